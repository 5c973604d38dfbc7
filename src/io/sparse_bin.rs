//! Sparse group-bin storage, only rows with a non-zero group bin.

use crate::core::error::{LightGBMError, Result};
use crate::core::types::{DataSize, Score};
use crate::core::utils::{BinaryReader, BinaryWriter};
use crate::io::bin::{Bin, HistogramBinEntry};
use crate::io::dense_bin::BinValue;
use std::collections::HashMap;

/// Sorted `(row, bin)` pairs; absent rows are in group bin zero.
#[derive(Debug, Clone)]
pub struct SparseBin<T: BinValue> {
    num_data: DataSize,
    rows: Vec<DataSize>,
    vals: Vec<T>,
}

impl<T: BinValue> SparseBin<T> {
    pub fn new(num_data: DataSize) -> Self {
        SparseBin {
            num_data,
            rows: Vec::new(),
            vals: Vec::new(),
        }
    }

    /// Number of stored non-zero entries
    pub fn num_vals(&self) -> usize {
        self.rows.len()
    }

    /// Read pairs of `num_global_data` rows; with `used_indices` only those
    /// rows are kept, renumbered by position
    pub fn read_from(
        reader: &mut BinaryReader<'_>,
        num_global_data: DataSize,
        used_indices: Option<&[DataSize]>,
    ) -> Result<Self> {
        let cnt = reader.read_count()?;
        let mut rows = Vec::with_capacity(cnt);
        let mut vals = Vec::with_capacity(cnt);
        for _ in 0..cnt {
            let row = reader.read_i32()?;
            let v = reader.read_u32()?;
            if row < 0 || row >= num_global_data {
                return Err(LightGBMError::format(format!(
                    "sparse feature row {} is out of range {}",
                    row, num_global_data
                )));
            }
            rows.push(row);
            vals.push(T::from_bin(v));
        }
        match used_indices {
            None => Ok(SparseBin {
                num_data: num_global_data,
                rows,
                vals,
            }),
            Some(indices) => {
                let global_to_local: HashMap<DataSize, DataSize> = indices
                    .iter()
                    .enumerate()
                    .map(|(local, &global)| (global, local as DataSize))
                    .collect();
                let mut pairs: Vec<(DataSize, T)> = rows
                    .iter()
                    .zip(vals.iter())
                    .filter_map(|(r, &v)| global_to_local.get(r).map(|&l| (l, v)))
                    .collect();
                pairs.sort_by_key(|p| p.0);
                let (rows, vals) = pairs.into_iter().unzip();
                Ok(SparseBin {
                    num_data: indices.len() as DataSize,
                    rows,
                    vals,
                })
            }
        }
    }
}

impl<T: BinValue> Bin for SparseBin<T> {
    fn num_data(&self) -> DataSize {
        self.num_data
    }

    fn push(&mut self, idx: DataSize, value: u32) {
        if value != 0 {
            self.rows.push(idx);
            self.vals.push(T::from_bin(value));
        }
    }

    fn finish_load(&mut self) {
        if self.rows.windows(2).all(|w| w[0] < w[1]) {
            return;
        }
        let mut pairs: Vec<(DataSize, T)> =
            self.rows.drain(..).zip(self.vals.drain(..)).collect();
        pairs.sort_by_key(|p| p.0);
        // a later push of the same row wins
        pairs.dedup_by(|later, earlier| {
            if later.0 == earlier.0 {
                earlier.1 = later.1;
                true
            } else {
                false
            }
        });
        let (rows, vals) = pairs.into_iter().unzip();
        self.rows = rows;
        self.vals = vals;
    }

    fn get(&self, idx: DataSize) -> u32 {
        match self.rows.binary_search(&idx) {
            Ok(pos) => self.vals[pos].to_bin(),
            Err(_) => 0,
        }
    }

    fn is_sparse(&self) -> bool {
        true
    }

    fn construct_histogram(
        &self,
        data_indices: Option<&[DataSize]>,
        gradients: &[Score],
        hessians: &[Score],
        out: &mut [HistogramBinEntry],
    ) {
        match data_indices {
            None => {
                for (&r, &v) in self.rows.iter().zip(&self.vals) {
                    let r = r as usize;
                    out[v.to_bin() as usize].add(gradients[r], hessians[r]);
                }
            }
            Some(indices) => {
                // merge walk over two ascending row lists
                let mut j = 0usize;
                for &i in indices {
                    while j < self.rows.len() && self.rows[j] < i {
                        j += 1;
                    }
                    if j == self.rows.len() {
                        break;
                    }
                    if self.rows[j] == i {
                        let r = i as usize;
                        out[self.vals[j].to_bin() as usize].add(gradients[r], hessians[r]);
                    }
                }
            }
        }
    }

    fn write_to(&self, writer: &mut dyn BinaryWriter) -> Result<()> {
        writer.write_i32(self.rows.len() as i32)?;
        for (&r, &v) in self.rows.iter().zip(&self.vals) {
            writer.write_i32(r)?;
            writer.write_u32(v.to_bin())?;
        }
        Ok(())
    }

    fn sizes_in_byte(&self) -> usize {
        4 + self.rows.len() * 8
    }
}
