//! Dense group-bin storage, one entry per row.

use crate::core::error::Result;
use crate::core::types::{DataSize, Score};
use crate::core::utils::{BinaryReader, BinaryWriter};
use crate::io::bin::{Bin, HistogramBinEntry};
use num_traits::{FromPrimitive, PrimInt, ToPrimitive, Unsigned};
use std::fmt;

/// Unsigned integer type a bin column is stored in.
pub trait BinValue:
    PrimInt + Unsigned + FromPrimitive + ToPrimitive + Default + Send + Sync + fmt::Debug + 'static
{
    /// Encode with the low `size_of::<Self>()` bytes, little-endian
    fn write_le(self, writer: &mut dyn BinaryWriter) -> std::io::Result<()> {
        let v = self.to_u64().unwrap_or_default();
        writer.write_bytes(&v.to_le_bytes()[..std::mem::size_of::<Self>()])
    }

    /// Decode a value written by [`BinValue::write_le`]
    fn read_le(reader: &mut BinaryReader<'_>) -> Result<Self> {
        let bytes = reader.read_bytes(std::mem::size_of::<Self>())?;
        let mut buf = [0u8; 8];
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(Self::from_u64(u64::from_le_bytes(buf)).unwrap_or_default())
    }

    #[inline]
    fn from_bin(v: u32) -> Self {
        Self::from_u32(v).unwrap_or_else(Self::max_value)
    }

    #[inline]
    fn to_bin(self) -> u32 {
        self.to_u32().unwrap_or(u32::MAX)
    }
}

impl<T> BinValue for T where
    T: PrimInt + Unsigned + FromPrimitive + ToPrimitive + Default + Send + Sync + fmt::Debug + 'static
{
}

/// Dense column, rows default to group bin zero.
#[derive(Debug, Clone)]
pub struct DenseBin<T: BinValue> {
    data: Vec<T>,
}

impl<T: BinValue> DenseBin<T> {
    pub fn new(num_data: DataSize) -> Self {
        DenseBin {
            data: vec![T::zero(); num_data.max(0) as usize],
        }
    }

    /// Read `num_global_data` entries, keeping only `used_indices` if given
    pub fn read_from(
        reader: &mut BinaryReader<'_>,
        num_global_data: DataSize,
        used_indices: Option<&[DataSize]>,
    ) -> Result<Self> {
        let all: Vec<T> = (0..num_global_data)
            .map(|_| T::read_le(reader))
            .collect::<Result<_>>()?;
        let data = match used_indices {
            Some(indices) => indices
                .iter()
                .map(|&i| all.get(i as usize).copied().unwrap_or_else(T::zero))
                .collect(),
            None => all,
        };
        Ok(DenseBin { data })
    }
}

impl<T: BinValue> Bin for DenseBin<T> {
    fn num_data(&self) -> DataSize {
        self.data.len() as DataSize
    }

    #[inline]
    fn push(&mut self, idx: DataSize, value: u32) {
        self.data[idx as usize] = T::from_bin(value);
    }

    fn finish_load(&mut self) {}

    #[inline]
    fn get(&self, idx: DataSize) -> u32 {
        self.data[idx as usize].to_bin()
    }

    fn is_sparse(&self) -> bool {
        false
    }

    fn construct_histogram(
        &self,
        data_indices: Option<&[DataSize]>,
        gradients: &[Score],
        hessians: &[Score],
        out: &mut [HistogramBinEntry],
    ) {
        match data_indices {
            Some(indices) => {
                for &i in indices {
                    let i = i as usize;
                    out[self.data[i].to_bin() as usize].add(gradients[i], hessians[i]);
                }
            }
            None => {
                for (i, v) in self.data.iter().enumerate() {
                    out[v.to_bin() as usize].add(gradients[i], hessians[i]);
                }
            }
        }
    }

    fn write_to(&self, writer: &mut dyn BinaryWriter) -> Result<()> {
        for &v in &self.data {
            v.write_le(writer)?;
        }
        Ok(())
    }

    fn sizes_in_byte(&self) -> usize {
        self.data.len() * std::mem::size_of::<T>()
    }
}
