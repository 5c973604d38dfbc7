//! Bin storage for one feature group.
//!
//! A [`Bin`] holds the group bin of every row, either densely (one entry per
//! row) or sparsely (only rows whose group bin is not zero). Group bin zero
//! means "every feature of the group at its default bin", so sparse storage
//! skips it.

use crate::core::error::{LightGBMError, Result};
use crate::core::types::{DataSize, Hist, Score};
use crate::core::utils::{BinaryReader, BinaryWriter};
use crate::io::dense_bin::DenseBin;
use crate::io::sparse_bin::SparseBin;
use std::fmt;

/// Gradient and hessian sums with the row count of one histogram bin.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HistogramBinEntry {
    pub sum_gradients: Hist,
    pub sum_hessians: Hist,
    pub cnt: DataSize,
}

impl HistogramBinEntry {
    #[inline]
    pub fn add(&mut self, g: Score, h: Score) {
        self.sum_gradients += Hist::from(g);
        self.sum_hessians += Hist::from(h);
        self.cnt += 1;
    }

    /// Subtract `other` entry-wise
    #[inline]
    pub fn subtract(&mut self, other: &HistogramBinEntry) {
        self.sum_gradients -= other.sum_gradients;
        self.sum_hessians -= other.sum_hessians;
        self.cnt -= other.cnt;
    }
}

/// Group-bin column of one feature group.
pub trait Bin: Send + Sync + fmt::Debug {
    /// Number of rows
    fn num_data(&self) -> DataSize;

    /// Store the bin of row `idx`. Rows must be pushed in increasing order
    /// for sparse storage, or `finish_load` must be called afterwards.
    fn push(&mut self, idx: DataSize, value: u32);

    /// Seal the column after all pushes
    fn finish_load(&mut self);

    /// Group bin of row `idx`
    fn get(&self, idx: DataSize) -> u32;

    /// Whether only non-zero bins are stored
    fn is_sparse(&self) -> bool;

    /// Accumulate `gradients[i]`, `hessians[i]` into `out[bin(i)]` for every
    /// row `i` of `data_indices` (sorted ascending), or every row when `None`.
    ///
    /// Sparse storage leaves `out[0]` untouched.
    fn construct_histogram(
        &self,
        data_indices: Option<&[DataSize]>,
        gradients: &[Score],
        hessians: &[Score],
        out: &mut [HistogramBinEntry],
    );

    /// Serialize the stored bins
    fn write_to(&self, writer: &mut dyn BinaryWriter) -> Result<()>;

    /// Serialized size in bytes
    fn sizes_in_byte(&self) -> usize;
}

/// Entry width of dense storage for `num_total_bin` group bins
pub fn dense_bin_width(num_total_bin: usize) -> usize {
    if num_total_bin <= 1 << 8 {
        1
    } else if num_total_bin <= 1 << 16 {
        2
    } else {
        4
    }
}

/// Create empty storage for `num_data` rows
pub fn create_bin(num_data: DataSize, num_total_bin: usize, is_sparse: bool) -> Box<dyn Bin> {
    match (is_sparse, dense_bin_width(num_total_bin)) {
        (true, 1) => Box::new(SparseBin::<u8>::new(num_data)),
        (true, 2) => Box::new(SparseBin::<u16>::new(num_data)),
        (true, _) => Box::new(SparseBin::<u32>::new(num_data)),
        (false, 1) => Box::new(DenseBin::<u8>::new(num_data)),
        (false, 2) => Box::new(DenseBin::<u16>::new(num_data)),
        (false, _) => Box::new(DenseBin::<u32>::new(num_data)),
    }
}

/// Read storage written by [`Bin::write_to`].
///
/// When `used_indices` is given only those rows (of `num_global_data`) are
/// kept, renumbered in order.
pub fn load_bin(
    reader: &mut BinaryReader<'_>,
    num_global_data: DataSize,
    num_total_bin: usize,
    is_sparse: bool,
    used_indices: Option<&[DataSize]>,
) -> Result<Box<dyn Bin>> {
    if num_global_data < 0 {
        return Err(LightGBMError::format("feature group has a negative row count"));
    }
    let bin: Box<dyn Bin> = match (is_sparse, dense_bin_width(num_total_bin)) {
        (true, 1) => Box::new(SparseBin::<u8>::read_from(reader, num_global_data, used_indices)?),
        (true, 2) => Box::new(SparseBin::<u16>::read_from(reader, num_global_data, used_indices)?),
        (true, _) => Box::new(SparseBin::<u32>::read_from(reader, num_global_data, used_indices)?),
        (false, 1) => Box::new(DenseBin::<u8>::read_from(reader, num_global_data, used_indices)?),
        (false, 2) => Box::new(DenseBin::<u16>::read_from(reader, num_global_data, used_indices)?),
        (false, _) => Box::new(DenseBin::<u32>::read_from(reader, num_global_data, used_indices)?),
    };
    Ok(bin)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(bin: &mut dyn Bin) {
        for (i, v) in [0u32, 3, 0, 1, 2, 0, 3].iter().enumerate() {
            if *v != 0 {
                bin.push(i as DataSize, *v);
            }
        }
        bin.finish_load();
    }

    #[test]
    fn test_dense_and_sparse_agree() {
        let mut dense = create_bin(7, 4, false);
        let mut sparse = create_bin(7, 4, true);
        fill(dense.as_mut());
        fill(sparse.as_mut());
        assert!(!dense.is_sparse());
        assert!(sparse.is_sparse());
        for i in 0..7 {
            assert_eq!(dense.get(i), sparse.get(i));
        }

        let grads: Vec<Score> = (0..7).map(|i| i as Score).collect();
        let hess = vec![1.0 as Score; 7];
        let indices = [1, 3, 4, 6];
        let mut hd = vec![HistogramBinEntry::default(); 4];
        let mut hs = vec![HistogramBinEntry::default(); 4];
        dense.construct_histogram(Some(&indices), &grads, &hess, &mut hd);
        sparse.construct_histogram(Some(&indices), &grads, &hess, &mut hs);
        assert_eq!(hd[1..], hs[1..]);
        assert_eq!(hd[3].cnt, 2);
        assert_eq!(hd[3].sum_gradients, 7.0);
    }

    #[test]
    fn test_write_and_load_subset() {
        for is_sparse in [false, true] {
            let mut bin = create_bin(7, 300, is_sparse);
            fill(bin.as_mut());
            let mut buf: Vec<u8> = Vec::new();
            bin.write_to(&mut buf).unwrap();
            assert_eq!(buf.len(), bin.sizes_in_byte());

            let mut reader = BinaryReader::new(&buf, "feature group");
            let full = load_bin(&mut reader, 7, 300, is_sparse, None).unwrap();
            assert_eq!((0..7).map(|i| full.get(i)).collect::<Vec<_>>(), vec![0, 3, 0, 1, 2, 0, 3]);

            let mut reader = BinaryReader::new(&buf, "feature group");
            let part = load_bin(&mut reader, 7, 300, is_sparse, Some(&[1, 2, 6])).unwrap();
            assert_eq!(part.num_data(), 3);
            assert_eq!((0..3).map(|i| part.get(i)).collect::<Vec<_>>(), vec![3, 0, 3]);
        }
    }

    #[test]
    fn test_bin_width() {
        assert_eq!(dense_bin_width(256), 1);
        assert_eq!(dense_bin_width(257), 2);
        assert_eq!(dense_bin_width(70_000), 4);
    }
}
