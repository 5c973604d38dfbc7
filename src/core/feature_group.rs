//! # FeatureGroup Module
//!
//! A feature group stores the bins of one or more features in a single
//! column. Features bundled together rarely take non-default values on the
//! same row, so each row needs only one group bin:
//!
//! - group bin 0 means every sub-feature is at its default bin;
//! - sub-feature `i` owns group bins `[bin_offsets[i], bin_offsets[i + 1])`,
//!   its default bin excluded.

use crate::core::error::{LightGBMError, Result};
use crate::core::types::{DataSize, Score};
use crate::core::utils::{BinaryReader, BinaryWriter};
use crate::dataset::binning::BinMapper;
use crate::io::bin::{create_bin, load_bin, Bin, HistogramBinEntry};

/// Binned storage of a bundle of features.
#[derive(Debug)]
pub struct FeatureGroup {
    bin_mappers: Vec<BinMapper>,
    bin_offsets: Vec<u32>,
    num_total_bin: usize,
    is_sparse: bool,
    bin_data: Box<dyn Bin>,
}

fn compute_offsets(bin_mappers: &[BinMapper]) -> (Vec<u32>, usize) {
    let mut num_total_bin = 1u32;
    let mut bin_offsets = Vec::with_capacity(bin_mappers.len() + 1);
    for mapper in bin_mappers {
        bin_offsets.push(num_total_bin);
        let mut num_bin = mapper.num_bin() as u32;
        if mapper.default_bin() == 0 {
            num_bin -= 1;
        }
        num_total_bin += num_bin;
    }
    bin_offsets.push(num_total_bin);
    (bin_offsets, num_total_bin as usize)
}

impl FeatureGroup {
    /// Empty group for `num_data` rows.
    ///
    /// Storage is sparse when the estimated fraction of rows in group bin 0
    /// reaches `sparse_threshold`.
    pub fn new(bin_mappers: Vec<BinMapper>, num_data: DataSize, sparse_threshold: f64) -> Self {
        let (bin_offsets, num_total_bin) = compute_offsets(&bin_mappers);
        let non_default: f64 = bin_mappers.iter().map(|m| 1.0 - m.sparse_rate()).sum();
        let is_sparse = 1.0 - non_default >= sparse_threshold;
        FeatureGroup {
            bin_data: create_bin(num_data, num_total_bin, is_sparse),
            bin_mappers,
            bin_offsets,
            num_total_bin,
            is_sparse,
        }
    }

    /// Empty group with the same mappers and storage kind
    pub fn empty_like(&self, num_data: DataSize) -> Self {
        FeatureGroup {
            bin_mappers: self.bin_mappers.clone(),
            bin_offsets: self.bin_offsets.clone(),
            num_total_bin: self.num_total_bin,
            is_sparse: self.is_sparse,
            bin_data: create_bin(num_data, self.num_total_bin, self.is_sparse),
        }
    }

    /// Number of features in this group
    pub fn num_feature(&self) -> usize {
        self.bin_mappers.len()
    }

    /// Total number of group bins, group bin 0 included
    pub fn num_total_bin(&self) -> usize {
        self.num_total_bin
    }

    pub fn is_sparse(&self) -> bool {
        self.is_sparse
    }

    pub fn bin_mapper(&self, sub_feature: usize) -> &BinMapper {
        &self.bin_mappers[sub_feature]
    }

    pub fn bin_mappers(&self) -> &[BinMapper] {
        &self.bin_mappers
    }

    pub fn bin_offsets(&self) -> &[u32] {
        &self.bin_offsets
    }

    pub fn num_data(&self) -> DataSize {
        self.bin_data.num_data()
    }

    /// Group bin for `value` of `sub_feature`, `None` when it is the default bin
    #[inline]
    pub fn group_bin_for_value(&self, sub_feature: usize, value: f64) -> Option<u32> {
        let mapper = &self.bin_mappers[sub_feature];
        let bin = mapper.value_to_bin(value);
        if bin == mapper.default_bin() {
            return None;
        }
        let mut bin = bin + self.bin_offsets[sub_feature];
        if mapper.default_bin() == 0 {
            bin -= 1;
        }
        Some(bin)
    }

    /// Store a group bin computed by [`FeatureGroup::group_bin_for_value`]
    #[inline]
    pub fn push_group_bin(&mut self, row: DataSize, group_bin: u32) {
        self.bin_data.push(row, group_bin);
    }

    /// Map `value` and store it for `row`
    pub fn push_data(&mut self, sub_feature: usize, row: DataSize, value: f64) {
        if let Some(bin) = self.group_bin_for_value(sub_feature, value) {
            self.bin_data.push(row, bin);
        }
    }

    /// Seal the storage after all rows are pushed
    pub fn finish_load(&mut self) {
        self.bin_data.finish_load();
    }

    /// Group bin of `row`
    #[inline]
    pub fn group_bin(&self, row: DataSize) -> u32 {
        self.bin_data.get(row)
    }

    /// Feature bin of `sub_feature` decoded from a group bin
    #[inline]
    pub fn decode_bin(&self, sub_feature: usize, group_bin: u32) -> u32 {
        let lo = self.bin_offsets[sub_feature];
        let hi = self.bin_offsets[sub_feature + 1];
        let mapper = &self.bin_mappers[sub_feature];
        if group_bin >= lo && group_bin < hi {
            let bin = group_bin - lo;
            if mapper.default_bin() == 0 {
                bin + 1
            } else {
                bin
            }
        } else {
            mapper.default_bin()
        }
    }

    /// Feature bin of `sub_feature` at `row`
    #[inline]
    pub fn feature_bin(&self, sub_feature: usize, row: DataSize) -> u32 {
        self.decode_bin(sub_feature, self.bin_data.get(row))
    }

    /// Histogram over all group bins for the given rows
    pub fn construct_histogram(
        &self,
        data_indices: Option<&[DataSize]>,
        gradients: &[Score],
        hessians: &[Score],
        out: &mut [HistogramBinEntry],
    ) {
        self.bin_data
            .construct_histogram(data_indices, gradients, hessians, out);
    }

    /// Serialized size in bytes
    pub fn sizes_in_byte(&self) -> usize {
        1 + 4
            + self.bin_mappers.iter().map(BinMapper::sizes_in_byte).sum::<usize>()
            + self.bin_data.sizes_in_byte()
    }

    /// Write `is_sparse`, the sub-feature count, every mapper, then the bins
    pub fn write_to(&self, writer: &mut dyn BinaryWriter) -> Result<()> {
        writer.write_u8(u8::from(self.is_sparse))?;
        writer.write_i32(self.bin_mappers.len() as i32)?;
        for mapper in &self.bin_mappers {
            writer.write_bytes(&mapper.to_bytes()?)?;
        }
        self.bin_data.write_to(writer)
    }

    /// Read a group blob. With `used_indices` only those rows are kept.
    pub fn read_from(
        buf: &[u8],
        num_global_data: DataSize,
        used_indices: Option<&[DataSize]>,
    ) -> Result<Self> {
        let mut reader = BinaryReader::new(buf, "feature group");
        let is_sparse = reader.read_u8()? != 0;
        let num_feature = reader.read_count()?;
        if num_feature == 0 {
            return Err(LightGBMError::format("feature group has no features"));
        }
        let bin_mappers = (0..num_feature)
            .map(|_| BinMapper::read_from(&mut reader))
            .collect::<Result<Vec<_>>>()?;
        let (bin_offsets, num_total_bin) = compute_offsets(&bin_mappers);
        let bin_data = load_bin(&mut reader, num_global_data, num_total_bin, is_sparse, used_indices)?;
        Ok(FeatureGroup {
            bin_mappers,
            bin_offsets,
            num_total_bin,
            is_sparse,
            bin_data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::BinType;

    fn mapper(values: &[f64], total: usize) -> BinMapper {
        BinMapper::find_bin(values, total, 16, 1, 0, BinType::Numerical, true, false)
    }

    #[test]
    fn test_bundle_round_trip_of_bins() {
        // two sparse features that never co-occur
        let a = mapper(&[1.0, 2.0], 10);
        let b = mapper(&[5.0, 6.0, 7.0], 10);
        let mut group = FeatureGroup::new(vec![a.clone(), b.clone()], 10, 0.8);
        assert_eq!(group.num_feature(), 2);

        group.push_data(0, 1, 1.0);
        group.push_data(0, 2, 2.0);
        group.push_data(1, 5, 6.0);
        group.push_data(1, 6, 0.0);
        group.finish_load();

        assert_eq!(group.feature_bin(0, 1), a.value_to_bin(1.0));
        assert_eq!(group.feature_bin(0, 2), a.value_to_bin(2.0));
        assert_eq!(group.feature_bin(1, 5), b.value_to_bin(6.0));
        assert_eq!(group.feature_bin(1, 1), b.default_bin());
        assert_eq!(group.feature_bin(0, 5), a.default_bin());
        assert_eq!(group.group_bin(0), 0);
    }

    #[test]
    fn test_offsets_skip_default_bin() {
        let a = mapper(&[1.0, 2.0, 3.0], 10);
        assert_eq!(a.default_bin(), 0);
        let group = FeatureGroup::new(vec![a.clone()], 10, 0.8);
        assert_eq!(group.num_total_bin(), a.num_bin() as usize);
        assert_eq!(group.bin_offsets(), &[1, a.num_bin() as u32]);
    }

    #[test]
    fn test_write_and_read() {
        let a = mapper(&[-1.0, 1.0, 2.0, 3.0], 6);
        let mut group = FeatureGroup::new(vec![a], 6, 0.99);
        for (row, v) in [1.0, 0.0, -1.0, 3.0, 2.0, 0.0].iter().enumerate() {
            group.push_data(0, row as DataSize, *v);
        }
        group.finish_load();
        let mut buf: Vec<u8> = Vec::new();
        group.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), group.sizes_in_byte());

        let back = FeatureGroup::read_from(&buf, 6, None).unwrap();
        for row in 0..6 {
            assert_eq!(back.feature_bin(0, row), group.feature_bin(0, row));
        }
        let part = FeatureGroup::read_from(&buf, 6, Some(&[3, 4])).unwrap();
        assert_eq!(part.num_data(), 2);
        assert_eq!(part.feature_bin(0, 0), group.feature_bin(0, 3));

        assert!(FeatureGroup::read_from(&buf[..buf.len() - 1], 6, None).is_err());
    }
}
