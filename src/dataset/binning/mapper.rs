//! Per-feature value to bin mapping.

use super::categorical::{find_categorical_bins, OTHER_CATEGORY};
use super::numerical::{check_double_equal_ordered, find_bin_with_zero_as_one_bin};
use crate::core::error::{LightGBMError, Result};
use crate::core::types::{BinType, MissingType};
use crate::core::utils::{BinaryReader, BinaryWriter, Common};
use std::collections::HashMap;

/// Bytes taken by the fixed part of a serialized [`BinMapper`].
const FIXED_SIZE: usize = 48;

/// Converts raw feature values into bins and keeps the bin metadata.
///
/// A mapper is built once from a sample by [`BinMapper::find_bin`] and never
/// changes afterwards. Its serialized form is bounded by
/// [`BinMapper::size_for_specific_bin`] so mappers can be exchanged in a
/// fixed-stride all-gather.
#[derive(Debug, Clone, PartialEq)]
pub struct BinMapper {
    num_bin: i32,
    missing_type: MissingType,
    is_trivial: bool,
    sparse_rate: f64,
    bin_type: BinType,
    min_val: f64,
    max_val: f64,
    default_bin: u32,
    /// Upper bound of each bin, numerical features only
    bin_upper_bound: Vec<f64>,
    /// Category of each bin, categorical features only
    bin_2_categorical: Vec<i32>,
    categorical_2_bin: HashMap<i32, u32>,
}

impl Default for BinMapper {
    fn default() -> Self {
        BinMapper {
            num_bin: 1,
            missing_type: MissingType::None,
            is_trivial: true,
            sparse_rate: 1.0,
            bin_type: BinType::Numerical,
            min_val: 0.0,
            max_val: 0.0,
            default_bin: 0,
            bin_upper_bound: vec![f64::INFINITY],
            bin_2_categorical: Vec::new(),
            categorical_2_bin: HashMap::new(),
        }
    }
}

impl BinMapper {
    /// Create a trivial single-bin mapper
    pub fn new() -> Self {
        Self::default()
    }

    /// Upper bound on the serialized size of a mapper with `num_bin` bins
    pub fn size_for_specific_bin(num_bin: usize) -> usize {
        FIXED_SIZE + num_bin * std::mem::size_of::<f64>()
    }

    /// Build bins from a sample of one feature.
    ///
    /// `values` holds only the sampled non-zero values (NaN included);
    /// zeros are implied by `total_sample_cnt - values.len()`.
    #[allow(clippy::too_many_arguments)]
    pub fn find_bin(
        values: &[f64],
        total_sample_cnt: usize,
        max_bin: usize,
        min_data_in_bin: usize,
        filter_cnt: usize,
        bin_type: BinType,
        use_missing: bool,
        zero_as_missing: bool,
    ) -> BinMapper {
        let mut non_nan: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        let mut na_cnt = 0usize;
        let missing_type = if !use_missing {
            MissingType::None
        } else if zero_as_missing {
            MissingType::Zero
        } else if non_nan.len() == values.len() {
            MissingType::None
        } else {
            na_cnt = values.len() - non_nan.len();
            MissingType::NaN
        };
        let zero_cnt = total_sample_cnt.saturating_sub(non_nan.len() + na_cnt);

        non_nan.sort_by(|a, b| a.total_cmp(b));
        let (distinct_values, counts) = distinct_with_zero(&non_nan, zero_cnt);

        let mut mapper = BinMapper {
            missing_type,
            bin_type,
            min_val: distinct_values.first().copied().unwrap_or(0.0),
            max_val: distinct_values.last().copied().unwrap_or(0.0),
            ..BinMapper::default()
        };

        let cnt_in_bin = match bin_type {
            BinType::Numerical => {
                let mut bounds = match missing_type {
                    MissingType::NaN => find_bin_with_zero_as_one_bin(
                        &distinct_values,
                        &counts,
                        max_bin.saturating_sub(1),
                        total_sample_cnt.saturating_sub(na_cnt),
                        min_data_in_bin,
                    ),
                    _ => find_bin_with_zero_as_one_bin(
                        &distinct_values,
                        &counts,
                        max_bin,
                        total_sample_cnt,
                        min_data_in_bin,
                    ),
                };
                if missing_type == MissingType::Zero && bounds.len() == 2 {
                    mapper.missing_type = MissingType::None;
                }
                if missing_type == MissingType::NaN {
                    bounds.push(f64::NAN);
                }
                let num_bin = bounds.len();
                let mut cnt_in_bin = vec![0usize; num_bin];
                let mut i_bin = 0usize;
                for (&v, &c) in distinct_values.iter().zip(&counts) {
                    while i_bin + 1 < num_bin && v > bounds[i_bin] {
                        i_bin += 1;
                    }
                    cnt_in_bin[i_bin] += c;
                }
                if missing_type == MissingType::NaN {
                    cnt_in_bin[num_bin - 1] = na_cnt;
                }
                mapper.num_bin = num_bin as i32;
                mapper.bin_upper_bound = bounds;
                cnt_in_bin
            }
            BinType::Categorical => {
                let bins = find_categorical_bins(
                    &distinct_values,
                    &counts,
                    total_sample_cnt,
                    max_bin,
                    filter_cnt,
                );
                mapper.missing_type = MissingType::NaN;
                mapper.num_bin = bins.bin_2_categorical.len() as i32;
                mapper.categorical_2_bin = bins
                    .bin_2_categorical
                    .iter()
                    .enumerate()
                    .map(|(i, &cat)| (cat, i as u32))
                    .collect();
                mapper.bin_upper_bound.clear();
                mapper.bin_2_categorical = bins.bin_2_categorical;
                bins.cnt_in_bin
            }
        };

        mapper.is_trivial =
            mapper.num_bin <= 1 || need_filter(&cnt_in_bin, total_sample_cnt, filter_cnt, bin_type);
        mapper.default_bin = mapper.value_to_bin(0.0);
        mapper.sparse_rate = if mapper.is_trivial || total_sample_cnt == 0 {
            1.0
        } else {
            cnt_in_bin[mapper.default_bin as usize] as f64 / total_sample_cnt as f64
        };
        mapper
    }

    /// Number of bins
    #[inline]
    pub fn num_bin(&self) -> i32 {
        self.num_bin
    }

    #[inline]
    pub fn missing_type(&self) -> MissingType {
        self.missing_type
    }

    /// A trivial feature cannot be split on and is dropped from the dataset
    #[inline]
    pub fn is_trivial(&self) -> bool {
        self.is_trivial
    }

    /// Fraction of sampled rows in the default bin
    #[inline]
    pub fn sparse_rate(&self) -> f64 {
        self.sparse_rate
    }

    #[inline]
    pub fn bin_type(&self) -> BinType {
        self.bin_type
    }

    /// Bin of the value zero
    #[inline]
    pub fn default_bin(&self) -> u32 {
        self.default_bin
    }

    /// Upper bounds of the numerical bins
    pub fn bin_upper_bound(&self) -> &[f64] {
        &self.bin_upper_bound
    }

    /// Map a bin back to a representative raw value.
    ///
    /// For numerical features this is the bin's upper bound, which is what
    /// tree thresholds store.
    pub fn bin_to_value(&self, bin: u32) -> f64 {
        match self.bin_type {
            BinType::Numerical => self.bin_upper_bound.get(bin as usize).copied().unwrap_or(0.0),
            BinType::Categorical => self
                .bin_2_categorical
                .get(bin as usize)
                .map_or(0.0, |&c| f64::from(c)),
        }
    }

    /// Map a raw value to its bin
    #[inline]
    pub fn value_to_bin(&self, value: f64) -> u32 {
        match self.bin_type {
            BinType::Numerical => {
                let mut value = value;
                if value.is_nan() {
                    if self.missing_type == MissingType::NaN {
                        return (self.num_bin - 1) as u32;
                    }
                    value = 0.0;
                }
                let mut r = self.num_bin as usize;
                if self.missing_type == MissingType::NaN {
                    r -= 1;
                }
                // first bin whose upper bound is >= value
                let bounds = &self.bin_upper_bound[..r];
                let pos = bounds.partition_point(|&ub| value > ub);
                pos.min(r.saturating_sub(1)) as u32
            }
            BinType::Categorical => {
                let other = (self.num_bin - 1) as u32;
                if value.is_nan() || value < 0.0 {
                    return other;
                }
                self.categorical_2_bin
                    .get(&(value as i32))
                    .copied()
                    .unwrap_or(other)
            }
        }
    }

    /// Bin of a categorical value, `None` when the category has no own bin
    pub fn categorical_bin(&self, category: i32) -> Option<u32> {
        if category == OTHER_CATEGORY {
            return None;
        }
        self.categorical_2_bin.get(&category).copied()
    }

    /// Bytes used by the serialized form of this mapper
    pub fn sizes_in_byte(&self) -> usize {
        let entries = match self.bin_type {
            BinType::Numerical => self.num_bin as usize * std::mem::size_of::<f64>(),
            BinType::Categorical => self.num_bin as usize * std::mem::size_of::<i32>(),
        };
        FIXED_SIZE + entries
    }

    /// Serialize to its binary layout
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf: Vec<u8> = Vec::with_capacity(self.sizes_in_byte());
        buf.write_i32(self.num_bin)?;
        buf.write_i32(self.missing_type as i32)?;
        buf.write_i32(i32::from(self.is_trivial))?;
        buf.write_i32(self.bin_type.to_i32())?;
        buf.write_f64(self.sparse_rate)?;
        buf.write_f64(self.min_val)?;
        buf.write_f64(self.max_val)?;
        buf.write_u32(self.default_bin)?;
        buf.write_u32(0)?;
        match self.bin_type {
            BinType::Numerical => {
                for &ub in &self.bin_upper_bound {
                    buf.write_f64(ub)?;
                }
            }
            BinType::Categorical => {
                for &cat in &self.bin_2_categorical {
                    buf.write_i32(cat)?;
                }
            }
        }
        Ok(buf)
    }

    /// Write into the front of `buffer`, which must hold
    /// [`BinMapper::sizes_in_byte`] bytes
    pub fn copy_to(&self, buffer: &mut [u8]) -> Result<()> {
        let bytes = self.to_bytes()?;
        if buffer.len() < bytes.len() {
            return Err(LightGBMError::internal(format!(
                "bin mapper needs {} bytes, buffer has {}",
                bytes.len(),
                buffer.len()
            )));
        }
        buffer[..bytes.len()].copy_from_slice(&bytes);
        Ok(())
    }

    /// Rebuild a mapper from the front of `buffer`. Trailing bytes are ignored.
    pub fn copy_from(buffer: &[u8]) -> Result<BinMapper> {
        let mut reader = BinaryReader::new(buffer, "bin mapper");
        Self::read_from(&mut reader)
    }

    /// Read a mapper at the reader's cursor
    pub fn read_from(reader: &mut BinaryReader<'_>) -> Result<BinMapper> {
        let num_bin = reader.read_i32()?;
        if num_bin < 1 {
            return Err(LightGBMError::format(format!("bin mapper has {} bins", num_bin)));
        }
        let missing_type = MissingType::from_i32(reader.read_i32()?)?;
        let is_trivial = reader.read_i32()? != 0;
        let bin_type = BinType::from_i32(reader.read_i32()?)?;
        let sparse_rate = reader.read_f64()?;
        let min_val = reader.read_f64()?;
        let max_val = reader.read_f64()?;
        let default_bin = reader.read_u32()?;
        let _padding = reader.read_u32()?;

        let mut mapper = BinMapper {
            num_bin,
            missing_type,
            is_trivial,
            sparse_rate,
            bin_type,
            min_val,
            max_val,
            default_bin,
            bin_upper_bound: Vec::new(),
            bin_2_categorical: Vec::new(),
            categorical_2_bin: HashMap::new(),
        };
        match bin_type {
            BinType::Numerical => {
                mapper.bin_upper_bound = (0..num_bin)
                    .map(|_| reader.read_f64())
                    .collect::<Result<_>>()?;
            }
            BinType::Categorical => {
                mapper.bin_2_categorical = reader.read_i32_vec(num_bin as usize)?;
                mapper.categorical_2_bin = mapper
                    .bin_2_categorical
                    .iter()
                    .enumerate()
                    .map(|(i, &cat)| (cat, i as u32))
                    .collect();
            }
        }
        Ok(mapper)
    }

    /// Value range or category list, as stored in `feature_infos` of a model
    pub fn bin_info_string(&self) -> String {
        if self.is_trivial {
            return "none".to_string();
        }
        match self.bin_type {
            BinType::Numerical => format!(
                "[{}:{}]",
                Common::double_to_str(self.min_val),
                Common::double_to_str(self.max_val)
            ),
            BinType::Categorical => {
                let cats: Vec<i32> = self
                    .bin_2_categorical
                    .iter()
                    .copied()
                    .filter(|&c| c != OTHER_CATEGORY)
                    .collect();
                Common::join(&cats, ":")
            }
        }
    }
}

/// Sorted distinct values with counts; zero is inserted in order with
/// `zero_cnt` when there are implied zeros.
fn distinct_with_zero(sorted: &[f64], zero_cnt: usize) -> (Vec<f64>, Vec<usize>) {
    let mut distinct_values: Vec<f64> = Vec::new();
    let mut counts: Vec<usize> = Vec::new();
    let mut zero_pushed = zero_cnt == 0;
    for &v in sorted {
        if !zero_pushed && v > 0.0 {
            distinct_values.push(0.0);
            counts.push(zero_cnt);
            zero_pushed = true;
        }
        match distinct_values.last() {
            Some(&last) if check_double_equal_ordered(last, v) => {
                if let Some(c) = counts.last_mut() {
                    *c += 1;
                }
            }
            _ => {
                distinct_values.push(v);
                counts.push(1);
            }
        }
    }
    if !zero_pushed {
        distinct_values.push(0.0);
        counts.push(zero_cnt);
    }
    (distinct_values, counts)
}

/// True when no bin boundary splits the sample into two sides with at least
/// `filter_cnt` rows each.
fn need_filter(cnt_in_bin: &[usize], total_cnt: usize, filter_cnt: usize, bin_type: BinType) -> bool {
    match bin_type {
        BinType::Numerical => {
            let mut sum_left = 0usize;
            for &c in &cnt_in_bin[..cnt_in_bin.len().saturating_sub(1)] {
                sum_left += c;
                if sum_left >= filter_cnt && total_cnt.saturating_sub(sum_left) >= filter_cnt {
                    return false;
                }
            }
            true
        }
        BinType::Categorical => {
            if cnt_in_bin.len() > 2 {
                return false;
            }
            cnt_in_bin[..cnt_in_bin.len().saturating_sub(1)]
                .iter()
                .all(|&c| c < filter_cnt || total_cnt.saturating_sub(c) < filter_cnt)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::meta::K_ZERO_THRESHOLD;

    fn numerical(values: &[f64], total: usize) -> BinMapper {
        BinMapper::find_bin(values, total, 255, 1, 0, BinType::Numerical, true, false)
    }

    #[test]
    fn test_numerical_bins_and_values() {
        let values: Vec<f64> = (1..=100).map(f64::from).collect();
        let mapper = numerical(&values, 100);
        assert!(!mapper.is_trivial());
        assert_eq!(mapper.missing_type(), MissingType::None);
        assert!(mapper.value_to_bin(1.0) < mapper.value_to_bin(50.0));
        assert!(mapper.value_to_bin(50.0) <= mapper.value_to_bin(1e9));
        // upper bounds are strictly increasing
        assert!(mapper.bin_upper_bound().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_zero_has_own_bin() {
        let values = vec![-1.0, -2.0, 3.0, 4.0];
        let mapper = numerical(&values, 10);
        let zero_bin = mapper.default_bin();
        assert_eq!(mapper.value_to_bin(0.0), zero_bin);
        assert_ne!(mapper.value_to_bin(-1.0), zero_bin);
        assert_ne!(mapper.value_to_bin(3.0), zero_bin);
        assert_eq!(mapper.bin_to_value(zero_bin), K_ZERO_THRESHOLD);
        assert!((mapper.sparse_rate() - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_nan_bin_is_last() {
        let values = vec![1.0, 2.0, f64::NAN, 3.0, f64::NAN];
        let mapper = numerical(&values, 5);
        assert_eq!(mapper.missing_type(), MissingType::NaN);
        assert_eq!(mapper.value_to_bin(f64::NAN), (mapper.num_bin() - 1) as u32);
    }

    #[test]
    fn test_missing_policies() {
        let values = vec![1.0, f64::NAN, 2.0];
        let mapper = BinMapper::find_bin(&values, 3, 255, 1, 0, BinType::Numerical, false, false);
        assert_eq!(mapper.missing_type(), MissingType::None);
        // NaN reads as zero without missing handling
        assert_eq!(mapper.value_to_bin(f64::NAN), mapper.value_to_bin(0.0));
    }

    #[test]
    fn test_constant_feature_is_trivial() {
        let mapper = numerical(&[], 100);
        assert!(mapper.is_trivial());
        let mapper = numerical(&[5.0; 20], 20);
        assert!(mapper.is_trivial() || mapper.num_bin() >= 2);
    }

    #[test]
    fn test_filter_cnt_marks_trivial() {
        // a single non-zero value cannot leave 10 rows on both sides
        let mapper = BinMapper::find_bin(&[1.0], 100, 255, 1, 10, BinType::Numerical, true, false);
        assert!(mapper.is_trivial());
    }

    #[test]
    fn test_categorical_mapping() {
        let values = vec![1.0, 1.0, 2.0, 2.0, 2.0, 7.0];
        let mapper = BinMapper::find_bin(&values, 8, 255, 1, 1, BinType::Categorical, true, false);
        assert_eq!(mapper.bin_type(), BinType::Categorical);
        assert_eq!(mapper.value_to_bin(2.0), 0);
        let other = (mapper.num_bin() - 1) as u32;
        assert_eq!(mapper.value_to_bin(-5.0), other);
        assert_eq!(mapper.value_to_bin(f64::NAN), other);
        assert_eq!(mapper.value_to_bin(99.0), other);
        assert_eq!(mapper.bin_info_string(), "2:0:1:7");
    }

    #[test]
    fn test_copy_to_and_from() {
        let values: Vec<f64> = (0..50).map(|i| f64::from(i) * 0.5 - 10.0).collect();
        let mapper = numerical(&values, 60);
        let mut buf = vec![0u8; BinMapper::size_for_specific_bin(mapper.num_bin() as usize)];
        mapper.copy_to(&mut buf).unwrap();
        let back = BinMapper::copy_from(&buf).unwrap();
        assert_eq!(back, mapper);

        let cat = BinMapper::find_bin(&[3.0, 3.0, 4.0], 5, 255, 1, 1, BinType::Categorical, true, false);
        let back = BinMapper::copy_from(&cat.to_bytes().unwrap()).unwrap();
        assert_eq!(back.value_to_bin(4.0), cat.value_to_bin(4.0));
        assert!(cat.sizes_in_byte() <= BinMapper::size_for_specific_bin(cat.num_bin() as usize));
    }

    #[test]
    fn test_copy_from_short_buffer() {
        assert!(BinMapper::copy_from(&[0u8; 10]).is_err());
    }
}
