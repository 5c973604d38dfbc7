//! Feature binning.
//!
//! Continuous and categorical features are discretized into small integer
//! bins from a row sample so that split search can work on histograms.

pub mod categorical;
pub mod mapper;
pub mod numerical;

pub use mapper::BinMapper;

use crate::core::types::BinType;
use rayon::prelude::*;
use std::collections::HashSet;

/// Parameters shared by every feature's [`BinMapper::find_bin`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinParams {
    pub max_bin: usize,
    pub min_data_in_bin: usize,
    /// Minimum rows each side of some split must keep, else the feature is trivial
    pub filter_cnt: usize,
    pub use_missing: bool,
    pub zero_as_missing: bool,
}

/// Build mappers for `features` in parallel.
///
/// `sample_values[f]` holds the sampled non-zero values of raw column `f`;
/// a column missing from the sample (or ignored) yields `None`.
pub fn find_bins_for_features(
    sample_values: &[Vec<f64>],
    features: std::ops::Range<usize>,
    total_sample_cnt: usize,
    params: BinParams,
    categorical_features: &HashSet<usize>,
    ignore_features: &HashSet<usize>,
) -> Vec<Option<BinMapper>> {
    features
        .into_par_iter()
        .map(|f| {
            if ignore_features.contains(&f) {
                return None;
            }
            let bin_type = if categorical_features.contains(&f) {
                BinType::Categorical
            } else {
                BinType::Numerical
            };
            let values = sample_values.get(f).map_or(&[][..], |v| v.as_slice());
            Some(BinMapper::find_bin(
                values,
                total_sample_cnt,
                params.max_bin,
                params.min_data_in_bin,
                params.filter_cnt,
                bin_type,
                params.use_missing,
                params.zero_as_missing,
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_bins_for_features() {
        let sample = vec![vec![1.0, 2.0, 3.0], vec![], vec![1.0, 1.0, 2.0]];
        let params = BinParams {
            max_bin: 16,
            min_data_in_bin: 1,
            filter_cnt: 0,
            use_missing: true,
            zero_as_missing: false,
        };
        let cats: HashSet<usize> = [2].into_iter().collect();
        let ignore: HashSet<usize> = [1].into_iter().collect();
        let mappers = find_bins_for_features(&sample, 0..3, 3, params, &cats, &ignore);
        assert_eq!(mappers.len(), 3);
        assert!(mappers[1].is_none());
        assert_eq!(mappers[0].as_ref().unwrap().bin_type(), BinType::Numerical);
        assert_eq!(mappers[2].as_ref().unwrap().bin_type(), BinType::Categorical);
    }
}
