//! Histogram construction and threshold search.

use crate::config::Config;
use crate::core::meta::threshold_l1;
use crate::core::types::{BinType, DataSize, MissingType, Score};
use crate::dataset::{BinMapper, Dataset};
use crate::io::bin::HistogramBinEntry;
use crate::treelearner::split_info::SplitInfo;
use rayon::prelude::*;

/// Regularization and size limits for split search.
#[derive(Debug, Clone, Copy)]
pub struct SplitParams {
    pub lambda_l1: f64,
    pub lambda_l2: f64,
    pub min_data_in_leaf: DataSize,
    pub min_sum_hessian_in_leaf: f64,
    pub min_gain_to_split: f64,
}

impl SplitParams {
    pub fn from_config(config: &Config) -> Self {
        SplitParams {
            lambda_l1: config.lambda_l1,
            lambda_l2: config.lambda_l2,
            min_data_in_leaf: config.min_data_in_leaf,
            min_sum_hessian_in_leaf: config.min_sum_hessian_in_leaf,
            min_gain_to_split: config.min_gain_to_split,
        }
    }

    /// Optimal leaf output for the given sums
    #[inline]
    pub fn leaf_output(&self, sum_gradients: f64, sum_hessians: f64) -> f64 {
        let denom = sum_hessians + self.lambda_l2;
        if denom <= 0.0 {
            return 0.0;
        }
        -threshold_l1(sum_gradients, self.lambda_l1) / denom
    }

    /// Objective reduction of a leaf with the given sums
    #[inline]
    pub fn leaf_gain(&self, sum_gradients: f64, sum_hessians: f64) -> f64 {
        let denom = sum_hessians + self.lambda_l2;
        if denom <= 0.0 {
            return 0.0;
        }
        let g = threshold_l1(sum_gradients, self.lambda_l1);
        g * g / denom
    }

    #[inline]
    fn side_ok(&self, entry: &HistogramBinEntry) -> bool {
        entry.cnt >= self.min_data_in_leaf.max(1) && entry.sum_hessians >= self.min_sum_hessian_in_leaf
    }
}

/// Gradient and hessian totals of `rows`, or of every row when `None`.
pub fn leaf_sums(rows: Option<&[DataSize]>, gradients: &[Score], hessians: &[Score]) -> HistogramBinEntry {
    let fold = |mut acc: HistogramBinEntry, i: usize| {
        acc.add(gradients[i], hessians[i]);
        acc
    };
    let merge = |mut a: HistogramBinEntry, b: HistogramBinEntry| {
        a.sum_gradients += b.sum_gradients;
        a.sum_hessians += b.sum_hessians;
        a.cnt += b.cnt;
        a
    };
    match rows {
        Some(rows) => rows
            .par_iter()
            .fold(HistogramBinEntry::default, |acc, &i| fold(acc, i as usize))
            .reduce(HistogramBinEntry::default, merge),
        None => (0..gradients.len())
            .into_par_iter()
            .fold(HistogramBinEntry::default, fold)
            .reduce(HistogramBinEntry::default, merge),
    }
}

/// Group-bin histogram of `rows` over every feature group of `dataset`.
///
/// The result has [`Dataset::num_total_bin`] entries laid out by
/// [`Dataset::group_bin_boundaries`]. Only groups holding a used feature
/// are filled.
pub fn construct_histograms(
    dataset: &Dataset,
    rows: Option<&[DataSize]>,
    gradients: &[Score],
    hessians: &[Score],
    group_used: &[bool],
    out: &mut Vec<HistogramBinEntry>,
) {
    out.clear();
    out.resize(dataset.num_total_bin(), HistogramBinEntry::default());
    let boundaries = dataset.group_bin_boundaries();
    let mut slices = Vec::with_capacity(dataset.num_groups());
    let mut rest: &mut [HistogramBinEntry] = out.as_mut_slice();
    for g in 0..dataset.num_groups() {
        let len = (boundaries[g + 1] - boundaries[g]) as usize;
        let (head, tail) = rest.split_at_mut(len);
        slices.push((g, head));
        rest = tail;
    }
    slices.into_par_iter().for_each(|(g, slice)| {
        if group_used[g] {
            dataset
                .feature_group(g)
                .construct_histogram(rows, gradients, hessians, slice);
        }
    });
}

/// `parent -= child` entry-wise, leaving the sibling's histogram.
pub fn subtract_histogram(parent: &mut [HistogramBinEntry], child: &[HistogramBinEntry]) {
    parent
        .par_iter_mut()
        .zip(child.par_iter())
        .for_each(|(p, c)| p.subtract(c));
}

/// Per-bin histogram of one feature cut out of a group histogram. The
/// default bin is rebuilt as the leaf total minus every other bin.
pub fn feature_histogram(
    dataset: &Dataset,
    inner: usize,
    group_hist: &[HistogramBinEntry],
    total: &HistogramBinEntry,
) -> Vec<HistogramBinEntry> {
    let group = dataset.feature_to_group(inner);
    let sub = dataset.feature_to_sub_feature(inner);
    let mapper = dataset.feature_bin_mapper(inner);
    let num_bin = mapper.num_bin() as usize;
    let default_bin = mapper.default_bin() as usize;
    let start = dataset.group_bin_boundaries()[group] as usize
        + dataset.feature_group(group).bin_offsets()[sub] as usize;
    let shift = usize::from(default_bin == 0);

    let mut hist = vec![HistogramBinEntry::default(); num_bin];
    let mut rest = *total;
    for (b, entry) in hist.iter_mut().enumerate() {
        if b == default_bin {
            continue;
        }
        *entry = group_hist[start + b - shift];
        rest.subtract(entry);
    }
    hist[default_bin] = rest;
    hist
}

/// Best split of `inner` for a leaf with histogram `hist` and totals `total`.
pub fn find_best_threshold(
    inner: usize,
    mapper: &BinMapper,
    hist: &[HistogramBinEntry],
    total: &HistogramBinEntry,
    params: &SplitParams,
) -> SplitInfo {
    let min_gain_shift = params.leaf_gain(total.sum_gradients, total.sum_hessians) + params.min_gain_to_split;
    match mapper.bin_type() {
        BinType::Numerical => find_best_threshold_numerical(inner, mapper, hist, total, params, min_gain_shift),
        BinType::Categorical => find_best_threshold_categorical(inner, hist, total, params, min_gain_shift),
    }
}

fn make_split(
    inner: usize,
    left: &HistogramBinEntry,
    right: &HistogramBinEntry,
    gain: f64,
    params: &SplitParams,
) -> SplitInfo {
    SplitInfo {
        feature: inner as i32,
        left_count: left.cnt,
        right_count: right.cnt,
        left_output: params.leaf_output(left.sum_gradients, left.sum_hessians),
        right_output: params.leaf_output(right.sum_gradients, right.sum_hessians),
        gain,
        left_sum_gradient: left.sum_gradients,
        left_sum_hessian: left.sum_hessians,
        right_sum_gradient: right.sum_gradients,
        right_sum_hessian: right.sum_hessians,
        ..SplitInfo::default()
    }
}

fn find_best_threshold_numerical(
    inner: usize,
    mapper: &BinMapper,
    hist: &[HistogramBinEntry],
    total: &HistogramBinEntry,
    params: &SplitParams,
    min_gain_shift: f64,
) -> SplitInfo {
    let num_bin = hist.len();
    let missing_bin = match mapper.missing_type() {
        MissingType::NaN => Some(num_bin - 1),
        MissingType::Zero => Some(mapper.default_bin() as usize),
        MissingType::None => None,
    };
    // the missing bin is tried on both sides
    let directions: &[bool] = if missing_bin.is_some() { &[true, false] } else { &[false] };

    let mut best = SplitInfo::default();
    for &default_left in directions {
        let mut left = HistogramBinEntry::default();
        if default_left {
            if let Some(m) = missing_bin {
                left = hist[m];
            }
        }
        for t in 0..num_bin.saturating_sub(1) {
            if Some(t) == missing_bin {
                continue;
            }
            left.sum_gradients += hist[t].sum_gradients;
            left.sum_hessians += hist[t].sum_hessians;
            left.cnt += hist[t].cnt;
            let mut right = *total;
            right.subtract(&left);
            if !params.side_ok(&left) || !params.side_ok(&right) {
                continue;
            }
            let gain = params.leaf_gain(left.sum_gradients, left.sum_hessians)
                + params.leaf_gain(right.sum_gradients, right.sum_hessians);
            if gain > min_gain_shift && gain - min_gain_shift > best.gain {
                best = make_split(inner, &left, &right, gain - min_gain_shift, params);
                best.threshold = t as u32;
                best.default_left = default_left;
            }
        }
    }
    best
}

fn find_best_threshold_categorical(
    inner: usize,
    hist: &[HistogramBinEntry],
    total: &HistogramBinEntry,
    params: &SplitParams,
    min_gain_shift: f64,
) -> SplitInfo {
    let mut best = SplitInfo::default();
    // the last bin collects unseen and rare categories and never goes left
    let other = hist.len().saturating_sub(1);
    for (b, left) in hist[..other].iter().enumerate() {
        let mut right = *total;
        right.subtract(left);
        if !params.side_ok(left) || !params.side_ok(&right) {
            continue;
        }
        let gain = params.leaf_gain(left.sum_gradients, left.sum_hessians)
            + params.leaf_gain(right.sum_gradients, right.sum_hessians);
        if gain > min_gain_shift && gain - min_gain_shift > best.gain {
            best = make_split(inner, left, &right, gain - min_gain_shift, params);
            best.threshold = b as u32;
            best.cat_threshold = vec![b as u32];
            best.default_left = false;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn params() -> SplitParams {
        SplitParams {
            lambda_l1: 0.0,
            lambda_l2: 0.0,
            min_data_in_leaf: 1,
            min_sum_hessian_in_leaf: 0.0,
            min_gain_to_split: 0.0,
        }
    }

    fn entry(g: f64, h: f64, cnt: DataSize) -> HistogramBinEntry {
        HistogramBinEntry { sum_gradients: g, sum_hessians: h, cnt }
    }

    #[test]
    fn test_leaf_output_and_gain() {
        let p = SplitParams { lambda_l1: 1.0, lambda_l2: 1.0, ..params() };
        assert_relative_eq!(p.leaf_output(-5.0, 3.0), 1.0);
        assert_relative_eq!(p.leaf_gain(-5.0, 3.0), 4.0);
        assert_eq!(p.leaf_output(0.5, 3.0), 0.0);
    }

    #[test]
    fn test_numerical_threshold_separates_signs() {
        let values: Vec<f64> = (0..40).map(|i| (i % 4) as f64 + 1.0).collect();
        let mapper = BinMapper::find_bin(&values, 40, 16, 1, 0, BinType::Numerical, true, false);
        let num_bin = mapper.num_bin() as usize;
        let mut hist = vec![HistogramBinEntry::default(); num_bin];
        // low values carry negative gradients, high values positive ones
        for v in [1.0, 2.0, 3.0, 4.0] {
            let b = mapper.value_to_bin(v) as usize;
            let g = if v <= 2.0 { -1.0 } else { 1.0 };
            hist[b] = entry(10.0 * g, 10.0, 10);
        }
        let total = hist.iter().fold(HistogramBinEntry::default(), |mut a, e| {
            a.sum_gradients += e.sum_gradients;
            a.sum_hessians += e.sum_hessians;
            a.cnt += e.cnt;
            a
        });
        let split = find_best_threshold(0, &mapper, &hist, &total, &params());
        assert!(split.is_valid());
        assert_eq!(split.threshold, mapper.value_to_bin(2.0));
        assert_relative_eq!(split.left_output, 1.0);
        assert_relative_eq!(split.right_output, -1.0);
        assert_eq!(split.left_count, 20);
        assert_relative_eq!(split.gain, 40.0);
    }

    #[test]
    fn test_no_split_below_min_data() {
        let hist = vec![entry(-1.0, 1.0, 1), entry(1.0, 1.0, 1)];
        let values = [0.0, 1.0];
        let mapper = BinMapper::find_bin(&values, 2, 16, 1, 0, BinType::Numerical, false, false);
        let total = entry(0.0, 2.0, 2);
        let p = SplitParams { min_data_in_leaf: 2, ..params() };
        assert!(!find_best_threshold(0, &mapper, &hist, &total, &p).is_valid());
    }

    #[test]
    fn test_categorical_one_vs_rest() {
        let hist = vec![entry(1.0, 5.0, 5), entry(-6.0, 5.0, 5), entry(1.0, 5.0, 5), entry(0.0, 1.0, 1)];
        let total = entry(-4.0, 16.0, 16);
        let split = find_best_threshold_categorical(2, &hist, &total, &params(), params().leaf_gain(-4.0, 16.0));
        assert_eq!(split.cat_threshold, vec![1]);
        assert_eq!(split.feature, 2);
        assert!(split.is_valid());
    }
}
