//! Categorical feature binning.
//!
//! Each frequent category gets its own bin, most frequent first. Rare,
//! negative, NaN and unseen categories share one trailing "other" bin.

/// Category layout produced by [`find_categorical_bins`].
#[derive(Debug, Clone, PartialEq)]
pub struct CategoricalBins {
    /// Category of each bin; the trailing "other" bin is `-1`
    pub bin_2_categorical: Vec<i32>,
    /// Sample count of each bin, "other" included
    pub cnt_in_bin: Vec<usize>,
}

/// Category value used for the "other" bin.
pub const OTHER_CATEGORY: i32 = -1;

/// Assign bins to categories.
///
/// `distinct_values` and `counts` describe the sample (zero included when it
/// occurs). Categories with fewer than `filter_cnt` samples are dropped and at
/// most `max_bin - 1` are kept.
pub fn find_categorical_bins(
    distinct_values: &[f64],
    counts: &[usize],
    total_sample_cnt: usize,
    max_bin: usize,
    filter_cnt: usize,
) -> CategoricalBins {
    let mut cats: Vec<(i32, usize)> = Vec::with_capacity(distinct_values.len());
    let mut negative_cnt = 0usize;
    for (&v, &c) in distinct_values.iter().zip(counts) {
        if v.is_nan() {
            continue;
        }
        let val = v as i32;
        if val < 0 {
            negative_cnt += c;
            continue;
        }
        match cats.iter_mut().find(|(cat, _)| *cat == val) {
            Some(entry) => entry.1 += c,
            None => cats.push((val, c)),
        }
    }
    if negative_cnt > 0 {
        log::warn!("Met negative value in categorical features, will convert it to NaN");
    }

    // most frequent first, ties by category value
    cats.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let keep_limit = max_bin.saturating_sub(1);
    let mut bin_2_categorical = Vec::new();
    let mut cnt_in_bin = Vec::new();
    let mut used_cnt = 0usize;
    for &(cat, cnt) in cats.iter() {
        if bin_2_categorical.len() >= keep_limit || cnt < filter_cnt.max(1) {
            break;
        }
        bin_2_categorical.push(cat);
        cnt_in_bin.push(cnt);
        used_cnt += cnt;
    }

    bin_2_categorical.push(OTHER_CATEGORY);
    cnt_in_bin.push(total_sample_cnt.saturating_sub(used_cnt));
    CategoricalBins {
        bin_2_categorical,
        cnt_in_bin,
    }
}
