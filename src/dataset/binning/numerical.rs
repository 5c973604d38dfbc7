//! Numerical feature binning.
//!
//! Bin boundaries are found greedily over the sorted distinct values so that
//! every bin holds roughly the same number of samples. Zero always gets a bin
//! of its own, bounded by `±K_ZERO_THRESHOLD`, and the negative and positive
//! sides share the remaining bins in proportion to their sample counts.

use crate::core::meta::K_ZERO_THRESHOLD;

/// Smallest double strictly greater than `a`.
pub fn get_double_upper_bound(a: f64) -> f64 {
    if a.is_nan() || a == f64::INFINITY {
        return a;
    }
    if a == 0.0 {
        return f64::from_bits(1);
    }
    let bits = a.to_bits();
    if a > 0.0 {
        f64::from_bits(bits + 1)
    } else {
        f64::from_bits(bits - 1)
    }
}

/// Whether `b` equals `a` up to one ulp, given `a <= b`.
pub fn check_double_equal_ordered(a: f64, b: f64) -> bool {
    b <= get_double_upper_bound(a)
}

/// Greedy equal-frequency binning of sorted distinct values.
///
/// Returns at most `max_bin` upper bounds, the last one `+inf`.
pub fn greedy_find_bin(
    distinct_values: &[f64],
    counts: &[usize],
    max_bin: usize,
    total_cnt: usize,
    min_data_in_bin: usize,
) -> Vec<f64> {
    let num_distinct = distinct_values.len();
    let mut bin_upper_bound = Vec::new();
    if num_distinct == 0 || max_bin == 0 {
        bin_upper_bound.push(f64::INFINITY);
        return bin_upper_bound;
    }

    if num_distinct <= max_bin {
        let mut cur_cnt_inbin = 0usize;
        for i in 0..num_distinct - 1 {
            cur_cnt_inbin += counts[i];
            if cur_cnt_inbin >= min_data_in_bin {
                let val = get_double_upper_bound((distinct_values[i] + distinct_values[i + 1]) / 2.0);
                let is_new = bin_upper_bound
                    .last()
                    .map_or(true, |&last| !check_double_equal_ordered(last, val));
                if is_new {
                    bin_upper_bound.push(val);
                    cur_cnt_inbin = 0;
                }
            }
        }
        bin_upper_bound.push(f64::INFINITY);
        return bin_upper_bound;
    }

    let mut max_bin = max_bin;
    if min_data_in_bin > 0 {
        max_bin = max_bin.min(total_cnt / min_data_in_bin).max(1);
    }
    if max_bin == 1 {
        bin_upper_bound.push(f64::INFINITY);
        return bin_upper_bound;
    }
    let mut mean_bin_size = total_cnt as f64 / max_bin as f64;

    // values that fill a bin on their own are isolated first
    let mut rest_bin_cnt = max_bin as i64;
    let mut rest_sample_cnt = total_cnt as i64;
    let is_big_count: Vec<bool> = counts.iter().map(|&c| c as f64 >= mean_bin_size).collect();
    for (i, &big) in is_big_count.iter().enumerate() {
        if big {
            rest_bin_cnt -= 1;
            rest_sample_cnt -= counts[i] as i64;
        }
    }
    mean_bin_size = rest_sample_cnt as f64 / rest_bin_cnt.max(1) as f64;

    let mut upper_bounds = vec![f64::INFINITY; max_bin];
    let mut lower_bounds = vec![f64::INFINITY; max_bin];
    let mut bin_cnt = 0usize;
    lower_bounds[0] = distinct_values[0];
    let mut cur_cnt_inbin = 0usize;
    for i in 0..num_distinct - 1 {
        if !is_big_count[i] {
            rest_sample_cnt -= counts[i] as i64;
        }
        cur_cnt_inbin += counts[i];
        let need_new_bin = is_big_count[i]
            || cur_cnt_inbin as f64 >= mean_bin_size
            || (is_big_count[i + 1] && cur_cnt_inbin as f64 >= (mean_bin_size * 0.5).max(1.0));
        if need_new_bin {
            upper_bounds[bin_cnt] = distinct_values[i];
            bin_cnt += 1;
            lower_bounds[bin_cnt] = distinct_values[i + 1];
            if bin_cnt >= max_bin - 1 {
                break;
            }
            cur_cnt_inbin = 0;
            if !is_big_count[i] {
                rest_bin_cnt -= 1;
                mean_bin_size = rest_sample_cnt as f64 / rest_bin_cnt.max(1) as f64;
            }
        }
    }
    bin_cnt += 1;

    for i in 0..bin_cnt - 1 {
        let val = get_double_upper_bound((upper_bounds[i] + lower_bounds[i + 1]) / 2.0);
        let is_new = bin_upper_bound
            .last()
            .map_or(true, |&last| !check_double_equal_ordered(last, val));
        if is_new {
            bin_upper_bound.push(val);
        }
    }
    bin_upper_bound.push(f64::INFINITY);
    bin_upper_bound
}

/// Binning with zero isolated in its own bin.
///
/// `distinct_values` is sorted and includes zero (with its count) when the
/// sample contains zeros. The result never has more than `max_bin` bounds.
pub fn find_bin_with_zero_as_one_bin(
    distinct_values: &[f64],
    counts: &[usize],
    max_bin: usize,
    total_sample_cnt: usize,
    min_data_in_bin: usize,
) -> Vec<f64> {
    if max_bin <= 1 || distinct_values.is_empty() {
        return vec![f64::INFINITY];
    }
    let num_distinct = distinct_values.len();

    let mut left_cnt_data = 0usize;
    let mut cnt_zero = 0usize;
    let mut right_cnt_data = 0usize;
    for (&v, &c) in distinct_values.iter().zip(counts) {
        if v <= -K_ZERO_THRESHOLD {
            left_cnt_data += c;
        } else if v > K_ZERO_THRESHOLD {
            right_cnt_data += c;
        } else {
            cnt_zero += c;
        }
    }

    let left_cnt = distinct_values
        .iter()
        .position(|&v| v > -K_ZERO_THRESHOLD)
        .unwrap_or(num_distinct);
    let right_start = distinct_values[left_cnt..]
        .iter()
        .position(|&v| v > K_ZERO_THRESHOLD)
        .map(|p| p + left_cnt);

    // not enough bins for negative, zero and positive: plain greedy binning
    if left_cnt > 0 && right_start.is_some() && max_bin < 3 {
        let total = left_cnt_data + cnt_zero + right_cnt_data;
        return greedy_find_bin(distinct_values, counts, max_bin, total, min_data_in_bin);
    }

    let mut bin_upper_bound = Vec::new();
    if left_cnt > 0 {
        let non_zero = total_sample_cnt.saturating_sub(cnt_zero).max(1);
        let mut left_max_bin = (left_cnt_data as f64 / non_zero as f64 * (max_bin - 1) as f64) as usize;
        left_max_bin = left_max_bin.max(1);
        if right_start.is_some() {
            left_max_bin = left_max_bin.min(max_bin - 2);
        }
        bin_upper_bound = greedy_find_bin(
            &distinct_values[..left_cnt],
            &counts[..left_cnt],
            left_max_bin,
            left_cnt_data,
            min_data_in_bin,
        );
        if let Some(last) = bin_upper_bound.last_mut() {
            *last = -K_ZERO_THRESHOLD;
        }
    }

    match right_start {
        Some(start) => {
            let right_max_bin = (max_bin - 1 - bin_upper_bound.len()).max(1);
            let right_bounds = greedy_find_bin(
                &distinct_values[start..],
                &counts[start..],
                right_max_bin,
                right_cnt_data,
                min_data_in_bin,
            );
            bin_upper_bound.push(K_ZERO_THRESHOLD);
            bin_upper_bound.extend(right_bounds);
        }
        None => bin_upper_bound.push(f64::INFINITY),
    }
    bin_upper_bound
}
