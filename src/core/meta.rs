/*!
 * Copyright (c) 2016 Microsoft Corporation. All rights reserved.
 * Licensed under the MIT License. See LICENSE file in the project root for license information.
 */

//! Shared constants and callback types.

use std::sync::Arc;

/// Small epsilon value for numerical comparisons
pub const K_EPSILON: f64 = 1e-15;
/// Values with magnitude below this are treated as zero
pub const K_ZERO_THRESHOLD: f64 = 1e-35;
/// Minimum possible split gain
pub const K_MIN_SCORE: f64 = f64::NEG_INFINITY;
/// Constant indicating no specific column/value is set
pub const NO_SPECIFIC: i32 = -1;
/// Magic token at the start of every binary dataset file
pub const BINARY_FILE_TOKEN: &str = "______LightGBM_Binary_File_Token______\n";
/// Version tag written into model files
pub const MODEL_VERSION: &str = "v2";

/// Row prediction callback: sparse `(feature index, value)` pairs in, one
/// output per class out. Used by the loader to compute warm-start scores.
pub type PredictFunction = Arc<dyn Fn(&[(i32, f64)], &mut [f64]) + Send + Sync>;

/// Threshold `s` by `l1`, the soft-thresholding used by leaf outputs.
#[inline]
pub fn threshold_l1(s: f64, l1: f64) -> f64 {
    let reg_s = (s.abs() - l1).max(0.0);
    if s >= 0.0 {
        reg_s
    } else {
        -reg_s
    }
}

/// Whether `v` is effectively zero.
#[inline]
pub fn is_zero(v: f64) -> bool {
    v.abs() <= K_ZERO_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_l1() {
        assert_eq!(threshold_l1(3.0, 1.0), 2.0);
        assert_eq!(threshold_l1(-3.0, 1.0), -2.0);
        assert_eq!(threshold_l1(0.5, 1.0), 0.0);
    }

    #[test]
    fn test_token_length() {
        assert_eq!(BINARY_FILE_TOKEN.len(), 39);
        assert!(is_zero(1e-40));
        assert!(!is_zero(1e-10));
    }
}
