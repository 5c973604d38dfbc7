//! Best split bookkeeping for the tree learner.

use crate::core::meta::K_MIN_SCORE;
use crate::core::types::DataSize;

/// Candidate split of one leaf.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitInfo {
    /// Inner feature index, -1 when no valid split was found
    pub feature: i32,
    /// Numerical threshold bin
    pub threshold: u32,
    /// Bins going left for categorical splits
    pub cat_threshold: Vec<u32>,
    pub left_count: DataSize,
    pub right_count: DataSize,
    pub left_output: f64,
    pub right_output: f64,
    /// Gain over the parent, minus `min_gain_to_split`
    pub gain: f64,
    pub left_sum_gradient: f64,
    pub left_sum_hessian: f64,
    pub right_sum_gradient: f64,
    pub right_sum_hessian: f64,
    pub default_left: bool,
}

impl Default for SplitInfo {
    fn default() -> Self {
        SplitInfo {
            feature: -1,
            threshold: 0,
            cat_threshold: Vec::new(),
            left_count: 0,
            right_count: 0,
            left_output: 0.0,
            right_output: 0.0,
            gain: K_MIN_SCORE,
            left_sum_gradient: 0.0,
            left_sum_hessian: 0.0,
            right_sum_gradient: 0.0,
            right_sum_hessian: 0.0,
            default_left: true,
        }
    }
}

impl SplitInfo {
    /// Whether this holds a usable split
    pub fn is_valid(&self) -> bool {
        self.feature >= 0 && self.gain > 0.0
    }

    pub fn is_categorical(&self) -> bool {
        !self.cat_threshold.is_empty()
    }

    /// Whether `self` should replace `other` as the best split.
    ///
    /// Higher gain wins; equal gains go to the smaller feature index so the
    /// choice does not depend on search order.
    pub fn better_than(&self, other: &SplitInfo) -> bool {
        if self.feature < 0 {
            return false;
        }
        if other.feature < 0 {
            return true;
        }
        if self.gain != other.gain {
            self.gain > other.gain
        } else {
            self.feature < other.feature
        }
    }

    /// Mark as unusable
    pub fn reset(&mut self) {
        *self = SplitInfo::default();
    }
}
