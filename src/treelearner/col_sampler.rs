//! Per-tree feature subsampling.

use crate::core::utils::Random;

/// Draws the subset of inner features each tree may split on.
#[derive(Debug, Clone)]
pub struct ColSampler {
    fraction: f64,
    random: Random,
    is_feature_used: Vec<bool>,
}

impl ColSampler {
    /// Sampler over `num_features` features keeping `fraction` of them per
    /// tree, drawing from its own generator seeded with `seed`.
    pub fn new(num_features: usize, fraction: f64, seed: i32) -> Self {
        ColSampler {
            fraction,
            random: Random::with_seed(seed),
            is_feature_used: vec![true; num_features],
        }
    }

    /// Draw the feature subset for the next tree.
    pub fn reset_by_tree(&mut self) {
        let total = self.is_feature_used.len();
        if self.fraction >= 1.0 || total == 0 {
            self.is_feature_used.iter_mut().for_each(|u| *u = true);
            return;
        }
        let used_cnt = ((total as f64 * self.fraction).round() as usize).clamp(1, total);
        self.is_feature_used.iter_mut().for_each(|u| *u = false);
        for idx in self.random.sample(total, used_cnt) {
            self.is_feature_used[idx] = true;
        }
    }

    #[inline]
    pub fn is_feature_used(&self, feature: usize) -> bool {
        self.is_feature_used[feature]
    }

    pub fn num_used(&self) -> usize {
        self.is_feature_used.iter().filter(|&&u| u).count()
    }
}
