//! Running scores of one dataset.
//!
//! Scores are class-major: the score of row `i` for class `k` lives at
//! `num_data * k + i`. They start from the dataset's initial scores (or zero)
//! and grow by one tree at a time, so evaluation never re-traverses the model.

use crate::core::error::{LightGBMError, Result};
use crate::core::tree_learner::TreeLearner;
use crate::core::types::DataSize;
use crate::dataset::Dataset;
use crate::io::tree::Tree;
use rayon::prelude::*;
use std::sync::Arc;

/// Per-row, per-class scores kept in sync with the model.
#[derive(Debug, Clone)]
pub struct ScoreUpdater {
    data: Arc<Dataset>,
    num_data: usize,
    score: Vec<f64>,
    has_init_score: bool,
}

impl ScoreUpdater {
    /// Scores for `num_tree_per_iteration` classes, starting from the
    /// dataset's initial scores when it has them.
    pub fn new(data: Arc<Dataset>, num_tree_per_iteration: usize) -> Result<Self> {
        let num_data = data.num_data() as usize;
        let total = num_data * num_tree_per_iteration;
        let (score, has_init_score) = match data.metadata().init_score() {
            Some(init_score) => {
                if init_score.len() != total {
                    return Err(LightGBMError::dataset(format!(
                        "Number of class for initial score error, expected {} scores but got {}",
                        total,
                        init_score.len()
                    )));
                }
                (init_score.to_vec(), true)
            }
            None => (vec![0.0; total], false),
        };
        Ok(ScoreUpdater {
            data,
            num_data,
            score,
            has_init_score,
        })
    }

    pub fn num_data(&self) -> DataSize {
        self.num_data as DataSize
    }

    pub fn has_init_score(&self) -> bool {
        self.has_init_score
    }

    /// Every score, class-major
    pub fn score(&self) -> &[f64] {
        &self.score
    }

    /// Scores of one class
    pub fn class_score(&self, cur_tree_id: usize) -> &[f64] {
        let offset = self.num_data * cur_tree_id;
        &self.score[offset..offset + self.num_data]
    }

    fn class_score_mut(&mut self, cur_tree_id: usize) -> &mut [f64] {
        let offset = self.num_data * cur_tree_id;
        &mut self.score[offset..offset + self.num_data]
    }

    /// Add a constant to every row of one class.
    pub fn add_score(&mut self, val: f64, cur_tree_id: usize) {
        self.class_score_mut(cur_tree_id)
            .par_iter_mut()
            .for_each(|s| *s += val);
    }

    /// Add `tree` by walking every row's bins.
    pub fn add_tree_score(&mut self, tree: &Tree, cur_tree_id: usize) -> Result<()> {
        let data = Arc::clone(&self.data);
        tree.add_prediction_to_score(&data, self.class_score_mut(cur_tree_id))
    }

    /// Add `tree` for the rows in `indices` only.
    pub fn add_tree_score_by_indices(&mut self, tree: &Tree, indices: &[DataSize], cur_tree_id: usize) -> Result<()> {
        let data = Arc::clone(&self.data);
        tree.add_prediction_to_score_by_indices(&data, indices, self.class_score_mut(cur_tree_id))
    }

    /// Add `tree` through the learner's row partition of the last training.
    pub fn add_tree_score_by_learner(&mut self, learner: &dyn TreeLearner, tree: &Tree, cur_tree_id: usize) {
        learner.add_prediction_to_score(tree, self.class_score_mut(cur_tree_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::core::network::LocalNetwork;
    use crate::dataset::DatasetLoader;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    fn dataset(init_score: Option<Vec<f64>>) -> Arc<Dataset> {
        let config = Config { min_data_in_leaf: 1, min_data_in_bin: 1, ..Config::default() };
        let values = Array2::from_shape_vec((4, 1), vec![0.0, 1.0, 2.0, 3.0]).unwrap();
        let mut loader = DatasetLoader::without_header(&config, Arc::new(LocalNetwork)).unwrap();
        let mut data = loader.construct_from_matrix(values.view(), &[0.0, 1.0, 0.0, 1.0]).unwrap();
        if let Some(init_score) = init_score {
            data.metadata_mut().set_init_score(init_score).unwrap();
        }
        Arc::new(data)
    }

    #[test]
    fn test_starts_from_init_score() {
        let updater = ScoreUpdater::new(dataset(Some(vec![0.5, 1.0, 1.5, 2.0])), 1).unwrap();
        assert!(updater.has_init_score());
        assert_eq!(updater.score(), &[0.5, 1.0, 1.5, 2.0]);
    }

    #[test]
    fn test_init_score_size_must_match_classes() {
        assert!(ScoreUpdater::new(dataset(Some(vec![0.0; 4])), 2).is_err());
    }

    #[test]
    fn test_add_constant_and_tree() {
        let mut updater = ScoreUpdater::new(dataset(None), 2).unwrap();
        updater.add_score(1.5, 1);
        assert_eq!(updater.class_score(0), &[0.0; 4]);
        assert_eq!(updater.class_score(1), &[1.5; 4]);

        let tree = Tree::constant(-0.5);
        updater.add_tree_score(&tree, 0).unwrap();
        updater.add_tree_score_by_indices(&tree, &[1, 3], 1).unwrap();
        assert_relative_eq!(updater.class_score(0)[2], -0.5);
        assert_eq!(updater.class_score(1), &[1.5, 1.0, 1.5, 1.0]);
    }
}
