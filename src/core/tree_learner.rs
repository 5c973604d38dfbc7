/*!
 * Copyright (c) 2016 Microsoft Corporation. All rights reserved.
 * Licensed under the MIT License. See LICENSE file in the project root for license information.
 */

//! The tree learning capability consumed by the boosting engine.

use crate::config::Config;
use crate::core::error::{LightGBMError, Result};
use crate::core::types::{DataSize, Score};
use crate::dataset::Dataset;
use crate::io::tree::Tree;
use crate::treelearner::SerialTreeLearner;
use std::sync::Arc;

/// Trains one tree from per-row gradients and hessians.
pub trait TreeLearner: Send + Sync {
    /// Bind the training data. Must be called before [`TreeLearner::train`].
    fn init(&mut self, train_data: Arc<Dataset>, is_constant_hessian: bool) -> Result<()>;

    /// Grow one tree. `gradients` and `hessians` hold one value per row.
    fn train(&mut self, gradients: &[Score], hessians: &[Score], is_constant_hessian: bool) -> Result<Tree>;

    /// Restrict the following trees to the in-bag rows, or to every row.
    fn set_bagging_data(&mut self, used_indices: Option<&[DataSize]>);

    /// Add the outputs of the last trained `tree` to the training scores.
    fn add_prediction_to_score(&self, tree: &Tree, score: &mut [f64]);
}

/// Tree learner selected by name.
pub fn create_tree_learner(learner_type: &str, config: &Config) -> Result<Box<dyn TreeLearner>> {
    match learner_type {
        "serial" => Ok(Box::new(SerialTreeLearner::new(config))),
        other => Err(LightGBMError::config(format!("Unknown tree learner type {}", other))),
    }
}
