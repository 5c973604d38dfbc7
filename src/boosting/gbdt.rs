//! Gradient Boosting Decision Tree engine.
//!
//! [`GBDT`] owns the model (one tree per class and iteration), the training
//! and validation score updaters and the bookkeeping for bagging and early
//! stopping. Trees of one iteration are stored consecutively, so tree
//! `i * num_tree_per_iteration + k` belongs to iteration `i` and class `k`.

use crate::config::Config;
use crate::core::error::{LightGBMError, Result};
use crate::core::meta::{K_EPSILON, K_MIN_SCORE, MODEL_VERSION};
use crate::core::tree_learner::{create_tree_learner, TreeLearner};
use crate::core::types::{DataSize, ImportanceType, Score};
use crate::core::utils::{Random, Threading};
use crate::dataset::Dataset;
use crate::io::tree::Tree;
use crate::metrics::Metric;
use crate::objective::{create_objective_from_string, ObjectiveFunction};
use crate::prediction::PredictionEarlyStopInstance;
use crate::boosting::score_updater::ScoreUpdater;
use log::{debug, info, warn};
use serde_json::{json, Value};
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Smallest block of rows drawn by one bagging task
const MIN_BAGGING_BLOCK: usize = 1000;

/// Name of the weak learner family, first line of a model file
const SUB_MODEL_NAME: &str = "tree";

fn not_initialized() -> LightGBMError {
    LightGBMError::training("GBDT is not initialized with training data")
}

/// Draw a Bernoulli-like sample of exactly `fraction * cnt` rows of
/// `[start, start + cnt)`, keeping row order on both sides.
fn bagging_helper(
    rand: &mut Random,
    fraction: f64,
    start: usize,
    cnt: usize,
    left: &mut Vec<DataSize>,
    right: &mut Vec<DataSize>,
) {
    let bag_cnt = (fraction * cnt as f64) as usize;
    for i in 0..cnt {
        let prob = (bag_cnt - left.len()) as f32 / (cnt - i) as f32;
        let row = (start + i) as DataSize;
        if rand.next_float() < prob {
            left.push(row);
        } else {
            right.push(row);
        }
    }
}

/// Value of the first line starting with `key`
fn find_value<'a>(lines: &[&'a str], key: &str) -> Option<&'a str> {
    lines.iter().find_map(|l| l.strip_prefix(key)).map(str::trim)
}

/// Gradient boosting over decision trees.
pub struct GBDT {
    config: Option<Config>,
    /// Iterations trained by this object, merged iterations excluded
    iter: usize,
    train_data: Option<Arc<Dataset>>,
    objective: Option<Box<dyn ObjectiveFunction>>,
    tree_learner: Option<Box<dyn TreeLearner>>,
    training_metrics: Vec<Box<dyn Metric>>,
    train_score_updater: Option<ScoreUpdater>,
    valid_score_updater: Vec<ScoreUpdater>,
    valid_metrics: Vec<Vec<Box<dyn Metric>>>,
    early_stopping_round: usize,
    best_iter: Vec<Vec<usize>>,
    best_score: Vec<Vec<f64>>,
    best_msg: Vec<Vec<String>>,
    models: Vec<Tree>,
    gradients: Vec<Score>,
    hessians: Vec<Score>,
    bag_data_indices: Vec<DataSize>,
    bag_data_cnt: DataSize,
    num_data: DataSize,
    num_class: usize,
    num_tree_per_iteration: usize,
    num_init_iteration: usize,
    num_iteration_for_pred: usize,
    shrinkage_rate: f64,
    max_feature_idx: i32,
    label_idx: i32,
    feature_names: Vec<String>,
    feature_infos: Vec<String>,
    average_output: bool,
    class_need_train: Vec<bool>,
    is_constant_hessian: bool,
    /// Parameter block of a loaded model, written back on save
    loaded_parameter: String,
}

impl std::fmt::Debug for GBDT {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GBDT")
            .field("iter", &self.iter)
            .field("num_class", &self.num_class)
            .field("num_tree_per_iteration", &self.num_tree_per_iteration)
            .field("num_models", &self.models.len())
            .field("num_init_iteration", &self.num_init_iteration)
            .field("objective", &self.objective)
            .finish()
    }
}

impl Default for GBDT {
    fn default() -> Self {
        Self::new()
    }
}

impl GBDT {
    /// Empty model, to be initialized for training or loaded from a string.
    pub fn new() -> Self {
        GBDT {
            config: None,
            iter: 0,
            train_data: None,
            objective: None,
            tree_learner: None,
            training_metrics: Vec::new(),
            train_score_updater: None,
            valid_score_updater: Vec::new(),
            valid_metrics: Vec::new(),
            early_stopping_round: 0,
            best_iter: Vec::new(),
            best_score: Vec::new(),
            best_msg: Vec::new(),
            models: Vec::new(),
            gradients: Vec::new(),
            hessians: Vec::new(),
            bag_data_indices: Vec::new(),
            bag_data_cnt: 0,
            num_data: 0,
            num_class: 1,
            num_tree_per_iteration: 1,
            num_init_iteration: 0,
            num_iteration_for_pred: 0,
            shrinkage_rate: 0.1,
            max_feature_idx: 0,
            label_idx: 0,
            feature_names: Vec::new(),
            feature_infos: Vec::new(),
            average_output: false,
            class_need_train: Vec::new(),
            is_constant_hessian: false,
            loaded_parameter: String::new(),
        }
    }

    /// Bind configuration, training data, objective and training metrics.
    ///
    /// The objective and the metrics must already be initialized with the
    /// training data. Without an objective, gradients have to be supplied
    /// to [`GBDT::train_one_iter`].
    pub fn init(
        &mut self,
        config: &Config,
        train_data: Arc<Dataset>,
        objective: Option<Box<dyn ObjectiveFunction>>,
        training_metrics: Vec<Box<dyn Metric>>,
    ) -> Result<()> {
        self.iter = 0;
        self.num_class = config.num_class;
        self.early_stopping_round = config.early_stopping_round;
        self.shrinkage_rate = config.learning_rate;
        self.num_tree_per_iteration = self.num_class;
        self.is_constant_hessian = false;
        if let Some(objective) = &objective {
            self.is_constant_hessian = objective.is_constant_hessian();
            self.num_tree_per_iteration = objective.num_model_per_iteration();
        }
        self.objective = objective;

        let mut learner = create_tree_learner("serial", config)?;
        learner.init(Arc::clone(&train_data), self.is_constant_hessian)?;
        self.tree_learner = Some(learner);

        self.training_metrics = training_metrics;
        self.train_score_updater = Some(ScoreUpdater::new(Arc::clone(&train_data), self.num_tree_per_iteration)?);
        self.num_data = train_data.num_data();
        let total_size = self.num_data as usize * self.num_tree_per_iteration;
        self.gradients = vec![0.0; total_size];
        self.hessians = vec![0.0; total_size];

        self.max_feature_idx = train_data.num_total_features() as i32 - 1;
        self.label_idx = train_data.label_idx();
        self.feature_names = train_data.feature_names().to_vec();
        self.feature_infos = train_data.feature_infos();

        self.bag_data_indices = (0..self.num_data).collect();
        self.bag_data_cnt = self.num_data;
        if config.bagging_fraction < 1.0 && config.bagging_freq > 0 {
            self.bag_data_cnt = (config.bagging_fraction * f64::from(self.num_data)) as DataSize;
            info!("Using bagging, fraction {} every {} iterations", config.bagging_fraction, config.bagging_freq);
        }

        self.class_need_train = (0..self.num_tree_per_iteration)
            .map(|k| self.objective.as_ref().map_or(true, |o| o.class_need_train(k)))
            .collect();

        self.train_data = Some(train_data);
        self.config = Some(config.clone());
        self.init_predict(-1);
        Ok(())
    }

    /// Put the trees of `other` in front of this model's trees.
    pub fn merge_from(&mut self, other: &GBDT) {
        let original = std::mem::take(&mut self.models);
        self.models = other.models.clone();
        self.num_init_iteration = self.models.len() / self.num_tree_per_iteration;
        self.models.extend(original);
        self.init_predict(-1);
    }

    /// Register a validation dataset binned like the training data.
    pub fn add_valid_dataset(&mut self, valid_data: Arc<Dataset>, valid_metrics: Vec<Box<dyn Metric>>) -> Result<()> {
        let train_data = self.train_data.as_ref().ok_or_else(not_initialized)?;
        if !train_data.check_align(&valid_data) {
            return Err(LightGBMError::dataset(
                "cannot add validation data, since it has different bin mappers with training data",
            ));
        }
        let mut updater = ScoreUpdater::new(valid_data, self.num_tree_per_iteration)?;
        for i in 0..self.iter {
            for k in 0..self.num_tree_per_iteration {
                let tree = &self.models[(i + self.num_init_iteration) * self.num_tree_per_iteration + k];
                updater.add_tree_score(tree, k)?;
            }
        }
        self.valid_score_updater.push(updater);
        if self.early_stopping_round > 0 {
            self.best_iter.push(vec![0; valid_metrics.len()]);
            self.best_score.push(vec![K_MIN_SCORE; valid_metrics.len()]);
            self.best_msg.push(vec![String::new(); valid_metrics.len()]);
        }
        self.valid_metrics.push(valid_metrics);
        Ok(())
    }

    /// Full training loop: at most `num_iterations` iterations with
    /// evaluation and early stopping, a snapshot every `snapshot_freq`
    /// iterations and the final model saved to `model_output_path`.
    pub fn train(&mut self, snapshot_freq: i32, model_output_path: &str) -> Result<()> {
        let num_iterations = self.config.as_ref().ok_or_else(not_initialized)?.num_iterations;
        let start = Instant::now();
        let mut is_finished = false;
        let mut iter = 0;
        while iter < num_iterations && !is_finished {
            is_finished = self.train_one_iter(None, None)?;
            if !is_finished {
                is_finished = self.eval_and_check_early_stopping();
            }
            iter += 1;
            info!(
                "{:.6} seconds elapsed, finished iteration {}",
                start.elapsed().as_secs_f64(),
                iter
            );
            if snapshot_freq > 0 && iter % snapshot_freq as usize == 0 {
                let snapshot_out = format!("{}.snapshot_iter_{}", model_output_path, iter);
                self.save_model_to_file(-1, &snapshot_out)?;
            }
        }
        self.save_model_to_file(-1, model_output_path)
    }

    /// Mean label of the training data when the first tree may start from it
    fn boost_from_average(&mut self) -> f64 {
        let enabled = self.config.as_ref().map_or(false, |c| c.boost_from_average);
        let Some(updater) = self.train_score_updater.as_mut() else {
            return 0.0;
        };
        let Some(objective) = self.objective.as_ref() else {
            return 0.0;
        };
        if !self.models.is_empty()
            || !enabled
            || updater.has_init_score()
            || self.num_class > 1
            || !objective.boost_from_average()
        {
            return 0.0;
        }
        let Some(train_data) = self.train_data.as_ref() else {
            return 0.0;
        };
        let metadata = train_data.metadata();
        let n = self.num_data as usize;
        let label = &metadata.label()[..n];
        let init_score = match metadata.weights() {
            Some(weights) => {
                let sum_w: f64 = weights[..n].iter().map(|&w| f64::from(w)).sum();
                let sum: f64 = label.iter().zip(weights).map(|(&l, &w)| f64::from(l) * f64::from(w)).sum();
                sum / sum_w
            }
            None => label.iter().map(|&l| f64::from(l)).sum::<f64>() / n as f64,
        };
        if init_score.abs() <= K_EPSILON {
            return 0.0;
        }
        info!("Start training from score {}", init_score);
        updater.add_score(init_score, 0);
        for valid in &mut self.valid_score_updater {
            valid.add_score(init_score, 0);
        }
        init_score
    }

    /// Gradients and hessians of the objective at the current scores
    fn boosting(&mut self) -> Result<()> {
        let objective = self
            .objective
            .as_ref()
            .ok_or_else(|| LightGBMError::training("No objective function provided"))?;
        let updater = self.train_score_updater.as_ref().ok_or_else(not_initialized)?;
        objective.get_gradients(updater.score(), &mut self.gradients, &mut self.hessians);
        Ok(())
    }

    /// Resample the in-bag rows on every `bagging_freq`-th iteration.
    fn bagging(&mut self, iter: usize) {
        let Some(config) = self.config.as_ref() else {
            return;
        };
        if self.bag_data_cnt >= self.num_data || config.bagging_freq == 0 || iter % config.bagging_freq != 0 {
            return;
        }
        let num_data = self.num_data as usize;
        let fraction = config.bagging_fraction;
        let seed = config.bagging_seed;
        let (num_blocks, _) = Threading::block_info_default(num_data, MIN_BAGGING_BLOCK);
        let left_cnt = Threading::stable_partition(
            num_data,
            MIN_BAGGING_BLOCK,
            &mut self.bag_data_indices,
            |block, start, end, left, right| {
                let mut rand = Random::with_seed(seed.wrapping_add((iter * num_blocks + block) as i32));
                bagging_helper(&mut rand, fraction, start, end - start, left, right);
            },
        );
        self.bag_data_cnt = left_cnt as DataSize;
        debug!("Re-bagging, using {} data to train", left_cnt);
        if let Some(learner) = self.tree_learner.as_mut() {
            learner.set_bagging_data(Some(&self.bag_data_indices[..left_cnt]));
        }
    }

    /// One boosting iteration.
    ///
    /// With `None`, gradients come from the objective; otherwise the given
    /// `num_data * num_tree_per_iteration` values are used verbatim.
    /// Returns true when no tree could be grown and training cannot go on.
    pub fn train_one_iter(&mut self, gradients: Option<&[Score]>, hessians: Option<&[Score]>) -> Result<bool> {
        if self.train_score_updater.is_none() {
            return Err(not_initialized());
        }
        let mut init_score = 0.0;
        match (gradients, hessians) {
            (Some(g), Some(h)) => {
                let total = self.num_data as usize * self.num_tree_per_iteration;
                if g.len() != total || h.len() != total {
                    return Err(LightGBMError::dimension_mismatch(
                        format!("{} gradients and hessians", total),
                        format!("{} gradients, {} hessians", g.len(), h.len()),
                    ));
                }
                self.gradients.copy_from_slice(g);
                self.hessians.copy_from_slice(h);
            }
            _ => {
                init_score = self.boost_from_average();
                self.boosting()?;
            }
        }
        self.bagging(self.iter);

        let n = self.num_data as usize;
        let mut should_continue = false;
        for cur_tree_id in 0..self.num_tree_per_iteration {
            let bias = cur_tree_id * n;
            let mut new_tree = Tree::new(2);
            if self.class_need_train[cur_tree_id] {
                let learner = self.tree_learner.as_mut().ok_or_else(not_initialized)?;
                new_tree = learner.train(
                    &self.gradients[bias..bias + n],
                    &self.hessians[bias..bias + n],
                    self.is_constant_hessian,
                )?;
            }
            if new_tree.num_leaves() > 1 {
                should_continue = true;
                new_tree.shrink(self.shrinkage_rate);
                self.update_score(&new_tree, cur_tree_id)?;
                if init_score.abs() > K_EPSILON {
                    new_tree.add_bias(init_score);
                }
            } else if self.models.len() < self.num_tree_per_iteration {
                // constant output of the first iteration; boost_from_average
                // already put init_score into the scores of trained classes
                if self.class_need_train[cur_tree_id] {
                    new_tree = Tree::constant(init_score);
                } else {
                    let output = self.objective.as_ref().map_or(0.0, |o| o.class_default_output(cur_tree_id));
                    new_tree = Tree::constant(output);
                    if let Some(updater) = self.train_score_updater.as_mut() {
                        updater.add_score(output, cur_tree_id);
                    }
                    for updater in &mut self.valid_score_updater {
                        updater.add_score(output, cur_tree_id);
                    }
                }
            }
            self.models.push(new_tree);
        }

        if !should_continue {
            warn!("Stopped training because there are no more leaves that meet the split requirements");
            if self.models.len() > self.num_tree_per_iteration {
                let keep = self.models.len() - self.num_tree_per_iteration;
                self.models.truncate(keep);
            }
            self.init_predict(-1);
            return Ok(true);
        }
        self.iter += 1;
        self.init_predict(-1);
        Ok(false)
    }

    /// Add a freshly trained tree to every score updater.
    fn update_score(&mut self, tree: &Tree, cur_tree_id: usize) -> Result<()> {
        let train = self.train_score_updater.as_mut().ok_or_else(not_initialized)?;
        let learner = self.tree_learner.as_deref().ok_or_else(not_initialized)?;
        train.add_tree_score_by_learner(learner, tree, cur_tree_id);
        let bag_cnt = self.bag_data_cnt as usize;
        if bag_cnt < self.num_data as usize {
            train.add_tree_score_by_indices(tree, &self.bag_data_indices[bag_cnt..], cur_tree_id)?;
        }
        for updater in &mut self.valid_score_updater {
            updater.add_tree_score(tree, cur_tree_id)?;
        }
        Ok(())
    }

    /// Drop the last trained iteration and remove its scores.
    pub fn rollback_one_iter(&mut self) -> Result<()> {
        if self.iter == 0 {
            return Ok(());
        }
        let cur_iter = self.iter + self.num_init_iteration - 1;
        for cur_tree_id in 0..self.num_tree_per_iteration {
            let idx = cur_iter * self.num_tree_per_iteration + cur_tree_id;
            let mut negated = self.models[idx].clone();
            negated.shrink(-1.0);
            if let Some(updater) = self.train_score_updater.as_mut() {
                updater.add_tree_score(&negated, cur_tree_id)?;
            }
            for updater in &mut self.valid_score_updater {
                updater.add_tree_score(&negated, cur_tree_id)?;
            }
        }
        let keep = self.models.len() - self.num_tree_per_iteration;
        self.models.truncate(keep);
        self.iter -= 1;
        self.init_predict(-1);
        Ok(())
    }

    /// Log the metrics of the current iteration and stop when no validation
    /// metric improved for `early_stopping_round` iterations. The model is
    /// then truncated to the best iteration.
    pub fn eval_and_check_early_stopping(&mut self) -> bool {
        let best_msg = self.output_metric(self.iter);
        if best_msg.is_empty() {
            return false;
        }
        info!(
            "Early stopping at iteration {}, the best iteration round is {}",
            self.iter,
            self.iter - self.early_stopping_round
        );
        info!("Output of best iteration round:\n{}", best_msg.trim_end());
        let drop = (self.early_stopping_round * self.num_tree_per_iteration).min(self.models.len());
        self.models.truncate(self.models.len() - drop);
        self.init_predict(-1);
        true
    }

    /// Log metric lines; returns the message of the best iteration once
    /// early stopping is met, an empty string otherwise.
    fn output_metric(&mut self, iter: usize) -> String {
        let metric_freq = self.config.as_ref().map_or(1, |c| c.metric_freq);
        let need_output = metric_freq > 0 && iter % metric_freq == 0;
        let early_stopping = self.early_stopping_round > 0;
        let objective = self.objective.as_deref();
        let mut msg_buf = String::new();
        let mut ret = String::new();
        let mut improved: Vec<(usize, usize)> = Vec::new();

        if need_output {
            if let Some(updater) = self.train_score_updater.as_ref() {
                for metric in &self.training_metrics {
                    let scores = metric.eval(updater.score(), objective);
                    for (name, score) in metric.names().iter().zip(&scores) {
                        let line = format!("Iteration:{}, training {} : {}", iter, name, score);
                        info!("{}", line);
                        if early_stopping {
                            msg_buf.push_str(&line);
                            msg_buf.push('\n');
                        }
                    }
                }
            }
        }

        if need_output || early_stopping {
            for (i, (metrics, updater)) in self.valid_metrics.iter().zip(&self.valid_score_updater).enumerate() {
                for (j, metric) in metrics.iter().enumerate() {
                    let scores = metric.eval(updater.score(), objective);
                    for (name, score) in metric.names().iter().zip(&scores) {
                        let line = format!("Iteration:{}, valid_{} {} : {}", iter, i + 1, name, score);
                        if need_output {
                            info!("{}", line);
                        }
                        if early_stopping {
                            msg_buf.push_str(&line);
                            msg_buf.push('\n');
                        }
                    }
                    if ret.is_empty() && early_stopping {
                        let Some(&last) = scores.last() else {
                            continue;
                        };
                        let cur_score = metric.factor_to_bigger_better() * last;
                        if cur_score > self.best_score[i][j] {
                            self.best_score[i][j] = cur_score;
                            self.best_iter[i][j] = iter;
                            improved.push((i, j));
                        } else if iter - self.best_iter[i][j] >= self.early_stopping_round {
                            ret = self.best_msg[i][j].clone();
                        }
                    }
                }
            }
        }
        for (i, j) in improved {
            self.best_msg[i][j] = msg_buf.clone();
        }
        ret
    }

    /// Metric values on dataset `data_idx`: 0 is the training data, `i` the
    /// `i`-th validation set.
    pub fn get_eval_at(&self, data_idx: usize) -> Result<Vec<f64>> {
        let objective = self.objective.as_deref();
        if data_idx == 0 {
            let updater = self.train_score_updater.as_ref().ok_or_else(not_initialized)?;
            return Ok(self
                .training_metrics
                .iter()
                .flat_map(|m| m.eval(updater.score(), objective))
                .collect());
        }
        let updater = self
            .valid_score_updater
            .get(data_idx - 1)
            .ok_or_else(|| LightGBMError::index_out_of_bounds(data_idx, self.valid_score_updater.len() + 1))?;
        Ok(self.valid_metrics[data_idx - 1]
            .iter()
            .flat_map(|m| m.eval(updater.score(), objective))
            .collect())
    }

    /// Raw scores of the training data, class-major
    pub fn training_score(&self) -> Result<&[f64]> {
        Ok(self.train_score_updater.as_ref().ok_or_else(not_initialized)?.score())
    }

    /// Number of values [`GBDT::get_predict_at`] returns for `data_idx`
    pub fn get_num_predict_at(&self, data_idx: usize) -> Result<usize> {
        Ok(self.score_updater_at(data_idx)?.num_data() as usize * self.num_tree_per_iteration)
    }

    fn score_updater_at(&self, data_idx: usize) -> Result<&ScoreUpdater> {
        if data_idx == 0 {
            self.train_score_updater.as_ref().ok_or_else(not_initialized)
        } else {
            self.valid_score_updater
                .get(data_idx - 1)
                .ok_or_else(|| LightGBMError::index_out_of_bounds(data_idx, self.valid_score_updater.len() + 1))
        }
    }

    /// Converted scores of dataset `data_idx`, laid out as
    /// `k * num_data + i`.
    pub fn get_predict_at(&self, data_idx: usize) -> Result<Vec<f64>> {
        let updater = self.score_updater_at(data_idx)?;
        let raw = updater.score();
        let Some(objective) = self.objective.as_ref() else {
            return Ok(raw.to_vec());
        };
        let n = updater.num_data() as usize;
        let ntpi = self.num_tree_per_iteration;
        let mut out = vec![0.0; raw.len()];
        let mut tree_pred = vec![0.0; ntpi];
        let mut tmp_result = vec![0.0; ntpi];
        for i in 0..n {
            for k in 0..ntpi {
                tree_pred[k] = raw[k * n + i];
            }
            objective.convert_output(&tree_pred, &mut tmp_result);
            for k in 0..ntpi {
                out[k * n + i] = tmp_result[k];
            }
        }
        Ok(out)
    }

    /// Use only the first `num_iteration` iterations for prediction, every
    /// iteration when non-positive.
    pub fn init_predict(&mut self, num_iteration: i32) {
        self.num_iteration_for_pred = self.models.len() / self.num_tree_per_iteration.max(1);
        if num_iteration > 0 {
            self.num_iteration_for_pred = self.num_iteration_for_pred.min(num_iteration as usize);
        }
    }

    /// Sum of tree outputs per class, checking `early_stop` every
    /// `round_period` iterations.
    pub fn predict_raw(&self, features: &[f64], output: &mut [f64], early_stop: &PredictionEarlyStopInstance) {
        let ntpi = self.num_tree_per_iteration;
        let output = &mut output[..ntpi];
        output.fill(0.0);
        let mut early_stop_round_counter = 0;
        for i in 0..self.num_iteration_for_pred {
            for (k, out) in output.iter_mut().enumerate() {
                *out += self.models[i * ntpi + k].predict(features);
            }
            early_stop_round_counter += 1;
            if early_stop.round_period == early_stop_round_counter {
                if early_stop.should_stop(output) {
                    return;
                }
                early_stop_round_counter = 0;
            }
        }
    }

    /// Raw scores followed by averaging or the objective's conversion.
    pub fn predict(&self, features: &[f64], output: &mut [f64], early_stop: &PredictionEarlyStopInstance) {
        self.predict_raw(features, output, early_stop);
        let ntpi = self.num_tree_per_iteration;
        if self.average_output {
            let iterations = self.num_iteration_for_pred.max(1) as f64;
            for out in &mut output[..ntpi] {
                *out /= iterations;
            }
        } else if let Some(objective) = self.objective.as_ref() {
            let raw = output[..ntpi].to_vec();
            objective.convert_output(&raw, &mut output[..ntpi]);
        }
    }

    /// Leaf reached in every tree, in model order.
    pub fn predict_leaf_index(&self, features: &[f64], output: &mut [f64]) {
        let total_tree = self.num_iteration_for_pred * self.num_tree_per_iteration;
        for (out, tree) in output.iter_mut().zip(&self.models[..total_tree]) {
            *out = tree.predict_leaf_index(features) as f64;
        }
    }

    /// SHAP values: per class, one value per raw feature and the expected
    /// value last.
    pub fn predict_contrib(&self, features: &[f64], output: &mut [f64], early_stop: &PredictionEarlyStopInstance) {
        let ntpi = self.num_tree_per_iteration;
        let stride = self.max_feature_idx as usize + 2;
        let output = &mut output[..ntpi * stride];
        output.fill(0.0);
        let mut early_stop_round_counter = 0;
        let mut raw = vec![0.0; ntpi];
        for i in 0..self.num_iteration_for_pred {
            for k in 0..ntpi {
                self.models[i * ntpi + k].predict_contrib(features, &mut output[k * stride..(k + 1) * stride]);
            }
            early_stop_round_counter += 1;
            if early_stop.round_period == early_stop_round_counter {
                for (k, r) in raw.iter_mut().enumerate() {
                    *r = output[k * stride..(k + 1) * stride].iter().sum();
                }
                if early_stop.should_stop(&raw) {
                    return;
                }
                early_stop_round_counter = 0;
            }
        }
    }

    /// Number of output values per row for a prediction mode
    pub fn num_predict_one_row(&self, num_iteration: i32, is_pred_leaf: bool, is_pred_contrib: bool) -> usize {
        if is_pred_leaf {
            let max_iteration = self.current_iteration();
            let iterations = if num_iteration > 0 {
                max_iteration.min(num_iteration as usize)
            } else {
                max_iteration
            };
            self.num_tree_per_iteration * iterations
        } else if is_pred_contrib {
            self.num_tree_per_iteration * (self.max_feature_idx as usize + 2)
        } else {
            self.num_tree_per_iteration
        }
    }

    /// Whether predictions must sum every tree
    pub fn need_accurate_prediction(&self) -> bool {
        self.objective.as_ref().map_or(true, |o| o.need_accurate_prediction())
    }

    fn num_used_model(&self, num_iteration: i32) -> usize {
        if num_iteration > 0 {
            (num_iteration as usize * self.num_tree_per_iteration).min(self.models.len())
        } else {
            self.models.len()
        }
    }

    /// Split counts or total split gains per raw feature.
    pub fn feature_importance(&self, num_iteration: i32, importance_type: ImportanceType) -> Vec<f64> {
        let mut importances = vec![0.0; (self.max_feature_idx + 1).max(0) as usize];
        for tree in &self.models[..self.num_used_model(num_iteration)] {
            for node in 0..tree.num_leaves().saturating_sub(1) {
                let gain = tree.split_gain(node);
                if gain > 0.0 {
                    let feature = tree.split_feature(node);
                    if let Some(v) = importances.get_mut(feature) {
                        *v += match importance_type {
                            ImportanceType::Split => 1.0,
                            ImportanceType::Gain => gain,
                        };
                    }
                }
            }
        }
        importances
    }

    /// Text form of the first `num_iteration` iterations, all when
    /// non-positive.
    pub fn save_model_to_string(&self, num_iteration: i32) -> String {
        let mut s = String::new();
        let _ = writeln!(s, "{}", SUB_MODEL_NAME);
        let _ = writeln!(s, "version={}", MODEL_VERSION);
        let _ = writeln!(s, "num_class={}", self.num_class);
        let _ = writeln!(s, "num_tree_per_iteration={}", self.num_tree_per_iteration);
        let _ = writeln!(s, "label_index={}", self.label_idx);
        let _ = writeln!(s, "max_feature_idx={}", self.max_feature_idx);
        if let Some(objective) = self.objective.as_ref() {
            let _ = writeln!(s, "objective={}", objective.to_model_string());
        }
        if self.average_output {
            s.push_str("average_output\n");
        }
        let _ = writeln!(s, "feature_names={}", self.feature_names.join(" "));
        let _ = writeln!(s, "feature_infos={}", self.feature_infos.join(" "));
        s.push('\n');

        for (i, tree) in self.models[..self.num_used_model(num_iteration)].iter().enumerate() {
            let _ = writeln!(s, "Tree={}", i);
            s.push_str(&tree.to_string());
            s.push('\n');
        }

        let importances = self.feature_importance(num_iteration, ImportanceType::Split);
        let mut pairs: Vec<(usize, &str)> = importances
            .iter()
            .enumerate()
            .filter(|(_, &v)| v as usize > 0)
            .map(|(i, &v)| (v as usize, self.feature_names.get(i).map_or("", String::as_str)))
            .collect();
        pairs.sort_by(|a, b| b.0.cmp(&a.0));
        s.push_str("\nfeature importances:\n");
        for (count, name) in pairs {
            let _ = writeln!(s, "{}={}", name, count);
        }

        let parameters = match self.config.as_ref() {
            Some(config) => config.to_parameter_string(),
            None => self.loaded_parameter.clone(),
        };
        if !parameters.is_empty() {
            s.push_str("\nparameters:\n");
            s.push_str(parameters.trim_end());
            s.push_str("\nend of parameters\n");
        }
        s
    }

    pub fn save_model_to_file<P: AsRef<Path>>(&self, num_iteration: i32, filename: P) -> Result<()> {
        std::fs::write(filename.as_ref(), self.save_model_to_string(num_iteration)).map_err(|e| {
            LightGBMError::model(format!("cannot write model to {}: {}", filename.as_ref().display(), e))
        })
    }

    /// Restore from a string written by [`GBDT::save_model_to_string`].
    ///
    /// On failure the reason is logged, false is returned and the model is
    /// left unchanged.
    pub fn load_model_from_string(&mut self, model_str: &str) -> bool {
        match self.parse_model(model_str) {
            Ok(()) => {
                info!("Finished loading {} models", self.models.len());
                true
            }
            Err(e) => {
                warn!("Failed to load model: {}", e);
                false
            }
        }
    }

    fn parse_model(&mut self, model_str: &str) -> Result<()> {
        let lines: Vec<&str> = model_str.lines().map(|l| l.trim_end_matches('\r')).collect();
        let find = |key: &str| find_value(&lines, key);
        fn parse<T: std::str::FromStr>(value: Option<&str>, missing: &str) -> Result<T> {
            let value = value.ok_or_else(|| LightGBMError::model(missing.to_string()))?;
            value
                .parse()
                .map_err(|_| LightGBMError::model(format!("{}: cannot parse \"{}\"", missing, value)))
        }

        let num_class: usize = parse(find("num_class="), "Model file doesn't specify the number of classes")?;
        let num_tree_per_iteration: usize = match find("num_tree_per_iteration=") {
            Some(v) => parse(Some(v), "Wrong num_tree_per_iteration")?,
            None => num_class,
        };
        if num_tree_per_iteration == 0 {
            return Err(LightGBMError::model("num_tree_per_iteration should be positive"));
        }
        let label_idx: i32 = parse(find("label_index="), "Model file doesn't specify the label index")?;
        let max_feature_idx: i32 = parse(find("max_feature_idx="), "Model file doesn't specify max_feature_idx")?;
        let average_output = lines.iter().any(|l| l.trim() == "average_output");
        let split_list = |v: &str| -> Vec<String> { v.split(' ').filter(|t| !t.is_empty()).map(String::from).collect() };
        let feature_names = split_list(
            find("feature_names=").ok_or_else(|| LightGBMError::model("Model file doesn't contain feature names"))?,
        );
        if feature_names.len() as i32 != max_feature_idx + 1 {
            return Err(LightGBMError::model("Wrong size of feature_names"));
        }
        let feature_infos = split_list(
            find("feature_infos=").ok_or_else(|| LightGBMError::model("Model file doesn't contain feature infos"))?,
        );
        if feature_infos.len() as i32 != max_feature_idx + 1 {
            return Err(LightGBMError::model("Wrong size of feature_infos"));
        }
        let objective = match find("objective=") {
            Some(text) => Some(create_objective_from_string(text)?),
            None => None,
        };

        let is_section_end = |l: &str| l.starts_with("Tree=") || l == "feature importances:" || l == "parameters:";
        let mut models = Vec::new();
        let mut loaded_parameter = String::new();
        let mut i = 0;
        while i < lines.len() {
            if lines[i].starts_with("Tree=") {
                i += 1;
                let start = i;
                while i < lines.len() && !is_section_end(lines[i]) {
                    i += 1;
                }
                models.push(Tree::from_string(&lines[start..i].join("\n"))?);
            } else if lines[i] == "parameters:" {
                i += 1;
                let start = i;
                while i < lines.len() && lines[i] != "end of parameters" {
                    i += 1;
                }
                loaded_parameter = lines[start..i].join("\n");
            } else {
                i += 1;
            }
        }
        if models.len() % num_tree_per_iteration != 0 {
            return Err(LightGBMError::model(format!(
                "{} trees do not fill whole iterations of {} trees",
                models.len(),
                num_tree_per_iteration
            )));
        }

        self.num_class = num_class;
        self.num_tree_per_iteration = num_tree_per_iteration;
        self.label_idx = label_idx;
        self.max_feature_idx = max_feature_idx;
        self.average_output = average_output;
        self.feature_names = feature_names;
        self.feature_infos = feature_infos;
        self.objective = objective;
        self.models = models;
        self.loaded_parameter = loaded_parameter;
        self.config = None;
        self.iter = 0;
        self.init_predict(-1);
        self.num_init_iteration = self.num_iteration_for_pred;
        Ok(())
    }

    /// JSON document of the first `num_iteration` iterations.
    pub fn dump_model_json(&self, num_iteration: i32) -> Value {
        let tree_info: Vec<Value> = self.models[..self.num_used_model(num_iteration)]
            .iter()
            .enumerate()
            .map(|(i, tree)| {
                let mut info = tree.to_json();
                if let Value::Object(map) = &mut info {
                    map.insert("tree_index".to_string(), json!(i));
                }
                info
            })
            .collect();
        json!({
            "name": SUB_MODEL_NAME,
            "num_class": self.num_class,
            "num_tree_per_iteration": self.num_tree_per_iteration,
            "label_index": self.label_idx,
            "max_feature_idx": self.max_feature_idx,
            "feature_names": self.feature_names,
            "tree_info": tree_info,
        })
    }

    pub fn dump_model(&self, num_iteration: i32) -> String {
        self.dump_model_json(num_iteration).to_string()
    }

    /// C++ source predicting with nested if-else statements.
    pub fn model_to_if_else(&self, num_iteration: i32) -> String {
        let num_used_model = self.num_used_model(num_iteration);
        let mut s = String::new();
        for header in [
            "\"gbdt.h\"",
            "<LightGBM/utils/common.h>",
            "<LightGBM/objective_function.h>",
            "<LightGBM/metric.h>",
            "<LightGBM/prediction_early_stop.h>",
            "<cmath>",
            "<cstring>",
            "<string>",
            "<unordered_map>",
            "<vector>",
        ] {
            let _ = writeln!(s, "#include {}", header);
        }
        s.push_str("namespace LightGBM {\n");

        for (i, tree) in self.models[..num_used_model].iter().enumerate() {
            let _ = writeln!(s, "{}", tree.to_if_else(i, false));
        }
        let names: Vec<String> = (0..num_used_model).map(|i| format!("PredictTree{}", i)).collect();
        let _ = writeln!(s, "double (*PredictTreePtr[])(const double*) = {{ {} }};\n", names.join(" , "));

        s.push_str(
            "void GBDT::PredictRaw(const double* features, double *output, const PredictionEarlyStopInstance* early_stop) const {\n\
             \tint early_stop_round_counter = 0;\n\
             \tstd::memset(output, 0, sizeof(double) * num_tree_per_iteration_);\n\
             \tfor (int i = 0; i < num_iteration_for_pred_; ++i) {\n\
             \t\tfor (int k = 0; k < num_tree_per_iteration_; ++k) {\n\
             \t\t\toutput[k] += (*PredictTreePtr[i * num_tree_per_iteration_ + k])(features);\n\
             \t\t}\n\
             \t\t++early_stop_round_counter;\n\
             \t\tif (early_stop->round_period == early_stop_round_counter) {\n\
             \t\t\tif (early_stop->callback_function(output, num_tree_per_iteration_))\n\
             \t\t\t\treturn;\n\
             \t\t\tearly_stop_round_counter = 0;\n\
             \t\t}\n\
             \t}\n\
             }\n\n",
        );
        s.push_str(
            "void GBDT::PredictRawByMap(const std::unordered_map<int, double>& features, double* output, const PredictionEarlyStopInstance* early_stop) const {\n\
             \tstd::vector<double> arr(max_feature_idx_ + 1, 0.0);\n\
             \tfor (const auto& kv : features) {\n\
             \t\tif (kv.first >= 0 && kv.first <= max_feature_idx_) arr[kv.first] = kv.second;\n\
             \t}\n\
             \tPredictRaw(arr.data(), output, early_stop);\n\
             }\n\n",
        );
        s.push_str(
            "void GBDT::Predict(const double* features, double *output, const PredictionEarlyStopInstance* early_stop) const {\n\
             \tPredictRaw(features, output, early_stop);\n\
             \tif (average_output_) {\n\
             \t\tfor (int k = 0; k < num_tree_per_iteration_; ++k) {\n\
             \t\t\toutput[k] /= num_iteration_for_pred_;\n\
             \t\t}\n\
             \t}\n\
             \telse if (objective_function_ != nullptr) {\n\
             \t\tobjective_function_->ConvertOutput(output, output);\n\
             \t}\n\
             }\n\n",
        );

        for (i, tree) in self.models[..num_used_model].iter().enumerate() {
            let _ = writeln!(s, "{}", tree.to_if_else(i, true));
        }
        let leaf_names: Vec<String> = (0..num_used_model).map(|i| format!("PredictTree{}Leaf", i)).collect();
        let _ = writeln!(s, "double (*PredictTreeLeafPtr[])(const double*) = {{ {} }};\n", leaf_names.join(" , "));
        s.push_str(
            "void GBDT::PredictLeafIndex(const double* features, double *output) const {\n\
             \tint total_tree = num_iteration_for_pred_ * num_tree_per_iteration_;\n\
             \tfor (int i = 0; i < total_tree; ++i) {\n\
             \t\toutput[i] = (*PredictTreeLeafPtr[i])(features);\n\
             \t}\n\
             }\n\n",
        );
        s.push_str("}  // namespace LightGBM\n");
        s
    }

    pub fn save_model_to_if_else<P: AsRef<Path>>(&self, num_iteration: i32, filename: P) -> Result<()> {
        std::fs::write(filename.as_ref(), self.model_to_if_else(num_iteration)).map_err(|e| {
            LightGBMError::model(format!("cannot write if-else model to {}: {}", filename.as_ref().display(), e))
        })
    }

    /// Iterations in the model, merged ones included
    pub fn current_iteration(&self) -> usize {
        self.models.len() / self.num_tree_per_iteration.max(1)
    }

    pub fn models(&self) -> &[Tree] {
        &self.models
    }

    pub fn number_of_total_model(&self) -> usize {
        self.models.len()
    }

    pub fn num_tree_per_iteration(&self) -> usize {
        self.num_tree_per_iteration
    }

    pub fn num_class(&self) -> usize {
        self.num_class
    }

    pub fn num_init_iteration(&self) -> usize {
        self.num_init_iteration
    }

    pub fn max_feature_idx(&self) -> i32 {
        self.max_feature_idx
    }

    pub fn label_idx(&self) -> i32 {
        self.label_idx
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn objective(&self) -> Option<&dyn ObjectiveFunction> {
        self.objective.as_deref()
    }

    pub fn sub_model_name(&self) -> &'static str {
        SUB_MODEL_NAME
    }

    pub fn get_leaf_value(&self, tree_idx: usize, leaf_idx: usize) -> Result<f64> {
        let tree = self
            .models
            .get(tree_idx)
            .ok_or_else(|| LightGBMError::index_out_of_bounds(tree_idx, self.models.len()))?;
        if leaf_idx >= tree.num_leaves() {
            return Err(LightGBMError::index_out_of_bounds(leaf_idx, tree.num_leaves()));
        }
        Ok(tree.leaf_output(leaf_idx))
    }

    pub fn set_leaf_value(&mut self, tree_idx: usize, leaf_idx: usize, val: f64) -> Result<()> {
        let len = self.models.len();
        let tree = self
            .models
            .get_mut(tree_idx)
            .ok_or_else(|| LightGBMError::index_out_of_bounds(tree_idx, len))?;
        if leaf_idx >= tree.num_leaves() {
            return Err(LightGBMError::index_out_of_bounds(leaf_idx, tree.num_leaves()));
        }
        tree.set_leaf_output(leaf_idx, val);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::network::LocalNetwork;
    use crate::core::types::ObjectiveType;
    use crate::dataset::DatasetLoader;
    use crate::metrics::create_metrics;
    use crate::objective::create_objective;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    fn config() -> Config {
        Config {
            num_iterations: 10,
            learning_rate: 0.5,
            num_leaves: 4,
            min_data_in_leaf: 2,
            min_data_in_bin: 1,
            metric: vec!["l2".to_string()],
            ..Config::default()
        }
    }

    fn step_data(config: &Config) -> Arc<Dataset> {
        let n = 40;
        let values: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let labels: Vec<f32> = (0..n).map(|i| if i < n / 2 { 1.0 } else { 3.0 }).collect();
        let matrix = Array2::from_shape_vec((n, 1), values).unwrap();
        let mut loader = DatasetLoader::without_header(config, Arc::new(LocalNetwork)).unwrap();
        Arc::new(loader.construct_from_matrix(matrix.view(), &labels).unwrap())
    }

    fn trained(config: &Config, iterations: usize) -> GBDT {
        let data = step_data(config);
        let mut objective = create_objective(config).unwrap();
        objective.init(data.metadata(), data.num_data()).unwrap();
        let metrics = create_metrics(config, data.metadata(), data.num_data()).unwrap();
        let mut gbdt = GBDT::new();
        gbdt.init(config, data, Some(objective), metrics).unwrap();
        for _ in 0..iterations {
            gbdt.train_one_iter(None, None).unwrap();
        }
        gbdt
    }

    #[test]
    fn test_training_reduces_loss() {
        let config = config();
        let mut gbdt = trained(&config, 0);
        gbdt.train_one_iter(None, None).unwrap();
        let first = gbdt.get_eval_at(0).unwrap()[0];
        for _ in 0..5 {
            gbdt.train_one_iter(None, None).unwrap();
        }
        let later = gbdt.get_eval_at(0).unwrap()[0];
        assert!(later < first);
        assert_eq!(gbdt.current_iteration(), 6);
    }

    #[test]
    fn test_boost_from_average_goes_into_first_tree() {
        let config = config();
        let gbdt = trained(&config, 1);
        let none = PredictionEarlyStopInstance::none();
        let mut low = [0.0];
        let mut high = [0.0];
        gbdt.predict_raw(&[0.0], &mut low, &none);
        gbdt.predict_raw(&[39.0], &mut high, &none);
        // mean label 2, half of the residual step of 1 after shrinkage
        assert_relative_eq!(low[0], 1.5, epsilon = 1e-9);
        assert_relative_eq!(high[0], 2.5, epsilon = 1e-9);
    }

    #[test]
    fn test_rollback_restores_scores() {
        let config = config();
        let mut gbdt = trained(&config, 2);
        let before = gbdt.training_score().unwrap().to_vec();
        gbdt.train_one_iter(None, None).unwrap();
        gbdt.rollback_one_iter().unwrap();
        assert_eq!(gbdt.current_iteration(), 2);
        for (a, b) in before.iter().zip(gbdt.training_score().unwrap()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_model_string_round_trip() {
        let config = config();
        let gbdt = trained(&config, 3);
        let text = gbdt.save_model_to_string(-1);
        assert!(text.starts_with("tree\nversion=v2\n"));
        assert!(text.contains("end of parameters"));
        let mut loaded = GBDT::new();
        assert!(loaded.load_model_from_string(&text));
        assert_eq!(loaded.current_iteration(), 3);
        assert_eq!(loaded.save_model_to_string(-1), text);
        let none = PredictionEarlyStopInstance::none();
        for x in [0.0, 7.5, 19.0, 20.0, 100.0, f64::NAN] {
            let (mut a, mut b) = ([0.0], [0.0]);
            gbdt.predict(&[x], &mut a, &none);
            loaded.predict(&[x], &mut b, &none);
            assert_eq!(a[0].to_bits(), b[0].to_bits());
        }
    }

    #[test]
    fn test_load_rejects_malformed_model() {
        let mut gbdt = GBDT::new();
        assert!(!gbdt.load_model_from_string("tree\nversion=v2\n"));
        assert!(!gbdt.load_model_from_string(
            "tree\nnum_class=1\nlabel_index=0\nmax_feature_idx=0\nfeature_names=a\nfeature_infos=none\n\nTree=0\nbogus=1\n"
        ));
        assert_eq!(gbdt.number_of_total_model(), 0);
    }

    #[test]
    fn test_external_gradients_length_checked() {
        let config = config();
        let mut gbdt = trained(&config, 0);
        assert!(gbdt.train_one_iter(Some(&[0.0; 3]), Some(&[1.0; 3])).is_err());
    }

    #[test]
    fn test_merge_puts_other_trees_first() {
        let config = config();
        let first = trained(&config, 2);
        let mut second = trained(&config, 1);
        let own = second.models()[0].clone();
        second.merge_from(&first);
        assert_eq!(second.number_of_total_model(), 3);
        assert_eq!(second.num_init_iteration(), 2);
        assert_eq!(second.models()[2], own);
    }

    #[test]
    fn test_empty_class_gets_constant_tree() {
        let config = Config { objective: ObjectiveType::Multiclass, num_class: 3, ..config() };
        let n = 40;
        let values: Vec<f64> = (0..n).map(|i| i as f64).collect();
        // class 2 never occurs
        let labels: Vec<f32> = (0..n).map(|i| if i < n / 2 { 0.0 } else { 1.0 }).collect();
        let matrix = Array2::from_shape_vec((n, 1), values).unwrap();
        let mut loader = DatasetLoader::without_header(&config, Arc::new(LocalNetwork)).unwrap();
        let data = Arc::new(loader.construct_from_matrix(matrix.view(), &labels).unwrap());
        let mut objective = create_objective(&config).unwrap();
        objective.init(data.metadata(), data.num_data()).unwrap();
        let mut gbdt = GBDT::new();
        gbdt.init(&config, data, Some(objective), Vec::new()).unwrap();
        assert!(!gbdt.train_one_iter(None, None).unwrap());
        assert_eq!(gbdt.models().len(), 3);
        assert_eq!(gbdt.models()[2].num_leaves(), 1);
        assert_eq!(gbdt.models()[2].leaf_output(0), 0.0);
        assert!(gbdt.models()[0].num_leaves() > 1);
    }

    #[test]
    fn test_unsplittable_first_iteration_keeps_average_tree() {
        let data = step_data(&config());
        // no split leaves 30 rows on both sides of 40
        let config = Config { min_data_in_leaf: 30, ..config() };
        let mut objective = create_objective(&config).unwrap();
        objective.init(data.metadata(), data.num_data()).unwrap();
        let mut gbdt = GBDT::new();
        gbdt.init(&config, data, Some(objective), Vec::new()).unwrap();

        assert!(gbdt.train_one_iter(None, None).unwrap());
        assert_eq!(gbdt.models().len(), 1);
        assert_relative_eq!(gbdt.models()[0].leaf_output(0), 2.0, epsilon = 1e-9);

        let none = PredictionEarlyStopInstance::none();
        let scores = gbdt.training_score().unwrap().to_vec();
        for row in [0usize, 39] {
            let mut out = [0.0];
            gbdt.predict_raw(&[row as f64], &mut out, &none);
            assert_relative_eq!(out[0], scores[row], epsilon = 1e-9);
            assert_relative_eq!(scores[row], 2.0, epsilon = 1e-9);
        }

        let mut reloaded = GBDT::new();
        assert!(reloaded.load_model_from_string(&gbdt.save_model_to_string(-1)));
        assert_eq!(reloaded.number_of_total_model(), 1);
    }

    #[test]
    fn test_feature_importance_and_dump() {
        let config = config();
        let gbdt = trained(&config, 2);
        let split = gbdt.feature_importance(-1, ImportanceType::Split);
        assert_eq!(split, vec![2.0]);
        let gain = gbdt.feature_importance(1, ImportanceType::Gain);
        assert!(gain[0] > 0.0);
        let dump = gbdt.dump_model_json(-1);
        assert_eq!(dump["name"], "tree");
        assert_eq!(dump["tree_info"].as_array().unwrap().len(), 2);
        assert_eq!(dump["tree_info"][1]["tree_index"], 1);
        let code = gbdt.model_to_if_else(-1);
        assert!(code.contains("double PredictTree1(const double* arr)"));
        assert!(code.contains("PredictTree0Leaf"));
        assert!(code.contains("void GBDT::PredictRawByMap"));
    }

    #[test]
    fn test_num_predict_one_row() {
        let config = config();
        let gbdt = trained(&config, 3);
        assert_eq!(gbdt.num_predict_one_row(-1, false, false), 1);
        assert_eq!(gbdt.num_predict_one_row(2, true, false), 2);
        assert_eq!(gbdt.num_predict_one_row(-1, false, true), 2);
    }
}
