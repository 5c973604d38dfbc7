//! Leaf-wise histogram tree learner.

use crate::config::Config;
use crate::core::error::{LightGBMError, Result};
use crate::core::tree_learner::TreeLearner;
use crate::core::types::{BinType, DataSize, MissingType, Score};
use crate::dataset::Dataset;
use crate::io::bin::HistogramBinEntry;
use crate::io::tree::Tree;
use crate::treelearner::col_sampler::ColSampler;
use crate::treelearner::data_partition::DataPartition;
use crate::treelearner::feature_histogram::{
    construct_histograms, feature_histogram, find_best_threshold, leaf_sums, subtract_histogram,
    SplitParams,
};
use crate::treelearner::split_info::SplitInfo;
use log::{debug, warn};
use rayon::prelude::*;
use std::sync::Arc;

/// Grows one tree per call by always splitting the leaf with the best gain.
pub struct SerialTreeLearner {
    params: SplitParams,
    num_leaves: usize,
    max_depth: i32,
    feature_fraction: f64,
    feature_fraction_seed: i32,

    train_data: Option<Arc<Dataset>>,
    partition: DataPartition,
    col_sampler: ColSampler,
    is_bagging: bool,
    is_constant_hessian: bool,

    /// Group-bin histogram of every splittable leaf
    histograms: Vec<Option<Vec<HistogramBinEntry>>>,
    leaf_totals: Vec<HistogramBinEntry>,
    best_split_per_leaf: Vec<SplitInfo>,
    group_used: Vec<bool>,
}

impl std::fmt::Debug for SerialTreeLearner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTreeLearner")
            .field("num_leaves", &self.num_leaves)
            .field("max_depth", &self.max_depth)
            .field("feature_fraction", &self.feature_fraction)
            .field("num_data", &self.train_data.as_ref().map(|d| d.num_data()))
            .field("is_bagging", &self.is_bagging)
            .field("is_constant_hessian", &self.is_constant_hessian)
            .finish()
    }
}

impl SerialTreeLearner {
    pub fn new(config: &Config) -> Self {
        SerialTreeLearner {
            params: SplitParams::from_config(config),
            num_leaves: config.num_leaves.max(2),
            max_depth: config.max_depth,
            feature_fraction: config.feature_fraction,
            feature_fraction_seed: config.feature_fraction_seed,
            train_data: None,
            partition: DataPartition::new(0, 0),
            col_sampler: ColSampler::new(0, 1.0, config.feature_fraction_seed),
            is_bagging: false,
            is_constant_hessian: false,
            histograms: Vec::new(),
            leaf_totals: Vec::new(),
            best_split_per_leaf: Vec::new(),
            group_used: Vec::new(),
        }
    }

    fn dataset(&self) -> Result<Arc<Dataset>> {
        self.train_data
            .clone()
            .ok_or_else(|| LightGBMError::training("tree learner is not initialized"))
    }

    /// Rows of `leaf`, `None` for a root holding every row
    fn leaf_rows(&self, tree: &Tree, leaf: usize) -> Option<&[DataSize]> {
        if tree.num_leaves() == 1 && !self.is_bagging {
            return None;
        }
        Some(self.partition.indices_on_leaf(leaf))
    }

    fn before_train(&mut self, data: &Dataset) {
        self.col_sampler.reset_by_tree();
        self.group_used = (0..data.num_groups())
            .map(|g| data.group_feature_range(g).any(|f| self.col_sampler.is_feature_used(f)))
            .collect();
        self.partition.init();
        self.histograms.iter_mut().for_each(|h| *h = None);
        self.best_split_per_leaf.clear();
        self.best_split_per_leaf.push(SplitInfo::default());
        self.leaf_totals.iter_mut().for_each(|t| *t = HistogramBinEntry::default());
    }

    /// Whether `leaf` is allowed to split at all
    fn can_split(&self, tree: &Tree, leaf: usize) -> bool {
        let total = &self.leaf_totals[leaf];
        if self.max_depth > 0 && tree.leaf_depth(leaf) >= self.max_depth {
            return false;
        }
        total.cnt >= 2 * self.params.min_data_in_leaf.max(1)
            && total.sum_hessians >= 2.0 * self.params.min_sum_hessian_in_leaf
    }

    fn find_best_split(&self, data: &Dataset, leaf: usize) -> SplitInfo {
        let Some(hist) = self.histograms[leaf].as_deref() else {
            return SplitInfo::default();
        };
        let total = self.leaf_totals[leaf];
        (0..data.num_features())
            .into_par_iter()
            .filter(|&f| self.col_sampler.is_feature_used(f))
            .map(|f| {
                let mapper = data.feature_bin_mapper(f);
                let feature_hist = feature_histogram(data, f, hist, &total);
                find_best_threshold(f, mapper, &feature_hist, &total, &self.params)
            })
            .reduce(SplitInfo::default, |a, b| if b.better_than(&a) { b } else { a })
    }

    fn build_histogram(
        &self,
        data: &Dataset,
        tree: &Tree,
        leaf: usize,
        gradients: &[Score],
        hessians: &[Score],
    ) -> Vec<HistogramBinEntry> {
        let mut hist = Vec::new();
        construct_histograms(data, self.leaf_rows(tree, leaf), gradients, hessians, &self.group_used, &mut hist);
        hist
    }

    /// Apply the best split of `leaf` to the tree and the partition.
    fn split(&mut self, data: &Arc<Dataset>, tree: &mut Tree, leaf: usize) -> usize {
        let info = self.best_split_per_leaf[leaf].clone();
        let inner = info.feature as usize;
        let mapper = data.feature_bin_mapper(inner);
        let real = data.real_feature_index(inner);
        let missing_type = mapper.missing_type();

        let right_leaf = match mapper.bin_type() {
            BinType::Categorical => {
                let raw: Vec<u32> = info
                    .cat_threshold
                    .iter()
                    .map(|&b| mapper.bin_to_value(b) as u32)
                    .collect();
                tree.split_categorical(
                    leaf,
                    inner,
                    real,
                    &info.cat_threshold,
                    &raw,
                    info.left_output,
                    info.right_output,
                    info.left_count,
                    info.right_count,
                    info.left_sum_hessian,
                    info.right_sum_hessian,
                    info.gain as f32,
                    missing_type,
                )
            }
            BinType::Numerical => tree.split(
                leaf,
                inner,
                real,
                info.threshold,
                mapper.bin_to_value(info.threshold),
                info.left_output,
                info.right_output,
                info.left_count,
                info.right_count,
                info.left_sum_hessian,
                info.right_sum_hessian,
                info.gain as f32,
                missing_type,
                info.default_left,
            ),
        };

        let default_bin = mapper.default_bin();
        let missing_bin = match missing_type {
            MissingType::NaN => Some(mapper.num_bin() as u32 - 1),
            MissingType::Zero => Some(default_bin),
            MissingType::None => None,
        };
        let rows = Arc::clone(data);
        let left_cnt = match mapper.bin_type() {
            BinType::Categorical => {
                let bins = info.cat_threshold.clone();
                self.partition.split(leaf, right_leaf, move |row| {
                    bins.contains(&rows.feature_bin(inner, row))
                })
            }
            BinType::Numerical => {
                let threshold = info.threshold;
                let default_left = info.default_left;
                self.partition.split(leaf, right_leaf, move |row| {
                    let bin = rows.feature_bin(inner, row);
                    if Some(bin) == missing_bin {
                        default_left
                    } else {
                        bin <= threshold
                    }
                })
            }
        };
        debug_assert_eq!(left_cnt, info.left_count);

        self.leaf_totals[leaf] = HistogramBinEntry {
            sum_gradients: info.left_sum_gradient,
            sum_hessians: info.left_sum_hessian,
            cnt: info.left_count,
        };
        self.leaf_totals[right_leaf] = HistogramBinEntry {
            sum_gradients: info.right_sum_gradient,
            sum_hessians: info.right_sum_hessian,
            cnt: info.right_count,
        };
        right_leaf
    }
}

impl TreeLearner for SerialTreeLearner {
    fn init(&mut self, train_data: Arc<Dataset>, is_constant_hessian: bool) -> Result<()> {
        let num_data = train_data.num_data();
        self.partition = DataPartition::new(num_data, self.num_leaves);
        self.col_sampler = ColSampler::new(
            train_data.num_features(),
            self.feature_fraction,
            self.feature_fraction_seed,
        );
        self.histograms = vec![None; self.num_leaves];
        self.leaf_totals = vec![HistogramBinEntry::default(); self.num_leaves];
        self.is_constant_hessian = is_constant_hessian;
        debug!(
            "Serial tree learner: {} rows, {} features, {} total bins",
            num_data,
            train_data.num_features(),
            train_data.num_total_bin()
        );
        self.train_data = Some(train_data);
        Ok(())
    }

    fn train(&mut self, gradients: &[Score], hessians: &[Score], is_constant_hessian: bool) -> Result<Tree> {
        let data = self.dataset()?;
        let num_data = data.num_data() as usize;
        if gradients.len() != num_data {
            return Err(LightGBMError::dimension_mismatch(num_data.to_string(), gradients.len().to_string()));
        }
        if hessians.len() != num_data {
            return Err(LightGBMError::dimension_mismatch(num_data.to_string(), hessians.len().to_string()));
        }
        self.is_constant_hessian = is_constant_hessian;
        self.before_train(&data);

        let mut tree = Tree::new(self.num_leaves as i32);
        self.leaf_totals[0] = leaf_sums(self.leaf_rows(&tree, 0), gradients, hessians);
        if self.can_split(&tree, 0) {
            self.histograms[0] = Some(self.build_histogram(&data, &tree, 0, gradients, hessians));
            self.best_split_per_leaf[0] = self.find_best_split(&data, 0);
        }

        for _ in 1..self.num_leaves {
            let best_leaf = (0..tree.num_leaves())
                .filter(|&l| self.best_split_per_leaf[l].is_valid())
                .fold(None, |best: Option<usize>, l| match best {
                    Some(b) if self.best_split_per_leaf[b].gain >= self.best_split_per_leaf[l].gain => Some(b),
                    _ => Some(l),
                });
            let Some(leaf) = best_leaf else {
                if tree.num_leaves() == 1 {
                    warn!("Stopped training because there are no more leaves that meet the split requirements");
                }
                break;
            };
            let parent_hist = self.histograms[leaf].take();
            let right_leaf = self.split(&data, &mut tree, leaf);
            self.best_split_per_leaf.push(SplitInfo::default());
            self.best_split_per_leaf[leaf].reset();

            let left_ok = self.can_split(&tree, leaf);
            let right_ok = self.can_split(&tree, right_leaf);
            if !left_ok && !right_ok {
                continue;
            }
            let (smaller, larger) = if self.partition.leaf_count(leaf) < self.partition.leaf_count(right_leaf) {
                (leaf, right_leaf)
            } else {
                (right_leaf, leaf)
            };
            let smaller_hist = self.build_histogram(&data, &tree, smaller, gradients, hessians);
            let larger_hist = parent_hist.map(|mut parent| {
                subtract_histogram(&mut parent, &smaller_hist);
                parent
            });
            self.histograms[smaller] = Some(smaller_hist);
            self.histograms[larger] = larger_hist;

            for l in [leaf, right_leaf] {
                if self.can_split(&tree, l) {
                    self.best_split_per_leaf[l] = self.find_best_split(&data, l);
                } else {
                    self.histograms[l] = None;
                }
            }
        }
        Ok(tree)
    }

    fn set_bagging_data(&mut self, used_indices: Option<&[DataSize]>) {
        self.is_bagging = used_indices.is_some();
        self.partition.set_used_data_indices(used_indices);
    }

    fn add_prediction_to_score(&self, tree: &Tree, score: &mut [f64]) {
        for leaf in 0..tree.num_leaves() {
            let output = tree.leaf_output(leaf);
            for &row in self.partition.indices_on_leaf(leaf) {
                score[row as usize] += output;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::network::LocalNetwork;
    use crate::dataset::DatasetLoader;
    use ndarray::Array2;

    fn one_feature_dataset(values: &[f64], labels: &[f32]) -> Arc<Dataset> {
        let config = Config { min_data_in_leaf: 1, min_data_in_bin: 1, ..Config::default() };
        let matrix = Array2::from_shape_vec((values.len(), 1), values.to_vec()).unwrap();
        let mut loader = DatasetLoader::without_header(&config, Arc::new(LocalNetwork)).unwrap();
        Arc::new(loader.construct_from_matrix(matrix.view(), labels).unwrap())
    }

    fn config(num_leaves: usize) -> Config {
        Config {
            num_leaves,
            min_data_in_leaf: 1,
            min_sum_hessian_in_leaf: 0.0,
            ..Config::default()
        }
    }

    #[test]
    fn test_debug_reports_shape() {
        let values: Vec<f64> = (0..8).map(f64::from).collect();
        let mut learner = SerialTreeLearner::new(&config(4));
        assert!(format!("{:?}", learner).contains("num_data: None"));
        learner.init(one_feature_dataset(&values, &[0.0; 8]), true).unwrap();
        let text = format!("{:?}", learner);
        assert!(text.starts_with("SerialTreeLearner {"));
        assert!(text.contains("num_leaves: 4"));
        assert!(text.contains("num_data: Some(8)"));
    }

    #[test]
    fn test_step_function_is_learned() {
        let values: Vec<f64> = (0..20).map(f64::from).collect();
        let labels: Vec<f32> = (0..20).map(|i| if i < 10 { 0.0 } else { 1.0 }).collect();
        let data = one_feature_dataset(&values, &labels);
        let mut learner = SerialTreeLearner::new(&config(2));
        learner.init(Arc::clone(&data), true).unwrap();
        // gradients of l2 loss at score 0
        let gradients: Vec<Score> = labels.iter().map(|&l| -l).collect();
        let hessians = vec![1.0; 20];
        let tree = learner.train(&gradients, &hessians, true).unwrap();
        assert_eq!(tree.num_leaves(), 2);
        assert!((tree.predict(&[3.0]) - 0.0).abs() < 1e-12);
        assert!((tree.predict(&[15.0]) - 1.0).abs() < 1e-12);

        let mut score = vec![0.0; 20];
        learner.add_prediction_to_score(&tree, &mut score);
        for (s, l) in score.iter().zip(&labels) {
            assert!((s - f64::from(*l)).abs() < 1e-12);
        }
    }

    #[test]
    fn test_raw_and_binned_paths_agree() {
        let values: Vec<f64> = (0..64).map(|i| ((i * 37) % 64) as f64 - 20.0).collect();
        let labels: Vec<f32> = values.iter().map(|v| (v * 0.1).sin() as f32).collect();
        let data = one_feature_dataset(&values, &labels);
        let mut learner = SerialTreeLearner::new(&config(8));
        learner.init(Arc::clone(&data), true).unwrap();
        let gradients: Vec<Score> = labels.iter().map(|&l| -l).collect();
        let hessians = vec![1.0; 64];
        let tree = learner.train(&gradients, &hessians, true).unwrap();
        assert!(tree.num_leaves() > 2);
        for (row, &v) in values.iter().enumerate() {
            let by_bins = tree.get_leaf_by_bins(&data, row as DataSize).unwrap();
            assert_eq!(by_bins, tree.get_leaf(&[v]));
        }
    }

    #[test]
    fn test_constant_target_gives_single_leaf() {
        let values: Vec<f64> = (0..10).map(f64::from).collect();
        let data = one_feature_dataset(&values, &[1.0; 10]);
        let mut learner = SerialTreeLearner::new(&config(4));
        learner.init(data, true).unwrap();
        let tree = learner.train(&[0.5; 10], &[1.0; 10], true).unwrap();
        assert_eq!(tree.num_leaves(), 1);
    }

    #[test]
    fn test_train_rejects_wrong_gradient_length() {
        let values: Vec<f64> = (0..10).map(f64::from).collect();
        let data = one_feature_dataset(&values, &[1.0; 10]);
        let mut learner = SerialTreeLearner::new(&config(4));
        learner.init(data, true).unwrap();
        assert!(learner.train(&[0.5; 3], &[1.0; 3], true).is_err());
    }
}
