//! Main configuration structure and builder.
//!
//! One flat `Config` carries every knob used by loading, training and
//! prediction. It can be built programmatically, deserialized from JSON or
//! TOML, or assembled from `key=value` parameters (see
//! [`crate::config::parameters`]).

use crate::core::error::{LightGBMError, Result};
use crate::core::types::*;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Configuration for loading, training and prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Task
    /// What the application runs
    pub task: TaskType,
    /// Boosting algorithm type
    pub boosting_type: BoostingType,
    /// Objective function type
    pub objective: ObjectiveType,
    /// Metric names evaluated on training/validation data
    pub metric: Vec<String>,

    // Input/output files
    /// Training (or prediction) data file
    pub data: String,
    /// Validation data files
    pub valid: Vec<String>,
    /// Initial score file of the training data
    pub initscore_filename: String,
    /// Initial score files of the validation data, one per valid file
    pub valid_init_score: Vec<String>,
    /// Path of the trained model
    pub output_model: String,
    /// Model to continue training from or predict with
    pub input_model: String,
    /// Prediction output path
    pub output_result: String,
    /// Path of the generated if-else source
    pub convert_model: String,
    /// Language of the generated source, only `cpp` is supported
    pub convert_model_language: String,

    // Boosting parameters
    /// Number of boosting iterations
    pub num_iterations: usize,
    /// Shrinkage rate applied to every new tree
    pub learning_rate: f64,
    /// Maximum number of leaves in one tree
    pub num_leaves: usize,
    /// Maximum depth of tree (-1 for unlimited)
    pub max_depth: i32,
    /// Minimum number of data points in a leaf
    pub min_data_in_leaf: DataSize,
    /// Minimum sum of hessian values in a leaf
    pub min_sum_hessian_in_leaf: f64,
    /// L1 regularization term
    pub lambda_l1: f64,
    /// L2 regularization term
    pub lambda_l2: f64,
    /// Minimum gain required to make a split
    pub min_gain_to_split: f64,
    /// Fraction of features to use for each tree
    pub feature_fraction: f64,
    /// Random seed for feature sampling
    pub feature_fraction_seed: i32,
    /// Fraction of data to use for bagging
    pub bagging_fraction: f64,
    /// Bagging frequency, 0 disables bagging
    pub bagging_freq: usize,
    /// Random seed for bagging
    pub bagging_seed: i32,
    /// Stop when no validation metric improves for this many rounds, 0 disables
    pub early_stopping_round: usize,
    /// Log metrics every this many iterations
    pub metric_freq: usize,
    /// Whether metrics are also evaluated on the training data
    pub is_provide_training_metric: bool,
    /// Save a model snapshot every this many iterations, non-positive disables
    pub snapshot_freq: i32,
    /// Add the average label as a bias to the first tree (regression)
    pub boost_from_average: bool,

    // Dataset parameters
    /// Maximum number of bins per feature
    pub max_bin: usize,
    /// Minimum number of samples in one bin
    pub min_data_in_bin: usize,
    /// Number of rows sampled to construct bins
    pub bin_construct_sample_cnt: usize,
    /// Seed for sampling and distributed data partitioning
    pub data_random_seed: i32,
    /// Whether NaN gets special treatment
    pub use_missing: bool,
    /// Treat zero as the missing value
    pub zero_as_missing: bool,
    /// Bundle mutually exclusive sparse features
    pub enable_bundle: bool,
    /// Sparse rate above which a feature group uses sparse storage
    pub sparse_threshold: f64,
    /// Whether the data file has a header line
    pub has_header: bool,
    /// Label column, a number or `name:<column>`
    pub label_column: String,
    /// Weight column, a number or `name:<column>`
    pub weight_column: String,
    /// Query/group id column, a number or `name:<column>`
    pub group_column: String,
    /// Ignored columns, numbers or `name:<a>,<b>`
    pub ignore_column: String,
    /// Categorical columns, numbers or `name:<a>,<b>`
    pub categorical_column: String,
    /// Stream the file twice instead of holding it in memory
    pub two_round: bool,
    /// Save the loaded dataset to `<data>.bin`
    pub is_save_binary_file: bool,
    /// Data files are already partitioned per worker
    pub is_pre_partition: bool,

    // Prediction parameters
    /// Use only this many iterations, non-positive for all
    pub num_iteration_predict: i32,
    /// Output raw scores instead of converted outputs
    pub predict_raw_score: bool,
    /// Output the leaf index of every tree
    pub predict_leaf_index: bool,
    /// Output per-feature contributions
    pub predict_contrib: bool,
    /// Stop summing trees early when the margin is large enough
    pub pred_early_stop: bool,
    /// Check the early stop margin every this many iterations
    pub pred_early_stop_freq: i32,
    /// Margin above which prediction stops early
    pub pred_early_stop_margin: f64,

    // Objective and metric parameters
    /// Number of classes for multiclass objectives
    pub num_class: usize,
    /// Sigmoid scale of the binary objective
    pub sigmoid: f64,
    /// Delta of the huber metric
    pub huber_delta: f64,
    /// `c` of the fair metric
    pub fair_c: f64,

    // Runtime
    /// Number of worker threads, 0 for all cores
    pub num_threads: usize,
    /// Number of machines in a distributed job
    pub num_machines: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            task: TaskType::Train,
            boosting_type: BoostingType::Gbdt,
            objective: ObjectiveType::Regression,
            metric: Vec::new(),
            data: String::new(),
            valid: Vec::new(),
            initscore_filename: String::new(),
            valid_init_score: Vec::new(),
            output_model: "LightGBM_model.txt".to_string(),
            input_model: String::new(),
            output_result: "LightGBM_predict_result.txt".to_string(),
            convert_model: "gbdt_prediction.cpp".to_string(),
            convert_model_language: String::new(),
            num_iterations: 100,
            learning_rate: 0.1,
            num_leaves: 31,
            max_depth: -1,
            min_data_in_leaf: 20,
            min_sum_hessian_in_leaf: 1e-3,
            lambda_l1: 0.0,
            lambda_l2: 0.0,
            min_gain_to_split: 0.0,
            feature_fraction: 1.0,
            feature_fraction_seed: 2,
            bagging_fraction: 1.0,
            bagging_freq: 0,
            bagging_seed: 3,
            early_stopping_round: 0,
            metric_freq: 1,
            is_provide_training_metric: false,
            snapshot_freq: -1,
            boost_from_average: true,
            max_bin: 255,
            min_data_in_bin: 3,
            bin_construct_sample_cnt: 200_000,
            data_random_seed: 1,
            use_missing: true,
            zero_as_missing: false,
            enable_bundle: true,
            sparse_threshold: 0.8,
            has_header: false,
            label_column: String::new(),
            weight_column: String::new(),
            group_column: String::new(),
            ignore_column: String::new(),
            categorical_column: String::new(),
            two_round: false,
            is_save_binary_file: false,
            is_pre_partition: false,
            num_iteration_predict: -1,
            predict_raw_score: false,
            predict_leaf_index: false,
            predict_contrib: false,
            pred_early_stop: false,
            pred_early_stop_freq: 10,
            pred_early_stop_margin: 10.0,
            num_class: 1,
            sigmoid: 1.0,
            huber_delta: 1.0,
            fair_c: 1.0,
            num_threads: 0,
            num_machines: 1,
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.learning_rate <= 0.0 {
            return Err(LightGBMError::invalid_parameter(
                "learning_rate",
                self.learning_rate.to_string(),
                "must be positive",
            ));
        }
        if self.num_leaves < 2 {
            return Err(LightGBMError::invalid_parameter(
                "num_leaves",
                self.num_leaves.to_string(),
                "must be at least 2",
            ));
        }
        for (name, v) in [
            ("feature_fraction", self.feature_fraction),
            ("bagging_fraction", self.bagging_fraction),
        ] {
            if v <= 0.0 || v > 1.0 {
                return Err(LightGBMError::invalid_parameter(
                    name,
                    v.to_string(),
                    "must be in range (0.0, 1.0]",
                ));
            }
        }
        if self.lambda_l1 < 0.0 || self.lambda_l2 < 0.0 {
            return Err(LightGBMError::invalid_parameter(
                "lambda_l1/lambda_l2",
                format!("{}/{}", self.lambda_l1, self.lambda_l2),
                "must be non-negative",
            ));
        }
        if self.min_data_in_leaf < 0 {
            return Err(LightGBMError::invalid_parameter(
                "min_data_in_leaf",
                self.min_data_in_leaf.to_string(),
                "must be non-negative",
            ));
        }
        if self.max_bin < 2 {
            return Err(LightGBMError::invalid_parameter(
                "max_bin",
                self.max_bin.to_string(),
                "must be at least 2",
            ));
        }
        if self.sigmoid <= 0.0 {
            return Err(LightGBMError::invalid_parameter(
                "sigmoid",
                self.sigmoid.to_string(),
                "must be positive",
            ));
        }
        if self.num_class < 1 {
            return Err(LightGBMError::invalid_parameter(
                "num_class",
                self.num_class.to_string(),
                "must be at least 1",
            ));
        }
        if self.objective.is_multiclass() {
            if self.num_class < 2 {
                return Err(LightGBMError::invalid_parameter(
                    "num_class",
                    self.num_class.to_string(),
                    "must be at least 2 for multiclass objectives",
                ));
            }
        } else if self.num_class != 1 {
            return Err(LightGBMError::invalid_parameter(
                "num_class",
                self.num_class.to_string(),
                format!("must be 1 for objective {}", self.objective),
            ));
        }
        if self.num_machines < 1 {
            return Err(LightGBMError::invalid_parameter(
                "num_machines",
                self.num_machines.to_string(),
                "must be at least 1",
            ));
        }
        if self.num_threads > num_cpus::get() * 2 {
            log::warn!(
                "num_threads ({}) is much larger than available cores ({})",
                self.num_threads,
                num_cpus::get()
            );
        }
        Ok(())
    }

    /// Worker-thread count after resolving 0 to the number of cores.
    pub fn effective_num_threads(&self) -> usize {
        if self.num_threads == 0 {
            num_cpus::get()
        } else {
            self.num_threads
        }
    }

    /// Whether this run trains on more than one machine
    pub fn is_parallel(&self) -> bool {
        self.num_machines > 1
    }

    /// Trees grown per boosting iteration
    pub fn num_tree_per_iteration(&self) -> usize {
        if self.objective.is_multiclass() {
            self.num_class
        } else {
            1
        }
    }

    /// Load configuration from a file.
    ///
    /// `.json` and `.toml` files are deserialized directly; anything else is
    /// read as `key=value` lines with `#` comments.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            LightGBMError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        match path.extension().and_then(|s| s.to_str()) {
            Some("json") => Ok(serde_json::from_str(&content)?),
            Some("toml") => Ok(toml::from_str(&content)?),
            _ => {
                let mut params = HashMap::new();
                for line in content.lines() {
                    let line = match line.find('#') {
                        Some(pos) => &line[..pos],
                        None => line,
                    };
                    super::parameters::kv_to_map(&mut params, line);
                }
                super::parameters::key_alias_transform(&mut params);
                Config::from_params(&params)
            }
        }
    }

    /// Save configuration as JSON or TOML, chosen by extension
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = match path.extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::to_string_pretty(self)?,
            Some("toml") => toml::to_string_pretty(self)
                .map_err(|e| LightGBMError::config(format!("Failed to serialize to TOML: {}", e)))?,
            _ => {
                return Err(LightGBMError::config(
                    "Unsupported config file format. Use .json or .toml",
                ))
            }
        };
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Builder for [`Config`] with validation on build.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
    validation_errors: Vec<String>,
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        ConfigBuilder {
            config: Config::default(),
            validation_errors: Vec::new(),
        }
    }

    /// Set the objective function
    pub fn objective(mut self, objective: ObjectiveType) -> Self {
        self.config.objective = objective;
        self
    }

    /// Set the metrics
    pub fn metric<S: AsRef<str>>(mut self, metrics: &[S]) -> Self {
        self.config.metric = metrics.iter().map(|m| m.as_ref().to_string()).collect();
        self
    }

    /// Set the number of boosting iterations
    pub fn num_iterations(mut self, iterations: usize) -> Self {
        self.config.num_iterations = iterations;
        self
    }

    /// Set the learning rate
    pub fn learning_rate(mut self, rate: f64) -> Self {
        if rate <= 0.0 {
            self.validation_errors
                .push("learning_rate must be positive".to_string());
        }
        self.config.learning_rate = rate;
        self
    }

    /// Set the number of leaves
    pub fn num_leaves(mut self, leaves: usize) -> Self {
        if leaves < 2 {
            self.validation_errors
                .push("num_leaves must be at least 2".to_string());
        }
        self.config.num_leaves = leaves;
        self
    }

    /// Set the maximum tree depth
    pub fn max_depth(mut self, depth: i32) -> Self {
        self.config.max_depth = depth;
        self
    }

    /// Set the minimum number of rows per leaf
    pub fn min_data_in_leaf(mut self, min_data: DataSize) -> Self {
        self.config.min_data_in_leaf = min_data;
        self
    }

    /// Set the minimum hessian sum per leaf
    pub fn min_sum_hessian_in_leaf(mut self, v: f64) -> Self {
        self.config.min_sum_hessian_in_leaf = v;
        self
    }

    /// Set L1 and L2 regularization
    pub fn regularization(mut self, lambda_l1: f64, lambda_l2: f64) -> Self {
        self.config.lambda_l1 = lambda_l1;
        self.config.lambda_l2 = lambda_l2;
        self
    }

    /// Set the feature fraction
    pub fn feature_fraction(mut self, fraction: f64) -> Self {
        if fraction <= 0.0 || fraction > 1.0 {
            self.validation_errors
                .push("feature_fraction must be in range (0.0, 1.0]".to_string());
        }
        self.config.feature_fraction = fraction;
        self
    }

    /// Set the bagging fraction and frequency
    pub fn bagging(mut self, fraction: f64, freq: usize) -> Self {
        if fraction <= 0.0 || fraction > 1.0 {
            self.validation_errors
                .push("bagging_fraction must be in range (0.0, 1.0]".to_string());
        }
        self.config.bagging_fraction = fraction;
        self.config.bagging_freq = freq;
        self
    }

    /// Set the bagging seed
    pub fn bagging_seed(mut self, seed: i32) -> Self {
        self.config.bagging_seed = seed;
        self
    }

    /// Set the maximum number of bins
    pub fn max_bin(mut self, max_bin: usize) -> Self {
        self.config.max_bin = max_bin;
        self
    }

    /// Set the minimum number of samples per bin
    pub fn min_data_in_bin(mut self, v: usize) -> Self {
        self.config.min_data_in_bin = v;
        self
    }

    /// Set the number of classes
    pub fn num_class(mut self, num_class: usize) -> Self {
        self.config.num_class = num_class;
        self
    }

    /// Set the early stopping rounds
    pub fn early_stopping_round(mut self, rounds: usize) -> Self {
        self.config.early_stopping_round = rounds;
        self
    }

    /// Set whether the data file has a header
    pub fn has_header(mut self, has_header: bool) -> Self {
        self.config.has_header = has_header;
        self
    }

    /// Set the label column
    pub fn label_column<S: Into<String>>(mut self, column: S) -> Self {
        self.config.label_column = column.into();
        self
    }

    /// Set the number of threads
    pub fn num_threads(mut self, threads: usize) -> Self {
        self.config.num_threads = threads;
        self
    }

    /// Set the training data file
    pub fn data<S: Into<String>>(mut self, path: S) -> Self {
        self.config.data = path.into();
        self
    }

    /// Add a validation data file
    pub fn valid<S: Into<String>>(mut self, path: S) -> Self {
        self.config.valid.push(path.into());
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<Config> {
        if !self.validation_errors.is_empty() {
            return Err(LightGBMError::config(format!(
                "Configuration validation failed: {}",
                self.validation_errors.join(", ")
            )));
        }
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default_is_valid() {
        let config = Config::default();
        assert_eq!(config.objective, ObjectiveType::Regression);
        assert_eq!(config.num_leaves, 31);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.learning_rate = -0.1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.sigmoid = 0.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sigmoid"));

        let mut config = Config::default();
        config.objective = ObjectiveType::Multiclass;
        assert!(config.validate().is_err());
        config.num_class = 3;
        assert!(config.validate().is_ok());
        assert_eq!(config.num_tree_per_iteration(), 3);
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .objective(ObjectiveType::Binary)
            .num_iterations(50)
            .learning_rate(0.05)
            .num_leaves(15)
            .metric(&["binary_logloss"])
            .build()
            .unwrap();
        assert_eq!(config.objective, ObjectiveType::Binary);
        assert_eq!(config.num_iterations, 50);
        assert_eq!(config.metric, vec!["binary_logloss".to_string()]);
    }

    #[test]
    fn test_config_builder_validation() {
        let result = ConfigBuilder::new().learning_rate(-0.1).num_leaves(1).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_json_and_toml_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigBuilder::new().num_leaves(7).build().unwrap();

        let json = dir.path().join("cfg.json");
        config.save_to_file(&json).unwrap();
        assert_eq!(Config::load_from_file(&json).unwrap(), config);

        let toml_path = dir.path().join("cfg.toml");
        std::fs::write(&toml_path, "num_leaves = 9\nobjective = \"binary\"\n").unwrap();
        let loaded = Config::load_from_file(&toml_path).unwrap();
        assert_eq!(loaded.num_leaves, 9);
        assert_eq!(loaded.objective, ObjectiveType::Binary);
    }

    #[test]
    fn test_key_value_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.conf");
        std::fs::write(
            &path,
            "# comment line\ntask = train\nnum_trees = 12 # trailing\nshrinkage_rate=0.2\n",
        )
        .unwrap();
        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.num_iterations, 12);
        assert_eq!(config.learning_rate, 0.2);
    }
}
