//! `key=value` parameter parsing.
//!
//! Command lines and plain config files spell parameters as `key=value`
//! pairs. Keys go through an alias table first, then each known key is
//! parsed into the matching [`Config`] field. Unknown keys are logged and
//! ignored.

use super::core::Config;
use crate::core::error::{LightGBMError, Result};
use crate::core::utils::{Common, Random};
use std::collections::HashMap;
use std::str::FromStr;

const ALIASES: &[(&str, &str)] = &[
    ("config_file", "config"),
    ("nthread", "num_threads"),
    ("num_thread", "num_threads"),
    ("random_seed", "seed"),
    ("boosting", "boosting_type"),
    ("boost", "boosting_type"),
    ("application", "objective"),
    ("app", "objective"),
    ("train_data", "data"),
    ("train", "data"),
    ("test_data", "valid"),
    ("valid_data", "valid"),
    ("test", "valid"),
    ("is_sparse", "enable_bundle"),
    ("is_enable_bundle", "enable_bundle"),
    ("num_iteration", "num_iterations"),
    ("num_tree", "num_iterations"),
    ("num_trees", "num_iterations"),
    ("num_round", "num_iterations"),
    ("num_rounds", "num_iterations"),
    ("num_boost_round", "num_iterations"),
    ("n_estimators", "num_iterations"),
    ("shrinkage_rate", "learning_rate"),
    ("eta", "learning_rate"),
    ("num_leaf", "num_leaves"),
    ("max_leaves", "num_leaves"),
    ("min_data_per_leaf", "min_data_in_leaf"),
    ("min_data", "min_data_in_leaf"),
    ("min_child_samples", "min_data_in_leaf"),
    ("min_sum_hessian_per_leaf", "min_sum_hessian_in_leaf"),
    ("min_sum_hessian", "min_sum_hessian_in_leaf"),
    ("min_hessian", "min_sum_hessian_in_leaf"),
    ("min_child_weight", "min_sum_hessian_in_leaf"),
    ("reg_alpha", "lambda_l1"),
    ("reg_lambda", "lambda_l2"),
    ("min_split_gain", "min_gain_to_split"),
    ("sub_feature", "feature_fraction"),
    ("colsample_bytree", "feature_fraction"),
    ("sub_row", "bagging_fraction"),
    ("subsample", "bagging_fraction"),
    ("subsample_freq", "bagging_freq"),
    ("early_stopping_rounds", "early_stopping_round"),
    ("early_stopping", "early_stopping_round"),
    ("training_metric", "is_provide_training_metric"),
    ("is_training_metric", "is_provide_training_metric"),
    ("output_freq", "metric_freq"),
    ("save_period", "snapshot_freq"),
    ("header", "has_header"),
    ("label", "label_column"),
    ("weight", "weight_column"),
    ("group", "group_column"),
    ("query", "group_column"),
    ("query_column", "group_column"),
    ("group_id", "group_column"),
    ("query_id", "group_column"),
    ("ignore_feature", "ignore_column"),
    ("blacklist", "ignore_column"),
    ("categorical_feature", "categorical_column"),
    ("cat_feature", "categorical_column"),
    ("categorical_features", "categorical_column"),
    ("use_two_round_loading", "two_round"),
    ("two_round_loading", "two_round"),
    ("save_binary", "is_save_binary_file"),
    ("is_save_binary", "is_save_binary_file"),
    ("subsample_for_bin", "bin_construct_sample_cnt"),
    ("data_seed", "data_random_seed"),
    ("model_output", "output_model"),
    ("model_out", "output_model"),
    ("model_input", "input_model"),
    ("model_in", "input_model"),
    ("predict_result", "output_result"),
    ("prediction_result", "output_result"),
    ("init_score_file", "initscore_filename"),
    ("init_score", "initscore_filename"),
    ("valid_init_score_file", "valid_init_score"),
    ("num_iteration_for_pred", "num_iteration_predict"),
    ("is_predict_raw_score", "predict_raw_score"),
    ("raw_score", "predict_raw_score"),
    ("is_predict_leaf_index", "predict_leaf_index"),
    ("leaf_index", "predict_leaf_index"),
    ("is_predict_contrib", "predict_contrib"),
    ("contrib", "predict_contrib"),
    ("num_classes", "num_class"),
    ("metric_types", "metric"),
    ("num_machine", "num_machines"),
    ("is_pre_partition", "is_pre_partition"),
    ("pre_partition", "is_pre_partition"),
];

/// Parse one `key=value` item into `params`.
///
/// Blank items are skipped. When a key is repeated the first value wins.
pub fn kv_to_map(params: &mut HashMap<String, String>, kv: &str) {
    let kv = Common::trim(kv);
    if kv.is_empty() {
        return;
    }
    match kv.split_once('=') {
        Some((key, value)) => {
            let key = Common::trim(key).to_ascii_lowercase();
            let value = Common::trim(value).to_string();
            if key.is_empty() {
                return;
            }
            if let Some(old) = params.get(&key) {
                log::warn!(
                    "{} is set={}, {}={} will be ignored. Current value: {}={}",
                    key,
                    old,
                    key,
                    value,
                    key,
                    old
                );
            } else {
                params.insert(key, value);
            }
        }
        None => log::warn!("Unknown parameter {}", kv),
    }
}

/// Parse command-line style arguments into a parameter map.
pub fn args_to_map<I, S>(args: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut params = HashMap::new();
    for arg in args {
        kv_to_map(&mut params, arg.as_ref());
    }
    key_alias_transform(&mut params);
    params
}

/// Rename aliased keys to their canonical names.
///
/// If both an alias and its canonical key are present the canonical one is
/// kept.
pub fn key_alias_transform(params: &mut HashMap<String, String>) {
    for &(alias, name) in ALIASES {
        if alias == name {
            continue;
        }
        if let Some(value) = params.remove(alias) {
            if params.contains_key(name) {
                log::warn!("{} is set with {}, {} is ignored", name, alias, alias);
            } else {
                params.insert(name.to_string(), value);
            }
        }
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse::<T>().map_err(|_| {
        LightGBMError::invalid_parameter(key, value, format!("cannot be parsed as {}", std::any::type_name::<T>()))
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "+" => Ok(true),
        "false" | "0" | "-" => Ok(false),
        _ => Err(LightGBMError::invalid_parameter(
            key,
            value,
            "must be true or false",
        )),
    }
}

fn parse_list(value: &str) -> Vec<String> {
    Common::split(value, ',')
        .into_iter()
        .map(|s| Common::trim(&s).to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Config {
    /// Build a config from canonical `key -> value` parameters.
    pub fn from_params(params: &HashMap<String, String>) -> Result<Config> {
        let mut config = Config::default();
        config.apply_params(params)?;
        Ok(config)
    }

    /// Override fields with the given canonical parameters and validate.
    pub fn apply_params(&mut self, params: &HashMap<String, String>) -> Result<()> {
        // `seed` is applied first so explicit per-purpose seeds still win
        if let Some(seed) = params.get("seed") {
            let mut rand = Random::with_seed(parse_value("seed", seed)?);
            self.data_random_seed = rand.next_short(0, i16::MAX as i32);
            self.bagging_seed = rand.next_short(0, i16::MAX as i32);
            self.feature_fraction_seed = rand.next_short(0, i16::MAX as i32);
        }

        let mut keys: Vec<&String> = params.keys().collect();
        keys.sort();
        for key in keys {
            let v = params[key].as_str();
            let k = key.as_str();
            match k {
                "seed" | "config" => {}
                "task" => self.task = v.parse()?,
                "boosting_type" => self.boosting_type = v.parse()?,
                "objective" => self.objective = v.parse()?,
                "metric" => self.metric = parse_list(v),
                "data" => self.data = v.to_string(),
                "valid" => self.valid = parse_list(v),
                "initscore_filename" => self.initscore_filename = v.to_string(),
                "valid_init_score" => self.valid_init_score = parse_list(v),
                "output_model" => self.output_model = v.to_string(),
                "input_model" => self.input_model = v.to_string(),
                "output_result" => self.output_result = v.to_string(),
                "convert_model" => self.convert_model = v.to_string(),
                "convert_model_language" => self.convert_model_language = v.to_string(),
                "num_iterations" => self.num_iterations = parse_value(k, v)?,
                "learning_rate" => self.learning_rate = parse_value(k, v)?,
                "num_leaves" => self.num_leaves = parse_value(k, v)?,
                "max_depth" => self.max_depth = parse_value(k, v)?,
                "min_data_in_leaf" => self.min_data_in_leaf = parse_value(k, v)?,
                "min_sum_hessian_in_leaf" => self.min_sum_hessian_in_leaf = parse_value(k, v)?,
                "lambda_l1" => self.lambda_l1 = parse_value(k, v)?,
                "lambda_l2" => self.lambda_l2 = parse_value(k, v)?,
                "min_gain_to_split" => self.min_gain_to_split = parse_value(k, v)?,
                "feature_fraction" => self.feature_fraction = parse_value(k, v)?,
                "feature_fraction_seed" => self.feature_fraction_seed = parse_value(k, v)?,
                "bagging_fraction" => self.bagging_fraction = parse_value(k, v)?,
                "bagging_freq" => self.bagging_freq = parse_value(k, v)?,
                "bagging_seed" => self.bagging_seed = parse_value(k, v)?,
                "early_stopping_round" => self.early_stopping_round = parse_value(k, v)?,
                "metric_freq" => self.metric_freq = parse_value(k, v)?,
                "is_provide_training_metric" => self.is_provide_training_metric = parse_bool(k, v)?,
                "snapshot_freq" => self.snapshot_freq = parse_value(k, v)?,
                "boost_from_average" => self.boost_from_average = parse_bool(k, v)?,
                "max_bin" => self.max_bin = parse_value(k, v)?,
                "min_data_in_bin" => self.min_data_in_bin = parse_value(k, v)?,
                "bin_construct_sample_cnt" => self.bin_construct_sample_cnt = parse_value(k, v)?,
                "data_random_seed" => self.data_random_seed = parse_value(k, v)?,
                "use_missing" => self.use_missing = parse_bool(k, v)?,
                "zero_as_missing" => self.zero_as_missing = parse_bool(k, v)?,
                "enable_bundle" => self.enable_bundle = parse_bool(k, v)?,
                "sparse_threshold" => self.sparse_threshold = parse_value(k, v)?,
                "has_header" => self.has_header = parse_bool(k, v)?,
                "label_column" => self.label_column = v.to_string(),
                "weight_column" => self.weight_column = v.to_string(),
                "group_column" => self.group_column = v.to_string(),
                "ignore_column" => self.ignore_column = v.to_string(),
                "categorical_column" => self.categorical_column = v.to_string(),
                "two_round" => self.two_round = parse_bool(k, v)?,
                "is_save_binary_file" => self.is_save_binary_file = parse_bool(k, v)?,
                "is_pre_partition" => self.is_pre_partition = parse_bool(k, v)?,
                "num_iteration_predict" => self.num_iteration_predict = parse_value(k, v)?,
                "predict_raw_score" => self.predict_raw_score = parse_bool(k, v)?,
                "predict_leaf_index" => self.predict_leaf_index = parse_bool(k, v)?,
                "predict_contrib" => self.predict_contrib = parse_bool(k, v)?,
                "pred_early_stop" => self.pred_early_stop = parse_bool(k, v)?,
                "pred_early_stop_freq" => self.pred_early_stop_freq = parse_value(k, v)?,
                "pred_early_stop_margin" => self.pred_early_stop_margin = parse_value(k, v)?,
                "num_class" => self.num_class = parse_value(k, v)?,
                "sigmoid" => self.sigmoid = parse_value(k, v)?,
                "huber_delta" => self.huber_delta = parse_value(k, v)?,
                "fair_c" => self.fair_c = parse_value(k, v)?,
                "num_threads" => self.num_threads = parse_value(k, v)?,
                "num_machines" => self.num_machines = parse_value(k, v)?,
                _ => log::warn!("Unknown parameter: {}", k),
            }
        }
        self.validate()
    }

    /// Training parameters as `[key: value]` lines for the model file.
    pub fn to_parameter_string(&self) -> String {
        let mut out = Vec::new();
        let mut push = |k: &str, v: String| out.push(format!("[{}: {}]", k, v));
        push("boosting_type", self.boosting_type.to_string());
        push("objective", self.objective.to_string());
        push("metric", self.metric.join(","));
        push("num_iterations", self.num_iterations.to_string());
        push("learning_rate", self.learning_rate.to_string());
        push("num_leaves", self.num_leaves.to_string());
        push("max_depth", self.max_depth.to_string());
        push("min_data_in_leaf", self.min_data_in_leaf.to_string());
        push("min_sum_hessian_in_leaf", self.min_sum_hessian_in_leaf.to_string());
        push("lambda_l1", self.lambda_l1.to_string());
        push("lambda_l2", self.lambda_l2.to_string());
        push("min_gain_to_split", self.min_gain_to_split.to_string());
        push("feature_fraction", self.feature_fraction.to_string());
        push("bagging_fraction", self.bagging_fraction.to_string());
        push("bagging_freq", self.bagging_freq.to_string());
        push("early_stopping_round", self.early_stopping_round.to_string());
        push("max_bin", self.max_bin.to_string());
        push("min_data_in_bin", self.min_data_in_bin.to_string());
        push("use_missing", self.use_missing.to_string());
        push("zero_as_missing", self.zero_as_missing.to_string());
        push("num_class", self.num_class.to_string());
        push("sigmoid", self.sigmoid.to_string());
        out.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ObjectiveType, TaskType};

    #[test]
    fn test_kv_first_value_wins() {
        let mut params = HashMap::new();
        kv_to_map(&mut params, "num_leaves=15");
        kv_to_map(&mut params, " num_leaves = 63 ");
        kv_to_map(&mut params, "   ");
        assert_eq!(params.len(), 1);
        assert_eq!(params["num_leaves"], "15");
    }

    #[test]
    fn test_alias_transform() {
        let params = args_to_map(["app=binary", "num_trees=7", "eta=0.3", "label=name:y"]);
        assert_eq!(params["objective"], "binary");
        assert_eq!(params["num_iterations"], "7");
        assert_eq!(params["label_column"], "name:y");

        let config = Config::from_params(&params).unwrap();
        assert_eq!(config.objective, ObjectiveType::Binary);
        assert_eq!(config.num_iterations, 7);
        assert_eq!(config.learning_rate, 0.3);
    }

    #[test]
    fn test_canonical_key_beats_alias() {
        let params = args_to_map(["num_iterations=5", "num_trees=9"]);
        assert_eq!(params["num_iterations"], "5");
    }

    #[test]
    fn test_bad_values_are_errors() {
        let params = args_to_map(["num_leaves=many"]);
        assert!(Config::from_params(&params).is_err());
        let params = args_to_map(["use_missing=maybe"]);
        assert!(Config::from_params(&params).is_err());
        let params = args_to_map(["task=fly"]);
        assert!(Config::from_params(&params).is_err());
    }

    #[test]
    fn test_seed_derives_other_seeds() {
        let a = Config::from_params(&args_to_map(["seed=7"])).unwrap();
        let b = Config::from_params(&args_to_map(["seed=7", "bagging_seed=99"])).unwrap();
        assert_eq!(a.data_random_seed, b.data_random_seed);
        assert_eq!(b.bagging_seed, 99);
        assert_ne!(a.data_random_seed, Config::default().data_random_seed);
    }

    #[test]
    fn test_lists_and_task() {
        let params = args_to_map(["metric=l2, l1", "valid=a.txt,b.txt", "task=predict"]);
        let config = Config::from_params(&params).unwrap();
        assert_eq!(config.metric, vec!["l2", "l1"]);
        assert_eq!(config.valid.len(), 2);
        assert_eq!(config.task, TaskType::Predict);
    }
}
