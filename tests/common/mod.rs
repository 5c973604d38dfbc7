//! Shared helpers for the integration tests.
#![allow(dead_code)]

use lightgbm_engine::boosting::GBDT;
use lightgbm_engine::config::Config;
use lightgbm_engine::core::network::LocalNetwork;
use lightgbm_engine::dataset::{Dataset, DatasetLoader};
use lightgbm_engine::metrics::create_metrics;
use lightgbm_engine::objective::create_objective;
use ndarray::Array2;
use rand::prelude::*;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Small-data friendly defaults
pub fn test_config() -> Config {
    Config {
        num_iterations: 10,
        learning_rate: 0.3,
        num_leaves: 7,
        min_data_in_leaf: 3,
        min_data_in_bin: 1,
        metric: vec!["l2".to_string()],
        ..Config::default()
    }
}

/// Uniform features in `[-5, 5)` and a noisy linear label
pub fn regression_data(num_samples: usize, num_features: usize, seed: u64) -> (Array2<f64>, Vec<f32>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let features = Array2::from_shape_fn((num_samples, num_features), |_| rng.gen_range(-5.0..5.0));
    let labels = features
        .outer_iter()
        .map(|row| {
            let signal: f64 = row.iter().enumerate().map(|(j, v)| v * (j + 1) as f64 * 0.1).sum();
            (signal + rng.gen_range(-0.1..0.1)) as f32
        })
        .collect();
    (features, labels)
}

/// Labels of `regression_data` thresholded at zero
pub fn binary_data(num_samples: usize, num_features: usize, seed: u64) -> (Array2<f64>, Vec<f32>) {
    let (features, labels) = regression_data(num_samples, num_features, seed);
    let labels = labels.into_iter().map(|l| if l > 0.0 { 1.0 } else { 0.0 }).collect();
    (features, labels)
}

pub fn dataset_from_matrix(config: &Config, features: &Array2<f64>, labels: &[f32]) -> Arc<Dataset> {
    let mut loader = DatasetLoader::without_header(config, Arc::new(LocalNetwork)).unwrap();
    Arc::new(loader.construct_from_matrix(features.view(), labels).unwrap())
}

/// GBDT bound to `data` with the configured objective and metrics
pub fn boosting_for(config: &Config, data: Arc<Dataset>) -> GBDT {
    let mut objective = create_objective(config).unwrap();
    objective.init(data.metadata(), data.num_data()).unwrap();
    let metrics = create_metrics(config, data.metadata(), data.num_data()).unwrap();
    let mut gbdt = GBDT::new();
    gbdt.init(config, data, Some(objective), metrics).unwrap();
    gbdt
}

pub fn train_iterations(gbdt: &mut GBDT, iterations: usize) {
    for _ in 0..iterations {
        if gbdt.train_one_iter(None, None).unwrap() {
            break;
        }
    }
}

/// Write `label,f0,f1,...` lines, optionally with a header
pub fn write_csv(dir: &Path, name: &str, features: &Array2<f64>, labels: &[f32], header: bool) -> PathBuf {
    let mut text = String::new();
    if header {
        let names: Vec<String> = (0..features.ncols()).map(|j| format!("f{}", j)).collect();
        let _ = writeln!(text, "label,{}", names.join(","));
    }
    for (row, label) in features.outer_iter().zip(labels) {
        let values: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        let _ = writeln!(text, "{},{}", label, values.join(","));
    }
    let path = dir.join(name);
    std::fs::write(&path, text).unwrap();
    path
}

/// Dense rows as sparse `(feature, value)` pairs
pub fn sparse_row(row: ndarray::ArrayView1<'_, f64>) -> Vec<(i32, f64)> {
    row.iter()
        .enumerate()
        .filter(|(_, v)| **v != 0.0)
        .map(|(j, &v)| (j as i32, v))
        .collect()
}
