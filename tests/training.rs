//! Boosting engine behavior over whole training runs.

mod common;

use approx::assert_relative_eq;
use common::*;
use lightgbm_engine::boosting::{create_boosting, GBDT};
use lightgbm_engine::config::Config;
use lightgbm_engine::core::error::Result;
use lightgbm_engine::core::types::{BoostingType, DataSize, ObjectiveType};
use lightgbm_engine::dataset::Metadata;
use lightgbm_engine::metrics::Metric;
use lightgbm_engine::objective::{create_objective, ObjectiveFunction};
use lightgbm_engine::prediction::{PredictionEarlyStopInstance, Predictor};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Metric replaying a fixed loss curve, one value per evaluation
#[derive(Debug)]
struct ScriptedLoss {
    names: Vec<String>,
    best_at: usize,
    calls: AtomicUsize,
}

impl ScriptedLoss {
    fn new(best_at: usize) -> Self {
        ScriptedLoss {
            names: vec!["scripted".to_string()],
            best_at,
            calls: AtomicUsize::new(0),
        }
    }
}

impl Metric for ScriptedLoss {
    fn init(&mut self, _metadata: &Metadata, _num_data: DataSize) -> Result<()> {
        Ok(())
    }

    fn names(&self) -> &[String] {
        &self.names
    }

    fn factor_to_bigger_better(&self) -> f64 {
        -1.0
    }

    fn eval(&self, _score: &[f64], _objective: Option<&dyn ObjectiveFunction>) -> Vec<f64> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let loss = if call <= self.best_at {
            100.0 - call as f64
        } else {
            100.0 - self.best_at as f64 + (call - self.best_at) as f64
        };
        vec![loss]
    }
}

#[test]
fn early_stopping_halts_after_patience_and_keeps_best() {
    let best_at = 4;
    let patience = 3;
    let config = Config {
        early_stopping_round: patience,
        num_iterations: 50,
        learning_rate: 0.1,
        ..test_config()
    };
    let (features, labels) = regression_data(200, 3, 7);
    let data = dataset_from_matrix(&config, &features, &labels);
    let mut objective = create_objective(&config).unwrap();
    objective.init(data.metadata(), data.num_data()).unwrap();
    let mut gbdt = GBDT::new();
    gbdt.init(&config, Arc::clone(&data), Some(objective), Vec::new()).unwrap();
    gbdt.add_valid_dataset(data, vec![Box::new(ScriptedLoss::new(best_at))]).unwrap();

    let mut snapshot_at_best = String::new();
    let mut stopped_at = 0;
    for iter in 1..=config.num_iterations {
        assert!(!gbdt.train_one_iter(None, None).unwrap());
        if iter == best_at {
            snapshot_at_best = gbdt.save_model_to_string(-1);
        }
        if gbdt.eval_and_check_early_stopping() {
            stopped_at = iter;
            break;
        }
    }
    assert_eq!(stopped_at, best_at + patience);
    assert_eq!(gbdt.current_iteration(), best_at);
    assert_eq!(gbdt.save_model_to_string(-1), snapshot_at_best);
}

#[test]
fn model_file_round_trip_predicts_bit_identically() {
    let config = Config { objective: ObjectiveType::Binary, metric: vec!["binary_logloss".into()], ..test_config() };
    let (features, labels) = binary_data(300, 4, 11);
    let data = dataset_from_matrix(&config, &features, &labels);
    let mut gbdt = boosting_for(&config, data);
    train_iterations(&mut gbdt, 8);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.txt");
    gbdt.save_model_to_file(-1, &path).unwrap();
    let loaded = create_boosting(BoostingType::Gbdt, path.to_str()).unwrap();
    assert_eq!(loaded.number_of_total_model(), gbdt.number_of_total_model());

    let none = PredictionEarlyStopInstance::none();
    for row in features.outer_iter().take(50) {
        let dense = row.to_vec();
        let (mut a, mut b) = ([0.0], [0.0]);
        gbdt.predict(&dense, &mut a, &none);
        loaded.predict(&dense, &mut b, &none);
        assert_eq!(a[0].to_bits(), b[0].to_bits());
        assert!(a[0] > 0.0 && a[0] < 1.0);
    }
}

#[test]
fn training_scores_match_raw_feature_predictions() {
    let config = test_config();
    let (features, labels) = regression_data(250, 3, 3);
    let data = dataset_from_matrix(&config, &features, &labels);
    let mut gbdt = boosting_for(&config, data);
    train_iterations(&mut gbdt, 6);

    let scores = gbdt.training_score().unwrap().to_vec();
    let none = PredictionEarlyStopInstance::none();
    for (i, row) in features.outer_iter().enumerate() {
        let mut out = [0.0];
        gbdt.predict_raw(&row.to_vec(), &mut out, &none);
        assert_relative_eq!(out[0], scores[i], epsilon = 1e-9);
    }
}

#[test]
fn predictions_are_identical_across_threads() {
    use rayon::prelude::*;

    let config = test_config();
    let (features, labels) = regression_data(200, 5, 21);
    let data = dataset_from_matrix(&config, &features, &labels);
    let mut gbdt = boosting_for(&config, data);
    train_iterations(&mut gbdt, 5);
    let predictor = Predictor::new(gbdt, -1, true, false, false, false, 1, 0.0).unwrap();

    let rows: Vec<Vec<(i32, f64)>> = features.outer_iter().map(sparse_row).collect();
    let serial: Vec<Vec<f64>> = rows.iter().map(|r| predictor.predict_row(r)).collect();
    // dense and nearly empty rows interleaved on every worker
    let parallel: Vec<Vec<f64>> = (0..rows.len() * 4)
        .into_par_iter()
        .map(|i| {
            let _ = predictor.predict_row(&rows[(i * 7) % rows.len()][..1]);
            predictor.predict_row(&rows[i % rows.len()])
        })
        .collect();
    for (i, p) in parallel.iter().enumerate() {
        assert_eq!(p, &serial[i % rows.len()]);
    }
}

#[test]
fn bagging_keeps_training_deterministic() {
    let config = Config { bagging_fraction: 0.5, bagging_freq: 1, bagging_seed: 5, ..test_config() };
    let (features, labels) = regression_data(3000, 3, 9);
    let train = |config: &Config| {
        let data = dataset_from_matrix(config, &features, &labels);
        let mut gbdt = boosting_for(config, data);
        train_iterations(&mut gbdt, 4);
        gbdt.save_model_to_string(-1)
    };
    let first = train(&config);
    assert_eq!(first, train(&config));
    assert_ne!(first, train(&Config { bagging_seed: 6, ..config.clone() }));
}

#[test]
fn multiclass_trains_one_tree_per_class() {
    let config = Config {
        objective: ObjectiveType::Multiclass,
        num_class: 3,
        metric: vec!["multi_logloss".into(), "multi_error".into()],
        ..test_config()
    };
    let (features, raw) = regression_data(300, 2, 4);
    let labels: Vec<f32> = raw.iter().map(|&l| if l < -0.3 { 0.0 } else if l < 0.3 { 1.0 } else { 2.0 }).collect();
    let data = dataset_from_matrix(&config, &features, &labels);
    let mut gbdt = boosting_for(&config, data);
    let before = gbdt.get_eval_at(0).unwrap();
    train_iterations(&mut gbdt, 5);
    assert_eq!(gbdt.number_of_total_model(), 15);
    let after = gbdt.get_eval_at(0).unwrap();
    assert!(after[0] < before[0]);

    let probs = gbdt.get_predict_at(0).unwrap();
    let n = labels.len();
    for i in 0..n {
        let total: f64 = (0..3).map(|k| probs[k * n + i]).sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-9);
    }
}

#[test]
fn custom_gradients_drive_training() {
    let mut config = test_config();
    config.boost_from_average = false;
    let (features, labels) = regression_data(200, 2, 1);
    let data = dataset_from_matrix(&config, &features, &labels);
    let mut gbdt = boosting_for(&config, data);
    for _ in 0..3 {
        let score = gbdt.training_score().unwrap().to_vec();
        let grad: Vec<f32> = score.iter().zip(&labels).map(|(s, l)| *s as f32 - l).collect();
        let hess = vec![1.0f32; grad.len()];
        assert!(!gbdt.train_one_iter(Some(&grad), Some(&hess)).unwrap());
    }
    assert_eq!(gbdt.current_iteration(), 3);
}
