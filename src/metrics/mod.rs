//! Evaluation metrics.
//!
//! Metrics are created by name, bound to a dataset's labels with
//! [`Metric::init`] and evaluated on raw scores. When an objective is
//! supplied, scores are converted to the output space first.
//!
//! ```rust,no_run
//! use lightgbm_engine::config::Config;
//! use lightgbm_engine::metrics::create_metric;
//!
//! let config = Config::default();
//! let rmse = create_metric("rmse", &config).expect("known metric");
//! assert_eq!(rmse.names(), &["rmse".to_string()]);
//! ```

pub mod classification;
pub mod regression;

pub use classification::{BinaryErrorMetric, BinaryLoglossMetric, MultiErrorMetric, MultiLoglossMetric};
pub use regression::{
    FairLossMetric, HuberLossMetric, L1Metric, L2Metric, PoissonMetric, RegressionMetric, RmseMetric,
};

use crate::config::Config;
use crate::core::error::Result;
use crate::core::types::{DataSize, Label};
use crate::dataset::Metadata;
use crate::objective::ObjectiveFunction;
use log::warn;
use std::fmt;

/// Evaluation of scores against the labels of one dataset.
pub trait Metric: Send + Sync + fmt::Debug {
    fn init(&mut self, metadata: &Metadata, num_data: DataSize) -> Result<()>;

    /// Display names, one per value returned by [`Metric::eval`]
    fn names(&self) -> &[String];

    /// `1` when bigger values are better, `-1` otherwise
    fn factor_to_bigger_better(&self) -> f64;

    fn eval(&self, score: &[f64], objective: Option<&dyn ObjectiveFunction>) -> Vec<f64>;
}

/// Labels, weights and the weight total shared by pointwise metrics.
#[derive(Debug, Clone, Default)]
pub(crate) struct PointwiseData {
    pub num_data: usize,
    pub label: Vec<Label>,
    pub weights: Option<Vec<Label>>,
    pub sum_weights: f64,
}

impl PointwiseData {
    pub fn from_metadata(metadata: &Metadata, num_data: DataSize) -> Self {
        let num_data = num_data as usize;
        let weights = metadata.weights().map(<[Label]>::to_vec);
        let sum_weights = match &weights {
            Some(w) => w.iter().map(|&v| f64::from(v)).sum(),
            None => num_data as f64,
        };
        PointwiseData {
            num_data,
            label: metadata.label()[..num_data].to_vec(),
            weights,
            sum_weights,
        }
    }

    #[inline]
    pub fn weight(&self, i: usize) -> f64 {
        self.weights.as_ref().map_or(1.0, |w| f64::from(w[i]))
    }
}

/// Metric for `name`, `None` for "no metric" names and unknown names.
pub fn create_metric(name: &str, config: &Config) -> Option<Box<dyn Metric>> {
    let metric: Box<dyn Metric> = match name.trim().to_ascii_lowercase().as_str() {
        "l2" | "mean_squared_error" | "mse" => Box::new(L2Metric::new()),
        "rmse" | "root_mean_squared_error" => Box::new(RmseMetric::new()),
        "l1" | "mean_absolute_error" | "mae" => Box::new(L1Metric::new()),
        "huber" => Box::new(HuberLossMetric::with_params(config.huber_delta, config.fair_c)),
        "fair" => Box::new(FairLossMetric::with_params(config.huber_delta, config.fair_c)),
        "poisson" => Box::new(PoissonMetric::new()),
        "binary_logloss" | "binary" => Box::new(BinaryLoglossMetric::new(config.sigmoid)),
        "binary_error" => Box::new(BinaryErrorMetric::new(config.sigmoid)),
        "multi_logloss" | "multiclass" | "softmax" | "multiclassova" | "multiclass_ova" | "ova" | "ovr" => {
            Box::new(MultiLoglossMetric::new(config.num_class))
        }
        "multi_error" => Box::new(MultiErrorMetric::new(config.num_class)),
        "" | "none" | "null" | "na" => return None,
        other => {
            warn!("Unknown metric {}, skipping it", other);
            return None;
        }
    };
    Some(metric)
}

/// Every metric named in `config.metric`, bound to `metadata`.
pub fn create_metrics(config: &Config, metadata: &Metadata, num_data: DataSize) -> Result<Vec<Box<dyn Metric>>> {
    let mut metrics = Vec::with_capacity(config.metric.len());
    for name in &config.metric {
        if let Some(mut metric) = create_metric(name, config) {
            metric.init(metadata, num_data)?;
            metrics.push(metric);
        }
    }
    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_names() {
        let config = Config::default();
        assert_eq!(create_metric("mse", &config).unwrap().names(), &["l2".to_string()]);
        assert!(create_metric("None", &config).is_none());
        assert!(create_metric("", &config).is_none());
        assert!(create_metric("ndcg_at_everything", &config).is_none());
    }

    #[test]
    fn test_create_metrics_skips_unknown() {
        let config = Config {
            metric: vec!["l2".into(), "bogus".into(), "l1".into()],
            ..Config::default()
        };
        let mut metadata = Metadata::new();
        metadata.init(2, -1, -1);
        let metrics = create_metrics(&config, &metadata, 2).unwrap();
        assert_eq!(metrics.len(), 2);
    }
}
