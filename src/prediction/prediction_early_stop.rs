//! Early exit from the tree loop during prediction.
//!
//! Every `round_period` iterations the boosting engine hands the partial raw
//! scores of a row to the instance; once the margin between the outputs is
//! large enough, the remaining trees cannot change the decision and are
//! skipped.

use crate::core::error::{LightGBMError, Result};
use serde::{Deserialize, Serialize};

/// Configuration for prediction early stopping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionEarlyStopConfig {
    /// Margin above which prediction stops
    pub margin_threshold: f64,
    /// Number of iterations between two checks
    pub round_period: i32,
}

impl Default for PredictionEarlyStopConfig {
    fn default() -> Self {
        PredictionEarlyStopConfig {
            margin_threshold: 0.0,
            round_period: 1,
        }
    }
}

impl PredictionEarlyStopConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_margin_threshold(mut self, margin_threshold: f64) -> Self {
        self.margin_threshold = margin_threshold;
        self
    }

    pub fn with_round_period(mut self, round_period: i32) -> Self {
        self.round_period = round_period;
        self
    }
}

/// Callback deciding whether partial raw scores are final.
pub struct PredictionEarlyStopInstance {
    check_fn: Box<dyn Fn(&[f64]) -> bool + Send + Sync>,
    /// Iterations between two calls of the callback
    pub round_period: i32,
}

impl PredictionEarlyStopInstance {
    pub fn new<F>(check_fn: F, round_period: i32) -> Self
    where
        F: Fn(&[f64]) -> bool + Send + Sync + 'static,
    {
        PredictionEarlyStopInstance {
            check_fn: Box::new(check_fn),
            round_period,
        }
    }

    /// Instance that never stops.
    pub fn none() -> Self {
        Self::new(|_| false, i32::MAX)
    }

    #[inline]
    pub fn should_stop(&self, pred: &[f64]) -> bool {
        (self.check_fn)(pred)
    }
}

impl std::fmt::Debug for PredictionEarlyStopInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictionEarlyStopInstance")
            .field("round_period", &self.round_period)
            .field("check_fn", &"<function>")
            .finish()
    }
}

/// Instance for `early_stop_type`, one of `none`, `binary` or `multiclass`.
pub fn create_prediction_early_stop_instance(
    early_stop_type: &str,
    config: &PredictionEarlyStopConfig,
) -> Result<PredictionEarlyStopInstance> {
    let margin_threshold = config.margin_threshold;
    match early_stop_type {
        "none" => Ok(PredictionEarlyStopInstance::none()),
        "binary" => Ok(PredictionEarlyStopInstance::new(
            move |pred: &[f64]| binary_margin(pred).map_or(false, |m| m > margin_threshold),
            config.round_period,
        )),
        "multiclass" => Ok(PredictionEarlyStopInstance::new(
            move |pred: &[f64]| multiclass_margin(pred).map_or(false, |m| m > margin_threshold),
            config.round_period,
        )),
        other => Err(LightGBMError::invalid_parameter(
            "early_stop_type",
            other,
            "unknown prediction early stopping type",
        )),
    }
}

/// Distance between the two sides of the decision boundary
fn binary_margin(pred: &[f64]) -> Option<f64> {
    match pred {
        [score] => Some(2.0 * score.abs()),
        _ => None,
    }
}

/// Gap between the two highest scores
fn multiclass_margin(pred: &[f64]) -> Option<f64> {
    if pred.len() < 2 {
        return None;
    }
    let mut top1 = f64::NEG_INFINITY;
    let mut top2 = f64::NEG_INFINITY;
    for &v in pred {
        if v > top1 {
            top2 = top1;
            top1 = v;
        } else if v > top2 {
            top2 = v;
        }
    }
    Some(top1 - top2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(margin: f64, period: i32) -> PredictionEarlyStopConfig {
        PredictionEarlyStopConfig::new()
            .with_margin_threshold(margin)
            .with_round_period(period)
    }

    #[test]
    fn test_none_never_stops() {
        let instance = create_prediction_early_stop_instance("none", &config(0.0, 3)).unwrap();
        assert_eq!(instance.round_period, i32::MAX);
        assert!(!instance.should_stop(&[100.0]));
        assert!(!instance.should_stop(&[100.0, -100.0]));
    }

    #[test]
    fn test_binary_margin() {
        let instance = create_prediction_early_stop_instance("binary", &config(1.0, 3)).unwrap();
        assert_eq!(instance.round_period, 3);
        assert!(instance.should_stop(&[0.6]));
        assert!(instance.should_stop(&[-0.7]));
        assert!(!instance.should_stop(&[0.5]));
        assert!(!instance.should_stop(&[2.0, 0.0]));
    }

    #[test]
    fn test_multiclass_margin() {
        let instance = create_prediction_early_stop_instance("multiclass", &config(0.5, 5)).unwrap();
        assert!(instance.should_stop(&[0.8, 0.2]));
        assert!(instance.should_stop(&[0.1, 0.9, 0.0]));
        assert!(!instance.should_stop(&[0.75, 0.25]));
        // ties at the top leave no margin
        assert!(!instance.should_stop(&[3.0, 3.0, -10.0]));
        assert!(!instance.should_stop(&[5.0]));
    }

    #[test]
    fn test_unknown_type() {
        assert!(create_prediction_early_stop_instance("ranking", &config(0.0, 1)).is_err());
    }
}
