//! Training objectives.
//!
//! An objective turns the current scores into per-row gradients and
//! hessians and maps raw scores to the output space. Multiclass objectives
//! lay their scores out class-major: the score of row `i` for class `k` is
//! at `num_data * k + i`.

pub mod binary;
pub mod multiclass;
pub mod regression;

pub use binary::BinaryLogloss;
pub use multiclass::{MulticlassOva, MulticlassSoftmax};
pub use regression::RegressionL2Loss;

use crate::config::Config;
use crate::core::error::{LightGBMError, Result};
use crate::core::types::{DataSize, ObjectiveType, Score};
use crate::dataset::Metadata;
use std::fmt;

/// Loss to be minimized by boosting.
pub trait ObjectiveFunction: Send + Sync + fmt::Debug {
    /// Bind labels and weights of the training data.
    fn init(&mut self, metadata: &Metadata, num_data: DataSize) -> Result<()>;

    /// Fill first and second order derivatives for every score.
    fn get_gradients(&self, score: &[f64], gradients: &mut [Score], hessians: &mut [Score]);

    fn name(&self) -> &'static str;

    /// Raw scores of one row to outputs, `num_predict_one_row` values each
    fn convert_output(&self, input: &[f64], output: &mut [f64]);

    /// Text stored in the `objective=` line of a model
    fn to_model_string(&self) -> String;

    /// Whether every hessian has the same value
    fn is_constant_hessian(&self) -> bool {
        false
    }

    /// Whether training may start from the mean label
    fn boost_from_average(&self) -> bool {
        false
    }

    fn skip_empty_class(&self) -> bool {
        false
    }

    fn num_model_per_iteration(&self) -> usize {
        1
    }

    fn num_predict_one_row(&self) -> usize {
        1
    }

    /// False when predictions may stop early once a margin is reached
    fn need_accurate_prediction(&self) -> bool {
        true
    }

    /// Whether trees of `class_id` carry any information
    fn class_need_train(&self, _class_id: usize) -> bool {
        true
    }

    /// Constant output of a class that does not need training
    fn class_default_output(&self, _class_id: usize) -> f64 {
        0.0
    }
}

/// Objective configured by `config.objective`.
pub fn create_objective(config: &Config) -> Result<Box<dyn ObjectiveFunction>> {
    Ok(match config.objective {
        ObjectiveType::Regression => Box::new(RegressionL2Loss::new()),
        ObjectiveType::Binary => Box::new(BinaryLogloss::new(config.sigmoid)?),
        ObjectiveType::Multiclass => Box::new(MulticlassSoftmax::new(config.num_class)?),
        ObjectiveType::MulticlassOva => Box::new(MulticlassOva::new(config.num_class, config.sigmoid)?),
    })
}

/// Rebuild an objective from the `objective=` line of a saved model, for
/// example `multiclassova num_class:3 sigmoid:1`.
pub fn create_objective_from_string(text: &str) -> Result<Box<dyn ObjectiveFunction>> {
    let mut tokens = text.split_whitespace();
    let name = tokens
        .next()
        .ok_or_else(|| LightGBMError::model("empty objective string"))?;
    let mut num_class: Option<usize> = None;
    let mut sigmoid: Option<f64> = None;
    for token in tokens {
        let Some((key, value)) = token.split_once(':') else {
            continue;
        };
        match key {
            "num_class" => {
                num_class = Some(value.parse().map_err(|_| {
                    LightGBMError::model(format!("invalid num_class in objective: {}", value))
                })?)
            }
            "sigmoid" => {
                sigmoid = Some(value.parse().map_err(|_| {
                    LightGBMError::model(format!("invalid sigmoid in objective: {}", value))
                })?)
            }
            _ => {}
        }
    }
    let need_num_class = || num_class.ok_or_else(|| LightGBMError::model("Objective should contain num_class field"));
    let objective: Box<dyn ObjectiveFunction> = match name.parse::<ObjectiveType>()? {
        ObjectiveType::Regression => Box::new(RegressionL2Loss::new()),
        ObjectiveType::Binary => Box::new(BinaryLogloss::new(sigmoid.unwrap_or(-1.0))?),
        ObjectiveType::Multiclass => Box::new(MulticlassSoftmax::new(need_num_class()?)?),
        ObjectiveType::MulticlassOva => {
            Box::new(MulticlassOva::new(need_num_class()?, sigmoid.unwrap_or(-1.0))?)
        }
    };
    Ok(objective)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_string_round_trip() {
        for text in ["regression", "binary sigmoid:1", "multiclass num_class:3", "multiclassova num_class:4 sigmoid:2"] {
            let objective = create_objective_from_string(text).unwrap();
            assert_eq!(objective.to_model_string(), text);
        }
    }

    #[test]
    fn test_model_string_requires_fields() {
        assert!(create_objective_from_string("multiclass").is_err());
        assert!(create_objective_from_string("binary").is_err());
        assert!(create_objective_from_string("lambdarank").is_err());
        assert!(create_objective_from_string("").is_err());
    }

    #[test]
    fn test_factory_uses_config() {
        let config = Config {
            objective: ObjectiveType::Multiclass,
            num_class: 5,
            ..Config::default()
        };
        let objective = create_objective(&config).unwrap();
        assert_eq!(objective.num_model_per_iteration(), 5);
        assert!(objective.skip_empty_class());
    }
}
