//! Core data types.
//!
//! Scalar aliases keep the widths used by the binary dataset format, and the
//! small enums below are the tags that drive the factories for objectives,
//! boosting and tasks.

use crate::core::error::{LightGBMError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Data indexing type, 32-bit signed like the on-disk row counts.
pub type DataSize = i32;

/// Gradient and hessian value type.
pub type Score = f32;

/// Target value and sample weight type.
pub type Label = f32;

/// Histogram accumulation type.
pub type Hist = f64;

/// Bin index type for discretized feature values.
pub type BinIndex = u32;

/// How a feature is discretized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinType {
    /// Ordered numeric bins with upper bounds
    Numerical,
    /// One bin per retained category
    Categorical,
}

impl BinType {
    pub(crate) fn to_i32(self) -> i32 {
        match self {
            BinType::Numerical => 0,
            BinType::Categorical => 1,
        }
    }

    pub(crate) fn from_i32(v: i32) -> Result<Self> {
        match v {
            0 => Ok(BinType::Numerical),
            1 => Ok(BinType::Categorical),
            _ => Err(LightGBMError::format(format!("unknown bin type {}", v))),
        }
    }
}

/// Missing value policy of a feature.
///
/// The discriminants are the two bits stored in a tree node's decision type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissingType {
    /// No missing handling, NaN is read as zero
    None = 0,
    /// Zero (and NaN) is the missing value
    Zero = 1,
    /// NaN gets its own last bin
    NaN = 2,
}

impl MissingType {
    pub(crate) fn from_i32(v: i32) -> Result<Self> {
        match v {
            0 => Ok(MissingType::None),
            1 => Ok(MissingType::Zero),
            2 => Ok(MissingType::NaN),
            _ => Err(LightGBMError::format(format!("unknown missing type {}", v))),
        }
    }
}

/// Task run by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Fit a model on the training data
    #[default]
    Train,
    /// Score a data file with an existing model
    Predict,
    /// Export an existing model to if-else source code
    ConvertModel,
}

impl FromStr for TaskType {
    type Err = LightGBMError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "train" | "training" => Ok(TaskType::Train),
            "predict" | "prediction" | "test" => Ok(TaskType::Predict),
            "convert_model" => Ok(TaskType::ConvertModel),
            other => Err(LightGBMError::invalid_parameter(
                "task",
                other,
                "must be one of train, predict, convert_model",
            )),
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskType::Train => write!(f, "train"),
            TaskType::Predict => write!(f, "predict"),
            TaskType::ConvertModel => write!(f, "convert_model"),
        }
    }
}

/// Objective function types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveType {
    /// Squared loss regression
    #[default]
    Regression,
    /// Binary log loss classification
    Binary,
    /// Softmax multiclass classification
    Multiclass,
    /// One-vs-all binary classifiers, one per class
    MulticlassOva,
}

impl ObjectiveType {
    /// Whether this objective trains one tree per class.
    pub fn is_multiclass(self) -> bool {
        matches!(self, ObjectiveType::Multiclass | ObjectiveType::MulticlassOva)
    }
}

impl FromStr for ObjectiveType {
    type Err = LightGBMError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "regression" | "regression_l2" | "l2" | "mean_squared_error" | "mse" => {
                Ok(ObjectiveType::Regression)
            }
            "binary" => Ok(ObjectiveType::Binary),
            "multiclass" | "softmax" => Ok(ObjectiveType::Multiclass),
            "multiclassova" | "multiclass_ova" | "ova" | "ovr" => Ok(ObjectiveType::MulticlassOva),
            other => Err(LightGBMError::invalid_parameter(
                "objective",
                other,
                "unknown objective type",
            )),
        }
    }
}

impl fmt::Display for ObjectiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectiveType::Regression => write!(f, "regression"),
            ObjectiveType::Binary => write!(f, "binary"),
            ObjectiveType::Multiclass => write!(f, "multiclass"),
            ObjectiveType::MulticlassOva => write!(f, "multiclassova"),
        }
    }
}

/// Boosting strategy types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BoostingType {
    /// Gradient Boosting Decision Tree
    #[default]
    Gbdt,
}

impl FromStr for BoostingType {
    type Err = LightGBMError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gbdt" | "gbrt" => Ok(BoostingType::Gbdt),
            other => Err(LightGBMError::invalid_parameter(
                "boosting_type",
                other,
                "only gbdt is supported",
            )),
        }
    }
}

impl fmt::Display for BoostingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoostingType::Gbdt => write!(f, "gbdt"),
        }
    }
}

/// Feature importance measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportanceType {
    /// Number of times a feature is used to split
    Split,
    /// Total gain of the splits using a feature
    Gain,
}
