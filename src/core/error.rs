//! Error handling and error types.
//!
//! Every detected invariant violation in dataset loading, training and
//! prediction is surfaced as a [`LightGBMError`] and propagated with `?` up to
//! the caller. The only recoverable path is model loading, which reports
//! failure as a boolean (see `GBDT::load_model_from_string`).

use std::io;
use thiserror::Error;

/// Main error type for the library.
#[derive(Error, Debug)]
pub enum LightGBMError {
    /// Configuration and validation errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Dataset-related errors (empty data, unusable features, bad ordering)
    #[error("Dataset error: {message}")]
    Dataset { message: String },

    /// Data loading and parsing errors
    #[error("Data loading error: {message}")]
    DataLoading { message: String },

    /// Binary file format errors
    #[error("Binary file error: {message}")]
    Format { message: String },

    /// Distributed protocol errors
    #[error("Network error: {message}")]
    Network { message: String },

    /// Training-related errors
    #[error("Training error: {message}")]
    Training { message: String },

    /// Prediction errors
    #[error("Prediction error: {message}")]
    Prediction { message: String },

    /// Model text parsing errors
    #[error("Model error: {message}")]
    Model { message: String },

    /// File I/O errors
    #[error("I/O error: {source}")]
    IO {
        #[from]
        source: io::Error,
    },

    /// CSV reading/writing errors
    #[error("CSV error: {source}")]
    Csv {
        #[from]
        source: csv::Error,
    },

    /// JSON serialization errors
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    /// TOML parsing errors
    #[error("TOML error: {source}")]
    Toml {
        #[from]
        source: toml::de::Error,
    },

    /// Invalid input parameters
    #[error("Invalid parameter: {parameter} = {value}, {reason}")]
    InvalidParameter {
        parameter: String,
        value: String,
        reason: String,
    },

    /// Dimension mismatch errors
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: String, actual: String },

    /// Out of bounds access
    #[error("Index out of bounds: index {index}, length {length}")]
    IndexOutOfBounds { index: usize, length: usize },

    /// Internal library errors (should not occur in normal usage)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, LightGBMError>;

macro_rules! message_constructors {
    ($($(#[$doc:meta])* $name:ident => $variant:ident),* $(,)?) => {
        $(
            $(#[$doc])*
            pub fn $name<S: Into<String>>(message: S) -> Self {
                LightGBMError::$variant { message: message.into() }
            }
        )*
    };
}

impl LightGBMError {
    message_constructors! {
        /// Invalid or inconsistent parameters
        config => Config,
        /// Unusable dataset contents
        dataset => Dataset,
        /// Text input that cannot be read or parsed
        data_loading => DataLoading,
        /// Corrupt or mismatched binary dataset file
        format => Format,
        /// Failed collective operation
        network => Network,
        training => Training,
        prediction => Prediction,
        /// Malformed model text
        model => Model,
        internal => Internal,
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter<P, V, R>(parameter: P, value: V, reason: R) -> Self
    where
        P: Into<String>,
        V: Into<String>,
        R: Into<String>,
    {
        LightGBMError::InvalidParameter {
            parameter: parameter.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create a dimension mismatch error
    pub fn dimension_mismatch<E, A>(expected: E, actual: A) -> Self
    where
        E: Into<String>,
        A: Into<String>,
    {
        LightGBMError::DimensionMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create an index out of bounds error
    pub fn index_out_of_bounds(index: usize, length: usize) -> Self {
        LightGBMError::IndexOutOfBounds { index, length }
    }

    /// Whether the caller may continue after this error.
    ///
    /// Only model parsing failures are recoverable: the caller can fall back
    /// to training from scratch. Corrupt training data never is.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, LightGBMError::Model { .. })
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            LightGBMError::Config { .. } => "config",
            LightGBMError::Dataset { .. } => "dataset",
            LightGBMError::DataLoading { .. } => "data_loading",
            LightGBMError::Format { .. } => "format",
            LightGBMError::Network { .. } => "network",
            LightGBMError::Training { .. } => "training",
            LightGBMError::Prediction { .. } => "prediction",
            LightGBMError::Model { .. } => "model",
            LightGBMError::IO { .. } => "io",
            LightGBMError::Csv { .. } => "csv",
            LightGBMError::Json { .. } => "json",
            LightGBMError::Toml { .. } => "toml",
            LightGBMError::InvalidParameter { .. } => "invalid_parameter",
            LightGBMError::DimensionMismatch { .. } => "dimension_mismatch",
            LightGBMError::IndexOutOfBounds { .. } => "index_out_of_bounds",
            LightGBMError::Internal { .. } => "internal",
        }
    }
}

/// Convenience macros for error creation
#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::core::error::LightGBMError::config($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::core::error::LightGBMError::config(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! dataset_error {
    ($msg:expr) => {
        $crate::core::error::LightGBMError::dataset($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::core::error::LightGBMError::dataset(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! format_error {
    ($msg:expr) => {
        $crate::core::error::LightGBMError::format($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::core::error::LightGBMError::format(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !($cond) {
            return Err($err.into());
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = LightGBMError::config("test configuration error");
        assert_eq!(err.category(), "config");
        assert!(!err.is_recoverable());

        let err = LightGBMError::model("bad tree block");
        assert_eq!(err.category(), "model");
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_error_macros() {
        let err = config_error!("test error");
        assert!(matches!(err, LightGBMError::Config { .. }));

        let err = format_error!("feature {} is incorrect", 3);
        assert!(matches!(err, LightGBMError::Format { .. }));
        assert!(err.to_string().contains("feature 3 is incorrect"));
    }

    #[test]
    fn test_ensure_macro() {
        fn check(v: i32) -> Result<i32> {
            ensure!(v > 0, dataset_error!("value {} must be positive", v));
            Ok(v)
        }
        assert!(check(1).is_ok());
        assert!(matches!(check(-1), Err(LightGBMError::Dataset { .. })));
    }

    #[test]
    fn test_parameter_errors() {
        let err = LightGBMError::invalid_parameter("sigmoid", "-0.5", "must be positive");
        assert_eq!(err.category(), "invalid_parameter");
        assert!(err.to_string().contains("sigmoid = -0.5"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: LightGBMError = io_err.into();
        assert!(matches!(err, LightGBMError::IO { .. }));
        assert_eq!(err.category(), "io");
    }
}
