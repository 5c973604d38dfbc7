//! Prediction with trained models.
//!
//! [`Predictor`] runs a model over text files or matrices; the early stop
//! instances let it skip trees once a row's decision is settled.

pub mod prediction_early_stop;
pub mod predictor;

pub use prediction_early_stop::{
    create_prediction_early_stop_instance, PredictionEarlyStopConfig, PredictionEarlyStopInstance,
};
pub use predictor::{PredictMode, Predictor};
