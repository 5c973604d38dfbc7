//! # LightGBM engine
//!
//! Histogram-based gradient boosting decision trees in Rust: dataset
//! binning and loading, the boosting engine, tree learning and batch
//! prediction, plus a `lightgbm` command-line application.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lightgbm_engine::boosting::GBDT;
//! use lightgbm_engine::config::Config;
//! use lightgbm_engine::core::network::LocalNetwork;
//! use lightgbm_engine::dataset::DatasetLoader;
//! use lightgbm_engine::metrics::create_metrics;
//! use lightgbm_engine::objective::create_objective;
//! use std::sync::Arc;
//!
//! # fn main() -> lightgbm_engine::Result<()> {
//! lightgbm_engine::init_logging();
//! let config = Config { num_iterations: 50, ..Config::default() };
//! let mut loader = DatasetLoader::new(&config, None, 1, "train.csv", Arc::new(LocalNetwork))?;
//! let train = Arc::new(loader.load_from_file("train.csv", "")?);
//!
//! let mut objective = create_objective(&config)?;
//! objective.init(train.metadata(), train.num_data())?;
//! let metrics = create_metrics(&config, train.metadata(), train.num_data())?;
//!
//! let mut gbdt = GBDT::new();
//! gbdt.init(&config, train, Some(objective), metrics)?;
//! gbdt.train(-1, "model.txt")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`config`]: parameters, aliases and config files
//! - [`dataset`]: bin mappers, the binned [`dataset::Dataset`], metadata and loaders
//! - [`treelearner`]: histogram-based serial tree learner
//! - [`objective`] and [`metrics`]: losses for gradients and evaluation
//! - [`boosting`]: the [`boosting::GBDT`] engine and score updaters
//! - [`prediction`]: [`prediction::Predictor`] and prediction early stopping
//! - [`application`]: train, predict and convert_model tasks

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_debug_implementations, rust_2018_idioms, non_snake_case, non_upper_case_globals)]

pub mod application;
pub mod boosting;
pub mod config;
pub mod core;
pub mod dataset;
pub mod io;
pub mod metrics;
pub mod objective;
pub mod prediction;
pub mod treelearner;

pub use crate::core::error::{LightGBMError, Result};
pub use crate::core::init_logging;
pub use crate::core::types::*;

pub use application::Application;
pub use boosting::GBDT;
pub use config::Config;
pub use dataset::{Dataset, DatasetLoader};
pub use prediction::Predictor;

/// Library version, from the package metadata
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
