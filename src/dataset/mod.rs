//! Dataset management.
//!
//! Raw rows are binned with per-feature [`BinMapper`]s into a [`Dataset`]
//! of feature groups, with labels, weights, queries and initial scores kept
//! in its [`Metadata`].

pub mod binning;
pub mod dataset;
pub mod loader;
pub mod metadata;

pub use binning::BinMapper;
pub use dataset::Dataset;
pub use loader::{DatasetLoader, Parser, TextReader};
pub use metadata::Metadata;
