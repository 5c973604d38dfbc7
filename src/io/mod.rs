//! Bin storage and the tree model.
//!
//! [`bin`] defines the storage trait for one feature group's bins with its
//! dense and sparse implementations, [`tree`] the decision tree that the
//! learner grows and the boosting engine serializes.

pub mod bin;
pub mod dense_bin;
pub mod sparse_bin;
pub mod tree;

pub use bin::{Bin, HistogramBinEntry};
pub use tree::Tree;
