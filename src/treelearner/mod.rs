/// Per-tree feature subsampling
pub mod col_sampler;
/// Row indices grouped by leaf
pub mod data_partition;
/// Histograms and threshold search
pub mod feature_histogram;
/// Serial tree learner
pub mod serial_tree_learner;
/// Split information structures
pub mod split_info;

pub use col_sampler::ColSampler;
pub use data_partition::DataPartition;
pub use serial_tree_learner::SerialTreeLearner;
pub use split_info::SplitInfo;
