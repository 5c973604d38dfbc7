//! Shared building blocks: errors, basic types, constants, the network
//! seam, the tree learner seam and small utilities.

pub mod error;
pub mod feature_group;
pub mod meta;
pub mod network;
pub mod tree_learner;
pub mod types;
pub mod utils;

pub use error::{LightGBMError, Result};

/// Initialize `env_logger` with `info` as the default level.
///
/// `RUST_LOG` overrides the default. Calling it again is harmless.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}
