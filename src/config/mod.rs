//! Configuration management.
//!
//! [`Config`] holds every parameter; [`parameters`] turns `key=value`
//! arguments (with aliases) into one.

pub mod core;
pub mod parameters;

pub use self::core::{Config, ConfigBuilder};
pub use parameters::{args_to_map, key_alias_transform, kv_to_map};

/// Default model output path
pub const DEFAULT_MODEL_FILE: &str = "LightGBM_model.txt";
