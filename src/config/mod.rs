//! Configuration module for Guardify.
//!
//! This module provides configuration management for the engine, including:
//! - Loading settings from files (TOML/JSON)
//! - Environment variable overrides
//! - CLI argument merging
//! - Eager validation
//! - Callback wiring through [`GuardifyConfig`]
//!
//! # Example
//!
//! ```rust,no_run
//! use guardify::config::{GuardifyConfig, GuardifySettings};
//!
//! // Load from a file, then apply environment overrides
//! let settings = GuardifySettings::from_file("guardify.toml")
//!     .unwrap()
//!     .merge_with_env()
//!     .unwrap();
//!
//! let config = GuardifyConfig::new(settings)
//!     .on_violation(|record| println!("violation #{}: {}", record.sequence, record.kind));
//! ```

mod callbacks;
mod options;
mod settings;

pub use callbacks::{
    invoke_guarded, DevToolsCallback, KeyPredicate, LifecycleCallback, ViolationCallback,
};
pub use options::GuardifyConfig;
pub use settings::{
    parse_key_list, CliArgs, ConfigError, DevToolsAction, GuardifySettings, SignalPolicy,
    DEFAULT_DEVTOOLS_THRESHOLD_PX, MIN_DEVTOOLS_INTERVAL_MS,
};
