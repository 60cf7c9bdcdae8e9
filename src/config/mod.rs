//! Runner Configuration Module
//!
//! Provides the runner settings loaded from TOML files plus the AAPP
//! environment snapshot consumed by stage selection.
//!
//! ## Loading Order
//!
//! 1. `POLAR_L1_RUNNER_CONFIG` environment variable (path to TOML file)
//! 2. `l1_runner.toml` in the current working directory
//! 3. Built-in defaults
//!
//! `SMHI_MODE` overrides the run mode after loading.
//!
//! ## Usage
//!
//! ```ignore
//! let config = RunnerConfig::load();
//! let ttl = config.scenes.pending_ttl_secs;
//! ```
//!
//! The loaded config is passed down explicitly; nothing below `main` reads
//! a global.

mod runner_config;
pub mod defaults;
pub mod environment;
pub mod validation;

pub use environment::{AappEnvironment, EnvironmentError, HirsVersionTable, HistoryBounds};
pub use runner_config::*;
