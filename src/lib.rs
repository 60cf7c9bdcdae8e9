//! polar-l1-runner: level-1 processing controller for polar direct readout
//!
//! Listens for file-dispatch notifications, assembles downlink files into
//! scenes, runs the level-0 to level-1 processing chain for each scene and
//! publishes messages describing the products.
//!
//! ## Architecture
//!
//! - **Scene Assembly**: pairs or passes through dispatched files per platform
//! - **Stage Selection**: pure mapping from configuration to the command chain
//! - **Process Runner**: supervised external binaries with timeout/cancel
//! - **Pipeline**: orchestration, publishing and the event loop

pub mod ancillary;
pub mod assembly;
pub mod config;
pub mod pipeline;
pub mod process;
pub mod stages;
pub mod types;

// Re-export configuration
pub use config::RunnerConfig;

// Re-export commonly used types
pub use types::{
    FileEvent, InboundMessage, OutboundMessage, OutputRole, Platform, ProcessingLevel, ProcessingResult,
    ProductFamily,
};

// Re-export the scene and pipeline entry points
pub use assembly::{Observation, Scene, SceneAssembler, SceneKey};
pub use pipeline::{Orchestrator, ProcessingLoop, SceneProcessor};
pub use process::{DryRunRunner, ProcessRunner, SystemRunner};
pub use stages::{select_stages, ProcessConfig, RuntimeLookup, Stage};
