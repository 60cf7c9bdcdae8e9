//! Processing Pipeline Module
//!
//! ## Data Flow
//!
//! ```text
//! MessageSource -> ProcessingLoop -> SceneAssembler -> SceneProcessor
//!                                                        |
//!                    planner -> Orchestrator -> ProcessRunner (per stage)
//!                                                        |
//!                                  publisher -> MessagePublisher
//! ```
//!
//! Exactly one scene is in flight at a time. A failed stage ends the scene:
//! no later stage starts and nothing is published for it.

pub mod orchestrator;
pub mod planner;
pub mod processing_loop;
pub mod processor;
pub mod publisher;
pub mod source;

pub use orchestrator::{FailureReason, Orchestrator, PipelineRun, PipelineState};
pub use planner::{PipelinePlan, PlanError};
pub use processing_loop::{LoopStats, ProcessingLoop};
pub use processor::{EnvironmentSource, SceneOutcome, SceneProcessor};
pub use publisher::{build_messages, ChannelPublisher, JsonLinesPublisher, MessagePublisher, TopicLayout};
pub use source::{LinesSource, MessageEvent, MessageSource, ReplaySource};
