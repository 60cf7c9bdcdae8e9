//! Pipeline Orchestrator
//!
//! Drives a plan's stages through the process runner, in order:
//!
//! ```text
//! PENDING -> RUNNING(0) -> RUNNING(1) -> ... -> COMPLETE
//!                 \             \
//!                  +-> FAILED    +-> FAILED
//! ```
//!
//! A stage advances the pipeline only on success. The first failure is
//! terminal: no later stage is started and nothing is rolled back. Outputs
//! are recorded into the [`ProcessingResult`] as each stage succeeds.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::planner::PipelinePlan;
use crate::process::{self, ProcessRunner, Termination, Verdict};
use crate::types::ProcessingResult;

/// Why a pipeline stopped short
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The process could not be started, or its logs not written
    Launch(String),
    /// Exited outside the accepted codes, or killed by a signal
    Rejected(Termination),
    TimedOut,
    Cancelled,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::Launch(e) => write!(f, "launch error: {e}"),
            FailureReason::Rejected(t) => write!(f, "{t}"),
            FailureReason::TimedOut => write!(f, "timed out"),
            FailureReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Per-scene pipeline state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Pending,
    Running { stage: usize },
    Failed { stage: usize, reason: FailureReason },
    Complete,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Failed { .. } | PipelineState::Complete)
    }
}

/// Final record of one pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineRun {
    pub state: PipelineState,
    /// Outputs of the stages that succeeded
    pub result: ProcessingResult,
    pub stages_run: usize,
    pub elapsed: Duration,
}

impl PipelineRun {
    pub fn is_complete(&self) -> bool {
        self.state == PipelineState::Complete
    }

    pub fn was_cancelled(&self) -> bool {
        matches!(
            self.state,
            PipelineState::Failed {
                reason: FailureReason::Cancelled,
                ..
            }
        )
    }

    /// The result, only if every stage succeeded
    pub fn into_result(self) -> Option<ProcessingResult> {
        (self.state == PipelineState::Complete).then_some(self.result)
    }
}

/// Runs plans through a shared process runner.
#[derive(Clone)]
pub struct Orchestrator {
    runner: Arc<dyn ProcessRunner>,
}

impl Orchestrator {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }

    pub fn runner_name(&self) -> &str {
        self.runner.name()
    }

    pub async fn run(&self, plan: &PipelinePlan, cancel: &CancellationToken) -> PipelineRun {
        let started = Instant::now();
        let mut result = ProcessingResult::new(plan.product);
        let mut state = PipelineState::Pending;
        let mut stages_run = 0;

        info!(
            scene = %plan.scene,
            platform = %plan.platform,
            stages = ?plan.stage_names(),
            "Pipeline start"
        );

        for (index, stage) in plan.stages.iter().enumerate() {
            state = PipelineState::Running { stage: index };
            debug!(scene = %plan.scene, stage = %stage.name, ?state, "Stage start");
            stages_run += 1;

            let outcome = process::supervise(
                self.runner.as_ref(),
                &stage.invocation,
                &stage.accepted,
                &stage.logs,
                cancel,
            )
            .await;

            let reason = match outcome {
                Ok(outcome) => match outcome.verdict {
                    Verdict::Success => {
                        for (role, path) in &stage.produces {
                            result.insert(*role, path);
                        }
                        continue;
                    }
                    Verdict::Failed => FailureReason::Rejected(outcome.output.termination),
                    Verdict::TimedOut => FailureReason::TimedOut,
                    Verdict::Cancelled => FailureReason::Cancelled,
                },
                Err(e) => FailureReason::Launch(e.to_string()),
            };

            state = PipelineState::Failed {
                stage: index,
                reason: reason.clone(),
            };
            if reason == FailureReason::Cancelled {
                warn!(scene = %plan.scene, stage = %stage.name, "Pipeline cancelled");
            } else {
                error!(
                    scene = %plan.scene,
                    stage = %stage.name,
                    %reason,
                    remaining = plan.stages.len() - index - 1,
                    "Pipeline failed, scene discarded"
                );
            }
            break;
        }

        if !state.is_terminal() {
            state = PipelineState::Complete;
            info!(
                scene = %plan.scene,
                outputs = result.len(),
                elapsed_s = started.elapsed().as_secs(),
                "Pipeline complete"
            );
        }

        PipelineRun {
            state,
            result,
            stages_run,
            elapsed: started.elapsed(),
        }
    }
}
