//! Scene Processor
//!
//! Takes one complete scene from planning to published messages:
//!
//! ```text
//! Scene -> plan (MODIS | AAPP) -> navigation files (MODIS) -> orchestrator -> publisher
//! ```
//!
//! Every failure is logged where it is detected and ends with the scene
//! discarded; nothing propagates to the event loop.

use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::orchestrator::Orchestrator;
use super::planner::{self, PipelinePlan};
use super::publisher::{build_messages, MessagePublisher, TopicLayout};
use crate::ancillary::NavigationFiles;
use crate::assembly::Scene;
use crate::config::{AappEnvironment, EnvironmentError, RunnerConfig};
use crate::process::ProcessRunner;
use crate::types::Platform;

/// Where the AAPP environment snapshot comes from
#[derive(Debug, Clone)]
pub enum EnvironmentSource {
    /// Re-read the process environment for every scene
    Process,
    /// A fixed snapshot
    Fixed(AappEnvironment),
}

impl EnvironmentSource {
    pub fn snapshot(&self) -> Result<AappEnvironment, EnvironmentError> {
        match self {
            EnvironmentSource::Process => AappEnvironment::from_env(),
            EnvironmentSource::Fixed(env) => Ok(env.clone()),
        }
    }
}

/// What happened to one scene
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneOutcome {
    /// Every stage succeeded; this many messages were published
    Published(usize),
    /// A stage failed, timed out or could not be launched
    Failed,
    /// The scene could not be planned (configuration or metadata error)
    Rejected,
    /// Shutdown interrupted the pipeline
    Cancelled,
}

pub struct SceneProcessor {
    config: Arc<RunnerConfig>,
    orchestrator: Orchestrator,
    layout: TopicLayout,
    navigation: Option<NavigationFiles>,
    environment: EnvironmentSource,
}

impl SceneProcessor {
    pub fn new(config: Arc<RunnerConfig>, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            layout: TopicLayout::from_config(&config),
            config,
            orchestrator: Orchestrator::new(runner),
            navigation: None,
            environment: EnvironmentSource::Process,
        }
    }

    /// Keep the MODIS navigation helper files fresh before each MODIS pipeline.
    pub fn with_navigation(mut self, navigation: NavigationFiles) -> Self {
        self.navigation = Some(navigation);
        self
    }

    pub fn with_environment(mut self, environment: EnvironmentSource) -> Self {
        self.environment = environment;
        self
    }

    pub fn runner_name(&self) -> &str {
        self.orchestrator.runner_name()
    }

    /// Plan, run and publish one scene.
    ///
    /// `metadata` is the data of the message that completed the scene; the
    /// outbound messages mirror it.
    pub async fn process(
        &self,
        scene: &Scene,
        metadata: &Map<String, Value>,
        publisher: &mut dyn MessagePublisher,
        cancel: &CancellationToken,
    ) -> SceneOutcome {
        let Some(plan) = self.plan(scene) else {
            return SceneOutcome::Rejected;
        };

        if plan.needs_navigation_files {
            if let Some(navigation) = &self.navigation {
                let downloaded = navigation.ensure_fresh(Utc::now().naive_utc()).await;
                if downloaded > 0 {
                    info!(files = downloaded, etc = %navigation.etc_dir().display(), "Navigation helper files refreshed");
                }
            }
        }

        let run = self.orchestrator.run(&plan, cancel).await;
        if run.was_cancelled() {
            return SceneOutcome::Cancelled;
        }
        let Some(result) = run.into_result() else {
            return SceneOutcome::Failed;
        };

        let mut published = 0;
        for message in build_messages(metadata, &result, &self.layout) {
            match publisher.publish(&message).await {
                Ok(()) => {
                    info!(subject = %message.subject, kind = ?message.kind, "Published");
                    published += 1;
                }
                Err(e) => warn!(
                    subject = %message.subject,
                    publisher = publisher.publisher_name(),
                    error = %e,
                    "Failed to publish message"
                ),
            }
        }
        SceneOutcome::Published(published)
    }

    fn plan(&self, scene: &Scene) -> Option<PipelinePlan> {
        let planned = match scene.platform {
            Platform::Terra | Platform::Aqua => {
                planner::plan_modis(scene, &self.config, Utc::now().naive_utc())
            }
            Platform::Aapp(_) => {
                let environment = match self.environment.snapshot() {
                    Ok(env) => env,
                    Err(e) => {
                        error!(scene = %scene.key, error = %e, "Invalid AAPP environment, scene discarded");
                        return None;
                    }
                };
                planner::plan_aapp(scene, &self.config, &environment)
            }
        };

        match planned {
            Ok(plan) => Some(plan),
            Err(e) => {
                error!(scene = %scene.key, platform = %scene.platform, error = %e, "Cannot plan scene, discarded");
                None
            }
        }
    }
}
