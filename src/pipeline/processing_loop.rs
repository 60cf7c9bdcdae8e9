//! Single-consumer event loop shared by every input mode.
//!
//! One message is taken through origin filtering, scene assembly, the
//! pipeline and publishing before the next one is read.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::processor::{SceneOutcome, SceneProcessor};
use super::publisher::MessagePublisher;
use super::source::{MessageEvent, MessageSource};
use crate::assembly::{Observation, SceneAssembler};
use crate::config::defaults::PROGRESS_LOG_INTERVAL;
use crate::config::RunnerConfig;
use crate::types::{FileEvent, InboundMessage, Platform};

// ============================================================================
// Message Acceptance
// ============================================================================

/// Why a well-formed message is not for this runner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Dispatched from another server
    Origin(String),
    UnknownPlatform(String),
    /// Known platform, but none of the sensors it is processed for
    Sensor(Platform),
}

/// Platform of an event this runner should handle.
pub fn accept(config: &RunnerConfig, event: &FileEvent) -> Result<Platform, IgnoreReason> {
    let servername = config.server.servername.trim();
    if !servername.is_empty() && event.host != servername {
        return Err(IgnoreReason::Origin(event.host.clone()));
    }

    let platform = Platform::from_name(&event.platform_name)
        .ok_or_else(|| IgnoreReason::UnknownPlatform(event.platform_name.clone()))?;

    let wanted = match &platform {
        Platform::Terra => event.has_sensor("modis"),
        Platform::Aqua => event.has_sensor("modis") || event.has_sensor("gbad"),
        Platform::Aapp(_) => {
            config.aapp.enabled && config.aapp.trigger_sensors.iter().any(|s| event.has_sensor(s))
        }
    };

    if wanted {
        Ok(platform)
    } else {
        Err(IgnoreReason::Sensor(platform))
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Counters kept by the loop and logged at shutdown
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub messages_received: u64,
    pub messages_ignored: u64,
    pub messages_dropped: u64,
    pub scenes_completed: u64,
    pub scenes_rejected: u64,
    pub scenes_expired: u64,
    pub pipelines_succeeded: u64,
    pub pipelines_failed: u64,
    pub messages_published: u64,
}

// ============================================================================
// Processing Loop
// ============================================================================

/// Owns all state needed for the event loop.
///
/// Built with [`new()`](ProcessingLoop::new), then consumed by
/// [`run()`](ProcessingLoop::run).
pub struct ProcessingLoop<P: MessagePublisher> {
    config: Arc<RunnerConfig>,
    assembler: SceneAssembler,
    processor: SceneProcessor,
    publisher: P,
    cancel_token: CancellationToken,
    stats: LoopStats,
}

impl<P: MessagePublisher> ProcessingLoop<P> {
    pub fn new(
        config: Arc<RunnerConfig>,
        processor: SceneProcessor,
        publisher: P,
        cancel_token: CancellationToken,
    ) -> Self {
        let ttl = Duration::from_secs(config.scenes.pending_ttl_secs);
        Self {
            assembler: SceneAssembler::new(ttl),
            config,
            processor,
            publisher,
            cancel_token,
            stats: LoopStats::default(),
        }
    }

    /// Run until the source is exhausted or shutdown is requested.
    ///
    /// Returns the final statistics.
    pub async fn run<S: MessageSource>(mut self, source: &mut S) -> LoopStats {
        info!(
            source = source.source_name(),
            publisher = self.publisher.publisher_name(),
            runner = self.processor.runner_name(),
            "Listening for dispatch messages"
        );

        loop {
            let event = tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Shutdown signal received");
                    break;
                }
                result = source.next_message() => {
                    match result {
                        Ok(ev) => ev,
                        Err(e) => {
                            warn!(error = %e, "Source error");
                            break;
                        }
                    }
                }
            };

            let message = match event {
                MessageEvent::Message(m) => m,
                MessageEvent::Eof => {
                    info!(received = self.stats.messages_received, "Source reached end");
                    break;
                }
            };

            self.stats.messages_received += 1;
            if !self.handle(message).await {
                break;
            }

            if self.stats.messages_received % PROGRESS_LOG_INTERVAL == 0 {
                info!(
                    received = self.stats.messages_received,
                    scenes = self.stats.scenes_completed,
                    pending = self.assembler.pending_count(),
                    "Progress"
                );
            }
        }

        self.log_summary();
        self.stats
    }

    /// Handle one message. Returns false once shutdown interrupted a pipeline.
    async fn handle(&mut self, message: InboundMessage) -> bool {
        // The only sweep; observe_at never evicts, so every expiry is counted here
        let now = Instant::now();
        let expired = self.assembler.evict_expired(now);
        self.stats.scenes_expired += expired.len() as u64;

        let event = match FileEvent::from_message(&message) {
            Ok(event) => event,
            Err(e) => {
                warn!(subject = %message.subject, error = %e, "Malformed dispatch message, dropped");
                self.stats.messages_dropped += 1;
                return true;
            }
        };

        let platform = match accept(&self.config, &event) {
            Ok(platform) => platform,
            Err(reason) => {
                debug!(uri = %event.uri, ?reason, "Message not for this runner");
                self.stats.messages_ignored += 1;
                return true;
            }
        };

        let scene = match self.assembler.observe_at(&platform, event, now) {
            Observation::Complete(scene) => scene,
            Observation::Pending(key) => {
                debug!(scene = %key, "Waiting for the partner file");
                return true;
            }
            Observation::Duplicate(key) => {
                debug!(scene = %key, "File already part of the scene, ignored");
                return true;
            }
            Observation::Dropped(reason) => {
                warn!(%reason, "Dispatch event dropped");
                self.stats.messages_dropped += 1;
                return true;
            }
        };

        self.stats.scenes_completed += 1;
        let outcome = self
            .processor
            .process(&scene, &message.data, &mut self.publisher, &self.cancel_token)
            .await;

        match outcome {
            SceneOutcome::Published(n) => {
                self.stats.pipelines_succeeded += 1;
                self.stats.messages_published += n as u64;
            }
            SceneOutcome::Failed => self.stats.pipelines_failed += 1,
            SceneOutcome::Rejected => self.stats.scenes_rejected += 1,
            SceneOutcome::Cancelled => {
                self.stats.pipelines_failed += 1;
                return false;
            }
        }
        true
    }

    fn log_summary(&self) {
        let s = &self.stats;
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        info!("FINAL STATISTICS");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        info!("   Messages Received:    {}", s.messages_received);
        info!("   Messages Ignored:     {}", s.messages_ignored);
        info!("   Messages Dropped:     {}", s.messages_dropped);
        info!("   Scenes Completed:     {}", s.scenes_completed);
        info!("   Scenes Rejected:      {}", s.scenes_rejected);
        info!("   Scenes Expired:       {}", s.scenes_expired);
        info!("   Pipelines Succeeded:  {}", s.pipelines_succeeded);
        info!("   Pipelines Failed:     {}", s.pipelines_failed);
        info!("   Messages Published:   {}", s.messages_published);
        info!("   Scenes Still Pending: {}", self.assembler.pending_count());
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }
}
