//! polar-l1-runner - level-1 processing controller
//!
//! Reads file-dispatch messages (JSON, one per line), runs the MODIS or AAPP
//! level-1 chain for every complete scene and writes the result messages.
//!
//! # Usage
//!
//! ```bash
//! # Messages from a relay on stdin, results on stdout
//! message-relay | polar-l1-runner
//!
//! # Replay a recorded day, only log the commands
//! polar-l1-runner --replay dispatch.jsonl --dry-run --publish-file out.jsonl
//! ```
//!
//! # Environment Variables
//!
//! - `POLAR_L1_RUNNER_CONFIG`: path to the TOML config (see `config` module)
//! - `SMHI_MODE`: run mode, part of the outbound topic
//! - `HIRSCL_VERSION` / `HIRSCL_SAT` and the other AAPP variables
//! - `RUST_LOG`: logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use polar_l1_runner::ancillary::NavigationFiles;
use polar_l1_runner::config::RunnerConfig;
use polar_l1_runner::pipeline::{
    JsonLinesPublisher, LinesSource, MessagePublisher, MessageSource, ProcessingLoop, SceneProcessor,
};
use polar_l1_runner::process::{DryRunRunner, ProcessRunner, SystemRunner};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "polar-l1-runner")]
#[command(about = "Scene assembly and level-1 processing for polar direct readout")]
#[command(version)]
struct CliArgs {
    /// Config file; skips the POLAR_L1_RUNNER_CONFIG / ./l1_runner.toml search
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Read dispatch messages from this JSON-lines file instead of stdin
    #[arg(long, value_name = "FILE")]
    replay: Option<PathBuf>,

    /// Append result messages to this file instead of stdout
    #[arg(long, value_name = "FILE")]
    publish_file: Option<PathBuf>,

    /// Override the run mode (server.mode)
    #[arg(long)]
    mode: Option<String>,

    /// Log every command instead of running it
    #[arg(long)]
    dry_run: bool,

    /// Log as JSON lines
    #[arg(long)]
    log_json: bool,
}

// ============================================================================
// Setup
// ============================================================================

/// Logs go to stderr; stdout carries the result messages.
fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn load_config(args: &CliArgs) -> Result<RunnerConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let mut config = RunnerConfig::load_from_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?;
            config.apply_env_overrides();
            config
        }
        None => RunnerConfig::load(),
    };

    if let Some(mode) = &args.mode {
        config.server.mode = mode.clone();
    }
    config.validate().context("Invalid runner configuration")?;
    Ok(config)
}

fn build_processor(config: &Arc<RunnerConfig>, dry_run: bool) -> SceneProcessor {
    let runner: Arc<dyn ProcessRunner> = if dry_run {
        Arc::new(DryRunRunner)
    } else {
        Arc::new(SystemRunner::new())
    };
    let processor = SceneProcessor::new(Arc::clone(config), runner);

    if !config.ancillary.enabled || dry_run {
        return processor;
    }
    match NavigationFiles::new(config.modis.etc_dir(), &config.ancillary) {
        Ok(navigation) => processor.with_navigation(navigation),
        Err(e) => {
            warn!(error = %e, "Navigation helper files will not be refreshed");
            processor
        }
    }
}

async fn run_loop<P: MessagePublisher>(
    args: &CliArgs,
    config: Arc<RunnerConfig>,
    processor: SceneProcessor,
    publisher: P,
    cancel_token: CancellationToken,
) -> Result<()> {
    let processing = ProcessingLoop::new(config, processor, publisher, cancel_token);
    match &args.replay {
        Some(path) => {
            let mut source = LinesSource::open(path)
                .await
                .with_context(|| format!("Failed to open replay file {}", path.display()))?;
            drive(processing, &mut source).await;
        }
        None => drive(processing, &mut LinesSource::stdin()).await,
    }
    Ok(())
}

async fn drive<P: MessagePublisher, S: MessageSource>(processing: ProcessingLoop<P>, source: &mut S) {
    let stats = processing.run(source).await;
    if stats.pipelines_failed > 0 {
        warn!(failed = stats.pipelines_failed, "Some scenes failed processing");
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_json);

    let config = Arc::new(load_config(&args)?);

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  polar-l1-runner");
    info!(
        "  mode: {} | site: {} | server: {}",
        config.server.mode,
        config.publish.site,
        if config.server.servername.is_empty() {
            "any"
        } else {
            &config.server.servername
        }
    );
    if args.dry_run {
        info!("  dry run: commands are logged, not executed");
    }
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    let processor = build_processor(&config, args.dry_run);

    match &args.publish_file {
        Some(path) => {
            let publisher = JsonLinesPublisher::append(path)
                .await
                .with_context(|| format!("Failed to open publish file {}", path.display()))?;
            run_loop(&args, config, processor, publisher, cancel_token).await?;
        }
        None => {
            run_loop(&args, config, processor, JsonLinesPublisher::stdout(), cancel_token).await?;
        }
    }

    info!("polar-l1-runner shutdown complete");
    Ok(())
}
