//! Turns a complete scene into an executable pipeline plan.
//!
//! Planning resolves everything a scene needs before the first process
//! starts: the working directory, output names, and the stage list. A scene
//! that cannot be planned is rejected without running anything.

use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::assembly::{FileRole, Scene, SceneKey};
use crate::config::{AappEnvironment, ModisPlatformConfig, RunnerConfig};
use crate::stages::modis::{self, ModisJob, ModisOutputs};
use crate::stages::{select_stages, ProcessConfig, RuntimeLookup, SelectionError, Stage};
use crate::types::{Platform, ProductFamily};

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("scene {scene} has no {role} file")]
    MissingFile { scene: SceneKey, role: FileRole },

    #[error("cannot determine the observation time of {}", file.display())]
    ObservationTime { file: PathBuf },

    #[error("AAPP scene {scene} has no {field}")]
    MissingMetadata { scene: SceneKey, field: &'static str },

    #[error(transparent)]
    Selection(#[from] SelectionError),
}

/// Everything needed to run one scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelinePlan {
    pub scene: SceneKey,
    pub platform: Platform,
    pub product: ProductFamily,
    pub working_dir: PathBuf,
    pub stages: Vec<Stage>,
    /// The MODIS geolocation needs fresh leapsec/utcpole files
    pub needs_navigation_files: bool,
}

impl PipelinePlan {
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }
}

// ============================================================================
// Working Directory
// ============================================================================

/// Create the working directory if needed; fall back to the system temp
/// directory when it cannot be created.
pub fn prepare_working_dir(dir: &Path) -> PathBuf {
    if dir.is_dir() {
        return dir.to_path_buf();
    }
    match std::fs::create_dir_all(dir) {
        Ok(()) => {
            info!(dir = %dir.display(), "Created working directory");
            dir.to_path_buf()
        }
        Err(e) => {
            let fallback = std::env::temp_dir();
            error!(
                dir = %dir.display(),
                error = %e,
                "Failed creating working directory, will use {}",
                fallback.display()
            );
            fallback
        }
    }
}

// ============================================================================
// MODIS
// ============================================================================

/// Plan the level-0 to level-1 chain of a Terra or Aqua scene.
pub fn plan_modis(scene: &Scene, config: &RunnerConfig, proctime: NaiveDateTime) -> Result<PipelinePlan, PlanError> {
    let modis_config = &config.modis;
    let names: &ModisPlatformConfig = match scene.platform {
        Platform::Aqua => &modis_config.aqua,
        _ => &modis_config.terra,
    };

    let pds_file = require(scene, FileRole::Primary)?;
    let file_name = pds_file.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    let obstime = modis::observation_time(&names.filetype, file_name)
        .or_else(|| {
            warn!(file = file_name, pattern = %names.filetype, "File name does not match filetype, using message start time");
            scene.event.start_time
        })
        .ok_or_else(|| PlanError::ObservationTime {
            file: pds_file.to_path_buf(),
        })?;

    let prefix = modis::level1a_prefix(names, obstime);
    if let Some(existing) = modis::existing_level1a(&modis_config.level1b_home, &prefix) {
        warn!(file = %existing.display(), "Level 1 file for this scene already exists");
    }

    let outputs = ModisOutputs::new(&modis_config.level1b_home, names, obstime, proctime);
    info!(scene = %scene.key, level1a = %outputs.level1a.display(), "Level-1 filename");

    let working_dir = prepare_working_dir(&modis_config.working_dir);
    let job = ModisJob {
        config: modis_config,
        names,
        pds_file,
        outputs: &outputs,
        working_dir: &working_dir,
        timeout: config.process.stage_timeout(),
    };

    let stages = match scene.platform {
        Platform::Aqua => modis::aqua_stages(&job, require(scene, FileRole::Packet)?),
        _ => modis::terra_stages(&job),
    };

    Ok(PipelinePlan {
        scene: scene.key.clone(),
        platform: scene.platform.clone(),
        product: ProductFamily::Modis,
        working_dir,
        stages,
        needs_navigation_files: config.ancillary.enabled,
    })
}

// ============================================================================
// AAPP
// ============================================================================

/// Per-scene AAPP process configuration from `[aapp]` and the message.
pub fn aapp_process_config(scene: &Scene, config: &RunnerConfig, working_dir: PathBuf) -> Result<ProcessConfig, PlanError> {
    let aapp = &config.aapp;
    let missing = |field| PlanError::MissingMetadata {
        scene: scene.key.clone(),
        field,
    };

    Ok(ProcessConfig {
        platform: scene.platform.to_string(),
        acquisition: aapp.acquisition,
        process_amsua: aapp.process_amsua,
        process_amsub: aapp.process_amsub,
        process_hirs: aapp.process_hirs,
        calibration_location: aapp.calibration_location.clone(),
        orbit_number: scene.event.orbit_number.ok_or_else(|| missing("orbit_number"))?,
        start_time: scene.event.start_time.ok_or_else(|| missing("start_time"))?,
        working_dir,
        msun_file: aapp.msun_file.clone(),
        amsua_file: aapp.amsua_file.clone(),
        amsub_file: aapp.amsub_file.clone(),
        hirs_file: aapp.hirs_file.clone(),
        stage_timeout: config.process.stage_timeout(),
    })
}

/// Plan the TOVS/ATOVS + HIRS calibration chain of a NOAA/Metop scene.
pub fn plan_aapp(scene: &Scene, config: &RunnerConfig, environment: &AappEnvironment) -> Result<PipelinePlan, PlanError> {
    let working_dir = prepare_working_dir(&config.aapp.working_dir);
    let process_config = aapp_process_config(scene, config, working_dir.clone())?;
    let lookup = RuntimeLookup::resolve(
        environment,
        config.aapp.hirs_default_version,
        &process_config.platform,
    );
    let stages = select_stages(&process_config, &lookup)?;

    Ok(PipelinePlan {
        scene: scene.key.clone(),
        platform: scene.platform.clone(),
        product: ProductFamily::Aapp,
        working_dir,
        stages,
        needs_navigation_files: false,
    })
}

fn require(scene: &Scene, role: FileRole) -> Result<&Path, PlanError> {
    scene.file(role).ok_or_else(|| PlanError::MissingFile {
        scene: scene.key.clone(),
        role,
    })
}
