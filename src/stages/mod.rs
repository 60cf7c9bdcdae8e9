//! Pipeline Stage Selector
//!
//! Pure decision logic mapping a processing configuration and the runtime
//! version lookup to an ordered list of [`Stage`]s. Nothing here touches the
//! filesystem or the process environment; everything the decision depends on
//! is captured up front in [`ProcessConfig`] and [`RuntimeLookup`].
//!
//! ```text
//! AAPP chain:  [msucl]                          (TOVS)
//!              [amsuacl] [amsubcl | mhscl]      (ATOVS, per instrument flag)
//!              [historic trim] [hcalcb1] hirscl (HIRS, per version)
//! MODIS chain: see `modis`
//! ```

pub mod atovs;
pub mod hirs;
pub mod modis;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::config::defaults::HIRS_HISTORIC_FILE;
use crate::config::{AappEnvironment, HirsVersionTable, HistoryBounds};
use crate::process::{AcceptedCodes, Invocation, StageLogs};
use crate::types::OutputRole;

pub use hirs::{translate_satellite_list, HirsVersion};

// ============================================================================
// Errors
// ============================================================================

/// Configuration errors of stage selection; fatal to the scene.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("unknown acquisition key '{0}' (expected TOVS or ATOVS)")]
    UnknownAcquisition(String),

    #[error("no HIRS calibration version resolvable for platform {platform}")]
    UnresolvableHirsVersion { platform: String },

    #[error("historic file {} exists but HIST_SIZE_HIGH/HIST_SIZE_LOW/HIST_NMAX are not all set", path.display())]
    MissingHistoryBounds { path: PathBuf },
}

// ============================================================================
// Acquisition Mode
// ============================================================================

/// Instrument-calibration family of an AAPP pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AcquisitionMode {
    /// NOAA KLM predecessors: MSU sounding unit
    #[serde(rename = "TOVS")]
    Tovs,
    /// AMSU-A / AMSU-B / MHS
    #[default]
    #[serde(rename = "ATOVS")]
    Atovs,
}

impl std::str::FromStr for AcquisitionMode {
    type Err = SelectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "TOVS" => Ok(Self::Tovs),
            "ATOVS" => Ok(Self::Atovs),
            other => Err(SelectionError::UnknownAcquisition(other.to_string())),
        }
    }
}

impl std::fmt::Display for AcquisitionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AcquisitionMode::Tovs => write!(f, "TOVS"),
            AcquisitionMode::Atovs => write!(f, "ATOVS"),
        }
    }
}

// ============================================================================
// Stage
// ============================================================================

/// One external-binary invocation with its own success criteria.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    /// Short name for logs (`amsuacl`, `l0tol1`, ...)
    pub name: String,
    pub invocation: Invocation,
    pub accepted: AcceptedCodes,
    pub logs: StageLogs,
    /// Output files this stage produces, recorded once it succeeds
    pub produces: Vec<(OutputRole, PathBuf)>,
}

impl Stage {
    pub fn new(name: impl Into<String>, invocation: Invocation) -> Self {
        Self {
            name: name.into(),
            invocation,
            accepted: AcceptedCodes::default(),
            logs: StageLogs::default(),
            produces: Vec::new(),
        }
    }

    pub fn with_logs(mut self, logs: StageLogs) -> Self {
        self.logs = logs;
        self
    }

    pub fn with_accepted(mut self, accepted: AcceptedCodes) -> Self {
        self.accepted = accepted;
        self
    }

    pub fn produces(mut self, role: OutputRole, path: impl Into<PathBuf>) -> Self {
        self.produces.push((role, path.into()));
        self
    }

    pub fn program(&self) -> &str {
        &self.invocation.program
    }
}

// ============================================================================
// AAPP Process Configuration
// ============================================================================

/// Immutable per-scene configuration of an AAPP calibration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessConfig {
    /// Platform name as AAPP expects it (`noaa19`, `metop02`)
    pub platform: String,
    pub acquisition: AcquisitionMode,
    pub process_amsua: bool,
    pub process_amsub: bool,
    pub process_hirs: bool,
    /// Calibration/location flags (`-c -l`)
    pub calibration_location: String,
    pub orbit_number: u32,
    /// Observation start
    pub start_time: NaiveDateTime,
    pub working_dir: PathBuf,
    pub msun_file: PathBuf,
    pub amsua_file: PathBuf,
    pub amsub_file: PathBuf,
    pub hirs_file: PathBuf,
    pub stage_timeout: Option<Duration>,
}

impl ProcessConfig {
    /// Invocation of `program` in the scene's working directory
    pub(crate) fn invocation(&self, program: &str) -> Invocation {
        Invocation::new(program, &self.working_dir).with_timeout(self.stage_timeout)
    }

    /// Standard AAPP calibration arguments:
    /// `{flags} -s {platform} -d {YYYYMMDD} -h {HHMM} -n {orbit:05} {file}`
    pub(crate) fn calibration_args(&self, flags: &str, file: &Path) -> Vec<String> {
        let mut args: Vec<String> = flags.split_whitespace().map(str::to_string).collect();
        args.extend([
            "-s".to_string(),
            self.platform.clone(),
            "-d".to_string(),
            self.start_time.format("%Y%m%d").to_string(),
            "-h".to_string(),
            self.start_time.format("%H%M").to_string(),
            "-n".to_string(),
            format!("{:05}", self.orbit_number),
            file.display().to_string(),
        ]);
        args
    }

    /// Instrument file resolved against the working directory
    pub(crate) fn data_file(&self, file: &Path) -> PathBuf {
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.working_dir.join(file)
        }
    }
}

// ============================================================================
// Runtime Lookup
// ============================================================================

/// Runtime state stage selection depends on, resolved for one platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeLookup {
    pub hirs_versions: HirsVersionTable,
    /// Used when no `HIRSCL_SAT` entry applies
    pub default_hirs_version: Option<u32>,
    pub history_bounds: Option<HistoryBounds>,
    /// Per-platform historic-tracking file, present only if it exists on disk
    pub historic_file: Option<PathBuf>,
    /// `PAR_NAVIGATION_DEFAULT_LISTESAT`
    pub navigation_satellites: Vec<String>,
}

impl RuntimeLookup {
    /// Capture the environment snapshot and probe the historic file for `platform`.
    pub fn resolve(environment: &AappEnvironment, default_hirs_version: Option<u32>, platform: &str) -> Self {
        let historic_file = environment
            .calibration_monitor
            .as_ref()
            .map(|root| root.join(platform).join(HIRS_HISTORIC_FILE))
            .filter(|path| path.exists());

        Self {
            hirs_versions: environment.hirs_versions.clone(),
            default_hirs_version,
            history_bounds: environment.history_bounds,
            historic_file,
            navigation_satellites: environment.navigation_satellites.clone(),
        }
    }
}

// ============================================================================
// Selection
// ============================================================================

/// Ordered AAPP calibration stages for one scene.
///
/// The TOVS/ATOVS stages come first, then the HIRS stages when HIRS
/// processing is enabled. Identical inputs always give an identical list.
pub fn select_stages(config: &ProcessConfig, lookup: &RuntimeLookup) -> Result<Vec<Stage>, SelectionError> {
    let mut stages = atovs::select(config);
    if config.process_hirs {
        stages.extend(hirs::select(config, lookup)?);
    }
    Ok(stages)
}
