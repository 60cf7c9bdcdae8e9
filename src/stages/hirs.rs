//! HIRS calibration stages.
//!
//! | Version | Pre-stages                               | Final stage                     |
//! |---------|------------------------------------------|---------------------------------|
//! | 0       | none                                     | `hirscl -c -l`                  |
//! | 1       | historic trim (if file exists), hcalcb1  | `hirscl_algoV4 -c -l`           |
//! | > 1     | none                                     | `hirscl -l` (navigation only)   |
//!
//! A TOVS pass always calibrates and navigates, whatever the version says,
//! unless the version asks for navigation only.

use tracing::{info, warn};

use super::{AcquisitionMode, ProcessConfig, RuntimeLookup, SelectionError, Stage};
use crate::config::defaults::METOP_SHORT_CODES;
use crate::process::{AcceptedCodes, StageLogs};
use crate::types::OutputRole;

pub const HIRS_BINARY: &str = "hirscl";
pub const HIRS_ALGO_V4_BINARY: &str = "hirscl_algoV4";
pub const HIRS_PER_SCAN_BINARY: &str = "hcalcb1_algoV4";
pub const HIRS_HISTORIC_BINARY: &str = "hirs_historic_file_manage";

const HIRS_ERROR_LOG: &str = "hirscl.err";
const HIRS_ALGO_V4_ERROR_LOG: &str = "hirscl_algoV4.err";

const CALIBRATE_AND_NAVIGATE: &str = "-c -l";
const NAVIGATE_ONLY: &str = "-l";

/// Environment variable holding the navigation satellite list
pub const SATELLITE_LIST_VAR: &str = "PAR_NAVIGATION_DEFAULT_LISTESAT";

/// HIRS calibration algorithm version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HirsVersion {
    /// 0: classic calibration and navigation
    Classic,
    /// 1: algorithm V4 with per-scan calibration
    AlgoV4,
    /// > 1: navigation only
    NavigationOnly(u32),
}

impl From<u32> for HirsVersion {
    fn from(version: u32) -> Self {
        match version {
            0 => Self::Classic,
            1 => Self::AlgoV4,
            n => Self::NavigationOnly(n),
        }
    }
}

/// Resolve the HIRS version for the configured platform.
pub fn resolve_version(config: &ProcessConfig, lookup: &RuntimeLookup) -> Result<HirsVersion, SelectionError> {
    lookup
        .hirs_versions
        .resolve(&config.platform, lookup.default_hirs_version)
        .map(HirsVersion::from)
        .ok_or_else(|| SelectionError::UnresolvableHirsVersion {
            platform: config.platform.clone(),
        })
}

pub(super) fn select(config: &ProcessConfig, lookup: &RuntimeLookup) -> Result<Vec<Stage>, SelectionError> {
    let version = resolve_version(config, lookup)?;
    info!(platform = %config.platform, ?version, "HIRS calibration version");

    let mut stages = Vec::new();
    let (binary, error_log, flags) = match (version, config.acquisition) {
        (HirsVersion::NavigationOnly(_), _) => (HIRS_BINARY, HIRS_ERROR_LOG, NAVIGATE_ONLY),
        (HirsVersion::Classic, _) | (HirsVersion::AlgoV4, AcquisitionMode::Tovs) => {
            (HIRS_BINARY, HIRS_ERROR_LOG, CALIBRATE_AND_NAVIGATE)
        }
        (HirsVersion::AlgoV4, AcquisitionMode::Atovs) => {
            if let Some(path) = &lookup.historic_file {
                let bounds = lookup
                    .history_bounds
                    .ok_or_else(|| SelectionError::MissingHistoryBounds { path: path.clone() })?;
                let invocation = config.invocation(HIRS_HISTORIC_BINARY).args([
                    "-m".to_string(),
                    bounds.size_high.to_string(),
                    "-r".to_string(),
                    bounds.size_low.to_string(),
                    "-n".to_string(),
                    bounds.nmax.to_string(),
                    path.display().to_string(),
                ]);
                stages.push(
                    Stage::new(HIRS_HISTORIC_BINARY, invocation).with_accepted(AcceptedCodes::new([0])),
                );
            }

            let t = config.start_time;
            let invocation = config.invocation(HIRS_PER_SCAN_BINARY).args([
                "-s".to_string(),
                config.platform.clone(),
                "-y".to_string(),
                t.format("%Y").to_string(),
                "-m".to_string(),
                t.format("%m").to_string(),
                "-d".to_string(),
                t.format("%d").to_string(),
                "-h".to_string(),
                t.format("%H").to_string(),
                "-n".to_string(),
                t.format("%M").to_string(),
            ]);
            stages.push(Stage::new(HIRS_PER_SCAN_BINARY, invocation).with_logs(StageLogs {
                error: Some(HIRS_ERROR_LOG.into()),
                ..StageLogs::default()
            }));

            (HIRS_ALGO_V4_BINARY, HIRS_ALGO_V4_ERROR_LOG, CALIBRATE_AND_NAVIGATE)
        }
    };

    let mut invocation = config
        .invocation(binary)
        .args(config.calibration_args(flags, &config.hirs_file));
    if let Some(list) = translate_satellite_list(&config.platform, &lookup.navigation_satellites) {
        invocation = invocation.env(SATELLITE_LIST_VAR, list.join(" "));
    }

    stages.push(
        Stage::new(binary, invocation)
            .with_logs(StageLogs {
                stdout: Some(format!("{binary}.log").into()),
                stderr: Some(error_log.into()),
                error: Some(error_log.into()),
            })
            .produces(OutputRole::Hirs, config.data_file(&config.hirs_file)),
    );
    Ok(stages)
}

/// Satellite list with AAPP short Metop codes (`M01`) spelled the way the
/// binaries expect (`metop01`).
///
/// Returns `None` when no translation is needed: the platform is already
/// listed, is not a Metop, or the list carries no short codes. The result is
/// passed to the final HIRS stage only and never written back.
pub fn translate_satellite_list(platform: &str, satellites: &[String]) -> Option<Vec<String>> {
    if satellites.is_empty() || satellites.iter().any(|s| s == platform) {
        return None;
    }
    warn!(
        platform,
        list = ?satellites,
        "Platform not in {}, consider updating the AAPP environment", SATELLITE_LIST_VAR
    );

    let is_short = |s: &String| METOP_SHORT_CODES.iter().any(|(code, _)| s == code);
    if !platform.contains("metop") || !satellites.iter().any(is_short) {
        return None;
    }

    info!("Translating Metop short codes for this run");
    Some(
        satellites
            .iter()
            .map(|s| {
                METOP_SHORT_CODES
                    .iter()
                    .find(|(code, _)| s == code)
                    .map_or_else(|| s.clone(), |(_, name)| (*name).to_string())
            })
            .collect(),
    )
}
