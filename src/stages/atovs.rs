//! TOVS / ATOVS calibration stages.

use super::{AcquisitionMode, ProcessConfig, Stage};
use crate::types::OutputRole;

/// MSU calibration (TOVS)
pub const MSU_BINARY: &str = "msucl";
/// AMSU-A calibration
pub const AMSUA_BINARY: &str = "amsuacl";
/// AMSU-B calibration on NOAA-17 and older
pub const AMSUB_LEGACY_BINARY: &str = "amsubcl";
/// MHS calibration, the AMSU-B successor
pub const AMSUB_BINARY: &str = "mhscl";

/// Last platform number still flying AMSU-B
const LAST_AMSUB_PLATFORM: u32 = 17;

/// Binary calibrating the AMSU-B slot for a platform.
///
/// The numeric part of the name (`noaa17` -> 17) decides; names without
/// a number there (all Metops) get the current binary.
pub fn amsub_binary(platform: &str) -> &'static str {
    match platform.get(4..6).and_then(|n| n.parse::<u32>().ok()) {
        Some(n) if n <= LAST_AMSUB_PLATFORM => AMSUB_LEGACY_BINARY,
        _ => AMSUB_BINARY,
    }
}

pub(super) fn select(config: &ProcessConfig) -> Vec<Stage> {
    let calibration = |program: &str, file: &std::path::Path, role: OutputRole| {
        let invocation = config
            .invocation(program)
            .args(config.calibration_args(&config.calibration_location, file));
        Stage::new(program, invocation).produces(role, config.data_file(file))
    };

    match config.acquisition {
        AcquisitionMode::Tovs => vec![calibration(MSU_BINARY, &config.msun_file, OutputRole::Msu)],
        AcquisitionMode::Atovs => {
            let mut stages = Vec::with_capacity(2);
            if config.process_amsua {
                stages.push(calibration(AMSUA_BINARY, &config.amsua_file, OutputRole::AmsuA));
            }
            if config.process_amsub {
                stages.push(calibration(
                    amsub_binary(&config.platform),
                    &config.amsub_file,
                    OutputRole::AmsuB,
                ));
            }
            stages
        }
    }
}
