//! MODIS level-0 to level-1 stages (SPA wrappers).
//!
//! ```text
//! Terra:  l0tol1 -> l1atob
//! Aqua:   gbad   -> l0tol1 (+ attitude/ephemeris, leapsec, utcpole) -> l1atob
//! ```

use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::Stage;
use crate::config::defaults::PROCESSING_TIME_FORMAT;
use crate::config::{ModisConfig, ModisPlatformConfig};
use crate::process::Invocation;
use crate::types::OutputRole;

const L0TOL1_WRAPPER: &str = "modisl1db/wrapper/l0tol1/run";
const L1ATOB_WRAPPER: &str = "modisl1db/wrapper/l1atob/run";
const GBAD_WRAPPER: &str = "gbad/wrapper/gbad/run";

/// Observation time encoded in a PDS filename, parsed with the platform's
/// `filetype` pattern.
pub fn observation_time(pattern: &str, file_name: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(file_name, pattern).ok()
}

/// Output files of one MODIS scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModisOutputs {
    pub level1a: PathBuf,
    pub geo: PathBuf,
    pub level1b_1km: PathBuf,
    pub level1b_500m: PathBuf,
    pub level1b_250m: PathBuf,
}

impl ModisOutputs {
    /// `{level1b_home}/{obstime formatted with pattern}_{proctime}.hdf`
    pub fn new(
        level1b_home: &Path,
        names: &ModisPlatformConfig,
        obstime: NaiveDateTime,
        proctime: NaiveDateTime,
    ) -> Self {
        let suffix = proctime.format(PROCESSING_TIME_FORMAT).to_string();
        let name = |pattern: &str| {
            level1b_home.join(format!("{}_{}.hdf", obstime.format(pattern), suffix))
        };
        Self {
            level1a: name(&names.level1a),
            geo: name(&names.geofile),
            level1b_1km: name(&names.level1b),
            level1b_500m: name(&names.level1b_500m),
            level1b_250m: name(&names.level1b_250m),
        }
    }
}

/// Prefix every level-1a file of this scene starts with.
pub fn level1a_prefix(names: &ModisPlatformConfig, obstime: NaiveDateTime) -> String {
    obstime.format(&names.level1a).to_string()
}

/// An existing level-1a file for the scene, if one was produced before.
pub fn existing_level1a(level1b_home: &Path, prefix: &str) -> Option<PathBuf> {
    let entries = std::fs::read_dir(level1b_home).ok()?;
    entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .find(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(prefix) && n.ends_with("hdf"))
        })
}

/// Aqua attitude and ephemeris files produced by GBAD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GbadOutputs {
    pub attitude: PathBuf,
    pub ephemeris: PathBuf,
}

impl GbadOutputs {
    /// Named after the packet file: `P154...001.PDS` -> `P154...001.att` / `.eph`
    pub fn new(config: &ModisConfig, packet_file: &Path) -> Self {
        let stem = packet_file
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.split(".PDS").next().unwrap_or(n))
            .unwrap_or_default();
        Self {
            attitude: config.attitude_home.join(format!("{stem}.att")),
            ephemeris: config.ephemeris_home.join(format!("{stem}.eph")),
        }
    }
}

/// Everything the MODIS stage builders need for one scene.
#[derive(Debug, Clone)]
pub struct ModisJob<'a> {
    pub config: &'a ModisConfig,
    pub names: &'a ModisPlatformConfig,
    pub pds_file: &'a Path,
    pub outputs: &'a ModisOutputs,
    pub working_dir: &'a Path,
    pub timeout: Option<Duration>,
}

impl ModisJob<'_> {
    fn wrapper(&self, relative: &str) -> Invocation {
        let program = self.config.spa_home.join(relative).display().to_string();
        Invocation::new(program, self.working_dir).with_timeout(self.timeout)
    }

    fn lut(&self, file: &str) -> PathBuf {
        let dir = if self.names.lut_dir.is_absolute() {
            self.names.lut_dir.clone()
        } else {
            self.config.spa_home.join(&self.names.lut_dir)
        };
        dir.join(file)
    }

    fn l0tol1(&self, satellite: &str) -> Invocation {
        self.wrapper(L0TOL1_WRAPPER)
            .key_value("modis.pds", self.pds_file)
            .key_value("sat", satellite)
            .key_value("modis.mxd01", &self.outputs.level1a)
            .key_value("modis.mxd03", &self.outputs.geo)
    }

    fn l1atob(&self) -> Stage {
        let o = self.outputs;
        let invocation = self
            .wrapper(L1ATOB_WRAPPER)
            .key_value("modis.mxd01", &o.level1a)
            .key_value("modis.mxd03", &o.geo)
            .key_value("modis_reflective_luts", self.lut(&self.names.reflective_lut))
            .key_value("modis_emissive_luts", self.lut(&self.names.emissive_lut))
            .key_value("modis_qa_luts", self.lut(&self.names.qa_lut))
            .key_value("modis.mxd021km", &o.level1b_1km)
            .key_value("modis.mxd02hkm", &o.level1b_500m)
            .key_value("modis.mxd02qkm", &o.level1b_250m);
        Stage::new("l1atob", invocation)
            .produces(OutputRole::Level1b1km, &o.level1b_1km)
            .produces(OutputRole::Level1b500m, &o.level1b_500m)
            .produces(OutputRole::Level1b250m, &o.level1b_250m)
    }
}

/// Terra: level-0 to 1a, then 1a to 1b.
pub fn terra_stages(job: &ModisJob<'_>) -> Vec<Stage> {
    let l0tol1 = Stage::new("l0tol1", job.l0tol1("Terra"))
        .produces(OutputRole::Level1a, &job.outputs.level1a)
        .produces(OutputRole::GeoFile, &job.outputs.geo);
    vec![l0tol1, job.l1atob()]
}

/// Aqua: GBAD attitude/ephemeris from the packet file, then level-0 to 1a
/// with the GBAD products, then 1a to 1b.
pub fn aqua_stages(job: &ModisJob<'_>, packet_file: &Path) -> Vec<Stage> {
    let gbad = GbadOutputs::new(job.config, packet_file);
    let etc = job.config.etc_dir();

    let gbad_stage = Stage::new(
        "gbad",
        job.wrapper(GBAD_WRAPPER)
            .key_value("aqua.gbad.pds", packet_file)
            .key_value("aqua.gbad_att", &gbad.attitude)
            .key_value("aqua.gbad_eph", &gbad.ephemeris)
            .key_value("configurationfile", &job.config.spa_config_file),
    );

    let l0tol1 = Stage::new(
        "l0tol1",
        job.l0tol1("Aqua")
            .key_value("gbad_eph", &gbad.ephemeris)
            .key_value("gbad_att", &gbad.attitude)
            .key_value("leapsec", etc.join("leapsec.dat"))
            .key_value("utcpole", etc.join("utcpole.dat"))
            .key_value("geocheck_threshold", job.config.geocheck_threshold.to_string()),
    )
    .produces(OutputRole::Level1a, &job.outputs.level1a)
    .produces(OutputRole::GeoFile, &job.outputs.geo);

    vec![gbad_stage, l0tol1, job.l1atob()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn config() -> ModisConfig {
        ModisConfig {
            spa_home: PathBuf::from("/opt/spa"),
            working_dir: PathBuf::from("/tmp/modis"),
            level1b_home: PathBuf::from("/data/lvl1"),
            attitude_home: PathBuf::from("/data/att"),
            ephemeris_home: PathBuf::from("/data/eph"),
            spa_config_file: PathBuf::from("/opt/spa/etc/station.cfg"),
            ..ModisConfig::default()
        }
    }

    fn proctime() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2014, 8, 27)
            .unwrap()
            .and_hms_opt(8, 10, 5)
            .unwrap()
    }

    #[test]
    fn test_observation_time_from_filename() {
        let t = observation_time(
            "P0420064AAAAAAAAAAAAAA%y%j%H%M%S001.PDS",
            "P0420064AAAAAAAAAAAAAA14239075753001.PDS",
        )
        .unwrap();
        assert_eq!(t.to_string(), "2014-08-27 07:57:53");
        assert!(observation_time("P0420064AAAAAAAAAAAAAA%y%j%H%M%S001.PDS", "garbage.PDS").is_none());
    }

    #[test]
    fn test_output_names() {
        let obstime = NaiveDate::from_ymd_opt(2014, 8, 27)
            .unwrap()
            .and_hms_opt(7, 57, 53)
            .unwrap();
        let outputs = ModisOutputs::new(
            Path::new("/data/lvl1"),
            &ModisPlatformConfig::terra(),
            obstime,
            proctime(),
        );
        assert_eq!(
            outputs.level1a,
            PathBuf::from("/data/lvl1/MOD01_A14239_075753_2014239081005.hdf")
        );
        assert_eq!(
            outputs.level1b_250m,
            PathBuf::from("/data/lvl1/MOD02QKM_A14239_075753_2014239081005.hdf")
        );
    }

    #[test]
    fn test_terra_chain() {
        let cfg = config();
        let names = ModisPlatformConfig::terra();
        let outputs = ModisOutputs::new(&cfg.level1b_home, &names, proctime(), proctime());
        let pds = PathBuf::from("/pds/P0420064AAAAAAAAAAAAAA14239075753001.PDS");
        let job = ModisJob {
            config: &cfg,
            names: &names,
            pds_file: &pds,
            outputs: &outputs,
            working_dir: Path::new("/tmp/modis"),
            timeout: None,
        };

        let stages = terra_stages(&job);
        assert_eq!(stages.len(), 2);
        let l0 = &stages[0].invocation;
        assert_eq!(l0.program, "/opt/spa/modisl1db/wrapper/l0tol1/run");
        assert_eq!(&l0.args[..4], ["modis.pds", pds.to_str().unwrap(), "sat", "Terra"]);

        let l1 = stages[1].invocation.command_line();
        assert!(l1.contains(
            "modis_qa_luts /opt/spa/modisl1db/algorithm/data/modist/cal/MOD02_QA_LUTs.V6.1.6.0_OC.hdf"
        ));
        assert_eq!(stages[1].produces.len(), 3);
    }

    #[test]
    fn test_aqua_chain_uses_gbad_outputs() {
        let cfg = config();
        let names = ModisPlatformConfig::aqua();
        let outputs = ModisOutputs::new(&cfg.level1b_home, &names, proctime(), proctime());
        let pds = PathBuf::from("/pds/P1540064AAAAAAAAAAAAAA12298130323001.PDS");
        let packet = PathBuf::from("/pds/P15409571540958154095912298130323001.PDS");
        let job = ModisJob {
            config: &cfg,
            names: &names,
            pds_file: &pds,
            outputs: &outputs,
            working_dir: Path::new("/tmp/modis"),
            timeout: Some(Duration::from_secs(60)),
        };

        let stages = aqua_stages(&job, &packet);
        let names: Vec<&str> = stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["gbad", "l0tol1", "l1atob"]);

        let gbad = stages[0].invocation.command_line();
        assert!(gbad.contains("aqua.gbad_att /data/att/P15409571540958154095912298130323001.att"));
        let l0 = stages[1].invocation.command_line();
        assert!(l0.contains("gbad_eph /data/eph/P15409571540958154095912298130323001.eph"));
        assert!(l0.contains("leapsec /opt/spa/etc/leapsec.dat"));
        assert!(l0.ends_with("geocheck_threshold 50"));
        assert!(stages.iter().all(|s| s.invocation.timeout == Some(Duration::from_secs(60))));
    }

    #[test]
    fn test_existing_level1a_detection() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(existing_level1a(tmp.path(), "MYD01_A12298_130323").is_none());
        std::fs::write(tmp.path().join("MYD01_A12298_130323_2012298140000.hdf"), "").unwrap();
        assert!(existing_level1a(tmp.path(), "MYD01_A12298_130323").is_some());
    }
}
