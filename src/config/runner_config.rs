//! Runner Configuration - operator-tunable settings loaded from TOML
//!
//! Every section implements `Default` with values that match a standard
//! direct readout station layout, so the runner starts with no config file
//! present.

use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use super::defaults;
use crate::stages::AcquisitionMode;

/// Environment variable naming the config file to load
pub const CONFIG_ENV_VAR: &str = "POLAR_L1_RUNNER_CONFIG";

/// Config file looked up in the current working directory
pub const LOCAL_CONFIG_FILE: &str = "l1_runner.toml";

/// Environment variable overriding `server.mode`
pub const MODE_ENV_VAR: &str = "SMHI_MODE";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for a runner deployment.
///
/// Load with `RunnerConfig::load()` which searches:
/// 1. `$POLAR_L1_RUNNER_CONFIG` env var
/// 2. `./l1_runner.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Origin filter and run mode
    #[serde(default)]
    pub server: ServerConfig,

    /// Outbound topic layout
    #[serde(default)]
    pub publish: PublishConfig,

    /// Pending-scene cache
    #[serde(default)]
    pub scenes: SceneConfig,

    /// External process supervision
    #[serde(default)]
    pub process: ProcessSettings,

    /// MODIS level-0 to level-1 processing (SPA)
    #[serde(default)]
    pub modis: ModisConfig,

    /// MODIS navigation helper files
    #[serde(default)]
    pub ancillary: AncillaryConfig,

    /// AAPP TOVS/ATOVS/HIRS calibration
    #[serde(default)]
    pub aapp: AappConfig,
}

impl RunnerConfig {
    /// Load configuration using the standard search order:
    /// 1. `$POLAR_L1_RUNNER_CONFIG` environment variable
    /// 2. `./l1_runner.toml` in the current working directory
    /// 3. Built-in defaults
    ///
    /// `$SMHI_MODE` overrides `server.mode` in all three cases.
    pub fn load() -> Self {
        let mut config = Self::search();
        config.apply_env_overrides();
        config
    }

    fn search() -> Self {
        // 1. Check env var
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded runner config from {}", CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        // 2. Check ./l1_runner.toml
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded runner config from ./{}", LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        // 3. Defaults
        info!("No {} found, using built-in defaults", LOCAL_CONFIG_FILE);
        Self::default()
    }

    /// Load from a specific TOML file path.
    ///
    /// Unknown keys are reported as warnings, then the file is deserialized
    /// and validated.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, err) => ConfigError::Parse(path.to_path_buf(), err),
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        // Two-pass: check for unknown keys first (warnings only)
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `$SMHI_MODE` on top of the loaded values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(mode) = std::env::var(MODE_ENV_VAR) {
            if !mode.trim().is_empty() {
                self.server.mode = mode.trim().to_string();
            }
        }
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate the settings for internal consistency.
    ///
    /// Rules:
    /// - Run mode, publish site and category must be non-empty
    /// - Scene TTL must be > 0
    /// - MODIS filename patterns must be non-empty
    /// - Ancillary keep window must cover the download interval
    /// - AAPP instrument file names must be non-empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if self.server.mode.trim().is_empty() {
            errors.push("server.mode must not be empty".to_string());
        }
        if self.server.servername.trim().is_empty() {
            warn!("server.servername is empty, the origin filter is disabled");
        }
        if self.publish.site.trim().is_empty() {
            errors.push("publish.site must not be empty".to_string());
        }
        if self.publish.category.trim().is_empty() {
            errors.push("publish.category must not be empty".to_string());
        }

        if self.scenes.pending_ttl_secs == 0 {
            errors.push("scenes.pending_ttl_secs must be > 0".to_string());
        }

        let m = &self.modis;
        if m.geocheck_threshold == 0 {
            errors.push("modis.geocheck_threshold must be > 0".to_string());
        }
        for (name, platform) in [("terra", &m.terra), ("aqua", &m.aqua)] {
            for (field, value) in platform.patterns() {
                if value.trim().is_empty() {
                    errors.push(format!("modis.{name}.{field} must not be empty"));
                }
            }
        }

        let a = &self.ancillary;
        if a.days_between_download == 0 {
            errors.push("ancillary.days_between_download must be > 0".to_string());
        }
        if a.days_keep_old < a.days_between_download {
            errors.push(format!(
                "ancillary.days_keep_old ({}) must be >= days_between_download ({})",
                a.days_keep_old, a.days_between_download
            ));
        }

        let aapp = &self.aapp;
        if aapp.calibration_location.trim().is_empty() {
            errors.push("aapp.calibration_location must not be empty".to_string());
        }
        for (field, value) in [
            ("hirs_file", &aapp.hirs_file),
            ("amsua_file", &aapp.amsua_file),
            ("amsub_file", &aapp.amsub_file),
            ("msun_file", &aapp.msun_file),
        ] {
            if value.as_os_str().is_empty() {
                errors.push(format!("aapp.{field} must not be empty"));
            }
        }
        if aapp.enabled && aapp.trigger_sensors.is_empty() {
            errors.push("aapp.trigger_sensors must list at least one sensor when aapp is enabled".to_string());
        }

        for w in super::validation::validate_locations(self) {
            warn!("{}", w);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Config parse error ({}): {}", .0.display(), .1)]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("Config serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config validation failed:\n{}", format_errors(.0))]
    Validation(Vec<String>),
}

fn format_errors(errors: &[String]) -> String {
    errors.iter().map(|e| format!("  - {e}\n")).collect()
}

// ============================================================================
// Server / Publish / Scenes / Process
// ============================================================================

/// Origin filter and run mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host the dispatch messages must originate from (URI authority).
    /// Empty disables the filter.
    #[serde(default)]
    pub servername: String,

    /// Run mode, part of the outbound topic (`offline`, `dev`, `oper`, ...)
    #[serde(default = "default_mode")]
    pub mode: String,
}

fn default_mode() -> String {
    "offline".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            servername: String::new(),
            mode: default_mode(),
        }
    }
}

/// Outbound topic layout: `/{format}/{level}/{site}/{mode}/{category}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    #[serde(default = "default_site")]
    pub site: String,

    #[serde(default = "default_category")]
    pub category: String,
}

fn default_site() -> String {
    "norrköping".to_string()
}
fn default_category() -> String {
    "polar/direct_readout".to_string()
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            site: default_site(),
            category: default_category(),
        }
    }
}

/// Pending-scene cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneConfig {
    /// Seconds an incomplete paired scene is kept before eviction
    #[serde(default = "default_pending_ttl")]
    pub pending_ttl_secs: u64,
}

fn default_pending_ttl() -> u64 {
    defaults::PENDING_SCENE_TTL_SECS
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            pending_ttl_secs: default_pending_ttl(),
        }
    }
}

/// External process supervision settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSettings {
    /// Per-stage timeout in seconds. 0 disables the timeout.
    #[serde(default = "default_stage_timeout")]
    pub stage_timeout_secs: u64,
}

fn default_stage_timeout() -> u64 {
    defaults::STAGE_TIMEOUT_SECS
}

impl Default for ProcessSettings {
    fn default() -> Self {
        Self {
            stage_timeout_secs: default_stage_timeout(),
        }
    }
}

impl ProcessSettings {
    pub fn stage_timeout(&self) -> Option<std::time::Duration> {
        (self.stage_timeout_secs > 0).then(|| std::time::Duration::from_secs(self.stage_timeout_secs))
    }
}

// ============================================================================
// MODIS
// ============================================================================

/// SPA (Science Processing Algorithm) locations and products.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModisConfig {
    /// Root of the SPA installation (`$SPA_HOME`)
    #[serde(default = "default_spa_home")]
    pub spa_home: PathBuf,

    /// Directory the SPA wrappers run in
    #[serde(default = "default_modis_working_dir")]
    pub working_dir: PathBuf,

    /// Where level-1a/1b and geolocation files are written
    #[serde(default = "default_level1b_home")]
    pub level1b_home: PathBuf,

    /// Where GBAD writes Aqua attitude files
    #[serde(default = "default_attitude_home")]
    pub attitude_home: PathBuf,

    /// Where GBAD writes Aqua ephemeris files
    #[serde(default = "default_ephemeris_home")]
    pub ephemeris_home: PathBuf,

    /// SPA station configuration file passed to GBAD
    #[serde(default = "default_spa_config_file")]
    pub spa_config_file: PathBuf,

    /// Geolocation check threshold passed to the Aqua level-0 to 1a wrapper
    #[serde(default = "default_geocheck_threshold")]
    pub geocheck_threshold: u32,

    /// Keys left out of `[modis.terra]` keep the Terra defaults
    #[serde(default = "ModisPlatformConfig::terra", deserialize_with = "terra_overrides")]
    pub terra: ModisPlatformConfig,

    /// Keys left out of `[modis.aqua]` keep the Aqua defaults
    #[serde(default = "ModisPlatformConfig::aqua", deserialize_with = "aqua_overrides")]
    pub aqua: ModisPlatformConfig,
}

fn default_spa_home() -> PathBuf {
    std::env::var("SPA_HOME").map_or_else(|_| PathBuf::from("/opt/spa"), PathBuf::from)
}
fn default_modis_working_dir() -> PathBuf {
    PathBuf::from("/tmp/modis_lvl1proc")
}
fn default_level1b_home() -> PathBuf {
    PathBuf::from("/data/polar/modis/lvl1")
}
fn default_attitude_home() -> PathBuf {
    PathBuf::from("/data/polar/modis/attitude")
}
fn default_ephemeris_home() -> PathBuf {
    PathBuf::from("/data/polar/modis/ephemeris")
}
fn default_spa_config_file() -> PathBuf {
    default_spa_home().join("etc/spa_station.cfg")
}
fn default_geocheck_threshold() -> u32 {
    defaults::GEOCHECK_THRESHOLD
}

impl Default for ModisConfig {
    fn default() -> Self {
        Self {
            spa_home: default_spa_home(),
            working_dir: default_modis_working_dir(),
            level1b_home: default_level1b_home(),
            attitude_home: default_attitude_home(),
            ephemeris_home: default_ephemeris_home(),
            spa_config_file: default_spa_config_file(),
            geocheck_threshold: default_geocheck_threshold(),
            terra: ModisPlatformConfig::terra(),
            aqua: ModisPlatformConfig::aqua(),
        }
    }
}

impl ModisConfig {
    /// Directory holding `leapsec.dat` and `utcpole.dat`
    pub fn etc_dir(&self) -> PathBuf {
        self.spa_home.join("etc")
    }
}

/// Per-platform filename patterns (`strftime` style) and calibration LUTs.
#[derive(Debug, Clone, Serialize)]
pub struct ModisPlatformConfig {
    /// Pattern the level-0 PDS filename is parsed with to get the observation time
    pub filetype: String,
    pub geofile: String,
    pub level1a: String,
    pub level1b: String,
    pub level1b_250m: String,
    pub level1b_500m: String,
    /// LUT directory, relative to `spa_home` unless absolute
    pub lut_dir: PathBuf,
    pub reflective_lut: String,
    pub emissive_lut: String,
    pub qa_lut: String,
}

/// A `[modis.terra]` / `[modis.aqua]` table as written: every key optional.
///
/// Terra and Aqua have different defaults, so missing keys are filled from
/// the platform's own preset rather than a shared `Default`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PlatformOverrides {
    filetype: Option<String>,
    geofile: Option<String>,
    level1a: Option<String>,
    level1b: Option<String>,
    level1b_250m: Option<String>,
    level1b_500m: Option<String>,
    lut_dir: Option<PathBuf>,
    reflective_lut: Option<String>,
    emissive_lut: Option<String>,
    qa_lut: Option<String>,
}

impl PlatformOverrides {
    fn apply(self, base: ModisPlatformConfig) -> ModisPlatformConfig {
        ModisPlatformConfig {
            filetype: self.filetype.unwrap_or(base.filetype),
            geofile: self.geofile.unwrap_or(base.geofile),
            level1a: self.level1a.unwrap_or(base.level1a),
            level1b: self.level1b.unwrap_or(base.level1b),
            level1b_250m: self.level1b_250m.unwrap_or(base.level1b_250m),
            level1b_500m: self.level1b_500m.unwrap_or(base.level1b_500m),
            lut_dir: self.lut_dir.unwrap_or(base.lut_dir),
            reflective_lut: self.reflective_lut.unwrap_or(base.reflective_lut),
            emissive_lut: self.emissive_lut.unwrap_or(base.emissive_lut),
            qa_lut: self.qa_lut.unwrap_or(base.qa_lut),
        }
    }
}

fn terra_overrides<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ModisPlatformConfig, D::Error> {
    PlatformOverrides::deserialize(deserializer).map(|o| o.apply(ModisPlatformConfig::terra()))
}

fn aqua_overrides<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ModisPlatformConfig, D::Error> {
    PlatformOverrides::deserialize(deserializer).map(|o| o.apply(ModisPlatformConfig::aqua()))
}

impl ModisPlatformConfig {
    pub fn terra() -> Self {
        Self {
            filetype: "P0420064AAAAAAAAAAAAAA%y%j%H%M%S001.PDS".to_string(),
            geofile: "MOD03_A%y%j_%H%M%S".to_string(),
            level1a: "MOD01_A%y%j_%H%M%S".to_string(),
            level1b: "MOD021KM_A%y%j_%H%M%S".to_string(),
            level1b_250m: "MOD02QKM_A%y%j_%H%M%S".to_string(),
            level1b_500m: "MOD02HKM_A%y%j_%H%M%S".to_string(),
            lut_dir: PathBuf::from("modisl1db/algorithm/data/modist/cal"),
            reflective_lut: "MOD02_Reflective_LUTs.V6.1.6.0_OC.hdf".to_string(),
            emissive_lut: "MOD02_Emissive_LUTs.V6.1.6.0_OC.hdf".to_string(),
            qa_lut: "MOD02_QA_LUTs.V6.1.6.0_OC.hdf".to_string(),
        }
    }

    pub fn aqua() -> Self {
        Self {
            filetype: "P1540064AAAAAAAAAAAAAA%y%j%H%M%S001.PDS".to_string(),
            geofile: "MYD03_A%y%j_%H%M%S".to_string(),
            level1a: "MYD01_A%y%j_%H%M%S".to_string(),
            level1b: "MYD021KM_A%y%j_%H%M%S".to_string(),
            level1b_250m: "MYD02QKM_A%y%j_%H%M%S".to_string(),
            level1b_500m: "MYD02HKM_A%y%j_%H%M%S".to_string(),
            lut_dir: PathBuf::from("modisl1db/algorithm/data/modisa/cal"),
            reflective_lut: "MYD02_Reflective_LUTs.V6.1.7.1_OCb.hdf".to_string(),
            emissive_lut: "MYD02_Emissive_LUTs.V6.1.7.1_OCb.hdf".to_string(),
            qa_lut: "MYD02_QA_LUTs.V6.1.7.1_OCb.hdf".to_string(),
        }
    }

    fn patterns(&self) -> [(&'static str, &String); 6] {
        [
            ("filetype", &self.filetype),
            ("geofile", &self.geofile),
            ("level1a", &self.level1a),
            ("level1b", &self.level1b),
            ("level1b_250m", &self.level1b_250m),
            ("level1b_500m", &self.level1b_500m),
        ]
    }
}

// ============================================================================
// Ancillary (navigation helper files)
// ============================================================================

/// `leapsec.dat` / `utcpole.dat` freshness and download settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AncillaryConfig {
    /// Check (and refresh) the files before every MODIS pipeline
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Base URL the files are fetched from. Empty disables downloading.
    #[serde(default)]
    pub url: String,

    /// Files older than this are re-downloaded
    #[serde(default = "default_days_between_download")]
    pub days_between_download: u32,

    /// Timestamped backups older than this are deleted
    #[serde(default = "default_days_keep_old")]
    pub days_keep_old: u32,
}

fn default_true() -> bool {
    true
}
fn default_days_between_download() -> u32 {
    defaults::DAYS_BETWEEN_URL_DOWNLOAD
}
fn default_days_keep_old() -> u32 {
    defaults::DAYS_KEEP_OLD_ETC_FILES
}

impl Default for AncillaryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: String::new(),
            days_between_download: default_days_between_download(),
            days_keep_old: default_days_keep_old(),
        }
    }
}

// ============================================================================
// AAPP
// ============================================================================

/// AAPP calibration settings for NOAA / Metop passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AappConfig {
    /// Handle NOAA / Metop dispatch messages
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Directory holding the decommutated level-1b files; the calibration
    /// binaries run here
    #[serde(default = "default_aapp_working_dir")]
    pub working_dir: PathBuf,

    /// TOVS or ATOVS
    #[serde(default)]
    pub acquisition: AcquisitionMode,

    #[serde(default = "default_true")]
    pub process_amsua: bool,

    #[serde(default = "default_true")]
    pub process_amsub: bool,

    #[serde(default = "default_true")]
    pub process_hirs: bool,

    /// Calibration/location flags passed to the calibration binaries
    #[serde(default = "default_calibration_location")]
    pub calibration_location: String,

    #[serde(default = "default_hirs_file")]
    pub hirs_file: PathBuf,

    #[serde(default = "default_amsua_file")]
    pub amsua_file: PathBuf,

    #[serde(default = "default_amsub_file")]
    pub amsub_file: PathBuf,

    #[serde(default = "default_msun_file")]
    pub msun_file: PathBuf,

    /// A dispatch message triggers the chain if it carries one of these sensors
    #[serde(default = "default_trigger_sensors")]
    pub trigger_sensors: Vec<String>,

    /// HIRS calibration version used when `$HIRSCL_SAT` has no match
    #[serde(default)]
    pub hirs_default_version: Option<u32>,
}

fn default_aapp_working_dir() -> PathBuf {
    PathBuf::from("/tmp/aapp_work")
}
fn default_calibration_location() -> String {
    "-c -l".to_string()
}
fn default_hirs_file() -> PathBuf {
    PathBuf::from("hrsn.l1b")
}
fn default_amsua_file() -> PathBuf {
    PathBuf::from("aman.l1b")
}
fn default_amsub_file() -> PathBuf {
    PathBuf::from("ambn.l1b")
}
fn default_msun_file() -> PathBuf {
    PathBuf::from("msun.l1b")
}
fn default_trigger_sensors() -> Vec<String> {
    vec!["avhrr/3".to_string(), "avhrr/2".to_string()]
}

impl Default for AappConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            working_dir: default_aapp_working_dir(),
            acquisition: AcquisitionMode::default(),
            process_amsua: true,
            process_amsub: true,
            process_hirs: true,
            calibration_location: default_calibration_location(),
            hirs_file: default_hirs_file(),
            amsua_file: default_amsua_file(),
            amsub_file: default_amsub_file(),
            msun_file: default_msun_file(),
            trigger_sensors: default_trigger_sensors(),
            hirs_default_version: None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = RunnerConfig::default();
        assert!(config.validate().is_ok(), "Default config must always validate");
    }

    #[test]
    fn test_empty_toml_produces_defaults() {
        let config = RunnerConfig::from_toml_str("").expect("empty TOML should parse");
        assert_eq!(config.server.mode, "offline");
        assert_eq!(config.publish.category, "polar/direct_readout");
        assert_eq!(config.modis.geocheck_threshold, 50);
        assert_eq!(config.aapp.acquisition, AcquisitionMode::Atovs);
        assert_eq!(config.aapp.calibration_location, "-c -l");
    }

    #[test]
    fn test_partial_toml_override() {
        let toml_str = r#"
[server]
servername = "safe.smhi.se"

[aapp]
acquisition = "TOVS"
process_amsub = false

[modis.terra]
filetype = "P0420064AAAAAAAAAAAAAA%y%j%H%M%S001.PDS"
geofile = "t1.%y%j.%H%M.geo"
level1a = "t1.%y%j.%H%M.mod01"
level1b = "t1.%y%j.%H%M.1000m"
level1b_250m = "t1.%y%j.%H%M.250m"
level1b_500m = "t1.%y%j.%H%M.500m"
lut_dir = "/opt/luts"
reflective_lut = "r.hdf"
emissive_lut = "e.hdf"
qa_lut = "q.hdf"
"#;
        let config = RunnerConfig::from_toml_str(toml_str).expect("partial TOML should parse");
        assert_eq!(config.server.servername, "safe.smhi.se");
        assert_eq!(config.aapp.acquisition, AcquisitionMode::Tovs);
        assert!(!config.aapp.process_amsub);
        assert!(config.aapp.process_amsua);
        assert_eq!(config.modis.terra.geofile, "t1.%y%j.%H%M.geo");
        // Aqua untouched
        assert_eq!(config.modis.aqua.level1a, "MYD01_A%y%j_%H%M%S");
    }

    #[test]
    fn test_single_modis_platform_key_keeps_platform_defaults() {
        let config = RunnerConfig::from_toml_str(
            "[modis.aqua]\nqa_lut = \"MYD02_QA_LUTs.local.hdf\"\n\n[modis.terra]\nlut_dir = \"/opt/luts\"\n",
        )
        .expect("a partial platform table should parse");
        assert_eq!(config.modis.aqua.qa_lut, "MYD02_QA_LUTs.local.hdf");
        assert_eq!(config.modis.aqua.level1a, "MYD01_A%y%j_%H%M%S");
        assert_eq!(config.modis.aqua.filetype, ModisPlatformConfig::aqua().filetype);
        assert_eq!(config.modis.terra.lut_dir, PathBuf::from("/opt/luts"));
        assert_eq!(config.modis.terra.geofile, "MOD03_A%y%j_%H%M%S");
    }

    #[test]
    fn test_config_error_messages() {
        let err = ConfigError::Validation(vec!["a must be > 0".to_string(), "b must not be empty".to_string()]);
        assert_eq!(
            err.to_string(),
            "Config validation failed:\n  - a must be > 0\n  - b must not be empty\n"
        );

        let io = ConfigError::Io(
            PathBuf::from("/etc/l1_runner.toml"),
            std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        assert!(io.to_string().starts_with("Config I/O error (/etc/l1_runner.toml): "));
        assert!(std::error::Error::source(&io).is_some());
    }

    #[test]
    fn test_unknown_acquisition_key_is_rejected() {
        let result = RunnerConfig::from_toml_str("[aapp]\nacquisition = \"HIRS-ONLY\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(..))));
    }

    #[test]
    fn test_validation_catches_bad_windows() {
        let mut config = RunnerConfig::default();
        config.ancillary.days_between_download = 30;
        config.ancillary.days_keep_old = 10;
        config.scenes.pending_ttl_secs = 0;
        match config.validate() {
            Err(ConfigError::Validation(errors)) => {
                assert!(errors.iter().any(|e| e.contains("days_keep_old")));
                assert!(errors.iter().any(|e| e.contains("pending_ttl_secs")));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_stage_timeout_zero_disables() {
        let mut settings = ProcessSettings::default();
        assert!(settings.stage_timeout().is_some());
        settings.stage_timeout_secs = 0;
        assert!(settings.stage_timeout().is_none());
    }

    #[test]
    fn test_roundtrip_toml() {
        let original = RunnerConfig::default();
        let toml_str = original.to_toml().expect("serialization should work");
        let roundtripped: RunnerConfig = toml::from_str(&toml_str).expect("deserialization should work");
        assert_eq!(original.modis.aqua.filetype, roundtripped.modis.aqua.filetype);
        assert_eq!(original.aapp.trigger_sensors, roundtripped.aapp.trigger_sensors);
    }
}
