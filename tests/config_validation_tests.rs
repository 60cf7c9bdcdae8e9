//! Config Validation Tests
//!
//! Typo detection on raw TOML, consistency rules of the loaded config, and
//! the AAPP environment snapshot.

use std::collections::HashMap;
use std::io::Write;

use polar_l1_runner::config::validation::{
    known_config_keys, suggest_correction, validate_locations, validate_unknown_keys,
};
use polar_l1_runner::config::{AappEnvironment, ConfigError, EnvironmentError, RunnerConfig};
use polar_l1_runner::stages::AcquisitionMode;

// ============================================================================
// Typo Detection
// ============================================================================

#[test]
fn typo_in_server_section_warns_with_suggestion() {
    let warnings = validate_unknown_keys(
        r#"
[server]
servrname = "safe"
"#,
    );
    assert_eq!(warnings.len(), 1, "Expected exactly 1 warning");
    assert_eq!(warnings[0].field, "server.servrname");
    assert_eq!(warnings[0].suggestion.as_deref(), Some("server.servername"));
    assert!(warnings[0].to_string().contains("did you mean"));
}

#[test]
fn typo_in_modis_platform_table_warns() {
    let warnings = validate_unknown_keys(
        r#"
[modis.aqua]
qa_lutt = "MYD02_QA_LUTs.hdf"
"#,
    );
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].suggestion.as_deref(), Some("modis.aqua.qa_lut"));
}

#[test]
fn unknown_section_has_no_close_match() {
    let warnings = validate_unknown_keys(
        r#"
[viirs]
enabled = true
"#,
    );
    // Both the section and its key are reported
    assert_eq!(warnings.len(), 2);
    assert!(warnings.iter().any(|w| w.field == "viirs" && w.suggestion.is_none()));
}

#[test]
fn valid_config_produces_zero_warnings() {
    let warnings = validate_unknown_keys(
        r#"
[server]
servername = "safe"
mode = "offline"

[publish]
site = "norrköping"
category = "polar/direct_readout"

[scenes]
pending_ttl_secs = 1800

[modis]
spa_home = "/opt/spa"
geocheck_threshold = 50

[modis.terra]
filetype = "P0420064AAAAAAAAAAAAAA%y%j%H%M%S001.PDS"

[aapp]
acquisition = "TOVS"
trigger_sensors = ["hirs/2"]
hirs_default_version = 0
"#,
    );
    assert!(warnings.is_empty(), "{warnings:?}");
}

#[test]
fn every_serialized_key_is_known() {
    let toml = RunnerConfig::default().to_toml().unwrap();
    assert!(validate_unknown_keys(&toml).is_empty());
}

#[test]
fn suggestion_only_within_edit_distance() {
    let known = known_config_keys();
    assert_eq!(
        suggest_correction("aapp.proces_hirs", &known).as_deref(),
        Some("aapp.process_hirs")
    );
    assert_eq!(suggest_correction("completely.unrelated", &known), None);
}

// ============================================================================
// Loading And Consistency
// ============================================================================

#[test]
fn defaults_are_valid() {
    assert!(RunnerConfig::default().validate().is_ok());
}

#[test]
fn partial_file_keeps_defaults_for_the_rest() {
    let config = RunnerConfig::from_toml_str(
        r#"
[server]
servername = "safe"

[aapp]
acquisition = "TOVS"
"#,
    )
    .unwrap();

    assert_eq!(config.server.servername, "safe");
    assert_eq!(config.aapp.acquisition, AcquisitionMode::Tovs);
    assert_eq!(config.scenes.pending_ttl_secs, RunnerConfig::default().scenes.pending_ttl_secs);
    assert_eq!(config.modis.terra.level1a, "MOD01_A%y%j_%H%M%S");
}

#[test]
fn toml_roundtrip_preserves_settings() {
    let mut config = RunnerConfig::default();
    config.server.servername = "safe".to_string();
    config.aapp.hirs_default_version = Some(2);
    config.process.stage_timeout_secs = 900;

    let parsed = RunnerConfig::from_toml_str(&config.to_toml().unwrap()).unwrap();
    assert_eq!(parsed.server.servername, "safe");
    assert_eq!(parsed.aapp.hirs_default_version, Some(2));
    assert_eq!(parsed.process.stage_timeout_secs, 900);
}

#[test]
fn inconsistent_values_collect_every_error() {
    let result = RunnerConfig::from_toml_str(
        r#"
[publish]
site = ""

[scenes]
pending_ttl_secs = 0

[ancillary]
days_between_download = 30
days_keep_old = 7
"#,
    );

    match result {
        Err(ConfigError::Validation(errors)) => {
            assert_eq!(errors.len(), 3, "{errors:?}");
            assert!(errors.iter().any(|e| e.contains("publish.site")));
            assert!(errors.iter().any(|e| e.contains("pending_ttl_secs")));
            assert!(errors.iter().any(|e| e.contains("days_keep_old")));
        }
        other => panic!("expected validation errors, got {other:?}"),
    }
}

#[test]
fn malformed_toml_is_a_parse_error() {
    assert!(matches!(
        RunnerConfig::from_toml_str("[server\nmode = 1"),
        Err(ConfigError::Parse(..))
    ));
}

#[test]
fn load_from_file_reports_the_path() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[server]\nmode = \"test\"").unwrap();
    assert_eq!(RunnerConfig::load_from_file(file.path()).unwrap().server.mode, "test");

    let missing = file.path().with_extension("absent");
    match RunnerConfig::load_from_file(&missing) {
        Err(ConfigError::Io(path, _)) => assert_eq!(path, missing),
        other => panic!("expected an I/O error, got {other:?}"),
    }
}

#[test]
fn missing_read_locations_are_warnings() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = RunnerConfig::default();
    config.modis.spa_home = tmp.path().to_path_buf();
    config.modis.level1b_home = tmp.path().join("not-there");
    config.aapp.enabled = false;

    let warnings = validate_locations(&config);
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].field, "modis.level1b_home");
}

// ============================================================================
// AAPP Environment
// ============================================================================

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |name| map.get(name).cloned()
}

#[test]
fn hirs_lists_of_different_length_are_rejected() {
    let result = AappEnvironment::from_lookup(lookup(&[
        ("HIRSCL_VERSION", "0 1 2"),
        ("HIRSCL_SAT", "noaa15 noaa19"),
    ]));
    assert_eq!(
        result,
        Err(EnvironmentError::LengthMismatch {
            versions: 3,
            satellites: 2
        })
    );
}

#[test]
fn environment_snapshot_reads_versions_and_bounds() {
    let env = AappEnvironment::from_lookup(lookup(&[
        ("HIRSCL_VERSION", "0 1"),
        ("HIRSCL_SAT", "noaa15 default"),
        ("HIST_SIZE_HIGH", "2000"),
        ("HIST_SIZE_LOW", "1000"),
        ("HIST_NMAX", "30"),
        ("PAR_NAVIGATION_DEFAULT_LISTESAT", "noaa15 M02"),
    ]))
    .unwrap();

    assert_eq!(env.hirs_versions.resolve("noaa15", None), Some(0));
    assert_eq!(env.hirs_versions.resolve("noaa19", None), Some(1));
    assert_eq!(env.history_bounds.map(|b| b.nmax), Some(30));
    assert_eq!(env.navigation_satellites, ["noaa15", "M02"]);
}

#[test]
fn partial_history_bounds_are_ignored() {
    let env = AappEnvironment::from_lookup(lookup(&[("HIST_SIZE_HIGH", "2000")])).unwrap();
    assert!(env.history_bounds.is_none());
}
