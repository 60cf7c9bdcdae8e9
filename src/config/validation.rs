//! Config validation: unknown-key detection with Levenshtein suggestions
//! and location sanity checks.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree, compare against known field names, and emit warnings
//! with "did you mean?" suggestions. Then proceed with normal serde
//! deserialization. Warnings never break existing configs.

use std::collections::HashSet;

use super::RunnerConfig;

/// A non-fatal config warning (typo, missing directory).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, ", did you mean '{s}'?")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

const MODIS_PLATFORM_FIELDS: [&str; 10] = [
    "filetype",
    "geofile",
    "level1a",
    "level1b",
    "level1b_250m",
    "level1b_500m",
    "lut_dir",
    "reflective_lut",
    "emissive_lut",
    "qa_lut",
];

/// Returns the complete set of valid dotted key paths for RunnerConfig.
///
/// Any new field added to RunnerConfig must be added here too.
pub fn known_config_keys() -> HashSet<String> {
    let fixed: &[&str] = &[
        // [server]
        "server",
        "server.servername",
        "server.mode",
        // [publish]
        "publish",
        "publish.site",
        "publish.category",
        // [scenes]
        "scenes",
        "scenes.pending_ttl_secs",
        // [process]
        "process",
        "process.stage_timeout_secs",
        // [modis]
        "modis",
        "modis.spa_home",
        "modis.working_dir",
        "modis.level1b_home",
        "modis.attitude_home",
        "modis.ephemeris_home",
        "modis.spa_config_file",
        "modis.geocheck_threshold",
        "modis.terra",
        "modis.aqua",
        // [ancillary]
        "ancillary",
        "ancillary.enabled",
        "ancillary.url",
        "ancillary.days_between_download",
        "ancillary.days_keep_old",
        // [aapp]
        "aapp",
        "aapp.enabled",
        "aapp.working_dir",
        "aapp.acquisition",
        "aapp.process_amsua",
        "aapp.process_amsub",
        "aapp.process_hirs",
        "aapp.calibration_location",
        "aapp.hirs_file",
        "aapp.amsua_file",
        "aapp.amsub_file",
        "aapp.msun_file",
        "aapp.trigger_sensors",
        "aapp.hirs_default_version",
    ];

    let mut keys: HashSet<String> = fixed.iter().map(|k| (*k).to_string()).collect();
    for platform in ["terra", "aqua"] {
        for field in MODIS_PLATFORM_FIELDS {
            keys.insert(format!("modis.{platform}.{field}"));
        }
    }
    keys
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// For example, a table `{ a = { b = 1, c = 2 } }` yields:
/// `["a", "a.b", "a.c"]`
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

/// Edit distance between two strings, counted in chars.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
pub fn suggest_correction(unknown: &str, known: &HashSet<String>) -> Option<String> {
    known
        .iter()
        .map(|k| (k, levenshtein(unknown, k)))
        .filter(|(_, dist)| *dist <= 3)
        .min_by(|(ka, da), (kb, db)| da.cmp(db).then_with(|| ka.cmp(kb)))
        .map(|(k, _)| k.clone())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// This does NOT fail on unknown keys, it only warns.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // parse errors are handled by serde later
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Location Checks
// ============================================================================

/// Warn about configured directories that do not exist yet.
///
/// Working directories are created on demand, so only the read-side
/// locations are checked.
pub fn validate_locations(config: &RunnerConfig) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    let mut check = |field: &str, path: &std::path::Path| {
        if !path.exists() {
            warnings.push(ValidationWarning {
                field: field.to_string(),
                message: format!("{field} = {} does not exist", path.display()),
                suggestion: None,
            });
        }
    };

    check("modis.spa_home", &config.modis.spa_home);
    check("modis.level1b_home", &config.modis.level1b_home);
    if config.aapp.enabled {
        check("aapp.working_dir", &config.aapp.working_dir);
    }
    warnings
}

// ============================================================================
// Tests
// ============================================================================
