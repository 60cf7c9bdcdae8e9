//! AAPP environment settings
//!
//! The AAPP installation exports its own configuration through environment
//! variables (normally sourced from `ATOVS_ENV7`). They are read once per
//! scene into [`AappEnvironment`] so stage selection never touches the
//! process environment directly.
//!
//! | Variable                          | Meaning                                   |
//! |-----------------------------------|-------------------------------------------|
//! | `HIRSCL_VERSION`                  | HIRS calibration versions, space separated |
//! | `HIRSCL_SAT`                      | satellites the versions apply to           |
//! | `PAR_CALIBRATION_MONITOR`         | root of the per-platform historic files    |
//! | `HIST_SIZE_HIGH` / `HIST_SIZE_LOW`| historic file trim bounds                  |
//! | `HIST_NMAX`                       | historic file maximum entries              |
//! | `PAR_NAVIGATION_DEFAULT_LISTESAT` | satellites known to the navigation         |

use std::path::PathBuf;
use thiserror::Error;

/// Satellite entry that applies when no other entry matches
pub const DEFAULT_SATELLITE_ENTRY: &str = "default";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvironmentError {
    #[error("HIRSCL_VERSION has {versions} entries but HIRSCL_SAT has {satellites}")]
    LengthMismatch { versions: usize, satellites: usize },

    #[error("HIRSCL_VERSION entry '{0}' is not a non-negative integer")]
    InvalidVersion(String),

    #[error("{name} = '{value}' is not a non-negative integer")]
    InvalidNumber { name: &'static str, value: String },
}

// ============================================================================
// HIRS Version Table
// ============================================================================

/// Ordered (satellite substring, calibration version) pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HirsVersionTable {
    entries: Vec<(String, u32)>,
}

impl Default for HirsVersionTable {
    /// What AAPP assumes when neither variable is set: version 0 for everyone.
    fn default() -> Self {
        Self {
            entries: vec![(DEFAULT_SATELLITE_ENTRY.to_string(), 0)],
        }
    }
}

impl HirsVersionTable {
    /// Pair the two whitespace-separated lists positionally.
    ///
    /// Lists of different length are rejected rather than silently truncated.
    pub fn parse(versions: &str, satellites: &str) -> Result<Self, EnvironmentError> {
        let versions: Vec<&str> = versions.split_whitespace().collect();
        let satellites: Vec<&str> = satellites.split_whitespace().collect();
        if versions.len() != satellites.len() {
            return Err(EnvironmentError::LengthMismatch {
                versions: versions.len(),
                satellites: satellites.len(),
            });
        }

        let entries = satellites
            .into_iter()
            .zip(versions)
            .map(|(sat, version)| {
                version
                    .parse::<u32>()
                    .map(|v| (sat.to_string(), v))
                    .map_err(|_| EnvironmentError::InvalidVersion(version.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { entries })
    }

    pub fn from_entries<S: Into<String>>(entries: impl IntoIterator<Item = (S, u32)>) -> Self {
        Self {
            entries: entries.into_iter().map(|(s, v)| (s.into(), v)).collect(),
        }
    }

    /// Version for a platform: the first entry whose satellite is a substring
    /// of the platform name wins, then the `default` entry, then `fallback`.
    pub fn resolve(&self, platform: &str, fallback: Option<u32>) -> Option<u32> {
        self.entries
            .iter()
            .filter(|(sat, _)| sat != DEFAULT_SATELLITE_ENTRY)
            .find(|(sat, _)| platform.contains(sat.as_str()))
            .or_else(|| {
                self.entries
                    .iter()
                    .find(|(sat, _)| sat == DEFAULT_SATELLITE_ENTRY)
            })
            .map(|(_, version)| *version)
            .or(fallback)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Environment Snapshot
// ============================================================================

/// Trim bounds passed to `hirs_historic_file_manage`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryBounds {
    pub size_high: u64,
    pub size_low: u64,
    pub nmax: u64,
}

/// Snapshot of the AAPP environment variables the stage selector consumes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AappEnvironment {
    pub hirs_versions: HirsVersionTable,
    pub calibration_monitor: Option<PathBuf>,
    pub history_bounds: Option<HistoryBounds>,
    /// `PAR_NAVIGATION_DEFAULT_LISTESAT`, split on whitespace
    pub navigation_satellites: Vec<String>,
}

impl AappEnvironment {
    /// Read the snapshot from the process environment.
    pub fn from_env() -> Result<Self, EnvironmentError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the snapshot from any variable lookup (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, EnvironmentError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let hirs_versions = match (lookup("HIRSCL_VERSION"), lookup("HIRSCL_SAT")) {
            (None, None) => HirsVersionTable::default(),
            (versions, satellites) => HirsVersionTable::parse(
                versions.as_deref().unwrap_or("0"),
                satellites.as_deref().unwrap_or(DEFAULT_SATELLITE_ENTRY),
            )?,
        };

        let number = |name: &'static str| -> Result<Option<u64>, EnvironmentError> {
            lookup(name)
                .map(|value| {
                    value
                        .trim()
                        .parse::<u64>()
                        .map_err(|_| EnvironmentError::InvalidNumber { name, value })
                })
                .transpose()
        };

        let history_bounds = match (
            number("HIST_SIZE_HIGH")?,
            number("HIST_SIZE_LOW")?,
            number("HIST_NMAX")?,
        ) {
            (Some(size_high), Some(size_low), Some(nmax)) => Some(HistoryBounds {
                size_high,
                size_low,
                nmax,
            }),
            _ => None,
        };

        Ok(Self {
            hirs_versions,
            calibration_monitor: lookup("PAR_CALIBRATION_MONITOR")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            history_bounds,
            navigation_satellites: lookup("PAR_NAVIGATION_DEFAULT_LISTESAT")
                .map(|s| s.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_first_substring_match_wins() {
        let table = HirsVersionTable::parse("2 1 0", "noaa19 noaa default").unwrap();
        assert_eq!(table.resolve("noaa19", None), Some(2));
        assert_eq!(table.resolve("noaa18", None), Some(1));
        assert_eq!(table.resolve("metop01", None), Some(0));
    }

    #[test]
    fn test_fallback_when_nothing_matches() {
        let table = HirsVersionTable::parse("1", "noaa19").unwrap();
        assert_eq!(table.resolve("metop02", Some(3)), Some(3));
        assert_eq!(table.resolve("metop02", None), None);
    }

    #[test]
    fn test_length_mismatch_is_rejected() {
        assert_eq!(
            HirsVersionTable::parse("0 1", "noaa19"),
            Err(EnvironmentError::LengthMismatch {
                versions: 2,
                satellites: 1
            })
        );
    }

    #[test]
    fn test_non_numeric_version_is_rejected() {
        assert_eq!(
            HirsVersionTable::parse("v4", "noaa19"),
            Err(EnvironmentError::InvalidVersion("v4".to_string()))
        );
    }

    #[test]
    fn test_snapshot_from_lookup() {
        let snapshot = AappEnvironment::from_lookup(env(&[
            ("HIRSCL_VERSION", "1 0"),
            ("HIRSCL_SAT", "metop default"),
            ("PAR_CALIBRATION_MONITOR", "/aapp/monitor"),
            ("HIST_SIZE_HIGH", "800"),
            ("HIST_SIZE_LOW", "400"),
            ("HIST_NMAX", "2000"),
            ("PAR_NAVIGATION_DEFAULT_LISTESAT", "noaa18 noaa19 M01 M02"),
        ]))
        .unwrap();

        assert_eq!(snapshot.hirs_versions.resolve("metop01", None), Some(1));
        assert_eq!(snapshot.calibration_monitor, Some(PathBuf::from("/aapp/monitor")));
        assert_eq!(
            snapshot.history_bounds,
            Some(HistoryBounds {
                size_high: 800,
                size_low: 400,
                nmax: 2000
            })
        );
        assert_eq!(snapshot.navigation_satellites.len(), 4);
    }

    #[test]
    fn test_empty_environment_defaults_to_version_zero() {
        let snapshot = AappEnvironment::from_lookup(env(&[])).unwrap();
        assert_eq!(snapshot.hirs_versions.resolve("noaa15", None), Some(0));
        assert!(snapshot.history_bounds.is_none());
        assert!(snapshot.navigation_satellites.is_empty());
    }

    #[test]
    fn test_bad_history_bound_is_rejected() {
        let result = AappEnvironment::from_lookup(env(&[("HIST_NMAX", "lots")]));
        assert!(matches!(
            result,
            Err(EnvironmentError::InvalidNumber { name: "HIST_NMAX", .. })
        ));
    }
}
