//! System-wide default constants.
//!
//! Centralises the numbers the runner falls back to when the config file
//! and environment are silent. Grouped by subsystem for easy discovery.

// ============================================================================
// Scene Assembly
// ============================================================================

/// How long an incomplete paired scene waits for its partner file (seconds).
///
/// An Aqua pass lasts at most ~15 minutes and both PDS files are dispatched
/// at the end of it, so 1 hour is ample.
pub const PENDING_SCENE_TTL_SECS: u64 = 3_600;

/// Scene key format: observation start time to the minute.
pub const SCENE_KEY_FORMAT: &str = "%Y%m%d%H%M";

// ============================================================================
// External Processes
// ============================================================================

/// Per-stage timeout (seconds). 7 200 = 2 hours, well above the slowest
/// level-1b run seen on a full pass.
pub const STAGE_TIMEOUT_SECS: u64 = 7_200;

/// Return codes a stage accepts unless it declares otherwise.
pub const DEFAULT_ACCEPTED_RETURN_CODES: &[i32] = &[0];

// ============================================================================
// MODIS
// ============================================================================

/// Geolocation check threshold passed to the Aqua level-0 to 1a wrapper.
pub const GEOCHECK_THRESHOLD: u32 = 50;

/// Processing-time suffix appended to every MODIS output name.
pub const PROCESSING_TIME_FORMAT: &str = "%Y%j%H%M%S";

/// Navigation helper files the SPA geolocation needs.
pub const NAVIGATION_HELPER_FILES: [&str; 2] = ["utcpole.dat", "leapsec.dat"];

/// Re-download navigation helper files older than this (days).
pub const DAYS_BETWEEN_URL_DOWNLOAD: u32 = 14;

/// Delete timestamped navigation helper backups older than this (days).
pub const DAYS_KEEP_OLD_ETC_FILES: u32 = 60;

/// HTTP timeout for navigation helper downloads (seconds).
pub const ANCILLARY_HTTP_TIMEOUT_SECS: u64 = 60;

// ============================================================================
// AAPP
// ============================================================================

/// Historic-tracking file kept per platform under `$PAR_CALIBRATION_MONITOR`.
pub const HIRS_HISTORIC_FILE: &str = "hirs_historic.txt";

/// AAPP short satellite codes and the names the binaries expect.
pub const METOP_SHORT_CODES: [(&str, &str); 4] = [
    ("M01", "metop01"),
    ("M02", "metop02"),
    ("M03", "metop03"),
    ("M04", "metop04"),
];

// ============================================================================
// Event Loop
// ============================================================================

/// Log a progress line every this many inbound messages.
pub const PROGRESS_LOG_INTERVAL: u64 = 50;
