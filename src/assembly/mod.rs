//! Scene Assembly Module
//!
//! Groups file-dispatch events into complete scenes:
//!
//! ```text
//! Terra / NOAA / Metop   one PDS or HRPT file     -> complete at once
//! Aqua                   MODIS PDS + GBAD packets -> complete when both
//!                        share a scene key (start time to the minute)
//! ```
//!
//! A completed scene leaves the pending cache in the same call that returns
//! it, so each scene reaches the pipeline at most once.

mod cache;

pub use cache::{InsertOutcome, SceneCache};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::defaults::SCENE_KEY_FORMAT;
use crate::types::{FileEvent, Platform, SceneFamily};

/// Terra MODIS level-0 PDS file prefix
pub const MODISFILE_TERRA_PREFIX: &str = "P0420064AAAAAAAAAAAAAA";
/// Aqua MODIS level-0 PDS file prefix
pub const MODISFILE_AQUA_PREFIX: &str = "P1540064AAAAAAAAAAAAAA";
/// Aqua GBAD (attitude/ephemeris) packet file prefix
pub const PACKETFILE_AQUA_PREFIX: &str = "P154095715409581540959";
/// Only the first (`001`) PDS file of a pass carries the scene
pub const PDS_SCENE_SUFFIX: &str = "001.PDS";

const PAIRED_ROLES: [FileRole; 2] = [FileRole::Primary, FileRole::Packet];

// ============================================================================
// Scene Types
// ============================================================================

/// Role a downlink file plays inside a scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FileRole {
    /// Instrument data file
    Primary,
    /// Spacecraft packet file (attitude/ephemeris)
    Packet,
}

impl std::fmt::Display for FileRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileRole::Primary => write!(f, "primary"),
            FileRole::Packet => write!(f, "packet"),
        }
    }
}

/// Identifier correlating the fragments of one scene
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SceneKey(String);

impl SceneKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Scene key of an observation start time (minute resolution)
    pub fn from_start_time(start: &chrono::NaiveDateTime) -> Self {
        Self(start.format(SCENE_KEY_FORMAT).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SceneKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A complete scene, ready for the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub key: SceneKey,
    pub platform: Platform,
    files: BTreeMap<FileRole, PathBuf>,
    /// The event that completed the scene; its metadata seeds the result messages
    pub event: FileEvent,
}

impl Scene {
    pub fn file(&self, role: FileRole) -> Option<&Path> {
        self.files.get(&role).map(PathBuf::as_path)
    }

    pub fn files(&self) -> impl Iterator<Item = (FileRole, &Path)> {
        self.files.iter().map(|(role, path)| (*role, path.as_path()))
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

/// Why an event did not contribute to a scene
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// The dispatched file is not on disk
    FileMissing(PathBuf),
    /// The filename matches none of the platform's patterns
    Unclassified(String),
    /// A paired-family event without a start time cannot be keyed
    MissingStartTime,
    /// A different file already holds this role for the scene
    AmbiguousRole {
        role: FileRole,
        existing: PathBuf,
        rejected: PathBuf,
    },
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DropReason::FileMissing(path) => write!(f, "file not on disk: {}", path.display()),
            DropReason::Unclassified(name) => write!(f, "unrecognised file name: {name}"),
            DropReason::MissingStartTime => write!(f, "no start time to key the scene"),
            DropReason::AmbiguousRole {
                role,
                existing,
                rejected,
            } => write!(
                f,
                "{role} role already held by {} (rejected {})",
                existing.display(),
                rejected.display()
            ),
        }
    }
}

/// Outcome of observing one event
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// The event completed a scene
    Complete(Scene),
    /// The event was recorded; the scene still waits for a partner file
    Pending(SceneKey),
    /// The event repeated a file the scene already holds
    Duplicate(SceneKey),
    /// The event was dropped
    Dropped(DropReason),
}

impl Observation {
    pub fn into_scene(self) -> Option<Scene> {
        match self {
            Observation::Complete(scene) => Some(scene),
            _ => None,
        }
    }
}

// ============================================================================
// File Classification
// ============================================================================

/// Classifies PDS filenames into scene roles by prefix pattern.
#[derive(Debug, Clone)]
pub struct FileClassifier {
    terra_primary: PdsPattern,
    aqua_primary: PdsPattern,
    aqua_packet: PdsPattern,
}

impl Default for FileClassifier {
    fn default() -> Self {
        Self::new(MODISFILE_TERRA_PREFIX, MODISFILE_AQUA_PREFIX, PACKETFILE_AQUA_PREFIX)
    }
}

impl FileClassifier {
    pub fn new(terra_primary: &str, aqua_primary: &str, aqua_packet: &str) -> Self {
        Self {
            terra_primary: PdsPattern::new(terra_primary),
            aqua_primary: PdsPattern::new(aqua_primary),
            aqua_packet: PdsPattern::new(aqua_packet),
        }
    }

    /// Role of `file_name` for `platform`, if it belongs to a scene at all.
    ///
    /// AAPP platforms accept any file as the primary one.
    pub fn classify(&self, platform: &Platform, file_name: &str) -> Option<FileRole> {
        match platform {
            Platform::Terra => self
                .terra_primary
                .is_match(file_name)
                .then_some(FileRole::Primary),
            Platform::Aqua => {
                if self.aqua_primary.is_match(file_name) {
                    Some(FileRole::Primary)
                } else if self.aqua_packet.is_match(file_name) {
                    Some(FileRole::Packet)
                } else {
                    None
                }
            }
            Platform::Aapp(_) => Some(FileRole::Primary),
        }
    }
}

/// `{prefix}...{PDS_SCENE_SUFFIX}`, prefix and suffix not overlapping
#[derive(Debug, Clone)]
struct PdsPattern {
    prefix: String,
}

impl PdsPattern {
    fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    fn is_match(&self, file_name: &str) -> bool {
        file_name.len() >= self.prefix.len() + PDS_SCENE_SUFFIX.len()
            && file_name.starts_with(&self.prefix)
            && file_name.ends_with(PDS_SCENE_SUFFIX)
    }
}

// ============================================================================
// Scene Assembler
// ============================================================================

/// Stateful matcher turning dispatch events into complete scenes.
pub struct SceneAssembler {
    classifier: FileClassifier,
    cache: SceneCache,
}

impl SceneAssembler {
    /// Create an assembler whose incomplete scenes expire after `pending_ttl`.
    pub fn new(pending_ttl: Duration) -> Self {
        Self::with_classifier(FileClassifier::default(), pending_ttl)
    }

    pub fn with_classifier(classifier: FileClassifier, pending_ttl: Duration) -> Self {
        Self {
            classifier,
            cache: SceneCache::new(pending_ttl),
        }
    }

    /// Observe one dispatch event.
    pub fn observe(&mut self, platform: &Platform, event: FileEvent) -> Observation {
        self.observe_at(platform, event, Instant::now())
    }

    /// Observe one dispatch event at a given instant.
    ///
    /// Expired scenes are not swept here; call [`evict_expired`](Self::evict_expired)
    /// first so a stale half is never paired and every eviction is reported once.
    pub fn observe_at(&mut self, platform: &Platform, event: FileEvent, now: Instant) -> Observation {
        match platform.family() {
            SceneFamily::SingleFile => self.observe_single(platform, event),
            SceneFamily::Paired => self.observe_paired(platform, event, now),
        }
    }

    /// Number of incomplete scenes currently held.
    pub fn pending_count(&self) -> usize {
        self.cache.len()
    }

    /// Evict incomplete scenes older than the TTL.
    pub fn evict_expired(&mut self, now: Instant) -> Vec<SceneKey> {
        self.cache.evict_expired(now)
    }

    fn observe_single(&mut self, platform: &Platform, event: FileEvent) -> Observation {
        let Some(role) = self.classifier.classify(platform, event.file_name()) else {
            debug!(file = %event.file_name(), platform = %platform, "File is not a scene file, ignoring");
            return Observation::Dropped(DropReason::Unclassified(event.file_name().to_string()));
        };

        if let Some(reason) = missing_file(&event) {
            return Observation::Dropped(reason);
        }

        let key = event.start_time.as_ref().map_or_else(
            || {
                SceneKey::new(
                    event
                        .path
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .unwrap_or_default(),
                )
            },
            SceneKey::from_start_time,
        );

        info!(scene = %key, platform = %platform, file = %event.path.display(), "Single-file scene complete");
        Observation::Complete(Scene {
            key,
            platform: platform.clone(),
            files: BTreeMap::from([(role, event.path.clone())]),
            event,
        })
    }

    fn observe_paired(&mut self, platform: &Platform, event: FileEvent, now: Instant) -> Observation {
        let Some(start_time) = event.start_time else {
            warn!(file = %event.path.display(), "No start time in message, cannot pair scene");
            return Observation::Dropped(DropReason::MissingStartTime);
        };
        let key = SceneKey::from_start_time(&start_time);

        let Some(role) = self.classifier.classify(platform, event.file_name()) else {
            debug!(scene = %key, file = %event.file_name(), "File is not a scene file, ignoring");
            return Observation::Dropped(DropReason::Unclassified(event.file_name().to_string()));
        };

        if let Some(reason) = missing_file(&event) {
            return Observation::Dropped(reason);
        }

        match self.cache.insert(&key, role, &event.path, now) {
            InsertOutcome::Added => {
                debug!(scene = %key, role = %role, file = %event.path.display(), "File added to pending scene");
            }
            InsertOutcome::Duplicate => {
                debug!(scene = %key, role = %role, "File already recorded for scene");
                return Observation::Duplicate(key);
            }
            InsertOutcome::Conflict { existing } => {
                error!(
                    scene = %key,
                    role = %role,
                    existing = %existing.display(),
                    rejected = %event.path.display(),
                    "Ambiguous scene: two files claim the same role"
                );
                return Observation::Dropped(DropReason::AmbiguousRole {
                    role,
                    existing,
                    rejected: event.path,
                });
            }
        }

        if !self.cache.is_complete(&key, &PAIRED_ROLES) {
            return Observation::Pending(key);
        }

        match self.cache.complete(&key) {
            Some(files) => {
                info!(scene = %key, platform = %platform, files = ?files.values().collect::<Vec<_>>(), "Paired scene complete");
                Observation::Complete(Scene {
                    key,
                    platform: platform.clone(),
                    files,
                    event,
                })
            }
            None => Observation::Pending(key),
        }
    }
}

fn missing_file(event: &FileEvent) -> Option<DropReason> {
    if event.path.exists() {
        None
    } else {
        warn!(
            file = %event.path.display(),
            "File is reported to be dispatched but is not there"
        );
        Some(DropReason::FileMissing(event.path.clone()))
    }
}
