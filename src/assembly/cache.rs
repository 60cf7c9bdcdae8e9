//! Pending-scene cache
//!
//! Owns the partially assembled paired scenes, keyed by scene key. Entries
//! that never complete are evicted once they are older than the TTL.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::{FileRole, SceneKey};

/// Result of adding a file to a pending scene
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The file filled an empty role
    Added,
    /// The same path was already recorded for this role
    Duplicate,
    /// A different path already holds this role; the new one was not recorded
    Conflict { existing: PathBuf },
}

#[derive(Debug)]
struct PendingScene {
    files: BTreeMap<FileRole, PathBuf>,
    first_seen: Instant,
}

/// Incomplete scenes waiting for their partner files.
#[derive(Debug)]
pub struct SceneCache {
    ttl: Duration,
    pending: HashMap<SceneKey, PendingScene>,
}

impl SceneCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            pending: HashMap::new(),
        }
    }

    /// Record `path` under `role` for the scene, creating the scene if needed.
    pub fn insert(&mut self, key: &SceneKey, role: FileRole, path: &Path, now: Instant) -> InsertOutcome {
        let scene = self
            .pending
            .entry(key.clone())
            .or_insert_with(|| PendingScene {
                files: BTreeMap::new(),
                first_seen: now,
            });

        match scene.files.get(&role) {
            Some(existing) if existing == path => InsertOutcome::Duplicate,
            Some(existing) => InsertOutcome::Conflict {
                existing: existing.clone(),
            },
            None => {
                scene.files.insert(role, path.to_path_buf());
                InsertOutcome::Added
            }
        }
    }

    /// True if the scene holds a file for every role in `required`.
    pub fn is_complete(&self, key: &SceneKey, required: &[FileRole]) -> bool {
        self.pending
            .get(key)
            .is_some_and(|scene| required.iter().all(|role| scene.files.contains_key(role)))
    }

    /// Remove the scene and hand back its files.
    pub fn complete(&mut self, key: &SceneKey) -> Option<BTreeMap<FileRole, PathBuf>> {
        self.pending.remove(key).map(|scene| scene.files)
    }

    /// Drop a scene without completing it.
    pub fn evict(&mut self, key: &SceneKey) -> bool {
        self.pending.remove(key).is_some()
    }

    /// Evict every scene first seen more than the TTL before `now`.
    pub fn evict_expired(&mut self, now: Instant) -> Vec<SceneKey> {
        let ttl = self.ttl;
        let expired: Vec<SceneKey> = self
            .pending
            .iter()
            .filter(|(_, scene)| now.saturating_duration_since(scene.first_seen) > ttl)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            if let Some(scene) = self.pending.remove(key) {
                warn!(
                    scene = %key,
                    files = ?scene.files.values().collect::<Vec<_>>(),
                    "Evicting incomplete scene after {}s",
                    ttl.as_secs()
                );
            }
        }
        if !expired.is_empty() {
            debug!(remaining = self.pending.len(), "Pending scenes after eviction");
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn contains(&self, key: &SceneKey) -> bool {
        self.pending.contains_key(key)
    }
}
