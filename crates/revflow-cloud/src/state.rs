//! Local snapshot store for built revisions
//!
//! Manages `<state_dir>/state.json`, which records every revision the engine
//! built together with its materialized assets in declaration order.

use crate::asset::MaterializedAsset;
use crate::error::{CloudError, Result};
use crate::revision::{Revision, RevisionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;

const STATE_VERSION: u32 = 1;
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";
const STATE_STAGING: &str = "state.json.tmp";
const LOCK_FILE: &str = "lock.json";
const STALE_LOCK_HOURS: i64 = 1;

/// A built revision and the assets materialized into it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionState {
    pub revision: Revision,

    /// One entry per declared spec, in declaration order
    pub assets: Vec<MaterializedAsset>,
}

impl RevisionState {
    pub fn new(revision: Revision, assets: Vec<MaterializedAsset>) -> Self {
        Self { revision, assets }
    }

    pub fn id(&self) -> &RevisionId {
        &self.revision.id
    }

    pub fn asset_ids(&self) -> impl Iterator<Item = &str> {
        self.assets.iter().map(|a| a.id())
    }
}

/// All recorded revisions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalState {
    /// State file version
    pub version: u32,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    /// Revisions indexed by `data_set_id:revision_id`
    pub revisions: HashMap<String, RevisionState>,
}

impl Default for GlobalState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            revisions: HashMap::new(),
        }
    }
}

impl GlobalState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Revisions belonging to one data set
    pub fn data_set_revisions(&self, data_set_id: &str) -> Vec<&RevisionState> {
        self.revisions
            .values()
            .filter(|r| r.revision.id.data_set_id == data_set_id)
            .collect()
    }

    /// Add or replace a revision
    pub fn set_revision(&mut self, state: RevisionState) {
        self.revisions.insert(state.id().key(), state);
        self.updated_at = Utc::now();
    }

    /// Remove a revision
    pub fn remove_revision(&mut self, id: &RevisionId) -> Option<RevisionState> {
        let result = self.revisions.remove(&id.key());
        if result.is_some() {
            self.updated_at = Utc::now();
        }
        result
    }

    pub fn get_revision(&self, id: &RevisionId) -> Option<&RevisionState> {
        self.revisions.get(&id.key())
    }

    /// Record a build: refresh the revision and append its new assets
    pub fn record_build(&mut self, built: &RevisionState) {
        let mut assets = self
            .revisions
            .remove(&built.id().key())
            .map(|previous| previous.assets)
            .unwrap_or_default();
        assets.extend(built.assets.iter().cloned());
        self.set_revision(RevisionState::new(built.revision.clone(), assets));
    }

    /// Replace the recorded revision metadata, keeping its assets
    pub fn refresh_revision(&mut self, revision: &Revision) -> bool {
        match self.revisions.get_mut(&revision.id.key()) {
            Some(recorded) => {
                recorded.revision = revision.clone();
                self.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }
}

/// Reads and writes `state.json` under a state directory
#[derive(Debug, Clone)]
pub struct StateStore {
    state_dir: PathBuf,
}

impl StateStore {
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            state_dir: state_dir.as_ref().to_path_buf(),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.state_dir.join(name)
    }

    /// Load the recorded state; empty when nothing was saved yet
    pub async fn load(&self) -> Result<GlobalState> {
        let content = match fs::read_to_string(self.path(STATE_FILE)).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(dir = %self.state_dir.display(), "No state recorded yet");
                return Ok(GlobalState::new());
            }
            Err(e) => return Err(e.into()),
        };

        let state: GlobalState = serde_json::from_str(&content)?;
        if state.version > STATE_VERSION {
            return Err(CloudError::StateError(format!(
                "state version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }
        Ok(state)
    }

    /// Persist the state
    ///
    /// The previous file is copied to `state.json.backup` and the new one is
    /// written to a temporary file and renamed into place.
    pub async fn save(&self, state: &GlobalState) -> Result<()> {
        fs::create_dir_all(&self.state_dir).await?;

        let current = self.path(STATE_FILE);
        if fs::try_exists(&current).await? {
            fs::copy(&current, self.path(STATE_BACKUP)).await?;
        }

        let staging = self.path(STATE_STAGING);
        fs::write(&staging, serde_json::to_vec_pretty(state)?).await?;
        fs::rename(&staging, &current).await?;

        tracing::debug!(revisions = state.revisions.len(), "Saved revision state");
        Ok(())
    }

    /// Take the exclusive lock; a lock older than an hour is treated as abandoned
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        fs::create_dir_all(&self.state_dir).await?;
        let lock_path = self.path(LOCK_FILE);

        match fs::read_to_string(&lock_path).await {
            Ok(content) => {
                let holder: LockHolder = serde_json::from_str(&content)?;
                let age = Utc::now().signed_duration_since(holder.acquired_at);
                if age < chrono::Duration::hours(STALE_LOCK_HOURS) {
                    return Err(CloudError::LockError(format!(
                        "held by {} (pid {}) since {}",
                        holder.host, holder.pid, holder.acquired_at
                    )));
                }
                tracing::warn!(
                    host = %holder.host,
                    pid = holder.pid,
                    "Taking over stale state lock"
                );
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let holder = LockHolder::current();
        fs::write(&lock_path, serde_json::to_vec_pretty(&holder)?).await?;
        Ok(StateLock {
            lock_path,
            released: false,
        })
    }

    /// Lock, load, apply `change`, save, unlock
    pub async fn update<T>(&self, change: impl FnOnce(&mut GlobalState) -> T) -> Result<T> {
        let lock = self.acquire_lock().await?;
        let mut state = self.load().await?;
        let output = change(&mut state);
        self.save(&state).await?;
        lock.release().await?;
        Ok(output)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LockHolder {
    host: String,
    pid: u32,
    acquired_at: DateTime<Utc>,
}

impl LockHolder {
    fn current() -> Self {
        let host = ["HOSTNAME", "HOST"]
            .iter()
            .find_map(|key| std::env::var(key).ok())
            .unwrap_or_else(|| "unknown".to_string());
        Self {
            host,
            pid: std::process::id(),
            acquired_at: Utc::now(),
        }
    }
}

/// Held state lock; removed on `release` or drop
#[derive(Debug)]
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        match fs::remove_file(&self.lock_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}
