//! # Snapshot Persistence
//!
//! Purpose: Durably write the whole keyspace to disk (`SAVE`/`BGSAVE`) and
//! restore it at startup, plus the three background policies that trigger
//! a save automatically: a fixed wall-clock interval, a mutation-rate
//! threshold measured per second, and a slower mutation-rate threshold
//! measured per minute.
//!
//! Encoding is `bincode` over the `Entry` map already used in memory, so
//! there is no separate on-disk schema to keep in sync by hand. The file
//! is written to a sibling `.tmp` path and renamed into place, so a reader
//! (or a crash mid-write) never observes a half-written snapshot.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ahash::RandomState;
use hashbrown::HashMap;
use tokio::time::Duration;
use tracing::{info, warn};

use hkv_common::{HkvError, HkvResult};

use crate::entry::Entry;
use crate::keyspace::Keyspace;

/// Owns the on-disk snapshot path and the in-flight-save guard.
pub struct SnapshotEngine {
    path: PathBuf,
    saving: AtomicBool,
}

impl SnapshotEngine {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SnapshotEngine {
            path: path.into(),
            saving: AtomicBool::new(false),
        }
    }

    /// Loads a snapshot from disk, if one exists at the configured path.
    /// A missing file is treated as "start empty", not an error.
    pub fn load(&self) -> HkvResult<Option<HashMap<String, Entry, RandomState>>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&self.path)?;
        let entries: HashMap<String, Entry, RandomState> = bincode::deserialize(&bytes)
            .map_err(|e| HkvError::SnapshotDecode(e.to_string()))?;
        Ok(Some(entries))
    }

    /// Synchronously writes `keyspace`'s current contents to disk. Used
    /// directly by the `SAVE` command, which blocks the caller until the
    /// write completes.
    pub fn save(&self, keyspace: &Keyspace) -> HkvResult<()> {
        let entries = keyspace.snapshot_entries();
        write_snapshot(&self.path, &entries)
    }

    /// Schedules a save on a blocking thread and returns immediately,
    /// matching `BGSAVE`'s fire-and-forget contract. A save already in
    /// flight makes this a no-op (single-flight), since a second
    /// concurrent writer offers nothing but another copy of the same data
    /// this one will eventually write.
    pub fn bgsave(self: &Arc<Self>, keyspace: &Arc<Keyspace>) {
        if self.saving.swap(true, Ordering::AcqRel) {
            return;
        }
        let engine = Arc::clone(self);
        let keyspace = Arc::clone(keyspace);
        tokio::task::spawn_blocking(move || {
            let entries = keyspace.snapshot_entries();
            if let Err(err) = write_snapshot(&engine.path, &entries) {
                warn!(error = %err, "background snapshot failed");
            }
            engine.saving.store(false, Ordering::Release);
        });
    }

    /// Runs the fixed-interval save policy (`ASYNC_TIME` seconds) until the
    /// server shuts down.
    pub async fn run_async_time_policy(self: Arc<Self>, keyspace: Arc<Keyspace>, period: Duration) {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if keyspace.modifications() > 0 {
                info!("periodic snapshot policy firing");
                keyspace.reset_modifications();
                self.bgsave(&keyspace);
            }
        }
    }

    /// Runs the per-second mutation-count policy (`SEC_COUNT`): every
    /// second, if at least `threshold` mutations happened since the last
    /// check, triggers a save.
    pub async fn run_sec_count_policy(self: Arc<Self>, keyspace: Arc<Keyspace>, threshold: u64) {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            ticker.tick().await;
            if keyspace.modifications() >= threshold {
                info!(threshold, "per-second mutation threshold policy firing");
                keyspace.reset_modifications();
                self.bgsave(&keyspace);
            }
        }
    }

    /// Runs the per-minute mutation-count policy (`MIN_COUNT`): every
    /// minute, if at least `threshold` mutations happened since the last
    /// check, triggers a save.
    pub async fn run_min_count_policy(self: Arc<Self>, keyspace: Arc<Keyspace>, threshold: u64) {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        loop {
            ticker.tick().await;
            if keyspace.modifications() >= threshold {
                info!(threshold, "per-minute mutation threshold policy firing");
                keyspace.reset_modifications();
                self.bgsave(&keyspace);
            }
        }
    }
}

fn write_snapshot(path: &Path, entries: &HashMap<String, Entry, RandomState>) -> HkvResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let tmp_path = tmp_path_for(path)?;
    let bytes = bincode::serialize(entries)
        .map_err(|e| HkvError::SnapshotDecode(e.to_string()))?;
    std::fs::write(&tmp_path, bytes)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

fn tmp_path_for(path: &Path) -> HkvResult<PathBuf> {
    let file_name = path
        .file_name()
        .ok_or_else(|| HkvError::InvalidSnapshotPath(path.to_path_buf()))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    Ok(path.with_file_name(tmp_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn save_then_load_roundtrips() {
        let dir = std::env::temp_dir().join(format!("hkv-snapshot-test-{:?}", std::thread::current().id()));
        let path = dir.join("dump.pdb");
        let engine = SnapshotEngine::new(&path);

        let keyspace = Keyspace::new();
        keyspace.set_string("k".into(), "v".into(), None);
        engine.save(&keyspace).unwrap();

        let restored = engine.load().unwrap().expect("snapshot should exist");
        assert_eq!(restored.len(), 1);
        assert!(restored.contains_key("k"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_file_loads_as_none() {
        let path = std::env::temp_dir().join("hkv-snapshot-does-not-exist.pdb");
        let _ = std::fs::remove_file(&path);
        let engine = SnapshotEngine::new(&path);
        assert!(engine.load().unwrap().is_none());
    }

    #[tokio::test]
    async fn bgsave_is_single_flight() {
        let dir = std::env::temp_dir().join("hkv-snapshot-bgsave-test");
        let path = dir.join("dump.pdb");
        let engine = Arc::new(SnapshotEngine::new(&path));
        let keyspace = Arc::new(Keyspace::new());
        keyspace.set_string("k".into(), "v".into(), None);

        engine.bgsave(&keyspace);
        engine.bgsave(&keyspace);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(path.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
