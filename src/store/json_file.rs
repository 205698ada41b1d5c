// src/store/json_file.rs
//! Single-file JSON watch store: `{"watches": [...]}`.
//!
//! Every operation re-reads the file, so edits made while the process runs are
//! picked up. Writes go to `<path>.tmp` and are renamed into place.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::WatchStore;
use crate::error::{Result, TrackError};
use crate::snapshot::Watch;

/// Used when the configured path cannot be written. Not persistent across reboots.
pub const FALLBACK_PATH: &str = "/tmp/bot.db";

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    watches: Vec<Watch>,
}

pub struct JsonWatchStore {
    path: PathBuf,
    // Serializes read-modify-write sequences within this process.
    lock: Mutex<()>,
}

impl JsonWatchStore {
    /// Open (or create) the store at `path`, falling back to [`FALLBACK_PATH`].
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with_fallback(path, FALLBACK_PATH).await
    }

    pub async fn open_with_fallback(
        path: impl Into<PathBuf>,
        fallback: impl Into<PathBuf>,
    ) -> Result<Self> {
        let requested = path.into();
        let fallback = fallback.into();

        let path = if can_write_to(&requested).await {
            requested
        } else if can_write_to(&fallback).await {
            tracing::warn!(
                requested = %requested.display(),
                fallback = %fallback.display(),
                "configured store path is not writable; falling back (non-persistent)"
            );
            fallback
        } else {
            return Err(TrackError::store(format!(
                "store path not writable and fallback failed: requested={}, fallback={}",
                requested.display(),
                fallback.display()
            )));
        };

        let store = Self {
            path,
            lock: Mutex::new(()),
        };
        if !fs::try_exists(&store.path).await.unwrap_or(false) {
            store.write(&StoreFile::default()).await?;
        }
        Ok(store)
    }

    /// The path actually in use (may be the fallback).
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<StoreFile> {
        let bytes = match fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(StoreFile::default()),
            Err(e) => {
                return Err(TrackError::store(format!(
                    "read {}: {e}",
                    self.path.display()
                )))
            }
        };

        match serde_json::from_slice::<StoreFile>(&bytes) {
            Ok(file) => Ok(file),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    path = %self.path.display(),
                    "watch store unreadable or schema invalid, resetting"
                );
                self.backup_corrupt().await;
                let empty = StoreFile::default();
                // Rewrite now so later reads don't back up the same bytes again.
                if let Err(e) = self.write(&empty).await {
                    tracing::warn!(error = %e, "could not reset corrupt watch store");
                }
                Ok(empty)
            }
        }
    }

    async fn write(&self, data: &StoreFile) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(data)?;
        self.write_bytes(&bytes)
            .await
            .map_err(|e| TrackError::store(format!("write {}: {e}", self.path.display())))
    }

    async fn write_bytes(&self, bytes: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let tmp = with_suffix(&self.path, ".tmp");
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);
        fs::rename(&tmp, &self.path).await
    }

    async fn backup_corrupt(&self) {
        let backup = with_suffix(
            &self.path,
            &format!(".corrupt-{}", Utc::now().timestamp_millis()),
        );
        match fs::copy(&self.path, &backup).await {
            Ok(_) => tracing::warn!(backup = %backup.display(), "backed up corrupt watch store"),
            Err(e) => tracing::debug!(error = %e, "corrupt store backup skipped"),
        }
    }
}

#[async_trait]
impl WatchStore for JsonWatchStore {
    async fn list_all(&self) -> Result<Vec<Watch>> {
        let _guard = self.lock.lock().await;
        Ok(self.read().await?.watches)
    }

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<Watch>> {
        let _guard = self.lock.lock().await;
        let mut watches = self.read().await?.watches;
        watches.retain(|w| w.user_id == user_id);
        Ok(watches)
    }

    async fn upsert(
        &self,
        user_id: i64,
        tracking_number: &str,
        carrier_code: Option<&str>,
        label: Option<&str>,
    ) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut store = self.read().await?;

        match store
            .watches
            .iter_mut()
            .find(|w| w.matches(user_id, tracking_number))
        {
            Some(existing) => {
                if let Some(c) = carrier_code {
                    existing.carrier_code = Some(c.to_string());
                }
                if let Some(l) = label {
                    existing.label = Some(l.to_string());
                }
            }
            None => {
                let mut watch = Watch::new(user_id, tracking_number);
                watch.carrier_code = carrier_code.map(str::to_string);
                watch.label = label.map(str::to_string);
                store.watches.insert(0, watch);
            }
        }
        self.write(&store).await
    }

    async fn update_state(
        &self,
        user_id: i64,
        tracking_number: &str,
        last_status_hash: &str,
        carrier_code: Option<&str>,
    ) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut store = self.read().await?;

        let Some(watch) = store
            .watches
            .iter_mut()
            .find(|w| w.matches(user_id, tracking_number))
        else {
            return Ok(());
        };
        watch.last_status_hash = Some(last_status_hash.to_string());
        if let Some(c) = carrier_code {
            watch.carrier_code = Some(c.to_string());
        }
        self.write(&store).await
    }

    async fn remove(&self, user_id: i64, tracking_number: &str) -> Result<usize> {
        let _guard = self.lock.lock().await;
        let mut store = self.read().await?;

        let before = store.watches.len();
        store
            .watches
            .retain(|w| !w.matches(user_id, tracking_number));
        let removed = before - store.watches.len();
        self.write(&store).await?;
        Ok(removed)
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s: OsString = path.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

/// Probe by creating and removing a scratch file next to `target`.
async fn can_write_to(target: &Path) -> bool {
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        if fs::create_dir_all(parent).await.is_err() {
            return false;
        }
    }
    let probe = with_suffix(
        target,
        &format!(
            ".probe-{}-{}",
            std::process::id(),
            Utc::now().timestamp_millis()
        ),
    );
    if fs::write(&probe, b"ok").await.is_err() {
        return false;
    }
    let _ = fs::remove_file(&probe).await;
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_is_appended_to_the_file_name() {
        assert_eq!(
            with_suffix(Path::new("data/bot.db"), ".tmp"),
            PathBuf::from("data/bot.db.tmp")
        );
    }

    #[tokio::test]
    async fn open_creates_an_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/bot.db");
        let store = JsonWatchStore::open(&path).await.unwrap();
        assert_eq!(store.path(), path.as_path());
        let raw = std::fs::read_to_string(&path).unwrap();
        let v: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(v, serde_json::json!({"watches": []}));
    }
}
