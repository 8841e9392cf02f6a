//! Durable pool snapshots
//!
//! The pool persists a versioned `PoolState` through a `StateStore`.
//! `JsonFileStore` writes the snapshot as JSON with temp-file + rename so a
//! crash mid-write leaves either the old or the new snapshot, never a torn one.
//! `MemoryStore` keeps the snapshot in memory and can be told to fail saves.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::account::Account;
use crate::error::{Error, Result};
use crate::settings::PoolSettings;

/// Snapshot format version written by this build.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Everything needed to rebuild a pool after a restart.
///
/// `next_id` is kept so ids of removed accounts are never handed out again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolState {
    pub version: u32,
    pub next_id: u64,
    pub settings: PoolSettings,
    pub accounts: Vec<Account>,
}

impl PoolState {
    pub fn empty(settings: PoolSettings) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            next_id: 1,
            settings,
            accounts: Vec::new(),
        }
    }
}

/// Boxed future returned by `StateStore` methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Load/save of the full pool state.
///
/// Uses `Pin<Box<dyn Future>>` return types so the pool can hold an
/// `Arc<dyn StateStore>`.
pub trait StateStore: Send + Sync {
    /// Read the last saved snapshot. `Ok(None)` means nothing has been saved yet;
    /// unreadable or unparseable data is an error.
    fn load(&self) -> StoreFuture<'_, Option<PoolState>>;

    /// Replace the stored snapshot atomically.
    fn save<'a>(&'a self, state: &'a PoolState) -> StoreFuture<'a, ()>;
}

/// JSON snapshot file on local disk.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> StoreFuture<'_, Option<PoolState>> {
        Box::pin(async move {
            if !tokio::fs::try_exists(&self.path)
                .await
                .map_err(|e| Error::Persistence(format!("checking snapshot file: {e}")))?
            {
                info!(path = %self.path.display(), "snapshot file not found, starting empty");
                return Ok(None);
            }

            let contents = tokio::fs::read_to_string(&self.path)
                .await
                .map_err(|e| Error::Persistence(format!("reading snapshot file: {e}")))?;
            let state: PoolState = serde_json::from_str(&contents)
                .map_err(|e| Error::Persistence(format!("parsing snapshot file: {e}")))?;

            if state.version > SNAPSHOT_VERSION {
                return Err(Error::Persistence(format!(
                    "snapshot version {} is newer than supported version {SNAPSHOT_VERSION}",
                    state.version
                )));
            }

            info!(
                path = %self.path.display(),
                accounts = state.accounts.len(),
                "loaded pool snapshot"
            );
            Ok(Some(state))
        })
    }

    fn save<'a>(&'a self, state: &'a PoolState) -> StoreFuture<'a, ()> {
        Box::pin(write_atomic(&self.path, state))
    }
}

/// Write a snapshot to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Sets file permissions to 0600 since the snapshot holds secrets.
async fn write_atomic(path: &Path, state: &PoolState) -> Result<()> {
    let json = serde_json::to_string_pretty(state)
        .map_err(|e| Error::Persistence(format!("serializing snapshot: {e}")))?;

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::Persistence("snapshot path has no file name".into()))?
        .to_string_lossy();
    let tmp_path = dir.join(format!(".{file_name}.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Persistence(format!("writing temp snapshot file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Persistence(format!("setting snapshot permissions: {e}")))?;
    }

    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(Error::Persistence(format!("renaming temp snapshot file: {e}")));
    }

    debug!(path = %path.display(), accounts = state.accounts.len(), "persisted pool snapshot");
    Ok(())
}

/// In-memory store for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<Option<PoolState>>,
    fail_saves: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a snapshot, as if a previous run had saved it.
    pub fn with_state(state: PoolState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
            ..Self::default()
        }
    }

    /// Make subsequent saves fail (or succeed again).
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Last successfully saved snapshot.
    pub async fn saved(&self) -> Option<PoolState> {
        self.state.lock().await.clone()
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> StoreFuture<'_, Option<PoolState>> {
        Box::pin(async move { Ok(self.state.lock().await.clone()) })
    }

    fn save<'a>(&'a self, state: &'a PoolState) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(Error::Persistence("memory store configured to fail".into()));
            }
            *self.state.lock().await = Some(state.clone());
            self.saves.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::tests::account;

    fn sample_state() -> PoolState {
        let mut state = PoolState::empty(PoolSettings::default());
        state.accounts = vec![account(1), account(2)];
        state.next_id = 4;
        state
    }

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("pool.json"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn roundtrip_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("pool.json"));
        let state = sample_state();

        store.save(&state).await.unwrap();
        let loaded = JsonFileStore::new(store.path()).load().await.unwrap().unwrap();
        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();

        let err = JsonFileStore::new(path).load().await.unwrap_err();
        assert!(matches!(err, Error::Persistence(_)), "got: {err:?}");
        assert!(err.to_string().contains("parsing"), "got: {err}");
    }

    #[tokio::test]
    async fn newer_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("pool.json"));
        let mut state = sample_state();
        state.version = SNAPSHOT_VERSION + 1;
        store.save(&state).await.unwrap();

        let err = store.load().await.unwrap_err();
        assert!(err.to_string().contains("newer"), "got: {err}");
    }

    #[tokio::test]
    async fn save_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("pool.json"));
        store.save(&sample_state()).await.unwrap();
        store.save(&sample_state()).await.unwrap();

        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names, vec!["pool.json"]);
    }

    #[tokio::test]
    async fn save_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nope").join("pool.json"));
        let err = store.save(&sample_state()).await.unwrap_err();
        assert!(matches!(err, Error::Persistence(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_permissions_are_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.json");
        JsonFileStore::new(&path).save(&sample_state()).await.unwrap();

        let mode = tokio::fs::metadata(&path).await.unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "snapshot file must be 0600, got {mode:o}");
    }

    #[tokio::test]
    async fn memory_store_can_fail_saves() {
        let store = MemoryStore::new();
        store.save(&sample_state()).await.unwrap();
        assert_eq!(store.save_count(), 1);

        store.fail_saves(true);
        assert!(store.save(&sample_state()).await.is_err());
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.saved().await, Some(sample_state()));
    }
}
