//! State file persistence
//!
//! Persists the inventory to `<state_dir>/state.json`. The previous file is
//! kept as `state.json.backup`, and `lock.json` serializes runs that share a
//! state directory.

use crate::error::{Result, SyncError};
use crate::memory::Inventory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

const STATE_VERSION: u32 = 1;
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";
const LOCK_FILE: &str = "lock.json";

/// On-disk state document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFile {
    pub version: u32,
    pub updated_at: DateTime<Utc>,
    pub inventory: Inventory,
}

impl StateFile {
    pub fn new(inventory: Inventory) -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            inventory,
        }
    }
}

/// Reads and writes the state directory
pub struct StateManager {
    state_dir: PathBuf,
}

impl StateManager {
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            state_dir: state_dir.as_ref().to_path_buf(),
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    fn state_path(&self) -> PathBuf {
        self.state_dir.join(STATE_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.state_dir.join(STATE_BACKUP)
    }

    fn lock_path(&self) -> PathBuf {
        self.state_dir.join(LOCK_FILE)
    }

    async fn ensure_state_dir(&self) -> Result<()> {
        if !self.state_dir.exists() {
            fs::create_dir_all(&self.state_dir).await?;
            tracing::debug!("Created state directory: {}", self.state_dir.display());
        }
        Ok(())
    }

    /// Load the saved inventory, empty when no state file exists yet
    pub async fn load(&self) -> Result<Inventory> {
        let path = self.state_path();
        if !path.exists() {
            tracing::debug!("State file not found, starting from an empty inventory");
            return Ok(Inventory::default());
        }

        let content = fs::read_to_string(&path).await?;
        let state: StateFile = serde_json::from_str(&content)?;

        if state.version > STATE_VERSION {
            return Err(SyncError::State(format!(
                "State file version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }

        tracing::debug!(
            "Loaded state with {} resources and {} relations",
            state.inventory.resources.len(),
            state.inventory.relations.len()
        );
        Ok(state.inventory)
    }

    /// Save the inventory, keeping the previous file as a backup
    pub async fn save(&self, inventory: &Inventory) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.state_path();
        let backup = self.backup_path();

        if path.exists() {
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(&path, &backup).await?;
            tracing::debug!("Created state backup");
        }

        let content = serde_json::to_string_pretty(&StateFile::new(inventory.clone()))?;
        fs::write(&path, content).await?;

        tracing::debug!("Saved state with {} resources", inventory.resources.len());
        Ok(())
    }

    /// Acquire the state directory lock
    ///
    /// `lock.json` is created with `create_new`, so of two runs racing for the
    /// same directory exactly one wins.
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        self.ensure_state_dir().await?;

        let lock_path = self.lock_path();
        let lock_info = LockInfo::current();

        match create_lock_file(&lock_path, &lock_info).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                self.remove_stale_lock(&lock_path).await?;
                create_lock_file(&lock_path, &lock_info).await.map_err(|e| {
                    if e.kind() == io::ErrorKind::AlreadyExists {
                        SyncError::Lock("State lock was taken by another run".into())
                    } else {
                        SyncError::Io(e)
                    }
                })?;
            }
            Err(e) => return Err(e.into()),
        }

        tracing::debug!("Acquired state lock");
        Ok(StateLock {
            lock_path,
            released: false,
        })
    }

    /// Remove an existing lock if it is older than an hour, fail otherwise
    async fn remove_stale_lock(&self, lock_path: &Path) -> Result<()> {
        let content = match fs::read_to_string(lock_path).await {
            Ok(content) => content,
            // released between our create attempt and this read
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        // a holder that has created the file but not written it yet
        let Ok(lock_info) = serde_json::from_str::<LockInfo>(&content) else {
            return Err(SyncError::Lock("State is locked by a starting run".into()));
        };

        let age = Utc::now().signed_duration_since(lock_info.acquired_at);
        if age.num_hours() < 1 {
            return Err(SyncError::Lock(format!(
                "State is locked by {} (pid {}) since {}",
                lock_info.holder, lock_info.pid, lock_info.acquired_at
            )));
        }

        tracing::warn!("Removing stale lock from {}", lock_info.holder);
        match fs::remove_file(lock_path).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

async fn create_lock_file(path: &Path, lock_info: &LockInfo) -> io::Result<()> {
    let content = serde_json::to_vec_pretty(lock_info)?;
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(&content).await?;
    file.flush().await
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    #[serde(default)]
    pid: u32,
    acquired_at: DateTime<Utc>,
}

impl LockInfo {
    fn current() -> Self {
        Self {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            pid: std::process::id(),
            acquired_at: Utc::now(),
        }
    }
}

/// RAII guard for the state lock
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
                fs::remove_file(&self.lock_path).await?;
                tracing::debug!("Released state lock");
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}
