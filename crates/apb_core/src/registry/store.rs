//! File-backed registry store.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use chrono::Local;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::errors::{RegistryError, RegistryResult};
use crate::models::{Batch, BatchStatus, StatusFilter, STEP_COUNT};
use crate::storage::{atomic_write, FileLock, DEFAULT_LOCK_TIMEOUT};

/// Persistent registry state (saved to the registry JSON file).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegistryState {
    /// Registry format version.
    version: u32,
    /// Batches in registration order.
    batches: Vec<Batch>,
}

impl Default for RegistryState {
    fn default() -> Self {
        Self {
            version: 1,
            batches: Vec::new(),
        }
    }
}

impl RegistryState {
    fn find(&self, id: &str) -> RegistryResult<&Batch> {
        self.batches
            .iter()
            .find(|b| b.id == id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    fn find_mut(&mut self, id: &str) -> RegistryResult<&mut Batch> {
        self.batches
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// Active batch (other than `except`) rooted at `dir`.
    fn active_at(&self, dir: &Path, except: Option<&str>) -> Option<&Batch> {
        self.batches.iter().find(|b| {
            b.status == BatchStatus::Active
                && Some(b.id.as_str()) != except
                && normalize_dir(&b.root) == dir
        })
    }
}

/// Registry of batches persisted to a single JSON file.
pub struct BatchRegistry {
    /// Path to the registry file.
    path: PathBuf,
    /// Serializes mutations from threads of this process; the lock file
    /// covers other processes.
    guard: Mutex<()>,
    lock_timeout: Duration,
}

impl BatchRegistry {
    /// Open the registry at `path`. The file is created on first mutation.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Override how long to wait for a contended lock.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Registry file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Register a new batch rooted at `directory`.
    ///
    /// Fails with [`RegistryError::DuplicateBatch`] if an active batch
    /// already points at the same directory.
    pub fn register(&self, name: &str, directory: &Path) -> RegistryResult<String> {
        let normalized = normalize_dir(directory);
        self.mutate(|state| {
            if let Some(existing) = state.active_at(&normalized, None) {
                return Err(RegistryError::DuplicateBatch {
                    directory: directory.to_path_buf(),
                    existing_id: existing.id.clone(),
                });
            }
            let batch = Batch::new(name, normalized.clone());
            let id = batch.id.clone();
            tracing::info!("Registered batch '{}' ({}) at {}", name, id, normalized.display());
            state.batches.push(batch);
            Ok(id)
        })
    }

    /// Get a batch by ID.
    pub fn get(&self, id: &str) -> RegistryResult<Batch> {
        let state = self.read_state()?;
        state.find(id).cloned()
    }

    /// List batches matching `filter`, in registration order.
    pub fn list(&self, filter: StatusFilter) -> RegistryResult<Vec<Batch>> {
        let state = self.read_state()?;
        Ok(state
            .batches
            .into_iter()
            .filter(|b| filter.matches(b.status))
            .collect())
    }

    /// Record the completion state of one step.
    pub fn update_step_status(&self, id: &str, step: u8, completed: bool) -> RegistryResult<Batch> {
        if !(1..=STEP_COUNT).contains(&step) {
            return Err(RegistryError::InvalidStep(step));
        }
        self.mutate(|state| {
            let batch = state.find_mut(id)?;
            batch.set_step(step, completed);
            tracing::debug!("Batch {} step {} completed={}", id, step, completed);
            Ok(batch.clone())
        })
    }

    /// Mark a batch as completed.
    pub fn mark_complete(&self, id: &str) -> RegistryResult<Batch> {
        self.mutate(|state| {
            let batch = state.find_mut(id)?;
            batch.status = BatchStatus::Completed;
            Ok(batch.clone())
        })
    }

    /// Archive a batch. Every step must be complete.
    pub fn archive(&self, id: &str) -> RegistryResult<Batch> {
        self.mutate(|state| {
            let batch = state.find_mut(id)?;
            let pending: Vec<u8> = (1..=STEP_COUNT)
                .filter(|n| !batch.is_step_complete(*n))
                .collect();
            if !pending.is_empty() {
                return Err(RegistryError::IncompleteBatch {
                    id: id.to_string(),
                    pending,
                });
            }
            batch.status = BatchStatus::Archived;
            Ok(batch.clone())
        })
    }

    /// Return an archived or completed batch to active status.
    pub fn reactivate(&self, id: &str) -> RegistryResult<Batch> {
        self.mutate(|state| {
            let root = normalize_dir(&state.find(id)?.root);
            if let Some(existing) = state.active_at(&root, Some(id)) {
                return Err(RegistryError::DuplicateBatch {
                    directory: root.clone(),
                    existing_id: existing.id.clone(),
                });
            }
            let batch = state.find_mut(id)?;
            batch.status = BatchStatus::Active;
            batch.last_accessed = Local::now();
            Ok(batch.clone())
        })
    }

    /// Detach a batch from the registry. Its files are left untouched.
    pub fn remove(&self, id: &str) -> RegistryResult<Batch> {
        self.mutate(|state| {
            let index = state
                .batches
                .iter()
                .position(|b| b.id == id)
                .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
            let removed = state.batches.remove(index);
            tracing::info!("Removed batch '{}' from registry (files kept)", removed.name);
            Ok(removed)
        })
    }

    /// Refresh a batch's last-accessed timestamp.
    pub fn touch(&self, id: &str) -> RegistryResult<Batch> {
        self.mutate(|state| {
            let batch = state.find_mut(id)?;
            batch.last_accessed = Local::now();
            Ok(batch.clone())
        })
    }

    /// Run `f` as one atomic read-modify-write cycle.
    ///
    /// State is re-read from disk under the lock; it is only written back
    /// when `f` succeeds.
    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut RegistryState) -> RegistryResult<T>,
    ) -> RegistryResult<T> {
        let _in_process = self.guard.lock();
        let _lock = FileLock::acquire(&self.path, self.lock_timeout)?;

        let mut state = self.load_unlocked()?;
        let value = f(&mut state)?;

        let json = serde_json::to_string_pretty(&state)?;
        atomic_write(&self.path, json.as_bytes())
            .map_err(|e| RegistryError::io(&self.path, e))?;
        Ok(value)
    }

    fn read_state(&self) -> RegistryResult<RegistryState> {
        let _in_process = self.guard.lock();
        let _lock = FileLock::acquire(&self.path, self.lock_timeout)?;
        self.load_unlocked()
    }

    fn load_unlocked(&self) -> RegistryResult<RegistryState> {
        if !self.path.exists() {
            return Ok(RegistryState::default());
        }
        let content =
            fs::read_to_string(&self.path).map_err(|e| RegistryError::io(&self.path, e))?;
        if content.trim().is_empty() {
            return Ok(RegistryState::default());
        }
        Ok(serde_json::from_str(&content)?)
    }
}

/// Canonical form of a batch directory for duplicate detection.
fn normalize_dir(dir: &Path) -> PathBuf {
    if let Ok(canonical) = fs::canonicalize(dir) {
        return canonical;
    }
    let mut out = PathBuf::new();
    for component in dir.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
