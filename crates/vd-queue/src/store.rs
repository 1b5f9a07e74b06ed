//! Durable queue store: entries keyed by id, in insertion order.
//!
//! Two backends:
//!   - **JSON** (default): loaded into memory on open, written through on every
//!     mutation with an atomic temp+rename. An open store holds an exclusive
//!     lock on `<path>.lock`, so only one process owns the file at a time.
//!   - **Memory**: same semantics, no persistence (tests, dry runs).
//!
//! Both implement `QueueStore`. Mutations go through `EntryUpdate`, which only
//! names the mutable fields; blob, metadata, secret id and checksum cannot be
//! changed after insert.

use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use vd_core::{EntryId, QueueEntry, UploadState};

use crate::error::StoreError;

const STORE_VERSION: u32 = 1;

/// The legal mutations of a stored entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryUpdate {
    /// Encrypted → Uploading, counts an attempt
    Claim { at_ms: u64 },
    /// Uploading → Encrypted after a retryable failure
    Reschedule,
    /// Uploading → Encrypted, attempt handed back (request never judged)
    ReleaseClaim,
    /// Uploading → Completed
    MarkCompleted,
    /// Uploading → Failed
    MarkFailed,
    /// Encrypted | Uploading → Skipped
    MarkSkipped,
    /// Failed | Skipped → Encrypted with a fresh attempt budget
    Requeue,
}

impl EntryUpdate {
    pub fn name(self) -> &'static str {
        match self {
            EntryUpdate::Claim { .. } => "claim",
            EntryUpdate::Reschedule => "reschedule",
            EntryUpdate::ReleaseClaim => "release_claim",
            EntryUpdate::MarkCompleted => "mark_completed",
            EntryUpdate::MarkFailed => "mark_failed",
            EntryUpdate::MarkSkipped => "mark_skipped",
            EntryUpdate::Requeue => "requeue",
        }
    }

    /// Apply to `entry`, leaving it untouched if the transition is illegal.
    pub fn apply(self, entry: &mut QueueEntry) -> Result<(), StoreError> {
        use UploadState::*;

        let next = match (self, entry.upload_state) {
            (EntryUpdate::Claim { at_ms }, Encrypted) => {
                entry.attempt_count += 1;
                entry.last_attempt_at_ms = Some(at_ms);
                Uploading
            }
            (EntryUpdate::Reschedule, Uploading) => Encrypted,
            (EntryUpdate::ReleaseClaim, Uploading) => {
                entry.attempt_count = entry.attempt_count.saturating_sub(1);
                Encrypted
            }
            (EntryUpdate::MarkCompleted, Uploading) => Completed,
            (EntryUpdate::MarkFailed, Uploading) => Failed,
            (EntryUpdate::MarkSkipped, Encrypted | Uploading) => Skipped,
            (EntryUpdate::Requeue, Failed | Skipped) => {
                entry.attempt_count = 0;
                entry.last_attempt_at_ms = None;
                Encrypted
            }
            (update, from) => {
                return Err(StoreError::IllegalTransition {
                    id: entry.id,
                    from,
                    update: update.name(),
                })
            }
        };
        entry.upload_state = next;
        Ok(())
    }
}

pub trait QueueStore: Send {
    /// Add a new entry. Fails on a duplicate id.
    fn insert(&mut self, entry: QueueEntry) -> Result<(), StoreError>;

    /// Apply a state transition and return the updated entry.
    fn update(&mut self, id: &EntryId, update: EntryUpdate) -> Result<QueueEntry, StoreError>;

    /// Remove a terminal entry. Removing an in-flight entry is illegal.
    fn remove(&mut self, id: &EntryId) -> Result<QueueEntry, StoreError>;

    fn get(&self, id: &EntryId) -> Option<QueueEntry>;

    /// Entries in any of `states`, oldest first.
    fn list_by_state(&self, states: &[UploadState]) -> Vec<QueueEntry>;

    /// All entries, oldest first.
    fn all(&self) -> Vec<QueueEntry>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Shared entry log ─────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone)]
struct EntryLog {
    entries: Vec<QueueEntry>,
}

impl EntryLog {
    fn position(&self, id: &EntryId) -> Result<usize, StoreError> {
        self.entries
            .iter()
            .position(|e| e.id == *id)
            .ok_or(StoreError::NotFound(*id))
    }

    fn insert(&mut self, entry: QueueEntry) -> Result<(), StoreError> {
        if self.entries.iter().any(|e| e.id == entry.id) {
            return Err(StoreError::DuplicateId(entry.id));
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Returns the index and the previous value so a failed flush can roll back.
    fn update(
        &mut self,
        id: &EntryId,
        update: EntryUpdate,
    ) -> Result<(usize, QueueEntry), StoreError> {
        let idx = self.position(id)?;
        let mut updated = self.entries[idx].clone();
        update.apply(&mut updated)?;
        let previous = std::mem::replace(&mut self.entries[idx], updated);
        Ok((idx, previous))
    }

    fn remove(&mut self, id: &EntryId) -> Result<(usize, QueueEntry), StoreError> {
        let idx = self.position(id)?;
        let state = self.entries[idx].upload_state;
        if !state.is_terminal() {
            return Err(StoreError::IllegalTransition {
                id: *id,
                from: state,
                update: "remove",
            });
        }
        Ok((idx, self.entries.remove(idx)))
    }

    fn get(&self, id: &EntryId) -> Option<QueueEntry> {
        self.entries.iter().find(|e| e.id == *id).cloned()
    }

    fn list_by_state(&self, states: &[UploadState]) -> Vec<QueueEntry> {
        self.entries
            .iter()
            .filter(|e| states.contains(&e.upload_state))
            .cloned()
            .collect()
    }
}

// ── Memory backend ───────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryQueueStore {
    log: EntryLog,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl QueueStore for MemoryQueueStore {
    fn insert(&mut self, entry: QueueEntry) -> Result<(), StoreError> {
        self.log.insert(entry)
    }

    fn update(&mut self, id: &EntryId, update: EntryUpdate) -> Result<QueueEntry, StoreError> {
        let (idx, _) = self.log.update(id, update)?;
        Ok(self.log.entries[idx].clone())
    }

    fn remove(&mut self, id: &EntryId) -> Result<QueueEntry, StoreError> {
        self.log.remove(id).map(|(_, entry)| entry)
    }

    fn get(&self, id: &EntryId) -> Option<QueueEntry> {
        self.log.get(id)
    }

    fn list_by_state(&self, states: &[UploadState]) -> Vec<QueueEntry> {
        self.log.list_by_state(states)
    }

    fn all(&self) -> Vec<QueueEntry> {
        self.log.entries.clone()
    }

    fn len(&self) -> usize {
        self.log.entries.len()
    }
}

// ── JSON backend ─────────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    entries: Vec<QueueEntry>,
}

/// JSON-file queue store with write-through persistence.
///
/// A mutation only succeeds once it is on disk; if the write fails the
/// in-memory state is rolled back and the error returned. The store owns the
/// file for as long as it is open: a second `open` of the same path, from
/// this process or another, fails with `StoreError::Locked`.
#[derive(Debug)]
pub struct JsonQueueStore {
    path: PathBuf,
    log: EntryLog,
    _lock: File,
}

impl JsonQueueStore {
    /// Lock and load the store at `path`, or start empty if it does not exist yet.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let lock = lock_store(path)?;
        let log = EntryLog {
            entries: load(path)?,
        };

        Ok(Self {
            path: path.to_path_buf(),
            log,
            _lock: lock,
        })
    }

    /// Read the entries at `path` without taking the lock.
    ///
    /// Works while another process owns the store; every write replaces the
    /// file atomically, so the snapshot is always a complete one.
    pub fn snapshot(path: &Path) -> Result<Vec<QueueEntry>, StoreError> {
        load(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = StoreFile {
            version: STORE_VERSION,
            entries: self.log.entries.clone(),
        };
        let json = serde_json::to_vec(&file)?;

        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, &json)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

fn lock_store(path: &Path) -> Result<File, StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(lock_path(path))?;
    FileExt::try_lock_exclusive(&file).map_err(|source| StoreError::Locked {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(file)
}

fn load(path: &Path) -> Result<Vec<QueueEntry>, StoreError> {
    if !path.exists() {
        debug!(path = %path.display(), "no queue store yet, starting empty");
        return Ok(Vec::new());
    }
    let data = std::fs::read(path)?;
    let file: StoreFile = serde_json::from_slice(&data)?;
    if file.version != STORE_VERSION {
        return Err(StoreError::UnsupportedVersion(file.version));
    }
    info!(path = %path.display(), entries = file.entries.len(), "loaded queue store");
    Ok(file.entries)
}

impl QueueStore for JsonQueueStore {
    fn insert(&mut self, entry: QueueEntry) -> Result<(), StoreError> {
        let id = entry.id;
        self.log.insert(entry)?;
        if let Err(e) = self.flush() {
            self.log.entries.retain(|e| e.id != id);
            return Err(e);
        }
        Ok(())
    }

    fn update(&mut self, id: &EntryId, update: EntryUpdate) -> Result<QueueEntry, StoreError> {
        let (idx, previous) = self.log.update(id, update)?;
        if let Err(e) = self.flush() {
            self.log.entries[idx] = previous;
            return Err(e);
        }
        Ok(self.log.entries[idx].clone())
    }

    fn remove(&mut self, id: &EntryId) -> Result<QueueEntry, StoreError> {
        let (idx, removed) = self.log.remove(id)?;
        if let Err(e) = self.flush() {
            self.log.entries.insert(idx, removed);
            return Err(e);
        }
        Ok(removed)
    }

    fn get(&self, id: &EntryId) -> Option<QueueEntry> {
        self.log.get(id)
    }

    fn list_by_state(&self, states: &[UploadState]) -> Vec<QueueEntry> {
        self.log.list_by_state(states)
    }

    fn all(&self) -> Vec<QueueEntry> {
        self.log.entries.clone()
    }

    fn len(&self) -> usize {
        self.log.entries.len()
    }
}
