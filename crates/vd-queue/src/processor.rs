//! `UploadQueue`: enqueue (encrypt + persist) and drain (retrying upload).
//!
//! At most one drain pass runs at a time. A drain requested while the drain
//! guard is held sets a rerun flag and returns immediately. Whoever holds the
//! guard checks the flag again after releasing it and sweeps once more if it
//! is set, so the request is served and no entry is ever uploaded by two
//! passes at once. After an auth failure the request is left for the next
//! drain.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};
use vd_core::{EntryId, FileMetadata, QueueEntry, SecretId, UploadState};
use vd_crypto::{checksum_hex, derive_file_key, encrypt, MasterKey};
use zeroize::Zeroizing;

use crate::clock::{Clock, SystemClock};
use crate::error::{QueueError, UploadError};
use crate::policy::RetryPolicy;
use crate::store::{EntryUpdate, QueueStore};
use crate::upload::Uploader;

/// A file handed to the queue. The plaintext is wiped once it is encrypted.
pub struct SharedFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl SharedFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }
}

impl std::fmt::Debug for SharedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedFile")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Outcome counts for one drain, over the entries that were eligible at its start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainSummary {
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Not yet due, rescheduled, or left alone after an auth failure
    pub pending: usize,
    pub total: usize,
    /// A 401 stopped the pass; nothing more will succeed until re-login
    pub auth_required: bool,
}

impl DrainSummary {
    /// Fold in the counts of a follow-up pass.
    ///
    /// `total` and `pending` are replaced rather than summed: an entry left
    /// pending by the first pass is seen again by the second.
    fn absorb(&mut self, next: DrainSummary) {
        self.completed += next.completed;
        self.failed += next.failed;
        self.skipped += next.skipped;
        self.pending = next.pending;
        self.total = self.completed + self.failed + self.skipped + self.pending;
        self.auth_required |= next.auth_required;
    }
}

pub struct UploadQueue<S: QueueStore> {
    store: Mutex<S>,
    uploader: Arc<dyn Uploader>,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
    drain_guard: Mutex<()>,
    rerun_requested: AtomicBool,
}

impl<S: QueueStore> UploadQueue<S> {
    pub fn new(store: S, uploader: Arc<dyn Uploader>, policy: RetryPolicy) -> Self {
        Self::with_clock(store, uploader, policy, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: S,
        uploader: Arc<dyn Uploader>,
        policy: RetryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store: Mutex::new(store),
            uploader,
            policy,
            clock,
            drain_guard: Mutex::new(()),
            rerun_requested: AtomicBool::new(false),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    // ── Enqueue ──────────────────────────────────────────────────────────

    /// Encrypt `file` under a key derived from `master_key` and its name, and
    /// persist it as an `Encrypted` entry. Nothing is stored on error.
    pub async fn enqueue(
        &self,
        file: SharedFile,
        secret_id: &SecretId,
        master_key: &MasterKey,
    ) -> Result<EntryId, QueueError> {
        let SharedFile {
            name,
            mime_type,
            bytes,
        } = file;
        let plaintext = Zeroizing::new(bytes);
        let plaintext_size = plaintext.len() as u64;

        let file_key = derive_file_key(master_key, &name)?;
        let payload = tokio::task::spawn_blocking(move || encrypt(&plaintext, &file_key))
            .await
            .map_err(|e| QueueError::Worker(e.to_string()))??;

        let mut entry = QueueEntry {
            id: EntryId::generate(),
            encrypted_blob: payload.to_blob(),
            metadata: FileMetadata {
                name,
                mime_type,
                plaintext_size,
                created_at_ms: self.clock.now_ms(),
            },
            secret_id: secret_id.clone(),
            checksum: String::new(),
            upload_state: UploadState::Pending,
            attempt_count: 0,
            last_attempt_at_ms: None,
        };
        entry.checksum = checksum_hex(&entry.encrypted_blob);
        entry.upload_state = UploadState::Encrypted;

        let id = entry.id;
        let blob_len = entry.encrypted_blob.len();
        self.store.lock().await.insert(entry)?;

        info!(entry = %id, secret = %secret_id, plaintext_size, blob_len, "file queued");
        Ok(id)
    }

    /// Enqueue each file independently; one failure does not stop the rest.
    pub async fn enqueue_batch(
        &self,
        files: Vec<SharedFile>,
        secret_id: &SecretId,
        master_key: &MasterKey,
    ) -> Vec<Result<EntryId, QueueError>> {
        let mut results = Vec::with_capacity(files.len());
        for file in files {
            let name = file.name.clone();
            let result = self.enqueue(file, secret_id, master_key).await;
            if let Err(ref e) = result {
                warn!(file = %name, "failed to queue file: {e}");
            }
            results.push(result);
        }
        results
    }

    // ── Drain ────────────────────────────────────────────────────────────

    /// Attempt every due entry once.
    ///
    /// Returns `Ok(None)` when another drain is already running; that drain
    /// will sweep the queue again before it returns.
    pub async fn drain(&self) -> Result<Option<DrainSummary>, QueueError> {
        let Some(mut guard) = self.claim_drain() else {
            debug!("drain already running, coalescing");
            return Ok(None);
        };

        let mut summary = self.drain_pass().await?;
        loop {
            while !summary.auth_required && self.rerun_requested.swap(false, Ordering::SeqCst) {
                debug!("drain requested during pass, sweeping again");
                let next = self.drain_pass().await?;
                summary.absorb(next);
            }
            drop(guard);

            // A request can land after the last swap but before the release.
            if summary.auth_required || !self.rerun_requested.load(Ordering::SeqCst) {
                break;
            }
            match self.drain_guard.try_lock() {
                Ok(next) => guard = next,
                Err(_) => break,
            }
        }

        info!(
            completed = summary.completed,
            failed = summary.failed,
            skipped = summary.skipped,
            pending = summary.pending,
            total = summary.total,
            auth_required = summary.auth_required,
            "drain complete"
        );
        Ok(Some(summary))
    }

    /// Take the drain guard, or leave a rerun request for whoever holds it.
    fn claim_drain(&self) -> Option<MutexGuard<'_, ()>> {
        let guard = match self.drain_guard.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                self.rerun_requested.store(true, Ordering::SeqCst);
                // The holder may have let go between the two checks.
                self.drain_guard.try_lock().ok()?
            }
        };
        // The pass about to run serves every request made before it.
        self.rerun_requested.store(false, Ordering::SeqCst);
        Some(guard)
    }

    async fn drain_pass(&self) -> Result<DrainSummary, QueueError> {
        // Holding the drain guard, any Uploading entry is left over from a crash.
        self.release_orphans().await?;

        let candidates = self
            .store
            .lock()
            .await
            .list_by_state(&[UploadState::Encrypted]);
        let mut summary = DrainSummary {
            total: candidates.len(),
            ..Default::default()
        };

        for entry in candidates {
            let now = self.clock.now_ms();

            if self.policy.retention_expired(&entry, now) {
                self.apply(&entry.id, EntryUpdate::MarkSkipped).await?;
                warn!(
                    entry = %entry.id,
                    attempts = entry.attempt_count,
                    "retention window exceeded, skipping"
                );
                summary.skipped += 1;
                continue;
            }

            if summary.auth_required || !self.policy.is_due(&entry, now) {
                summary.pending += 1;
                continue;
            }

            let claimed = self.apply(&entry.id, EntryUpdate::Claim { at_ms: now }).await?;
            let attempt = claimed.attempt_count;

            match self.uploader.upload(&claimed).await {
                Ok(ack) => {
                    self.apply(&claimed.id, EntryUpdate::MarkCompleted).await?;
                    self.store.lock().await.remove(&claimed.id)?;
                    info!(entry = %claimed.id, attempt, remote_id = ?ack.remote_id, "upload completed");
                    summary.completed += 1;
                }
                Err(UploadError::Unauthorized) => {
                    self.apply(&claimed.id, EntryUpdate::ReleaseClaim).await?;
                    warn!(entry = %claimed.id, "upload unauthorized, pausing drain until re-login");
                    summary.auth_required = true;
                    summary.pending += 1;
                }
                Err(e) if self.policy.attempts_exhausted(attempt) => {
                    self.apply(&claimed.id, EntryUpdate::MarkFailed).await?;
                    error!(entry = %claimed.id, attempt, "upload failed permanently: {e}");
                    summary.failed += 1;
                }
                Err(e) => {
                    self.apply(&claimed.id, EntryUpdate::Reschedule).await?;
                    let retry_in = self.policy.backoff(attempt);
                    warn!(
                        entry = %claimed.id,
                        attempt,
                        retry_in_ms = retry_in.as_millis() as u64,
                        "upload attempt failed: {e}"
                    );
                    summary.pending += 1;
                }
            }
        }

        Ok(summary)
    }

    async fn release_orphans(&self) -> Result<usize, QueueError> {
        let mut store = self.store.lock().await;
        let orphans = store.list_by_state(&[UploadState::Uploading]);
        for entry in &orphans {
            // The interrupted attempt counts; if it was the last one, the entry is done.
            if self.policy.attempts_exhausted(entry.attempt_count) {
                store.update(&entry.id, EntryUpdate::MarkFailed)?;
                error!(
                    entry = %entry.id,
                    attempts = entry.attempt_count,
                    "final upload attempt was interrupted, marking failed"
                );
            } else {
                store.update(&entry.id, EntryUpdate::Reschedule)?;
                warn!(entry = %entry.id, attempts = entry.attempt_count, "recovered interrupted upload");
            }
        }
        Ok(orphans.len())
    }

    /// Return entries left `Uploading` by an interrupted process to `Encrypted`,
    /// or to `Failed` when the interrupted attempt was the last one allowed.
    ///
    /// Drains do this themselves; call it on startup to get accurate status
    /// output before the first drain.
    pub async fn recover(&self) -> Result<usize, QueueError> {
        let Ok(guard) = self.drain_guard.try_lock() else {
            return Ok(0);
        };
        let recovered = self.release_orphans().await?;
        drop(guard);

        if self.rerun_requested.load(Ordering::SeqCst) {
            debug!("drain requested during recovery, draining now");
            self.drain().await?;
        }
        Ok(recovered)
    }

    async fn apply(&self, id: &EntryId, update: EntryUpdate) -> Result<QueueEntry, QueueError> {
        Ok(self.store.lock().await.update(id, update)?)
    }

    // ── Operator actions ─────────────────────────────────────────────────

    /// Give a failed or skipped entry a fresh attempt budget.
    pub async fn requeue(&self, id: &EntryId) -> Result<QueueEntry, QueueError> {
        let entry = self.apply(id, EntryUpdate::Requeue).await?;
        info!(entry = %id, "entry requeued");
        Ok(entry)
    }

    /// Permanently delete a failed or skipped entry.
    pub async fn discard(&self, id: &EntryId) -> Result<QueueEntry, QueueError> {
        let removed = self.store.lock().await.remove(id)?;
        info!(entry = %id, state = %removed.upload_state, "entry discarded");
        Ok(removed)
    }

    // ── Inspection ───────────────────────────────────────────────────────

    pub async fn entries(&self) -> Vec<QueueEntry> {
        self.store.lock().await.all()
    }

    pub async fn get(&self, id: &EntryId) -> Option<QueueEntry> {
        self.store.lock().await.get(id)
    }

    /// Time until the earliest retryable entry becomes due, if any.
    pub async fn next_due_in(&self) -> Option<Duration> {
        let now = self.clock.now_ms();
        self.store
            .lock()
            .await
            .list_by_state(&[UploadState::Encrypted])
            .iter()
            .map(|e| self.policy.next_attempt_at_ms(e).saturating_sub(now))
            .min()
            .map(Duration::from_millis)
    }
}
