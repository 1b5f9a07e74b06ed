#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, Semaphore};

use vd_core::{EntryId, QueueEntry};
use vd_crypto::MasterKey;
use vd_queue::{
    ManualClock, MemoryQueueStore, QueueStore, RetryPolicy, SharedFile, UploadAck, UploadError,
    UploadQueue, Uploader,
};

pub const START_MS: u64 = 1_700_000_000_000;

#[derive(Debug, Clone, Copy)]
pub enum Outcome {
    Accept,
    Transport,
    Reject(u16),
    Unauthorized,
    ChecksumMismatch,
}

impl Outcome {
    fn into_result(self) -> Result<UploadAck, UploadError> {
        match self {
            Outcome::Accept => Ok(UploadAck {
                remote_id: Some("remote-1".into()),
            }),
            Outcome::Transport => Err(UploadError::Transport("connection refused".into())),
            Outcome::Reject(status) => Err(UploadError::Rejected { status }),
            Outcome::Unauthorized => Err(UploadError::Unauthorized),
            Outcome::ChecksumMismatch => Err(UploadError::ChecksumMismatch),
        }
    }
}

/// Snapshot of an entry as the uploader saw it.
#[derive(Debug, Clone)]
pub struct Call {
    pub id: EntryId,
    pub name: String,
    pub attempt: u32,
    pub at_ms: Option<u64>,
    pub entry: QueueEntry,
}

/// Plays scripted outcomes in order, then the fallback forever.
pub struct ScriptedUploader {
    script: Mutex<VecDeque<Outcome>>,
    fallback: Outcome,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedUploader {
    pub fn new(script: Vec<Outcome>, fallback: Outcome) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn always(outcome: Outcome) -> Arc<Self> {
        Self::new(Vec::new(), outcome)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Uploader for ScriptedUploader {
    async fn upload(&self, entry: &QueueEntry) -> Result<UploadAck, UploadError> {
        self.calls.lock().unwrap().push(Call {
            id: entry.id,
            name: entry.metadata.name.clone(),
            attempt: entry.attempt_count,
            at_ms: entry.last_attempt_at_ms,
            entry: entry.clone(),
        });
        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback);
        outcome.into_result()
    }
}

/// Blocks every upload until permits are released, announcing entry first.
pub struct GatedUploader {
    pub entered: Notify,
    pub gate: Semaphore,
    calls: Mutex<Vec<EntryId>>,
}

impl GatedUploader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entered: Notify::new(),
            gate: Semaphore::new(0),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<EntryId> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Uploader for GatedUploader {
    async fn upload(&self, entry: &QueueEntry) -> Result<UploadAck, UploadError> {
        self.calls.lock().unwrap().push(entry.id);
        self.entered.notify_one();
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| UploadError::Transport(e.to_string()))?;
        permit.forget();
        Ok(UploadAck::default())
    }
}

pub fn master_key() -> MasterKey {
    MasterKey::from_bytes([0x42; 32])
}

pub fn text_file(name: &str, body: &str) -> SharedFile {
    SharedFile::new(name, "text/plain", body.as_bytes().to_vec())
}

pub fn memory_queue(
    uploader: Arc<dyn Uploader>,
    policy: RetryPolicy,
) -> (UploadQueue<MemoryQueueStore>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(START_MS));
    let queue = UploadQueue::with_clock(MemoryQueueStore::new(), uploader, policy, clock.clone());
    (queue, clock)
}

pub async fn only_entry<S: QueueStore>(queue: &UploadQueue<S>) -> QueueEntry {
    let entries = queue.entries().await;
    assert_eq!(entries.len(), 1, "expected exactly one entry");
    entries.into_iter().next().unwrap()
}
