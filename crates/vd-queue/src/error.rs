use std::path::PathBuf;
use thiserror::Error;
use vd_core::{EntryId, UploadState};
use vd_crypto::CryptoError;

/// Integrity/programmer errors from the queue store. Never retried.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("entry {0} already exists")]
    DuplicateId(EntryId),

    #[error("entry {0} not found")]
    NotFound(EntryId),

    #[error("illegal transition for entry {id}: {update} from {from}")]
    IllegalTransition {
        id: EntryId,
        from: UploadState,
        update: &'static str,
    },

    #[error("queue store {} is in use by another process", .path.display())]
    Locked {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("unsupported queue store version {0}")]
    UnsupportedVersion(u32),

    #[error("queue store I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("queue store encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Outcome of a failed upload attempt, as seen by the retry policy.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload transport failed: {0}")]
    Transport(String),

    #[error("server rejected upload with status {status}")]
    Rejected { status: u16 },

    #[error("server reported checksum mismatch")]
    ChecksumMismatch,

    #[error("not authenticated")]
    Unauthorized,
}

/// Errors surfaced synchronously to queue callers.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("encryption worker failed: {0}")]
    Worker(String),
}
