pub mod config;
pub mod error;
pub mod types;

pub use error::{VdError, VdResult};
pub use types::{EntryId, FileMetadata, QueueEntry, SecretId, UploadState};
