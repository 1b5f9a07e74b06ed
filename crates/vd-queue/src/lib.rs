//! vd-queue: durable, retrying upload queue for encrypted files
//!
//! ```text
//! enqueue:  plaintext → file key → encrypt → blob → checksum → store (Encrypted)
//! drain:    store(Encrypted) → retention/backoff check → Uploading → upload
//!             ├── ok           → Completed → removed
//!             ├── 401          → Encrypted (attempt not spent, pass stops)
//!             ├── error, < max → Encrypted (retry after backoff)
//!             └── error, = max → Failed (kept for the operator)
//!           stale entries      → Skipped (kept for the operator)
//! ```

pub mod clock;
pub mod error;
pub mod policy;
pub mod processor;
pub mod runner;
pub mod store;
pub mod upload;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{QueueError, StoreError, UploadError};
pub use policy::RetryPolicy;
pub use processor::{DrainSummary, SharedFile, UploadQueue};
pub use runner::QueueRunner;
pub use store::{EntryUpdate, JsonQueueStore, MemoryQueueStore, QueueStore};
pub use upload::{ApiUploader, UploadAck, Uploader};
