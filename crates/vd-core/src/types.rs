use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Locally generated identifier of a queue entry. Assigned once, never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(Uuid);

impl EntryId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of the destination secret (vault entry) a file is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretId(String);

impl SecretId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SecretId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

/// Descriptive metadata captured at enqueue time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Original file name (also the key-derivation context)
    pub name: String,
    pub mime_type: String,
    /// Size of the plaintext before encryption
    pub plaintext_size: u64,
    /// Unix timestamp (ms) at which the entry was created
    pub created_at_ms: u64,
}

/// Upload lifecycle of a queue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    /// Ciphertext exists, checksum not yet computed
    Pending,
    /// Checksummed, durably stored, ready to upload
    Encrypted,
    /// Upload request in flight
    Uploading,
    /// Server acknowledged receipt and checksum
    Completed,
    /// Attempts exhausted
    Failed,
    /// Abandoned after the retention window
    Skipped,
}

impl UploadState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            UploadState::Completed | UploadState::Failed | UploadState::Skipped
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UploadState::Pending => "pending",
            UploadState::Encrypted => "encrypted",
            UploadState::Uploading => "uploading",
            UploadState::Completed => "completed",
            UploadState::Failed => "failed",
            UploadState::Skipped => "skipped",
        }
    }
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// The unit of durable queue state.
///
/// `encrypted_blob`, `metadata`, `secret_id` and `checksum` never change after
/// creation. Only `upload_state`, `attempt_count` and `last_attempt_at_ms` are
/// mutated, and only by the queue store's update operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: EntryId,
    /// `iv || tag || ciphertext`
    #[serde(with = "base64_bytes")]
    pub encrypted_blob: Vec<u8>,
    pub metadata: FileMetadata,
    pub secret_id: SecretId,
    /// BLAKE3 hex digest of `encrypted_blob`
    pub checksum: String,
    pub upload_state: UploadState,
    pub attempt_count: u32,
    #[serde(default)]
    pub last_attempt_at_ms: Option<u64>,
}

impl QueueEntry {
    /// Reference time for retention: the last attempt, or creation if never attempted.
    pub fn last_activity_ms(&self) -> u64 {
        self.last_attempt_at_ms.unwrap_or(self.metadata.created_at_ms)
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry() -> QueueEntry {
        QueueEntry {
            id: EntryId::generate(),
            encrypted_blob: vec![0xde, 0xad, 0xbe, 0xef],
            metadata: FileMetadata {
                name: "report.pdf".into(),
                mime_type: "application/pdf".into(),
                plaintext_size: 4,
                created_at_ms: 1_700_000_000_000,
            },
            secret_id: SecretId::new("secret-42"),
            checksum: "00".repeat(32),
            upload_state: UploadState::Encrypted,
            attempt_count: 0,
            last_attempt_at_ms: None,
        }
    }

    #[test]
    fn entry_json_keeps_blob_as_base64() {
        let entry = sample_entry();
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"3q2+7w==\""), "blob must be base64: {json}");
        assert!(json.contains("\"encrypted\""));

        let back: QueueEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn last_activity_falls_back_to_creation() {
        let mut entry = sample_entry();
        assert_eq!(entry.last_activity_ms(), 1_700_000_000_000);
        entry.last_attempt_at_ms = Some(1_700_000_100_000);
        assert_eq!(entry.last_activity_ms(), 1_700_000_100_000);
    }

    #[test]
    fn terminal_states() {
        assert!(UploadState::Completed.is_terminal());
        assert!(UploadState::Failed.is_terminal());
        assert!(UploadState::Skipped.is_terminal());
        assert!(!UploadState::Encrypted.is_terminal());
        assert!(!UploadState::Uploading.is_terminal());
        assert!(!UploadState::Pending.is_terminal());
    }

    #[test]
    fn entry_id_parse_display() {
        let id = EntryId::generate();
        let parsed = EntryId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
        assert!(EntryId::parse("not-a-uuid").is_err());
    }
}
