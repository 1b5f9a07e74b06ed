use thiserror::Error;

/// Local, per-file crypto failures. Messages never carry key material.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: invalid key or corrupted data")]
    Decryption,

    #[error("malformed encrypted blob: {0}")]
    MalformedBlob(String),

    #[error("key custody: {0}")]
    Custody(String),
}
