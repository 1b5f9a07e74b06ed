//! Key hierarchy: per-secret master key → per-file key via HKDF-SHA256

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::error::CryptoError;
use crate::KEY_SIZE;

const FILE_KEY_DOMAIN: &[u8] = b"vaultdrop-file-key\0";

/// A 256-bit master key scoped to one secret.
///
/// Obtained from key custody on demand and never persisted. Zeroized on drop.
#[derive(Clone)]
pub struct MasterKey {
    bytes: [u8; KEY_SIZE],
}

impl MasterKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Build a master key from untrusted key material, checking its length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| {
            CryptoError::KeyDerivation(format!(
                "master key must be {KEY_SIZE} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for MasterKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// A per-file 256-bit encryption key. Zeroized on drop.
#[derive(Clone)]
pub struct FileKey {
    bytes: [u8; KEY_SIZE],
}

impl FileKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for FileKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for FileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Derive the file key for `file_name` from the secret's master key.
///
/// Deterministic: re-deriving for the same (master key, file name) pair
/// always yields the same key. The file name is the HKDF info context, so two
/// files under one master key never share a key.
pub fn derive_file_key(master: &MasterKey, file_name: &str) -> Result<FileKey, CryptoError> {
    if master.as_bytes().iter().all(|b| *b == 0) {
        return Err(CryptoError::KeyDerivation(
            "master key is empty (all-zero)".into(),
        ));
    }
    if file_name.is_empty() {
        return Err(CryptoError::KeyDerivation(
            "file name must not be empty".into(),
        ));
    }

    let mut info = Vec::with_capacity(FILE_KEY_DOMAIN.len() + file_name.len());
    info.extend_from_slice(FILE_KEY_DOMAIN);
    info.extend_from_slice(file_name.as_bytes());

    let hkdf = Hkdf::<Sha256>::new(None, master.as_bytes());
    let mut okm = [0u8; KEY_SIZE];
    hkdf.expand(&info, &mut okm)
        .map_err(|e| CryptoError::KeyDerivation(format!("HKDF expand failed: {e}")))?;

    let key = FileKey::from_bytes(okm);
    okm.zeroize();
    Ok(key)
}
