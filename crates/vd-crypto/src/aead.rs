//! File encryption/decryption with XChaCha20-Poly1305
//!
//! Blob format (binary):
//! ```text
//! [24 bytes: random nonce][16 bytes: Poly1305 tag][N bytes: ciphertext]
//! ```
//!
//! The tag is kept detached and stored ahead of the ciphertext so the blob
//! layout is `iv || tag || ciphertext`.

use chacha20poly1305::{
    aead::{AeadInPlace, KeyInit},
    Tag, XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::keys::FileKey;
use crate::{NONCE_SIZE, TAG_SIZE};

/// Output of one `encrypt` call.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedPayload {
    pub iv: [u8; NONCE_SIZE],
    pub tag: [u8; TAG_SIZE],
    pub ciphertext: Vec<u8>,
}

impl EncryptedPayload {
    /// Concatenate into the persisted blob form: `iv || tag || ciphertext`.
    pub fn to_blob(&self) -> Vec<u8> {
        let mut blob = Vec::with_capacity(NONCE_SIZE + TAG_SIZE + self.ciphertext.len());
        blob.extend_from_slice(&self.iv);
        blob.extend_from_slice(&self.tag);
        blob.extend_from_slice(&self.ciphertext);
        blob
    }

    /// Split a persisted blob back into its parts.
    pub fn from_blob(blob: &[u8]) -> Result<Self, CryptoError> {
        if blob.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::MalformedBlob(format!(
                "{} bytes (minimum {})",
                blob.len(),
                NONCE_SIZE + TAG_SIZE
            )));
        }

        let (iv_bytes, rest) = blob.split_at(NONCE_SIZE);
        let (tag_bytes, ciphertext) = rest.split_at(TAG_SIZE);

        let mut iv = [0u8; NONCE_SIZE];
        iv.copy_from_slice(iv_bytes);
        let mut tag = [0u8; TAG_SIZE];
        tag.copy_from_slice(tag_bytes);

        Ok(Self {
            iv,
            tag,
            ciphertext: ciphertext.to_vec(),
        })
    }
}

impl std::fmt::Debug for EncryptedPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedPayload")
            .field("ciphertext_len", &self.ciphertext.len())
            .finish_non_exhaustive()
    }
}

/// Encrypt `plaintext` under `file_key` with a fresh random nonce.
///
/// Every call draws a new 192-bit nonce, so repeated encryption of the same
/// plaintext under the same key never reuses an IV.
pub fn encrypt(plaintext: &[u8], file_key: &FileKey) -> Result<EncryptedPayload, CryptoError> {
    let cipher = XChaCha20Poly1305::new(file_key.as_bytes().into());

    let mut iv = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut iv);
    let nonce = XNonce::from_slice(&iv);

    // Holds plaintext until encryption succeeds; wiped if it does not.
    let mut buffer = Zeroizing::new(plaintext.to_vec());
    let tag = cipher
        .encrypt_in_place_detached(nonce, b"", &mut *buffer)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    let mut tag_bytes = [0u8; TAG_SIZE];
    tag_bytes.copy_from_slice(&tag);

    Ok(EncryptedPayload {
        iv,
        tag: tag_bytes,
        ciphertext: std::mem::take(&mut *buffer),
    })
}

/// Decrypt and authenticate a payload. Any tampering with the IV, tag or
/// ciphertext fails verification.
pub fn decrypt(payload: &EncryptedPayload, file_key: &FileKey) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(file_key.as_bytes().into());
    let nonce = XNonce::from_slice(&payload.iv);
    let tag = Tag::from_slice(&payload.tag);

    let mut buffer = payload.ciphertext.clone();
    cipher
        .decrypt_in_place_detached(nonce, b"", &mut buffer, tag)
        .map_err(|_| CryptoError::Decryption)?;
    Ok(buffer)
}
