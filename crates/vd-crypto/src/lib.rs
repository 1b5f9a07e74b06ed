//! vd-crypto: client-side encryption for shared files
//!
//! Pipeline: plaintext → derive file key → XChaCha20-Poly1305 → BLAKE3 checksum of blob
//!
//! Key hierarchy:
//! ```text
//! Master Key (256-bit, one per secret, from key custody)
//!   └── File Key (HKDF-SHA256, info = "vaultdrop-file-key\0" || file name)
//!       └── AEAD: XChaCha20-Poly1305 (nonce = random 192-bit per call)
//! ```
//!
//! Blob layout: `[24-byte nonce][16-byte Poly1305 tag][ciphertext]`

pub mod aead;
pub mod checksum;
pub mod custody;
pub mod error;
pub mod keys;

pub use aead::{decrypt, encrypt, EncryptedPayload};
pub use checksum::{checksum_hex, verify_checksum};
pub use custody::{KdfParams, KeyCustody, PassphraseCustody};
pub use error::CryptoError;
pub use keys::{derive_file_key, FileKey, MasterKey};

/// Size of master and file keys in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;
