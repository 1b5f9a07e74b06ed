//! Key custody: where per-secret master keys come from
//!
//! The queue never stores master keys. It asks a `KeyCustody` for one at
//! enqueue time and drops it as soon as the file key has been derived.

use argon2::{Algorithm, Argon2, Params, Version};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use vd_core::SecretId;
use zeroize::Zeroize;

use crate::error::CryptoError;
use crate::keys::MasterKey;
use crate::KEY_SIZE;

const SALT_DOMAIN: &[u8] = b"vaultdrop-secret-salt";

/// Source of master keys, one per secret.
#[async_trait]
pub trait KeyCustody: Send + Sync {
    async fn master_key(&self, secret_id: &SecretId) -> Result<MasterKey, CryptoError>;
}

/// Argon2id parameters for KDF
#[derive(Debug, Clone)]
pub struct KdfParams {
    /// Memory cost in KiB (default: 65536 = 64 MiB)
    pub mem_cost_kib: u32,
    /// Time cost / iterations (default: 3)
    pub time_cost: u32,
    /// Parallelism (default: 4)
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            mem_cost_kib: 65536,
            time_cost: 3,
            parallelism: 4,
        }
    }
}

impl From<&vd_core::config::CryptoConfig> for KdfParams {
    fn from(c: &vd_core::config::CryptoConfig) -> Self {
        Self {
            mem_cost_kib: c.argon2_mem_cost_kib,
            time_cost: c.argon2_time_cost,
            parallelism: c.argon2_parallelism,
        }
    }
}

/// Derives each secret's master key from an operator passphrase with Argon2id.
///
/// The salt is the first 16 bytes of `BLAKE3(domain || secret_id)`, so every
/// secret gets an independent master key from the same passphrase.
pub struct PassphraseCustody {
    passphrase: SecretString,
    params: KdfParams,
}

impl PassphraseCustody {
    pub fn new(passphrase: SecretString, params: KdfParams) -> Self {
        Self { passphrase, params }
    }

    fn derive(&self, secret_id: &SecretId) -> Result<MasterKey, CryptoError> {
        let argon2_params = Params::new(
            self.params.mem_cost_kib,
            self.params.time_cost,
            self.params.parallelism,
            Some(KEY_SIZE),
        )
        .map_err(|e| CryptoError::Custody(format!("invalid Argon2id params: {e}")))?;

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);
        let salt = secret_salt(secret_id);

        let mut key = [0u8; KEY_SIZE];
        argon2
            .hash_password_into(self.passphrase.expose_secret().as_bytes(), &salt, &mut key)
            .map_err(|e| CryptoError::Custody(format!("Argon2id KDF failed: {e}")))?;

        let master = MasterKey::from_bytes(key);
        key.zeroize();
        Ok(master)
    }
}

#[async_trait]
impl KeyCustody for PassphraseCustody {
    async fn master_key(&self, secret_id: &SecretId) -> Result<MasterKey, CryptoError> {
        tracing::debug!(secret = %secret_id, "deriving master key");
        self.derive(secret_id)
    }
}

fn secret_salt(secret_id: &SecretId) -> [u8; 16] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(SALT_DOMAIN);
    hasher.update(secret_id.as_str().as_bytes());
    let digest = hasher.finalize();
    let mut salt = [0u8; 16];
    salt.copy_from_slice(&digest.as_bytes()[..16]);
    salt
}
