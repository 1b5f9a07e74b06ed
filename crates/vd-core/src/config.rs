use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{VdError, VdResult};

/// Top-level configuration (loaded from vaultdrop.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VdConfig {
    pub daemon: DaemonConfig,
    pub api: ApiConfig,
    pub queue: QueueConfig,
    pub crypto: CryptoConfig,
}

impl VdConfig {
    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist.
    pub fn load(path: &Path) -> VdResult<Self> {
        if !path.exists() {
            tracing::warn!(
                "config file not found: {}  (using defaults)",
                path.display()
            );
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| VdError::Config(format!("parsing {}: {e}", path.display())))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Log level (default: info)
    pub log_level: String,
    /// Log format: "json" or "text"
    pub log_format: String,
    /// Prometheus metrics endpoint (default: 127.0.0.1:9110)
    pub metrics_addr: Option<String>,
    /// Interval between background drain passes
    pub drain_interval_secs: u64,
}

/// Backend API and CSRF settings for the resilient request layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Upload endpoint; `{secret_id}` is substituted per entry
    pub upload_path: String,
    /// Token issuance endpoint hit after a 419
    pub csrf_path: String,
    /// Cookie carrying the CSRF token
    pub csrf_cookie: String,
    /// Request header the token is echoed in
    pub csrf_header: String,
    /// Per-request timeout ceiling
    pub request_timeout_secs: u64,
}

/// Upload queue persistence and retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// JSON queue store path
    pub store_path: PathBuf,
    /// Attempts before an entry is marked failed
    pub max_attempts: u32,
    /// Delay before the first retry
    pub backoff_base_ms: u64,
    /// Growth factor between successive retries
    pub backoff_multiplier: u32,
    /// Entries idle longer than this are skipped (default: 1440 = 24h)
    pub max_retention_minutes: u64,
}

/// Argon2id parameters for passphrase-based key custody
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Argon2id memory cost in KiB (default: 65536 = 64 MiB)
    pub argon2_mem_cost_kib: u32,
    /// Argon2id time cost (iterations, default: 3)
    pub argon2_time_cost: u32,
    /// Argon2id parallelism (default: 4)
    pub argon2_parallelism: u32,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            log_format: "text".into(),
            metrics_addr: Some("127.0.0.1:9110".into()),
            drain_interval_secs: 30,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".into(),
            upload_path: "/api/secrets/{secret_id}/files".into(),
            csrf_path: "/sanctum/csrf-cookie".into(),
            csrf_cookie: "XSRF-TOKEN".into(),
            csrf_header: "X-XSRF-TOKEN".into(),
            request_timeout_secs: 10,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("~/.local/share/vaultdrop/queue.json"),
            max_attempts: 5,
            backoff_base_ms: 1000,
            backoff_multiplier: 2,
            max_retention_minutes: 1440,
        }
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            argon2_mem_cost_kib: 65536,
            argon2_time_cost: 3,
            argon2_parallelism: 4,
        }
    }
}
