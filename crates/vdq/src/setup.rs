//! Wiring: config, queue store, request layer and key custody.

use anyhow::{anyhow, Context, Result};
use reqwest::cookie::Jar;
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use vd_core::config::VdConfig;
use vd_core::QueueEntry;
use vd_crypto::{KdfParams, PassphraseCustody};
use vd_net::{
    ClientConfig, ConnectivityFlag, CookieJarTokenStore, ReqwestTransport, ResilientClient,
    SessionBus,
};
use vd_queue::{ApiUploader, JsonQueueStore, RetryPolicy, StoreError, UploadQueue};

pub const PASSPHRASE_ENV: &str = "VDQ_PASSPHRASE";
/// Optional `name=value` session cookie seeded into the jar
pub const SESSION_COOKIE_ENV: &str = "VDQ_SESSION_COOKIE";

pub type Queue = UploadQueue<JsonQueueStore>;

/// Everything a command or the daemon needs to talk to the queue and backend.
pub struct Services {
    pub queue: Arc<Queue>,
    pub client: Arc<ResilientClient>,
    pub session: SessionBus,
    /// Tracks backend reachability from request outcomes
    pub connectivity: Arc<ConnectivityFlag>,
}

pub fn load_config(path: &Path) -> Result<VdConfig> {
    VdConfig::load(path).with_context(|| format!("loading config {}", path.display()))
}

pub fn build(config: &VdConfig) -> Result<Services> {
    let store_path = expand_tilde(&config.queue.store_path);
    let store = JsonQueueStore::open(&store_path).map_err(|e| match e {
        StoreError::Locked { .. } => anyhow!(
            "queue store {} is owned by another vdq process (is `vdq daemon` running?)",
            store_path.display()
        ),
        other => anyhow::Error::new(other)
            .context(format!("opening queue store {}", store_path.display())),
    })?;

    let client_config =
        ClientConfig::from_api_config(&config.api).context("invalid [api] configuration")?;

    let jar = Arc::new(Jar::default());
    if let Ok(cookie) = std::env::var(SESSION_COOKIE_ENV) {
        jar.add_cookie_str(&format!("{cookie}; Path=/"), &client_config.base_url);
    }
    let transport = ReqwestTransport::new(
        Duration::from_secs(config.api.request_timeout_secs),
        jar.clone(),
    )
    .context("building HTTP client")?;
    let tokens = CookieJarTokenStore::new(
        jar,
        client_config.base_url.clone(),
        config.api.csrf_cookie.clone(),
    );

    let session = SessionBus::default();
    let connectivity = Arc::new(ConnectivityFlag::default());
    let client = Arc::new(ResilientClient::new(
        client_config,
        Arc::new(transport),
        Arc::new(tokens),
        Arc::new(session.clone()),
        connectivity.clone(),
    ));

    let uploader = ApiUploader::new(client.clone(), config.api.upload_path.clone());
    let queue = UploadQueue::new(store, Arc::new(uploader), RetryPolicy::from(&config.queue));

    Ok(Services {
        queue: Arc::new(queue),
        client,
        session,
        connectivity,
    })
}

/// Read the queue without taking ownership of the store, so it works while
/// the daemon is running.
pub fn snapshot(config: &VdConfig) -> Result<Vec<QueueEntry>> {
    let store_path = expand_tilde(&config.queue.store_path);
    JsonQueueStore::snapshot(&store_path)
        .with_context(|| format!("reading queue store {}", store_path.display()))
}

/// Master-key custody backed by the operator passphrase in `VDQ_PASSPHRASE`.
pub fn custody(config: &VdConfig) -> Result<PassphraseCustody> {
    let passphrase = std::env::var(PASSPHRASE_ENV)
        .with_context(|| format!("{PASSPHRASE_ENV} must be set to derive master keys"))?;
    Ok(PassphraseCustody::new(
        SecretString::from(passphrase),
        KdfParams::from(&config.crypto),
    ))
}

/// Expand a leading `~/` to $HOME.
pub fn expand_tilde(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => {
            let home = std::env::var("HOME").unwrap_or_default();
            PathBuf::from(home).join(rest)
        }
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_tilde() {
        let home = std::env::var("HOME").unwrap_or_default();
        assert_eq!(
            expand_tilde(Path::new("~/q/queue.json")),
            PathBuf::from(&home).join("q/queue.json")
        );
        assert_eq!(
            expand_tilde(Path::new("/var/lib/q.json")),
            PathBuf::from("/var/lib/q.json")
        );
        assert_eq!(
            expand_tilde(Path::new("relative/q.json")),
            PathBuf::from("relative/q.json")
        );
    }

    #[test]
    fn test_build_opens_store_at_configured_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = VdConfig::default();
        config.queue.store_path = dir.path().join("queue.json");

        let services = build(&config).unwrap();
        assert_eq!(services.queue.policy().max_attempts, config.queue.max_attempts);
    }

    #[test]
    fn test_second_build_reports_owner() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = VdConfig::default();
        config.queue.store_path = dir.path().join("queue.json");

        let _daemon = build(&config).unwrap();
        let err = build(&config).err().unwrap();
        assert!(err.to_string().contains("owned by another vdq process"), "{err}");
        assert!(snapshot(&config).unwrap().is_empty());
    }
}
