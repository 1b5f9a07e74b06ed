//! `ResilientClient`: CSRF-aware, session-aware request dispatch
//!
//! Response handling:
//!   - 419: refresh the token once via the token endpoint, then reissue the
//!     original request exactly once. A second 419 goes back to the caller.
//!   - 401 while online: publish `session:expired`, return the response.
//!   - 401 while offline: return the response silently (likely a stale cache).
//!
//! Every exchange is reported to the `Connectivity` source: a connect failure
//! or timeout marks the client offline, and a completed `send` marks it
//! online again once the 401 decision above has been made.

use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{StatusCode, Url};
use std::sync::Arc;
use tracing::{debug, warn};
use vd_core::config::ApiConfig;

use crate::csrf::{token_from_response, CsrfTokenStore};
use crate::error::{RequestError, TransportError};
use crate::session::{Connectivity, SessionNotifier};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};
use crate::STATUS_CSRF_MISMATCH;

/// Endpoint and header names the client works with.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: Url,
    pub csrf_path: String,
    pub csrf_cookie: String,
    pub csrf_header: HeaderName,
}

impl ClientConfig {
    pub fn from_api_config(api: &ApiConfig) -> Result<Self, RequestError> {
        let csrf_header = HeaderName::from_bytes(api.csrf_header.as_bytes()).map_err(|e| {
            RequestError::Csrf(format!("invalid CSRF header name '{}': {e}", api.csrf_header))
        })?;
        Ok(Self {
            base_url: Url::parse(&api.base_url)?,
            csrf_path: api.csrf_path.clone(),
            csrf_cookie: api.csrf_cookie.clone(),
            csrf_header,
        })
    }
}

pub struct ResilientClient {
    config: ClientConfig,
    transport: Arc<dyn HttpTransport>,
    csrf: Arc<dyn CsrfTokenStore>,
    notifier: Arc<dyn SessionNotifier>,
    connectivity: Arc<dyn Connectivity>,
}

impl ResilientClient {
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn HttpTransport>,
        csrf: Arc<dyn CsrfTokenStore>,
        notifier: Arc<dyn SessionNotifier>,
        connectivity: Arc<dyn Connectivity>,
    ) -> Self {
        Self {
            config,
            transport,
            csrf,
            notifier,
            connectivity,
        }
    }

    /// Resolve a path (absolute or relative) against the configured base URL.
    pub fn url(&self, path: &str) -> Result<Url, RequestError> {
        Ok(self.config.base_url.join(path)?)
    }

    /// Send a request through the CSRF and session handling described above.
    ///
    /// Non-2xx responses are returned as `Ok`; only a missing response
    /// (`Transport`) or a failed token refresh (`Csrf`) is an `Err`.
    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse, RequestError> {
        let mut response = self.dispatch(request.clone()).await?;

        if response.status.as_u16() == STATUS_CSRF_MISMATCH {
            debug!(url = %request.url, "CSRF mismatch, refreshing token");
            self.refresh_csrf_token().await?;

            response = self.dispatch(request.clone()).await?;
            if response.status.as_u16() == STATUS_CSRF_MISMATCH {
                warn!(url = %request.url, "CSRF mismatch persisted after token refresh");
            }
        }

        if response.status == StatusCode::UNAUTHORIZED {
            if self.connectivity.is_online() {
                warn!(url = %request.url, "401 while online");
                self.notifier.session_expired();
            } else {
                debug!(url = %request.url, "401 while offline, not treating as session expiry");
            }
        }
        self.connectivity.observe(true);

        Ok(response)
    }

    /// Check whether the backend answers at all, updating connectivity.
    ///
    /// Any response counts, whatever its status.
    pub async fn check_reachable(&self) -> bool {
        let Ok(url) = self.url(&self.config.csrf_path) else {
            return false;
        };
        match self.execute(HttpRequest::get(url)).await {
            Ok(_) => {
                self.connectivity.observe(true);
                true
            }
            Err(e) => {
                debug!("reachability check failed: {e}");
                false
            }
        }
    }

    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let result = self.transport.execute(request).await;
        if let Err(TransportError::Connect(_) | TransportError::Timeout) = result {
            self.connectivity.observe(false);
        }
        result
    }

    async fn dispatch(&self, mut request: HttpRequest) -> Result<HttpResponse, RequestError> {
        if request.is_state_changing() {
            if let Some(token) = self.csrf.token() {
                let value = HeaderValue::from_str(&token).map_err(|_| {
                    RequestError::Csrf("stored token is not a valid header value".into())
                })?;
                request
                    .headers
                    .insert(self.config.csrf_header.clone(), value);
            }
        }
        Ok(self.execute(request).await?)
    }

    /// Fetch a fresh token from the issuance endpoint into the token store.
    async fn refresh_csrf_token(&self) -> Result<(), RequestError> {
        let url = self.url(&self.config.csrf_path)?;
        let response = self
            .execute(HttpRequest::get(url))
            .await
            .map_err(|e| RequestError::Csrf(e.to_string()))?;

        if !response.is_success() {
            return Err(RequestError::Csrf(format!(
                "token endpoint returned {}",
                response.status
            )));
        }

        if let Some(token) = token_from_response(&response, &self.config.csrf_cookie) {
            self.csrf.store(&token);
            return Ok(());
        }

        // A cookie-jar store may already have picked the cookie up from the transport.
        if self.csrf.token().is_some() {
            Ok(())
        } else {
            Err(RequestError::Csrf("token endpoint issued no token".into()))
        }
    }
}
