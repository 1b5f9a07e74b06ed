//! vd-net: resilient request layer
//!
//! Wraps every outbound call with:
//!   - CSRF token attachment for state-changing methods
//!   - one-shot token refresh + retry on 419
//!   - online-aware session-expiry signaling on 401
//!
//! The transport, token store, session notifier and connectivity source are
//! all injected so the layer can be exercised without a network.

pub mod client;
pub mod csrf;
pub mod error;
pub mod session;
pub mod transport;

pub use client::{ClientConfig, ResilientClient};
pub use csrf::{CookieJarTokenStore, CsrfTokenStore, MemoryTokenStore};
pub use error::{RequestError, TransportError};
pub use session::{Connectivity, ConnectivityFlag, SessionBus, SessionEvent, SessionNotifier};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};

/// Status a backend sends when the CSRF token is missing or stale
pub const STATUS_CSRF_MISMATCH: u16 = 419;
