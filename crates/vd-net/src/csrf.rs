//! CSRF token storage and extraction
//!
//! The backend issues the token as a cookie (`XSRF-TOKEN` by default). The
//! client echoes it back in a request header on state-changing calls.

use percent_encoding::percent_decode_str;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::SET_COOKIE;
use reqwest::Url;
use serde::Deserialize;
use std::sync::{Arc, RwLock};

use crate::transport::HttpResponse;

/// Cookie-like holder of the current CSRF token.
pub trait CsrfTokenStore: Send + Sync {
    fn token(&self) -> Option<String>;
    fn store(&self, token: &str);
}

/// In-process token store.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: RwLock<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: &str) -> Self {
        Self {
            token: RwLock::new(Some(token.to_string())),
        }
    }
}

impl CsrfTokenStore for MemoryTokenStore {
    fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn store(&self, token: &str) {
        *self
            .token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(token.to_string());
    }
}

/// Reads and writes the token cookie in the reqwest cookie jar the transport uses.
pub struct CookieJarTokenStore {
    jar: Arc<Jar>,
    url: Url,
    cookie_name: String,
}

impl CookieJarTokenStore {
    pub fn new(jar: Arc<Jar>, url: Url, cookie_name: impl Into<String>) -> Self {
        Self {
            jar,
            url,
            cookie_name: cookie_name.into(),
        }
    }
}

impl CsrfTokenStore for CookieJarTokenStore {
    fn token(&self) -> Option<String> {
        let header = self.jar.cookies(&self.url)?;
        let cookies = header.to_str().ok()?;
        cookies
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == self.cookie_name)
            .and_then(|(_, value)| decode_cookie_value(value))
    }

    fn store(&self, token: &str) {
        self.jar
            .add_cookie_str(&format!("{}={}; Path=/", self.cookie_name, token), &self.url);
    }
}

#[derive(Deserialize)]
struct TokenBody {
    #[serde(alias = "token")]
    csrf_token: String,
}

/// Pull a freshly issued token out of a token-endpoint response: the named
/// `Set-Cookie` first, then a JSON `csrf_token` / `token` field.
pub fn token_from_response(response: &HttpResponse, cookie_name: &str) -> Option<String> {
    let from_cookie = response
        .headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|cookie| cookie.split(';').next())
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .and_then(|(_, value)| decode_cookie_value(value));

    from_cookie.or_else(|| {
        response
            .json::<TokenBody>()
            .ok()
            .map(|b| b.csrf_token)
            .filter(|t| !t.is_empty())
    })
}

fn decode_cookie_value(raw: &str) -> Option<String> {
    let decoded = percent_decode_str(raw).decode_utf8().ok()?.into_owned();
    if decoded.is_empty() {
        None
    } else {
        Some(decoded)
    }
}
