//! Upload seam: one attempt to deliver an entry's blob to the backend.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use vd_core::QueueEntry;
use vd_net::{HttpRequest, ResilientClient};

use crate::error::UploadError;

/// What the backend returned for an accepted upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadAck {
    pub remote_id: Option<String>,
}

#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, entry: &QueueEntry) -> Result<UploadAck, UploadError>;
}

#[derive(Serialize)]
struct UploadBody<'a> {
    file_name: &'a str,
    mime_type: &'a str,
    size: u64,
    checksum: &'a str,
    /// base64 of `iv || tag || ciphertext`
    payload: String,
}

#[derive(Deserialize, Default)]
struct UploadReceipt {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    checksum: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
}

/// Uploads entries to the vault API through the resilient request layer.
pub struct ApiUploader {
    client: Arc<ResilientClient>,
    /// Path template containing `{secret_id}`
    upload_path: String,
}

impl ApiUploader {
    pub fn new(client: Arc<ResilientClient>, upload_path: impl Into<String>) -> Self {
        Self {
            client,
            upload_path: upload_path.into(),
        }
    }

    fn path_for(&self, entry: &QueueEntry) -> String {
        let secret = utf8_percent_encode(entry.secret_id.as_str(), NON_ALPHANUMERIC).to_string();
        self.upload_path.replace("{secret_id}", &secret)
    }
}

#[async_trait]
impl Uploader for ApiUploader {
    async fn upload(&self, entry: &QueueEntry) -> Result<UploadAck, UploadError> {
        let url = self
            .client
            .url(&self.path_for(entry))
            .map_err(|e| UploadError::Transport(e.to_string()))?;

        let body = UploadBody {
            file_name: &entry.metadata.name,
            mime_type: &entry.metadata.mime_type,
            size: entry.metadata.plaintext_size,
            checksum: &entry.checksum,
            payload: STANDARD.encode(&entry.encrypted_blob),
        };
        let request = HttpRequest::json(Method::POST, url, &body)
            .map_err(|e| UploadError::Transport(e.to_string()))?;

        let response = self
            .client
            .send(request)
            .await
            .map_err(|e| UploadError::Transport(e.to_string()))?;

        match response.status {
            status if status.is_success() => {
                let receipt: UploadReceipt = response.json().unwrap_or_default();
                if let Some(echoed) = receipt.checksum {
                    if !echoed.eq_ignore_ascii_case(&entry.checksum) {
                        return Err(UploadError::ChecksumMismatch);
                    }
                }
                debug!(entry = %entry.id, remote_id = ?receipt.id, "upload acknowledged");
                Ok(UploadAck {
                    remote_id: receipt.id,
                })
            }
            StatusCode::UNAUTHORIZED => Err(UploadError::Unauthorized),
            StatusCode::UNPROCESSABLE_ENTITY
                if response
                    .json::<ErrorBody>()
                    .ok()
                    .and_then(|b| b.error)
                    .as_deref()
                    == Some("checksum_mismatch") =>
            {
                Err(UploadError::ChecksumMismatch)
            }
            status => Err(UploadError::Rejected {
                status: status.as_u16(),
            }),
        }
    }
}
