#![doc = "Google Drive implementation of the remote store used by `publish`."]
//
//! # Drive upload
//!
//! [`DriveClient`] implements [`RemoteStore`] with a single multipart upload
//! to the Drive v3 API. The uploaded DOCX is converted to a Google Doc and
//! named after the merged file's stem; the response carries the new file's
//! id and its web link.
//!
//! ## Client Usage
//!
//! - Construct [`DriveClient`] from the environment (`GOOGLE_DRIVE_ACCESS_TOKEN`,
//!   optionally `GOOGLE_DRIVE_FOLDER_ID`), which may come from a `.env` file.
//! - Failures are reported as [`StoreError::Auth`], [`StoreError::Quota`] or
//!   [`StoreError::Network`].

use std::env;

use async_trait::async_trait;
use lesson_docs_core::contract::{RemoteStore, StoreError, StoredObject};
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

pub const ACCESS_TOKEN_ENV: &str = "GOOGLE_DRIVE_ACCESS_TOKEN";
pub const FOLDER_ID_ENV: &str = "GOOGLE_DRIVE_FOLDER_ID";

pub const DRIVE_UPLOAD_URL: &str =
    "https://www.googleapis.com/upload/drive/v3/files?uploadType=multipart&fields=id,webViewLink";
pub const GOOGLE_DOC_MIME: &str = "application/vnd.google-apps.document";
pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

pub struct DriveClient {
    http: reqwest::Client,
    access_token: String,
    folder_id: Option<String>,
    upload_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    web_view_link: Option<String>,
}

impl DriveClient {
    pub fn new(access_token: impl Into<String>, folder_id: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            access_token: access_token.into(),
            folder_id,
            upload_url: DRIVE_UPLOAD_URL.to_string(),
        }
    }

    pub fn new_from_env() -> Result<Self, StoreError> {
        dotenvy::dotenv().ok(); // loads environment variables from .env if present
        let access_token = match env::var(ACCESS_TOKEN_ENV) {
            Ok(token) if !token.trim().is_empty() => token,
            Ok(_) | Err(_) => {
                tracing::error!("{ACCESS_TOKEN_ENV} missing in environment");
                return Err(StoreError::Auth(format!("{ACCESS_TOKEN_ENV} is not set")));
            }
        };
        let folder_id = env::var(FOLDER_ID_ENV).ok().filter(|id| !id.trim().is_empty());
        tracing::info!(
            folder_set = folder_id.is_some(),
            "Initialized DriveClient from environment"
        );
        Ok(Self::new(access_token, folder_id))
    }

    /// Points the client at a different upload endpoint.
    pub fn with_upload_url(mut self, url: impl Into<String>) -> Self {
        self.upload_url = url.into();
        self
    }
}

#[async_trait]
impl RemoteStore for DriveClient {
    async fn store_document(
        &self,
        display_name: &str,
        content: Vec<u8>,
    ) -> Result<StoredObject, StoreError> {
        tracing::info!(
            name = display_name,
            size = content.len(),
            "Uploading document to Drive"
        );
        let mut metadata = json!({
            "name": display_name,
            "mimeType": GOOGLE_DOC_MIME,
        });
        if let Some(folder) = &self.folder_id {
            metadata["parents"] = json!([folder]);
        }

        let boundary = format!("lesson-docs-{}", Uuid::new_v4().simple());
        let body = multipart_body(&boundary, &metadata.to_string(), &content);

        let response = self
            .http
            .post(&self.upload_url)
            .bearer_auth(&self.access_token)
            .header(
                CONTENT_TYPE,
                format!("multipart/related; boundary={boundary}"),
            )
            .body(body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, "Drive request failed");
                StoreError::Network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %text, "Drive rejected upload");
            return Err(classify_failure(status.as_u16(), &text));
        }

        let file: DriveFile = response.json().await.map_err(|e| {
            tracing::error!(error = ?e, "Unreadable Drive response");
            StoreError::Network(format!("unreadable response: {e}"))
        })?;
        tracing::info!(id = %file.id, link = ?file.web_view_link, "Uploaded to Google Docs");
        Ok(StoredObject {
            id: file.id,
            link: file.web_view_link,
        })
    }
}

/// `multipart/related` body: JSON metadata part, then the DOCX bytes.
fn multipart_body(boundary: &str, metadata: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(content.len() + metadata.len() + 256);
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("--{boundary}\r\nContent-Type: {DOCX_MIME}\r\n\r\n").as_bytes());
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

/// Maps a failed Drive response to the store failure kinds.
pub fn classify_failure(status: u16, body: &str) -> StoreError {
    let quota_reason = ["storageQuotaExceeded", "quotaExceeded", "rateLimitExceeded"]
        .iter()
        .any(|reason| body.contains(reason));
    match status {
        401 => StoreError::Auth(format!("HTTP {status}")),
        403 if quota_reason => StoreError::Quota(format!("HTTP {status}")),
        403 => StoreError::Auth(format!("HTTP {status}")),
        429 => StoreError::Quota(format!("HTTP {status}")),
        _ => StoreError::Network(format!("HTTP {status}: {body}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_map_to_store_errors() {
        assert!(matches!(classify_failure(401, ""), StoreError::Auth(_)));
        assert!(matches!(
            classify_failure(403, r#"{"error":{"errors":[{"reason":"storageQuotaExceeded"}]}}"#),
            StoreError::Quota(_)
        ));
        assert!(matches!(
            classify_failure(403, r#"{"error":{"errors":[{"reason":"insufficientPermissions"}]}}"#),
            StoreError::Auth(_)
        ));
        assert!(matches!(classify_failure(429, ""), StoreError::Quota(_)));
        assert!(matches!(classify_failure(503, "busy"), StoreError::Network(_)));
    }

    #[test]
    fn multipart_body_frames_metadata_and_content() {
        let body = multipart_body("XYZ", r#"{"name":"course"}"#, b"PK\x03\x04");
        let text = String::from_utf8_lossy(&body);
        assert!(text.starts_with("--XYZ\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{\"name\":\"course\"}\r\n"));
        assert!(text.contains(&format!("--XYZ\r\nContent-Type: {DOCX_MIME}\r\n\r\nPK")));
        assert!(text.ends_with("\r\n--XYZ--\r\n"));
    }
}
