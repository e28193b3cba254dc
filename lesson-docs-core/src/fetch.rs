//! Real media fetch collaborator: HTTP(S) via reqwest, `file://` from disk.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, error};
use url::Url;

use crate::contract::MediaFetcher;
use crate::error::FetchError;

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

pub struct HttpMediaFetcher {
    client: Client,
}

impl HttpMediaFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl MediaFetcher for HttpMediaFetcher {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        match url.scheme() {
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| FetchError::Network(format!("not a local path: {url}")))?;
                debug!(path = %path.display(), "Reading local media");
                tokio::fs::read(&path)
                    .await
                    .map_err(|e| FetchError::Network(e.to_string()))
            }
            "http" | "https" => {
                let response = self.client.get(url.as_str()).send().await.map_err(|e| {
                    error!(url = %url, error = ?e, "Media request failed");
                    if e.is_timeout() {
                        FetchError::Timeout
                    } else {
                        FetchError::Network(e.to_string())
                    }
                })?;
                let status = response.status();
                if !status.is_success() {
                    error!(url = %url, status = %status, "Media server returned error");
                    return Err(FetchError::Http(status.as_u16()));
                }
                let bytes = response.bytes().await.map_err(|e| {
                    if e.is_timeout() {
                        FetchError::Timeout
                    } else {
                        FetchError::Network(e.to_string())
                    }
                })?;
                debug!(url = %url, size = bytes.len(), "Fetched media");
                Ok(bytes.to_vec())
            }
            other => Err(FetchError::Network(format!("unsupported scheme: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn reads_file_urls_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"GIF89a....").unwrap();
        let url = Url::from_file_path(file.path()).unwrap();

        let fetcher = HttpMediaFetcher::new(DEFAULT_FETCH_TIMEOUT).unwrap();
        assert_eq!(fetcher.fetch(&url).await.unwrap(), b"GIF89a....".to_vec());
    }

    #[tokio::test]
    async fn missing_file_is_a_fetch_error() {
        let dir = tempfile::tempdir().unwrap();
        let url = Url::from_file_path(dir.path().join("absent.png")).unwrap();

        let fetcher = HttpMediaFetcher::new(DEFAULT_FETCH_TIMEOUT).unwrap();
        assert!(matches!(
            fetcher.fetch(&url).await,
            Err(FetchError::Network(_))
        ));
    }

    #[tokio::test]
    async fn unsupported_scheme_is_rejected() {
        let url = Url::parse("ftp://example.com/a.png").unwrap();
        let fetcher = HttpMediaFetcher::new(DEFAULT_FETCH_TIMEOUT).unwrap();
        assert!(fetcher.fetch(&url).await.is_err());
    }
}
