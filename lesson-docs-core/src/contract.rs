//! # contract: collaborator interfaces at the edge of the core
//!
//! The conversion engine itself is pure. The two places where it touches the
//! outside world are declared here as traits so that the pipeline can run
//! against real clients in the CLI and against `mockall` mocks in tests:
//!
//! - [`MediaFetcher`]: fetches the bytes behind a remote or relative image
//!   reference. One attempt per reference; the caller applies the timeout.
//! - [`RemoteStore`]: accepts a finished document and returns where it lives.
//!
//! Mocks are generated with `automock` and exported behind the
//! `test-export-mocks` feature so downstream crates can use them too.

use async_trait::async_trait;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;
use url::Url;

pub use crate::error::{FetchError, StoreError};

/// Identifier and link of a stored document.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StoredObject {
    pub id: String,
    pub link: Option<String>,
}

/// Media fetch collaborator.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Fetch the full body behind `url`.
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError>;
}

/// Remote store collaborator.
///
/// Implementors own authentication and transport; callers only see the
/// three failure kinds of [`StoreError`].
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Store `content` (a DOCX package) under `display_name`.
    async fn store_document(
        &self,
        display_name: &str,
        content: Vec<u8>,
    ) -> Result<StoredObject, StoreError>;
}
