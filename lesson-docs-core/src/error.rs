//! Error types shared across the core crate.

use std::path::PathBuf;

use thiserror::Error;

/// Structural failure converting one lesson page.
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("malformed input: {0}")]
    MalformedInput(String),
}

/// Failure writing a DOCX package.
#[derive(Error, Debug)]
pub enum AssembleError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Failure merging several DOCX packages into one.
#[derive(Error, Debug)]
pub enum MergeError {
    #[error("no .docx files to merge")]
    NoDocuments,

    #[error("{path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("UTF-8 decoding error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error(transparent)]
    Assemble(#[from] AssembleError),
}

/// Failure of the media fetch collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP status {0}")]
    Http(u16),

    #[error("timed out")]
    Timeout,
}

/// Failure of the remote store collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("quota exceeded: {0}")]
    Quota(String),

    #[error("network error: {0}")]
    Network(String),
}

/// Failure of a pipeline step, or of one document within a batch.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Convert(#[from] ConvertError),

    #[error(transparent)]
    Assemble(#[from] AssembleError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
