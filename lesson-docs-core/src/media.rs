//! Image references to bytes or an external fetch handle.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;
use url::Url;

use crate::model::MediaSource;

/// Resolves `src` values against the location of the page they came from.
///
/// Data URIs are decoded here; anything else becomes a [`MediaSource::Remote`]
/// that the assembler fetches (once, with a timeout) through a
/// [`MediaFetcher`](crate::contract::MediaFetcher).
#[derive(Debug, Clone, Default)]
pub struct MediaResolver {
    base: Option<Url>,
    skip_media: bool,
}

/// Why a reference produced no media.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unresolved {
    Skipped,
    MalformedDataUri,
    InvalidReference,
}

impl Unresolved {
    pub fn reason(&self) -> &'static str {
        match self {
            Unresolved::Skipped => "media skipped by configuration",
            Unresolved::MalformedDataUri => "malformed data URI",
            Unresolved::InvalidReference => "reference cannot be resolved to a URL",
        }
    }
}

impl MediaResolver {
    pub fn new(base: Option<Url>) -> Self {
        Self {
            base,
            skip_media: false,
        }
    }

    /// Resolver for a page stored at `path` on disk.
    pub fn for_file(path: &std::path::Path) -> Self {
        let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        Self::new(Url::from_file_path(absolute).ok())
    }

    /// Every reference resolves to nothing; images are left out entirely.
    pub fn skip_media(mut self, skip: bool) -> Self {
        self.skip_media = skip;
        self
    }

    pub fn base(&self) -> Option<&Url> {
        self.base.as_ref()
    }

    pub fn resolve(&self, reference: &str) -> Option<MediaSource> {
        self.try_resolve(reference).ok()
    }

    pub fn try_resolve(&self, reference: &str) -> Result<MediaSource, Unresolved> {
        if self.skip_media {
            return Err(Unresolved::Skipped);
        }
        let reference = reference.trim();
        if reference.starts_with("data:") {
            return decode_data_uri(reference)
                .map(MediaSource::Bytes)
                .ok_or(Unresolved::MalformedDataUri);
        }
        self.resolve_url(reference)
            .map(MediaSource::Remote)
            .ok_or(Unresolved::InvalidReference)
    }

    /// Absolute references are kept; relative ones are joined onto the base.
    pub fn resolve_url(&self, reference: &str) -> Option<Url> {
        match Url::parse(reference) {
            Ok(url) => Some(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base = self.base.as_ref()?;
                base.join(reference).ok()
            }
            Err(e) => {
                debug!(reference, error = ?e, "Unparsable media reference");
                None
            }
        }
    }
}

/// `data:image/<type>;base64,<payload>` to bytes.
fn decode_data_uri(uri: &str) -> Option<Vec<u8>> {
    let (header, payload) = uri.split_once(',')?;
    if !header.starts_with("data:image") || !header.ends_with(";base64") {
        return None;
    }
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD.decode(compact).ok()?;
    (!bytes.is_empty()).then_some(bytes)
}
