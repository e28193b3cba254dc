//! Structured-document model produced by the classifier and consumed by the assembler.

use url::Url;

/// Inline formatting flags, inherited from enclosing emphasis wrappers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Formatting {
    pub bold: bool,
    pub italic: bool,
}

impl Formatting {
    pub fn with_bold(self) -> Self {
        Self { bold: true, ..self }
    }

    pub fn with_italic(self) -> Self {
        Self {
            italic: true,
            ..self
        }
    }
}

/// Where the bytes of an image come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    /// Decoded in place from a data URI.
    Bytes(Vec<u8>),
    /// Must be fetched by the assembler.
    Remote(Url),
}

impl MediaSource {
    /// Short description for logs and diagnostics; never dumps the bytes.
    pub fn describe(&self) -> String {
        match self {
            MediaSource::Bytes(bytes) => format!("<inline data, {} bytes>", bytes.len()),
            MediaSource::Remote(url) => url.to_string(),
        }
    }
}

/// An image with its optional size in inches.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRun {
    pub source: MediaSource,
    pub width: Option<f64>,
    pub height: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunContent {
    Text(String),
    Hyperlink { text: String, target: String },
    Image(ImageRun),
}

/// A contiguous span of inline content with its formatting.
#[derive(Debug, Clone, PartialEq)]
pub struct StyledRun {
    pub content: RunContent,
    pub format: Formatting,
}

impl StyledRun {
    pub fn text(text: impl Into<String>, format: Formatting) -> Self {
        Self {
            content: RunContent::Text(text.into()),
            format,
        }
    }

    /// Plain single space used to keep words apart around links and emphasis.
    pub fn separator() -> Self {
        Self::text(" ", Formatting::default())
    }

    /// True when the run renders as nothing but whitespace.
    pub fn is_blank(&self) -> bool {
        match &self.content {
            RunContent::Text(text) => text.trim().is_empty(),
            RunContent::Hyperlink { .. } | RunContent::Image(_) => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParagraphStyle {
    Body,
    BulletItem,
    NumberedItem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Document,
    Audio,
    Video,
}

/// A paragraph-or-larger unit of the output document.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Heading {
        level: u8,
        runs: Vec<StyledRun>,
    },
    Paragraph {
        style: ParagraphStyle,
        runs: Vec<StyledRun>,
    },
    /// Block-level image, rendered centered.
    Image(ImageRun),
    Attachment {
        kind: AttachmentKind,
        title: String,
        download_url: Option<String>,
    },
}

/// Something recovered from locally during conversion or assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    Skipped { tag: String, reason: String },
    UnresolvableMedia { reference: String, reason: String },
    UnresolvableLink { text: String },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversionResult {
    pub blocks: Vec<Block>,
    /// Number of attachment containers seen under the content container.
    pub attachment_count: usize,
    pub diagnostics: Vec<Diagnostic>,
}
