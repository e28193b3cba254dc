//! Block classifier: the recursive dispatcher over markup elements.
//!
//! Dispatch is structural. Attachment types are recognised from the class
//! markers the lesson platform puts on its embed containers; anything
//! unrecognised is treated as a transparent wrapper and its element
//! children are classified in turn.

use tracing::debug;

use crate::inline::{build_runs, image_from_element};
use crate::markup::Element;
use crate::media::MediaResolver;
use crate::model::{AttachmentKind, Block, Diagnostic, Formatting, ParagraphStyle};

pub const PDF_EMBED_CLASS: &str = "lecture-attachment-type-pdf_embed";
pub const AUDIO_EMBED_CLASS: &str = "lecture-attachment-type-audio";
pub const VIDEO_EMBED_CLASS: &str = "lecture-attachment-type-video";

pub const DOCUMENT_PLACEHOLDER: &str = "PDF Attachment";
pub const AUDIO_PLACEHOLDER: &str = "[Audio]";
pub const VIDEO_PLACEHOLDER: &str = "[Video Here]";

/// Elements that never produce output.
const UNRENDERABLE: &[&str] = &[
    "script", "style", "meta", "link", "noscript", "template", "svg", "math", "canvas",
];

/// Per-conversion state: the media resolver and the diagnostics collected so
/// far. Created fresh for every tree, so nothing leaks between documents.
#[derive(Debug)]
pub struct ConversionContext<'a> {
    media: &'a MediaResolver,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> ConversionContext<'a> {
    pub fn new(media: &'a MediaResolver) -> Self {
        Self {
            media,
            diagnostics: Vec::new(),
        }
    }

    pub fn media(&self) -> &'a MediaResolver {
        self.media
    }

    pub fn record(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

/// Classifies one element into zero or more blocks, in document order.
pub fn classify(element: &Element, cx: &mut ConversionContext<'_>) -> Vec<Block> {
    let tag = element.tag();

    if let Some(level) = heading_level(tag) {
        return build_runs(element, Formatting::default(), cx)
            .into_blocks(|runs| Block::Heading { level, runs });
    }

    match tag {
        "p" => build_runs(element, Formatting::default(), cx).into_blocks(|runs| {
            Block::Paragraph {
                style: ParagraphStyle::Body,
                runs,
            }
        }),
        "ul" => list_items(element, ParagraphStyle::BulletItem, cx),
        "ol" => list_items(element, ParagraphStyle::NumberedItem, cx),
        "img" => image_from_element(element, cx)
            .map(Block::Image)
            .into_iter()
            .collect(),
        "div" => match attachment_kind(element) {
            Some(kind) => vec![attachment(element, kind)],
            None => transparent(element, cx),
        },
        _ if UNRENDERABLE.contains(&tag) => {
            debug!(tag, "Dropping unrenderable element");
            cx.record(Diagnostic::Skipped {
                tag: tag.to_string(),
                reason: "unrenderable element".into(),
            });
            Vec::new()
        }
        _ => transparent(element, cx),
    }
}

/// `h1`..`h6` clamped to the three heading levels the output supports.
fn heading_level(tag: &str) -> Option<u8> {
    let level = tag.strip_prefix('h')?.parse::<u8>().ok()?;
    (1..=6).contains(&level).then(|| level.min(3))
}

fn list_items(
    list: &Element,
    style: ParagraphStyle,
    cx: &mut ConversionContext<'_>,
) -> Vec<Block> {
    list.element_children()
        .filter(|child| child.tag() == "li")
        .flat_map(|item| {
            build_runs(item, Formatting::default(), cx)
                .into_blocks(|runs| Block::Paragraph { style, runs })
        })
        .collect()
}

fn transparent(element: &Element, cx: &mut ConversionContext<'_>) -> Vec<Block> {
    element
        .element_children()
        .flat_map(|child| classify(child, cx))
        .collect()
}

fn attachment_kind(element: &Element) -> Option<AttachmentKind> {
    if element.has_class(PDF_EMBED_CLASS) {
        Some(AttachmentKind::Document)
    } else if element.has_class(AUDIO_EMBED_CLASS) {
        Some(AttachmentKind::Audio)
    } else if element.has_class(VIDEO_EMBED_CLASS) {
        Some(AttachmentKind::Video)
    } else {
        None
    }
}

fn attachment(element: &Element, kind: AttachmentKind) -> Block {
    match kind {
        AttachmentKind::Document => {
            let title = element
                .find(|el| el.tag() == "div" && el.has_class("label"))
                .map(Element::stripped_text)
                .filter(|text| !text.is_empty())
                .unwrap_or_else(|| DOCUMENT_PLACEHOLDER.to_string());
            let download_url = element
                .find(|el| el.tag() == "a" && el.attr("href").is_some())
                .and_then(|a| a.attr("href"))
                .map(str::to_owned);
            Block::Attachment {
                kind,
                title,
                download_url,
            }
        }
        AttachmentKind::Audio => {
            let title = element
                .find(|el| el.tag() == "span" && el.has_class("audioloader__name"))
                .and_then(Element::single_string)
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(|name| format!("[{name}]"))
                .unwrap_or_else(|| AUDIO_PLACEHOLDER.to_string());
            Block::Attachment {
                kind,
                title,
                download_url: None,
            }
        }
        AttachmentKind::Video => Block::Attachment {
            kind,
            title: VIDEO_PLACEHOLDER.to_string(),
            download_url: None,
        },
    }
}
