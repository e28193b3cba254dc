//! Inline content of one block element to an ordered sequence of styled runs.
//!
//! The builder never shares a "current paragraph" with its caller. It
//! returns an [`InlineContent`] accumulator made of segments: the runs seen
//! so far, and for every block-level element met inline, the blocks it was
//! classified into followed by the runs after it. The classifier decides how
//! segments become blocks.

use tracing::debug;

use crate::classify::{classify, ConversionContext};
use crate::markup::{Element, MarkupNode};
use crate::model::{
    Block, Diagnostic, Formatting, ImageRun, ParagraphStyle, RunContent, StyledRun,
};
use crate::style::resolve_dimensions;

/// Runs accumulated between two block flushes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Segment {
    /// Blocks produced by the intrusion that opened this segment.
    pub flushed: Vec<Block>,
    pub runs: Vec<StyledRun>,
}

/// Accumulator returned by [`build_runs`]. Always holds at least one segment;
/// the first one never carries flushed blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineContent {
    segments: Vec<Segment>,
}

impl Default for InlineContent {
    fn default() -> Self {
        Self {
            segments: vec![Segment::default()],
        }
    }
}

impl InlineContent {
    /// Whether a block-level element interrupted the runs.
    pub fn flushed(&self) -> bool {
        self.segments.len() > 1
    }

    /// Runs before the first intrusion.
    pub fn leading_runs(&self) -> &[StyledRun] {
        &self.segments[0].runs
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    fn push(&mut self, run: StyledRun) {
        if let Some(current) = self.segments.last_mut() {
            current.runs.push(run);
        }
    }

    fn flush(&mut self, blocks: Vec<Block>) {
        self.segments.push(Segment {
            flushed: blocks,
            runs: Vec::new(),
        });
    }

    fn append(&mut self, other: InlineContent) {
        let mut rest = other.segments.into_iter();
        if let Some(first) = rest.next() {
            if let Some(current) = self.segments.last_mut() {
                current.runs.extend(first.runs);
            }
        }
        self.segments.extend(rest);
    }

    /// Blocks in document order. The leading runs always become `lead`'s
    /// block; each later segment becomes a body paragraph when it has
    /// visible content.
    pub fn into_blocks<F>(self, lead: F) -> Vec<Block>
    where
        F: FnOnce(Vec<StyledRun>) -> Block,
    {
        let mut segments = self.segments.into_iter();
        let mut blocks = Vec::new();
        if let Some(first) = segments.next() {
            blocks.push(lead(first.runs));
        }
        for segment in segments {
            blocks.extend(segment.flushed);
            if segment.runs.iter().any(|run| !run.is_blank()) {
                blocks.push(Block::Paragraph {
                    style: ParagraphStyle::Body,
                    runs: segment.runs,
                });
            }
        }
        blocks
    }
}

/// Walks `element`'s children in order with the inherited `format`.
pub fn build_runs(
    element: &Element,
    format: Formatting,
    cx: &mut ConversionContext<'_>,
) -> InlineContent {
    let mut content = InlineContent::default();

    for child in element.children() {
        let child = match child {
            MarkupNode::Text(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    content.push(StyledRun::text(text, format));
                }
                continue;
            }
            MarkupNode::Element(el) => el,
        };

        match child.tag() {
            "a" => push_link(child, format, cx, &mut content),
            "strong" | "b" => push_emphasis(child, format.with_bold(), cx, &mut content),
            "em" | "i" => push_emphasis(child, format.with_italic(), cx, &mut content),
            "span" | "br" => content.append(build_runs(child, format, cx)),
            "img" => {
                if let Some(image) = image_from_element(child, cx) {
                    content.push(StyledRun {
                        content: RunContent::Image(image),
                        format,
                    });
                }
            }
            // Vector graphics and math are not rendered.
            "svg" | "math" | "canvas" => {}
            _ => {
                debug!(tag = child.tag(), "Block element inside inline content, flushing");
                let blocks = classify(child, cx);
                content.flush(blocks);
            }
        }
    }

    content
}

fn push_emphasis(
    element: &Element,
    format: Formatting,
    cx: &mut ConversionContext<'_>,
    content: &mut InlineContent,
) {
    content.push(StyledRun::separator());
    content.append(build_runs(element, format, cx));
    content.push(StyledRun::separator());
}

fn push_link(
    element: &Element,
    format: Formatting,
    cx: &mut ConversionContext<'_>,
    content: &mut InlineContent,
) {
    let Some(target) = element.attr("href").and_then(|href| link_target(href, cx)) else {
        cx.record(Diagnostic::UnresolvableLink {
            text: element.stripped_text(),
        });
        content.append(build_runs(element, format, cx));
        return;
    };

    let visible = element.stripped_text();
    let text = if visible.is_empty() {
        target.clone()
    } else {
        visible
    };

    content.push(StyledRun::separator());
    content.push(StyledRun {
        content: RunContent::Hyperlink { text, target },
        format,
    });
    content.push(StyledRun::separator());
}

/// Usable hyperlink target, or `None` for empty, fragment-only and
/// `javascript:` links. Relative targets are joined onto a web base; against
/// a local file base they are kept as written.
fn link_target(href: &str, cx: &ConversionContext<'_>) -> Option<String> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with('#')
        || href.to_ascii_lowercase().starts_with("javascript:")
    {
        return None;
    }
    if url::Url::parse(href).is_ok() {
        return Some(href.to_string());
    }
    let web_base = cx
        .media()
        .base()
        .filter(|base| matches!(base.scheme(), "http" | "https"));
    match web_base.and_then(|base| base.join(href).ok()) {
        Some(joined) => Some(joined.to_string()),
        None => Some(href.to_string()),
    }
}

/// Resolves an `img` element's source and size. Failures are recorded and
/// yield `None`.
pub(crate) fn image_from_element(
    element: &Element,
    cx: &mut ConversionContext<'_>,
) -> Option<ImageRun> {
    let Some(src) = element.attr("src") else {
        cx.record(Diagnostic::UnresolvableMedia {
            reference: String::new(),
            reason: "image has no src".into(),
        });
        return None;
    };

    let source = match cx.media().try_resolve(src) {
        Ok(source) => source,
        Err(unresolved) => {
            debug!(src = %truncate(src), reason = unresolved.reason(), "Dropping image");
            cx.record(Diagnostic::UnresolvableMedia {
                reference: truncate(src),
                reason: unresolved.reason().into(),
            });
            return None;
        }
    };

    let dims = resolve_dimensions(
        element.attr("width"),
        element.attr("height"),
        element.attr("style"),
    );
    Some(ImageRun {
        source,
        width: dims.width,
        height: dims.height,
    })
}

/// Data URIs can be megabytes long; keep diagnostics readable.
fn truncate(reference: &str) -> String {
    const MAX: usize = 80;
    match reference.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}...", &reference[..cut]),
        None => reference.to_string(),
    }
}
