//! Lesson-page conversion: find the content container, apply the top-level
//! skip rules and classify every content block.

use tracing::{debug, info, warn};

use crate::classify::{classify, ConversionContext};
use crate::error::ConvertError;
use crate::markup::{Element, MarkupDocument};
use crate::media::MediaResolver;
use crate::model::{ConversionResult, Diagnostic};

/// Both classes must be present on the `div` holding the lesson body.
pub const CONTENT_CONTAINER_CLASSES: [&str; 2] = ["course-mainbar", "lecture-content"];
pub const ATTACHMENT_CLASS: &str = "lecture-attachment";
const COMMENTS_CLASS: &str = "comments";
const TOP_LEVEL_SKIP: &[&str] = &["script", "meta", "style"];

/// Converts a parsed lesson page.
///
/// Fails only when the page has no body or no content container; every
/// per-element problem is recovered from and recorded in
/// [`ConversionResult::diagnostics`].
pub fn convert_lesson(
    document: &MarkupDocument,
    media: &MediaResolver,
) -> Result<ConversionResult, ConvertError> {
    let body = document
        .body()
        .ok_or_else(|| ConvertError::MalformedInput("no <body> element".into()))?;
    let container = find_content_container(body).ok_or_else(|| {
        ConvertError::MalformedInput("no lesson content container found".into())
    })?;

    let attachment_count = container
        .find_all(|el| el.tag() == "div" && el.has_class(ATTACHMENT_CLASS))
        .len();
    info!(attachment_count, "Found lecture-attachment blocks");

    let mut cx = ConversionContext::new(media);
    let mut blocks = Vec::new();

    for (index, block) in container.element_children().enumerate() {
        debug!(block = index + 1, tag = block.tag(), "Processing content block");

        if TOP_LEVEL_SKIP.contains(&block.tag()) {
            cx.record(Diagnostic::Skipped {
                tag: block.tag().to_string(),
                reason: "script/meta/style at top level".into(),
            });
            continue;
        }

        let comment_only = block
            .element_children()
            .next()
            .is_some_and(|first| first.has_class(COMMENTS_CLASS));
        if comment_only {
            debug!(block = index + 1, "Skipping comment-only block");
            cx.record(Diagnostic::Skipped {
                tag: block.tag().to_string(),
                reason: "comment-only block".into(),
            });
            continue;
        }

        blocks.extend(classify(block, &mut cx));
    }

    let diagnostics = cx.into_diagnostics();
    if !diagnostics.is_empty() {
        warn!(count = diagnostics.len(), "Conversion recovered from problems");
    }

    Ok(ConversionResult {
        blocks,
        attachment_count,
        diagnostics,
    })
}

pub fn find_content_container(body: &Element) -> Option<&Element> {
    let is_container = |el: &Element| {
        el.tag() == "div"
            && CONTENT_CONTAINER_CLASSES
                .iter()
                .all(|class| el.has_class(class))
    };
    if is_container(body) {
        return Some(body);
    }
    body.find(is_container)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::parse_document;
    use crate::model::{Block, Formatting, ParagraphStyle, StyledRun};

    fn lesson(content: &str) -> MarkupDocument {
        parse_document(&format!(
            "<html><head><title>T</title></head><body>\
             <div class='course-mainbar lecture-content'>{content}</div></body></html>"
        ))
    }

    #[test]
    fn single_plain_paragraph_yields_one_body_block() {
        let doc = lesson("<div class='lecture-attachment'><p>  Hello World \n</p></div>");
        let result = convert_lesson(&doc, &MediaResolver::default()).unwrap();
        assert_eq!(
            result.blocks,
            vec![Block::Paragraph {
                style: ParagraphStyle::Body,
                runs: vec![StyledRun::text("Hello World", Formatting::default())],
            }]
        );
        assert_eq!(result.attachment_count, 1);
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn missing_container_is_malformed_input() {
        let doc = parse_document("<html><body><p>no container</p></body></html>");
        let err = convert_lesson(&doc, &MediaResolver::default()).unwrap_err();
        assert!(matches!(err, ConvertError::MalformedInput(_)));
    }

    #[test]
    fn top_level_script_and_comment_blocks_are_skipped() {
        let doc = lesson(
            "<script>track()</script>\
             <div><div class='comments'><p>a comment</p></div><p>hidden</p></div>\
             <p>visible</p>",
        );
        let result = convert_lesson(&doc, &MediaResolver::default()).unwrap();
        assert_eq!(result.blocks.len(), 1);
        assert_eq!(result.diagnostics.len(), 2);
    }

    #[test]
    fn conversion_is_repeatable() {
        let doc = lesson("<h2>Title</h2><ul><li>a</li></ul><img src='data:image/png;base64,!!'>");
        let media = MediaResolver::default();
        let first = convert_lesson(&doc, &media).unwrap();
        let second = convert_lesson(&doc, &media).unwrap();
        assert_eq!(first, second);
    }
}
