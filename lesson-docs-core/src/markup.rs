//! Input collaborator: HTML text to an owned, read-only markup tree.
//!
//! Parsing is delegated to `html5ever`, which never fails on malformed
//! input; the resulting `RcDom` is copied into [`MarkupNode`] values so the
//! rest of the crate works on plain owned data with no interior mutability.

use html5ever::parse_document as parse_html;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData, RcDom};

/// One node of the markup tree. Comments and doctypes are not kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupNode {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    tag: String,
    attributes: Vec<(String, String)>,
    children: Vec<MarkupNode>,
}

impl Element {
    pub fn new(
        tag: impl Into<String>,
        attributes: Vec<(String, String)>,
        children: Vec<MarkupNode>,
    ) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            attributes,
            children,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or("").split_whitespace()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|c| c == class)
    }

    pub fn children(&self) -> &[MarkupNode] {
        &self.children
    }

    pub fn element_children(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|child| match child {
            MarkupNode::Element(el) => Some(el),
            MarkupNode::Text(_) => None,
        })
    }

    /// First descendant (not self) in document order matching `pred`.
    pub fn find<P>(&self, pred: P) -> Option<&Element>
    where
        P: Fn(&Element) -> bool + Copy,
    {
        for child in self.element_children() {
            if pred(child) {
                return Some(child);
            }
            if let Some(found) = child.find(pred) {
                return Some(found);
            }
        }
        None
    }

    /// All descendants (not self) in document order matching `pred`.
    pub fn find_all<P>(&self, pred: P) -> Vec<&Element>
    where
        P: Fn(&Element) -> bool + Copy,
    {
        let mut found = Vec::new();
        self.collect_matching(pred, &mut found);
        found
    }

    fn collect_matching<'a, P>(&'a self, pred: P, found: &mut Vec<&'a Element>)
    where
        P: Fn(&Element) -> bool + Copy,
    {
        for child in self.element_children() {
            if pred(child) {
                found.push(child);
            }
            child.collect_matching(pred, found);
        }
    }

    /// Every descendant text string trimmed, empties dropped, concatenated
    /// without a separator.
    pub fn stripped_text(&self) -> String {
        let mut out = String::new();
        self.push_stripped_text(&mut out);
        out
    }

    fn push_stripped_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                MarkupNode::Text(text) => out.push_str(text.trim()),
                MarkupNode::Element(el) => el.push_stripped_text(out),
            }
        }
    }

    /// The text of an element whose only content is a single string,
    /// possibly wrapped in single-child elements. `None` for mixed content.
    pub fn single_string(&self) -> Option<&str> {
        match self.children.as_slice() {
            [MarkupNode::Text(text)] => Some(text),
            [MarkupNode::Element(el)] => el.single_string(),
            _ => None,
        }
    }
}

/// A parsed page.
#[derive(Debug, Clone)]
pub struct MarkupDocument {
    pub root: Element,
}

impl MarkupDocument {
    pub fn body(&self) -> Option<&Element> {
        if self.root.tag() == "body" {
            return Some(&self.root);
        }
        self.root.find(|el| el.tag() == "body")
    }

    /// Trimmed `<title>` text, if the page has a non-empty one.
    pub fn title(&self) -> Option<String> {
        self.root
            .find(|el| el.tag() == "title")
            .and_then(Element::single_string)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_owned)
    }
}

/// Best-effort parse of a whole HTML page. Never fails.
pub fn parse_document(html: &str) -> MarkupDocument {
    let dom: RcDom = parse_html(RcDom::default(), Default::default()).one(html);

    let root = dom
        .document
        .children
        .borrow()
        .iter()
        .find_map(|child| match convert(child) {
            Some(MarkupNode::Element(el)) => Some(el),
            _ => None,
        })
        .unwrap_or_else(|| Element::new("html", Vec::new(), Vec::new()));

    MarkupDocument { root }
}

fn convert(handle: &Handle) -> Option<MarkupNode> {
    match handle.data {
        NodeData::Element {
            ref name,
            ref attrs,
            ..
        } => {
            let attributes = attrs
                .borrow()
                .iter()
                .map(|attr| (attr.name.local.to_string(), attr.value.to_string()))
                .collect();
            let children = handle.children.borrow().iter().filter_map(convert).collect();
            Some(MarkupNode::Element(Element::new(
                name.local.as_ref(),
                attributes,
                children,
            )))
        }
        NodeData::Text { ref contents } => Some(MarkupNode::Text(contents.borrow().to_string())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_malformed_markup_without_failing() {
        let doc = parse_document("<div class='a b'><p>unclosed <b>bold</div>");
        let body = doc.body().expect("html5ever always synthesises a body");
        let div = body.find(|el| el.tag() == "div").unwrap();
        assert!(div.has_class("a"));
        assert!(div.has_class("b"));
        assert!(div.find(|el| el.tag() == "b").is_some());
    }

    #[test]
    fn stripped_text_concatenates_trimmed_strings() {
        let doc = parse_document("<div id='x'>  Lesson <span> notes </span>\n PDF </div>");
        let div = doc.root.find(|el| el.attr("id") == Some("x")).unwrap();
        assert_eq!(div.stripped_text(), "LessonnotesPDF");
    }

    #[test]
    fn single_string_requires_one_text_child() {
        let doc = parse_document("<span id='a'><b>only</b></span><span id='b'>x<b>y</b></span>");
        let a = doc.root.find(|el| el.attr("id") == Some("a")).unwrap();
        let b = doc.root.find(|el| el.attr("id") == Some("b")).unwrap();
        assert_eq!(a.single_string(), Some("only"));
        assert_eq!(b.single_string(), None);
    }

    #[test]
    fn title_is_trimmed_and_empty_titles_are_absent() {
        let doc = parse_document("<html><head><title>  Lesson 1 </title></head><body></body></html>");
        assert_eq!(doc.title().as_deref(), Some("Lesson 1"));

        let untitled = parse_document("<html><head><title>   </title></head></html>");
        assert_eq!(untitled.title(), None);
    }
}
