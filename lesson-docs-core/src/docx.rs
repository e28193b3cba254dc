//! # docx: WordprocessingML packaging
//!
//! [`DocxAssembler`] turns a [`ConversionResult`] into the bytes of a `.docx`
//! package. Remote images are fetched up front through a [`MediaFetcher`],
//! one attempt each under a timeout; anything that cannot be fetched or is
//! not PNG, JPEG or GIF is left out and reported as a diagnostic.
//!
//! The package part writer is shared with [`crate::merge`].

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Write};
use std::time::Duration;

use quick_xml::escape::escape;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use url::Url;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::contract::MediaFetcher;
use crate::error::{AssembleError, FetchError};
use crate::fetch::DEFAULT_FETCH_TIMEOUT;
use crate::image_info::{self, ImageFormat};
use crate::model::{
    AttachmentKind, Block, ConversionResult, Diagnostic, Formatting, ImageRun, MediaSource,
    ParagraphStyle, RunContent, StyledRun,
};

pub const DEFAULT_FONT: &str = "Helvetica";
/// Letter page minus two one-inch margins.
pub const USABLE_WIDTH_INCHES: f64 = 6.5;
pub const EMU_PER_INCH: f64 = 914_400.0;

const NS_MAIN: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
pub(crate) const NS_REL: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_WP: &str = "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing";
const NS_A: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const NS_PIC: &str = "http://schemas.openxmlformats.org/drawingml/2006/picture";

pub(crate) const REL_HYPERLINK: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink";
pub(crate) const REL_IMAGE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
const REL_STYLES: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";
const REL_NUMBERING: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/numbering";
const REL_OFFICE_DOCUMENT: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";

// Paragraph spacing after, in twentieths of a point.
const HEADING_SPACE_AFTER: u32 = 120;
const BODY_SPACE_AFTER: u32 = 200;
const LIST_SPACE_AFTER: u32 = 80;
const LIST_INDENT: u32 = 720;

const BULLET_NUM_ID: u32 = 1;
const DECIMAL_NUM_ID: u32 = 2;

const SECTION_PROPERTIES: &str = r#"<w:sectPr><w:pgSz w:w="12240" w:h="15840"/><w:pgMar w:top="1440" w:right="1440" w:bottom="1440" w:left="1440" w:header="720" w:footer="720" w:gutter="0"/></w:sectPr>"#;

#[derive(Debug, Clone)]
pub struct AssembleOptions {
    pub font: String,
    pub fetch_timeout: Duration,
}

impl Default for AssembleOptions {
    fn default() -> Self {
        Self {
            font: DEFAULT_FONT.to_string(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

/// A finished package and what was dropped while building it.
#[derive(Debug, Clone)]
pub struct AssembledDocument {
    pub bytes: Vec<u8>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Default)]
pub struct DocxAssembler {
    options: AssembleOptions,
}

impl DocxAssembler {
    pub fn new(options: AssembleOptions) -> Self {
        Self { options }
    }

    /// Builds the package for `result`.
    ///
    /// Returns an error only when the archive itself cannot be written.
    pub async fn assemble<F>(
        &self,
        result: &ConversionResult,
        fetcher: &F,
    ) -> Result<AssembledDocument, AssembleError>
    where
        F: MediaFetcher + ?Sized,
    {
        let mut diagnostics = Vec::new();
        let fetched = self
            .fetch_remote_media(&result.blocks, fetcher, &mut diagnostics)
            .await;

        let mut body = BodyWriter::new(&fetched);
        for block in &result.blocks {
            body.block(block);
        }
        diagnostics.append(&mut body.diagnostics);

        let package = Package {
            body: body.xml,
            styles: styles_xml(&self.options.font),
            numbering: numbering_xml(),
            relationships: body.relationships,
            media: body.media,
            namespaces: BTreeMap::new(),
        };
        let bytes = package.to_bytes()?;
        info!(
            blocks = result.blocks.len(),
            images = package.media.len(),
            size = bytes.len(),
            "Assembled document"
        );
        Ok(AssembledDocument { bytes, diagnostics })
    }

    async fn fetch_remote_media<F>(
        &self,
        blocks: &[Block],
        fetcher: &F,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> HashMap<Url, Vec<u8>>
    where
        F: MediaFetcher + ?Sized,
    {
        let mut fetched: HashMap<Url, Vec<u8>> = HashMap::new();
        let mut failed: Vec<&Url> = Vec::new();
        for url in remote_images(blocks) {
            if fetched.contains_key(url) || failed.contains(&url) {
                continue;
            }
            let outcome = match timeout(self.options.fetch_timeout, fetcher.fetch(url)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(FetchError::Timeout),
            };
            match outcome {
                Ok(bytes) => {
                    debug!(url = %url, size = bytes.len(), "Image fetched");
                    fetched.insert(url.clone(), bytes);
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "Image fetch failed, leaving it out");
                    diagnostics.push(Diagnostic::UnresolvableMedia {
                        reference: url.to_string(),
                        reason: e.to_string(),
                    });
                    failed.push(url);
                }
            }
        }
        fetched
    }
}

fn remote_images(blocks: &[Block]) -> Vec<&Url> {
    fn visit(image: &ImageRun) -> Option<&Url> {
        match &image.source {
            MediaSource::Remote(url) => Some(url),
            MediaSource::Bytes(_) => None,
        }
    }

    let mut urls = Vec::new();
    for block in blocks {
        match block {
            Block::Image(image) => urls.extend(visit(image)),
            Block::Heading { runs, .. } | Block::Paragraph { runs, .. } => {
                for run in runs {
                    if let RunContent::Image(image) = &run.content {
                        urls.extend(visit(image));
                    }
                }
            }
            Block::Attachment { .. } => {}
        }
    }
    urls
}

/// A `word/_rels/document.xml.rels` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Relationship {
    pub id: String,
    pub kind: String,
    pub target: String,
    pub external: bool,
}

/// A binary part under `word/media/`.
#[derive(Debug, Clone)]
pub(crate) struct MediaPart {
    /// Name relative to `word/`, e.g. `media/image1.png`.
    pub name: String,
    pub data: Vec<u8>,
}

/// Everything needed to write a single-document package.
#[derive(Debug, Clone, Default)]
pub(crate) struct Package {
    /// Content of `<w:body>` without the trailing section properties.
    pub body: String,
    pub styles: String,
    pub numbering: String,
    pub relationships: Vec<Relationship>,
    pub media: Vec<MediaPart>,
    /// Namespace declarations carried over from source documents, by prefix.
    pub namespaces: BTreeMap<String, String>,
}

impl Package {
    pub fn to_bytes(&self) -> Result<Vec<u8>, AssembleError> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        zip.start_file("[Content_Types].xml", options)?;
        zip.write_all(self.content_types().as_bytes())?;

        zip.start_file("_rels/.rels", options)?;
        zip.write_all(package_relationships().as_bytes())?;

        zip.start_file("word/document.xml", options)?;
        zip.write_all(self.document().as_bytes())?;

        zip.start_file("word/styles.xml", options)?;
        zip.write_all(self.styles.as_bytes())?;

        zip.start_file("word/numbering.xml", options)?;
        zip.write_all(self.numbering.as_bytes())?;

        zip.start_file("word/_rels/document.xml.rels", options)?;
        zip.write_all(self.document_relationships().as_bytes())?;

        for part in &self.media {
            zip.start_file(format!("word/{}", part.name), options)?;
            zip.write_all(&part.data)?;
        }

        Ok(zip.finish()?.into_inner())
    }

    fn document(&self) -> String {
        let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        xml.push_str(&format!(
            r#"<w:document xmlns:w="{NS_MAIN}" xmlns:r="{NS_REL}" xmlns:wp="{NS_WP}" xmlns:a="{NS_A}" xmlns:pic="{NS_PIC}""#
        ));
        for (prefix, uri) in &self.namespaces {
            if !matches!(prefix.as_str(), "w" | "r" | "wp" | "a" | "pic") {
                xml.push_str(&format!(r#" xmlns:{prefix}="{}""#, escape(uri.as_str())));
            }
        }
        xml.push_str("><w:body>");
        xml.push_str(&self.body);
        xml.push_str(SECTION_PROPERTIES);
        xml.push_str("</w:body></w:document>");
        xml
    }

    fn content_types(&self) -> String {
        let mut extensions: BTreeMap<String, &str> = BTreeMap::new();
        for part in &self.media {
            if let Some((_, ext)) = part.name.rsplit_once('.') {
                let ext = ext.to_ascii_lowercase();
                let content_type = media_content_type(&ext);
                extensions.insert(ext, content_type);
            }
        }
        let mut xml = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/>"#,
        );
        for (ext, content_type) in extensions {
            xml.push_str(&format!(
                r#"<Default Extension="{}" ContentType="{content_type}"/>"#,
                escape(ext.as_str())
            ));
        }
        xml.push_str(r#"<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/><Override PartName="/word/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"/><Override PartName="/word/numbering.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.numbering+xml"/></Types>"#);
        xml
    }

    fn document_relationships(&self) -> String {
        let mut xml = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
        );
        xml.push_str(&format!(
            r#"<Relationship Id="rIdStyles" Type="{REL_STYLES}" Target="styles.xml"/><Relationship Id="rIdNumbering" Type="{REL_NUMBERING}" Target="numbering.xml"/>"#
        ));
        for rel in &self.relationships {
            xml.push_str(&format!(
                r#"<Relationship Id="{}" Type="{}" Target="{}"{}/>"#,
                escape(rel.id.as_str()),
                escape(rel.kind.as_str()),
                xml_escape(&rel.target),
                if rel.external {
                    r#" TargetMode="External""#
                } else {
                    ""
                }
            ));
        }
        xml.push_str("</Relationships>");
        xml
    }
}

fn package_relationships() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="{REL_OFFICE_DOCUMENT}" Target="word/document.xml"/></Relationships>"#
    )
}

fn media_content_type(ext: &str) -> &'static str {
    match ext {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "emf" => "image/x-emf",
        "wmf" => "image/x-wmf",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

/// Writes `<w:body>` content for a block sequence, collecting the
/// relationships and media parts it references.
struct BodyWriter<'a> {
    fetched: &'a HashMap<Url, Vec<u8>>,
    xml: String,
    relationships: Vec<Relationship>,
    media: Vec<MediaPart>,
    diagnostics: Vec<Diagnostic>,
    next_drawing_id: u32,
}

impl<'a> BodyWriter<'a> {
    fn new(fetched: &'a HashMap<Url, Vec<u8>>) -> Self {
        Self {
            fetched,
            xml: String::new(),
            relationships: Vec::new(),
            media: Vec::new(),
            diagnostics: Vec::new(),
            next_drawing_id: 1,
        }
    }

    fn block(&mut self, block: &Block) {
        match block {
            Block::Heading { level, runs } => {
                let level = (*level).clamp(1, 3);
                let props = format!(
                    r#"<w:pStyle w:val="Heading{level}"/><w:spacing w:after="{HEADING_SPACE_AFTER}"/>"#
                );
                self.paragraph(&props, runs);
            }
            Block::Paragraph { style, runs } => {
                let props = match style {
                    ParagraphStyle::Body => format!(r#"<w:spacing w:after="{BODY_SPACE_AFTER}"/>"#),
                    ParagraphStyle::BulletItem => list_properties("ListBullet"),
                    ParagraphStyle::NumberedItem => list_properties("ListNumber"),
                };
                self.paragraph(&props, runs);
            }
            Block::Image(image) => {
                if let Some(drawing) = self.drawing(image) {
                    self.xml.push_str(r#"<w:p><w:pPr><w:jc w:val="center"/></w:pPr>"#);
                    self.xml.push_str(&drawing);
                    self.xml.push_str("</w:p>");
                }
            }
            Block::Attachment {
                kind,
                title,
                download_url,
            } => self.attachment(*kind, title, download_url.as_deref()),
        }
    }

    fn paragraph(&mut self, props: &str, runs: &[StyledRun]) {
        let mut content = String::new();
        for run in runs {
            match &run.content {
                RunContent::Text(text) => content.push_str(&text_run(text, run.format, None)),
                RunContent::Hyperlink { text, target } => {
                    content.push_str(&self.hyperlink(text, target, run.format));
                }
                RunContent::Image(image) => {
                    if let Some(drawing) = self.drawing(image) {
                        content.push_str(&drawing);
                    }
                }
            }
        }
        self.xml.push_str("<w:p><w:pPr>");
        self.xml.push_str(props);
        self.xml.push_str("</w:pPr>");
        self.xml.push_str(&content);
        self.xml.push_str("</w:p>");
    }

    fn attachment(&mut self, kind: AttachmentKind, title: &str, download_url: Option<&str>) {
        let bold = Formatting::default().with_bold();
        match kind {
            AttachmentKind::Document => {
                self.paragraph(
                    &body_properties(),
                    &[StyledRun::text(format!("📎 Attached Document: {title}"), bold)],
                );
                if let Some(url) = download_url {
                    self.paragraph(
                        &body_properties(),
                        &[
                            StyledRun::text("Download here: ", Formatting::default()),
                            StyledRun {
                                content: RunContent::Hyperlink {
                                    text: url.to_string(),
                                    target: url.to_string(),
                                },
                                format: Formatting::default(),
                            },
                        ],
                    );
                }
            }
            AttachmentKind::Audio | AttachmentKind::Video => {
                self.paragraph(
                    &body_properties(),
                    &[StyledRun::text(title, Formatting::default())],
                );
            }
        }
    }

    fn add_relationship(&mut self, kind: &str, target: String, external: bool) -> String {
        let id = format!("rId{}", self.relationships.len() + 1);
        self.relationships.push(Relationship {
            id: id.clone(),
            kind: kind.to_string(),
            target,
            external,
        });
        id
    }

    fn hyperlink(&mut self, text: &str, target: &str, format: Formatting) -> String {
        let id = self.add_relationship(REL_HYPERLINK, target.to_string(), true);
        let link_props = r#"<w:color w:val="0000FF"/><w:u w:val="single"/>"#;
        format!(
            r#"<w:hyperlink r:id="{id}">{}</w:hyperlink>"#,
            text_run(text, format, Some(link_props))
        )
    }

    fn drawing(&mut self, image: &ImageRun) -> Option<String> {
        let data = match &image.source {
            MediaSource::Bytes(bytes) => bytes.clone(),
            // Failures were already recorded while fetching.
            MediaSource::Remote(url) => self.fetched.get(url)?.clone(),
        };
        let Some((format, width_px, height_px)) = image_info::inspect(&data) else {
            debug!(source = %image.source.describe(), "Unsupported image format");
            self.diagnostics.push(Diagnostic::UnresolvableMedia {
                reference: image.source.describe(),
                reason: "unsupported image format".into(),
            });
            return None;
        };

        let drawing_id = self.next_drawing_id;
        self.next_drawing_id += 1;
        let name = media_name(drawing_id, format);
        let rel_id = self.add_relationship(REL_IMAGE, name.clone(), false);
        self.media.push(MediaPart { name, data });

        let (cx, cy) = extent_emu(image, width_px, height_px);
        Some(format!(
            concat!(
                r#"<w:r><w:drawing><wp:inline distT="0" distB="0" distL="0" distR="0">"#,
                r#"<wp:extent cx="{cx}" cy="{cy}"/><wp:docPr id="{id}" name="Picture {id}"/>"#,
                r#"<a:graphic><a:graphicData uri="{pic}"><pic:pic>"#,
                r#"<pic:nvPicPr><pic:cNvPr id="{id}" name="Picture {id}"/><pic:cNvPicPr/></pic:nvPicPr>"#,
                r#"<pic:blipFill><a:blip r:embed="{rel}"/><a:stretch><a:fillRect/></a:stretch></pic:blipFill>"#,
                r#"<pic:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm>"#,
                r#"<a:prstGeom prst="rect"><a:avLst/></a:prstGeom></pic:spPr>"#,
                r#"</pic:pic></a:graphicData></a:graphic></wp:inline></w:drawing></w:r>"#
            ),
            cx = cx,
            cy = cy,
            id = drawing_id,
            pic = NS_PIC,
            rel = rel_id,
        ))
    }
}

fn media_name(index: u32, format: ImageFormat) -> String {
    format!("media/image{index}.{}", format.extension())
}

fn body_properties() -> String {
    format!(r#"<w:spacing w:after="{BODY_SPACE_AFTER}"/>"#)
}

fn list_properties(style: &str) -> String {
    format!(
        r#"<w:pStyle w:val="{style}"/><w:spacing w:after="{LIST_SPACE_AFTER}"/><w:ind w:left="{LIST_INDENT}" w:hanging="360"/>"#
    )
}

fn text_run(text: &str, format: Formatting, extra_props: Option<&str>) -> String {
    let mut props = String::new();
    if format.bold {
        props.push_str("<w:b/>");
    }
    if format.italic {
        props.push_str("<w:i/>");
    }
    if let Some(extra) = extra_props {
        props.push_str(extra);
    }
    let props = if props.is_empty() {
        props
    } else {
        format!("<w:rPr>{props}</w:rPr>")
    };
    format!(
        r#"<w:r>{props}<w:t xml:space="preserve">{}</w:t></w:r>"#,
        xml_escape(text)
    )
}

/// Escapes `text` for element or attribute content, dropping characters
/// outside the XML 1.0 `Char` production.
fn xml_escape(text: &str) -> Cow<'_, str> {
    if text.chars().all(is_xml_char) {
        return escape(text);
    }
    let cleaned: String = text.chars().filter(|&c| is_xml_char(c)).collect();
    Cow::Owned(escape(cleaned.as_str()).into_owned())
}

fn is_xml_char(c: char) -> bool {
    matches!(
        c,
        '\t' | '\n' | '\r' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..='\u{10FFFF}'
    )
}

/// Size in EMU: explicit hints win, a single hint keeps the native aspect
/// ratio, and no hint means the full usable width.
fn extent_emu(image: &ImageRun, width_px: u32, height_px: u32) -> (u64, u64) {
    let aspect = f64::from(height_px) / f64::from(width_px);
    let (width, height) = match (image.width, image.height) {
        (Some(w), Some(h)) => (w, h),
        (Some(w), None) => (w, w * aspect),
        (None, Some(h)) => (h / aspect, h),
        (None, None) => (USABLE_WIDTH_INCHES, USABLE_WIDTH_INCHES * aspect),
    };
    (
        (width * EMU_PER_INCH).round() as u64,
        (height * EMU_PER_INCH).round() as u64,
    )
}

pub(crate) fn styles_xml(font: &str) -> String {
    let font = xml_escape(font);
    let mut xml = format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:styles xmlns:w="{ns}">"#,
            r#"<w:docDefaults><w:rPrDefault><w:rPr><w:rFonts w:ascii="{font}" w:hAnsi="{font}" w:cs="{font}" w:eastAsia="{font}"/><w:sz w:val="22"/></w:rPr></w:rPrDefault>"#,
            r#"<w:pPrDefault><w:pPr><w:spacing w:after="{body}"/></w:pPr></w:pPrDefault></w:docDefaults>"#,
            r#"<w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/><w:qFormat/>"#,
            r#"<w:rPr><w:rFonts w:ascii="{font}" w:hAnsi="{font}" w:cs="{font}"/></w:rPr></w:style>"#
        ),
        ns = NS_MAIN,
        font = font,
        body = BODY_SPACE_AFTER,
    );
    for (level, size) in [(1u8, 32u32), (2, 26), (3, 24)] {
        xml.push_str(&format!(
            concat!(
                r#"<w:style w:type="paragraph" w:styleId="Heading{level}"><w:name w:val="heading {level}"/>"#,
                r#"<w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:qFormat/>"#,
                r#"<w:pPr><w:keepNext/><w:spacing w:before="240" w:after="{after}"/><w:outlineLvl w:val="{outline}"/></w:pPr>"#,
                r#"<w:rPr><w:b/><w:sz w:val="{size}"/></w:rPr></w:style>"#
            ),
            level = level,
            after = HEADING_SPACE_AFTER,
            outline = level - 1,
            size = size,
        ));
    }
    for (style_id, name, num_id) in [
        ("ListBullet", "List Bullet", BULLET_NUM_ID),
        ("ListNumber", "List Number", DECIMAL_NUM_ID),
    ] {
        xml.push_str(&format!(
            concat!(
                r#"<w:style w:type="paragraph" w:styleId="{id}"><w:name w:val="{name}"/><w:basedOn w:val="Normal"/>"#,
                r#"<w:pPr><w:numPr><w:ilvl w:val="0"/><w:numId w:val="{num}"/></w:numPr></w:pPr></w:style>"#
            ),
            id = style_id,
            name = name,
            num = num_id,
        ));
    }
    xml.push_str("</w:styles>");
    xml
}

pub(crate) fn numbering_xml() -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:numbering xmlns:w="{ns}">"#,
            r#"<w:abstractNum w:abstractNumId="0"><w:lvl w:ilvl="0"><w:start w:val="1"/><w:numFmt w:val="bullet"/>"#,
            r#"<w:lvlText w:val="•"/><w:lvlJc w:val="left"/><w:pPr><w:ind w:left="{indent}" w:hanging="360"/></w:pPr></w:lvl></w:abstractNum>"#,
            r#"<w:abstractNum w:abstractNumId="1"><w:lvl w:ilvl="0"><w:start w:val="1"/><w:numFmt w:val="decimal"/>"#,
            r#"<w:lvlText w:val="%1."/><w:lvlJc w:val="left"/><w:pPr><w:ind w:left="{indent}" w:hanging="360"/></w:pPr></w:lvl></w:abstractNum>"#,
            r#"<w:num w:numId="{bullet}"><w:abstractNumId w:val="0"/></w:num>"#,
            r#"<w:num w:numId="{decimal}"><w:abstractNumId w:val="1"/></w:num></w:numbering>"#
        ),
        ns = NS_MAIN,
        indent = LIST_INDENT,
        bullet = BULLET_NUM_ID,
        decimal = DECIMAL_NUM_ID,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::MockMediaFetcher;
    use crate::image_info::fixtures::png_header;
    use std::io::Read;
    use zip::ZipArchive;

    fn part(bytes: &[u8], name: &str) -> String {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut file = archive.by_name(name).unwrap();
        let mut text = String::new();
        file.read_to_string(&mut text).unwrap();
        text
    }

    fn paragraph(text: &str) -> Block {
        Block::Paragraph {
            style: ParagraphStyle::Body,
            runs: vec![StyledRun::text(text, Formatting::default())],
        }
    }

    #[tokio::test]
    async fn writes_required_parts_with_escaped_text() {
        let result = ConversionResult {
            blocks: vec![
                Block::Heading {
                    level: 2,
                    runs: vec![StyledRun::text("Fish & Chips", Formatting::default())],
                },
                paragraph("a < b"),
            ],
            ..Default::default()
        };
        let fetcher = MockMediaFetcher::new();
        let doc = DocxAssembler::default()
            .assemble(&result, &fetcher)
            .await
            .unwrap();

        let document = part(&doc.bytes, "word/document.xml");
        assert!(document.contains(r#"<w:pStyle w:val="Heading2"/>"#));
        assert!(document.contains("Fish &amp; Chips"));
        assert!(document.contains("a &lt; b"));
        assert!(part(&doc.bytes, "word/styles.xml").contains(r#"w:ascii="Helvetica""#));
        assert!(part(&doc.bytes, "[Content_Types].xml").contains("/word/numbering.xml"));
        assert!(doc.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn configured_font_lands_in_styles() {
        let assembler = DocxAssembler::new(AssembleOptions {
            font: "Georgia".into(),
            ..Default::default()
        });
        let doc = assembler
            .assemble(&ConversionResult::default(), &MockMediaFetcher::new())
            .await
            .unwrap();
        assert!(part(&doc.bytes, "word/styles.xml").contains(r#"w:ascii="Georgia""#));
    }

    #[tokio::test]
    async fn hyperlinks_become_external_relationships() {
        let result = ConversionResult {
            blocks: vec![Block::Paragraph {
                style: ParagraphStyle::BulletItem,
                runs: vec![StyledRun {
                    content: RunContent::Hyperlink {
                        text: "docs".into(),
                        target: "https://example.com/?a=1&b=2".into(),
                    },
                    format: Formatting::default(),
                }],
            }],
            ..Default::default()
        };
        let doc = DocxAssembler::default()
            .assemble(&result, &MockMediaFetcher::new())
            .await
            .unwrap();

        let rels = part(&doc.bytes, "word/_rels/document.xml.rels");
        assert!(rels.contains(r#"Target="https://example.com/?a=1&amp;b=2" TargetMode="External""#));
        let document = part(&doc.bytes, "word/document.xml");
        assert!(document.contains(r#"<w:hyperlink r:id="rId1">"#));
        assert!(document.contains(r#"<w:pStyle w:val="ListBullet"/>"#));
    }

    #[tokio::test]
    async fn remote_image_is_fetched_once_and_sized_to_usable_width() {
        let url = Url::parse("https://cdn.example.com/a.png").unwrap();
        let image = ImageRun {
            source: MediaSource::Remote(url.clone()),
            width: None,
            height: None,
        };
        let result = ConversionResult {
            blocks: vec![Block::Image(image.clone()), Block::Image(image)],
            ..Default::default()
        };
        let mut fetcher = MockMediaFetcher::new();
        fetcher
            .expect_fetch()
            .times(1)
            .returning(|_| Ok(png_header(200, 100)));

        let doc = DocxAssembler::default()
            .assemble(&result, &fetcher)
            .await
            .unwrap();

        let document = part(&doc.bytes, "word/document.xml");
        assert!(document.contains(r#"<wp:extent cx="5943600" cy="2971800"/>"#));
        assert!(document.contains(r#"<w:jc w:val="center"/>"#));
        assert!(part(&doc.bytes, "[Content_Types].xml").contains(r#"Extension="png""#));
        assert!(doc.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn failed_fetch_drops_image_and_records_diagnostic() {
        let result = ConversionResult {
            blocks: vec![
                Block::Image(ImageRun {
                    source: MediaSource::Remote(Url::parse("https://cdn.example.com/x.png").unwrap()),
                    width: Some(2.0),
                    height: None,
                }),
                paragraph("after"),
            ],
            ..Default::default()
        };
        let mut fetcher = MockMediaFetcher::new();
        fetcher
            .expect_fetch()
            .returning(|_| Err(FetchError::Http(404)));

        let doc = DocxAssembler::default()
            .assemble(&result, &fetcher)
            .await
            .unwrap();

        assert!(!part(&doc.bytes, "word/document.xml").contains("<w:drawing>"));
        assert!(matches!(
            doc.diagnostics.as_slice(),
            [Diagnostic::UnresolvableMedia { reason, .. }] if reason == "HTTP status 404"
        ));
    }

    #[tokio::test]
    async fn unsupported_inline_bytes_are_dropped() {
        let result = ConversionResult {
            blocks: vec![Block::Image(ImageRun {
                source: MediaSource::Bytes(b"<svg/>".to_vec()),
                width: None,
                height: None,
            })],
            ..Default::default()
        };
        let doc = DocxAssembler::default()
            .assemble(&result, &MockMediaFetcher::new())
            .await
            .unwrap();
        assert_eq!(doc.diagnostics.len(), 1);
    }

    #[tokio::test]
    async fn document_attachment_renders_title_and_download_link() {
        let result = ConversionResult {
            blocks: vec![Block::Attachment {
                kind: AttachmentKind::Document,
                title: "Workbook".into(),
                download_url: Some("https://files.example.com/w.pdf".into()),
            }],
            ..Default::default()
        };
        let doc = DocxAssembler::default()
            .assemble(&result, &MockMediaFetcher::new())
            .await
            .unwrap();

        let document = part(&doc.bytes, "word/document.xml");
        assert!(document.contains("📎 Attached Document: Workbook"));
        assert!(document.contains("Download here: "));
        assert!(document.contains(r#"<w:color w:val="0000FF"/><w:u w:val="single"/>"#));
    }

    #[tokio::test]
    async fn control_characters_are_dropped_from_text() {
        let result = ConversionResult {
            blocks: vec![
                paragraph("tab\u{0b}bed\u{0c}x\u{1}y\tz"),
                Block::Attachment {
                    kind: AttachmentKind::Document,
                    title: "Notes\u{7}".into(),
                    download_url: Some("https://files.example.com/n\u{1b}.pdf".into()),
                },
            ],
            ..Default::default()
        };
        let doc = DocxAssembler::default()
            .assemble(&result, &MockMediaFetcher::new())
            .await
            .unwrap();

        for name in ["word/document.xml", "word/_rels/document.xml.rels"] {
            let xml = part(&doc.bytes, name);
            let invalid: Vec<char> = xml.chars().filter(|&c| !is_xml_char(c)).collect();
            assert!(invalid.is_empty(), "{name} holds {invalid:?}");
        }
        let document = part(&doc.bytes, "word/document.xml");
        assert!(document.contains("tabbedxy\tz"));
        assert!(document.contains("Attached Document: Notes<"));
    }

    #[test]
    fn xml_escape_keeps_valid_text_borrowed() {
        assert!(matches!(xml_escape("plain"), Cow::Borrowed("plain")));
        assert_eq!(xml_escape("a\u{FFFE}<b"), "a&lt;b");
    }

    struct StalledFetcher;

    #[async_trait::async_trait]
    impl MediaFetcher for StalledFetcher {
        async fn fetch(&self, _url: &Url) -> Result<Vec<u8>, FetchError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(png_header(10, 10))
        }
    }

    #[tokio::test]
    async fn stalled_fetch_times_out_and_conversion_continues() {
        let result = ConversionResult {
            blocks: vec![
                Block::Image(ImageRun {
                    source: MediaSource::Remote(Url::parse("https://x/a.png").unwrap()),
                    width: None,
                    height: None,
                }),
                paragraph("still here"),
            ],
            ..Default::default()
        };
        let assembler = DocxAssembler::new(AssembleOptions {
            fetch_timeout: Duration::from_millis(50),
            ..Default::default()
        });

        let started = std::time::Instant::now();
        let doc = assembler.assemble(&result, &StalledFetcher).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));

        assert_eq!(
            doc.diagnostics,
            vec![Diagnostic::UnresolvableMedia {
                reference: "https://x/a.png".into(),
                reason: "timed out".into(),
            }]
        );
        let document = part(&doc.bytes, "word/document.xml");
        assert!(!document.contains("<w:drawing>"));
        assert!(document.contains("still here"));
    }

    #[test]
    fn single_hint_keeps_aspect_ratio() {
        let image = ImageRun {
            source: MediaSource::Bytes(Vec::new()),
            width: None,
            height: Some(1.0),
        };
        assert_eq!(extent_emu(&image, 400, 200), (1_828_800, 914_400));
    }
}
