//! Merging converted lessons into one document.
//!
//! The merged package starts with a table-of-contents field (heading levels
//! 1-3) and then carries every source body in order, each separated by a
//! page break. Relationship ids and media part names are prefixed per source
//! (`d1_`, `d2_`, ...) so that they never collide. Styles and numbering
//! definitions are taken from the first source.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::SystemTime;

use quick_xml::escape::unescape;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use zip::result::ZipError;
use zip::ZipArchive;

use crate::docx::{
    numbering_xml, styles_xml, MediaPart, Package, Relationship, DEFAULT_FONT, NS_REL,
    REL_HYPERLINK, REL_IMAGE,
};
use crate::error::MergeError;

const TABLE_OF_CONTENTS: &str = concat!(
    r#"<w:p><w:r><w:fldChar w:fldCharType="begin" w:dirty="true"/></w:r>"#,
    r#"<w:r><w:instrText xml:space="preserve">TOC \o "1-3" \h \z \u</w:instrText></w:r>"#,
    r#"<w:r><w:fldChar w:fldCharType="separate"/></w:r>"#,
    r#"<w:r><w:fldChar w:fldCharType="end"/></w:r></w:p>"#
);
const PAGE_BREAK: &str = r#"<w:p><w:r><w:br w:type="page"/></w:r></w:p>"#;

/// Order in which lesson files are merged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    /// Case-insensitive file name.
    #[default]
    #[serde(rename = "name")]
    Name,
    /// File creation time, oldest first.
    #[serde(rename = "ctime", alias = "created")]
    Created,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "name" => Ok(SortOrder::Name),
            "ctime" | "created" => Ok(SortOrder::Created),
            other => Err(format!("unknown sort order '{other}' (expected name or ctime)")),
        }
    }
}

/// Every `.docx` under `folder`, recursively, in `sort` order.
pub fn collect_lesson_files(folder: &Path, sort: SortOrder) -> Result<Vec<PathBuf>, MergeError> {
    fn visit_dir(dir: &Path, results: &mut Vec<PathBuf>) -> Result<(), MergeError> {
        for entry_res in std::fs::read_dir(dir)? {
            let path = entry_res?.path();
            if path.is_dir() {
                visit_dir(&path, results)?;
            } else if is_lesson_file(&path) {
                results.push(path);
            }
        }
        Ok(())
    }

    let mut files = Vec::new();
    visit_dir(folder, &mut files)?;

    match sort {
        SortOrder::Name => files.sort_by_cached_key(|path| (file_name_key(path), path.clone())),
        SortOrder::Created => files.sort_by_cached_key(|path| (created_at(path), path.clone())),
    }
    info!(folder = %folder.display(), count = files.len(), sort = ?sort, "Collected lesson files");
    Ok(files)
}

fn is_lesson_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    // "~$" prefixes are word-processor lock files.
    path.is_file()
        && !name.starts_with("~$")
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("docx"))
}

fn file_name_key(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn created_at(path: &Path) -> SystemTime {
    std::fs::metadata(path)
        .and_then(|meta| meta.created().or_else(|_| meta.modified()))
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

/// Merges `paths` into one DOCX package and returns its bytes.
pub fn merge_documents(paths: &[PathBuf]) -> Result<Vec<u8>, MergeError> {
    if paths.is_empty() {
        return Err(MergeError::NoDocuments);
    }
    info!(count = paths.len(), "Merging documents");

    let mut package = Package::default();
    package.body.push_str(TABLE_OF_CONTENTS);

    for (index, path) in paths.iter().enumerate() {
        let source = SourceDocument::open(path)?;
        if index == 0 {
            package.styles = source
                .styles
                .clone()
                .unwrap_or_else(|| styles_xml(DEFAULT_FONT));
            package.numbering = source.numbering.clone().unwrap_or_else(numbering_xml);
        }
        package.body.push_str(PAGE_BREAK);

        let prefix = format!("d{}_", index + 1);
        let ids = carry_relationships(&source, &prefix, &mut package);
        let body = extract_body(&source.document, &ids, &mut package.namespaces).map_err(
            |e| MergeError::Malformed {
                path: path.clone(),
                reason: e.to_string(),
            },
        )?;
        debug!(path = %path.display(), size = body.len(), "Appended document body");
        package.body.push_str(&body);
    }

    Ok(package.to_bytes()?)
}

/// The parts of one source package the merge needs.
struct SourceDocument {
    document: String,
    relationships: Vec<Relationship>,
    styles: Option<String>,
    numbering: Option<String>,
    /// Media parts by full archive name, e.g. `word/media/image1.png`.
    media: HashMap<String, Vec<u8>>,
}

impl SourceDocument {
    fn open(path: &Path) -> Result<Self, MergeError> {
        let malformed = |reason: String| MergeError::Malformed {
            path: path.to_path_buf(),
            reason,
        };

        let file = File::open(path)?;
        let mut archive = ZipArchive::new(BufReader::new(file))
            .map_err(|e| malformed(format!("not a DOCX package: {e}")))?;

        let document = read_part(&mut archive, "word/document.xml")?
            .ok_or_else(|| malformed("missing word/document.xml".into()))?;
        let document = String::from_utf8(document)?;

        let relationships = match read_part(&mut archive, "word/_rels/document.xml.rels")? {
            Some(bytes) => parse_relationships(&String::from_utf8(bytes)?)
                .map_err(|e| malformed(format!("bad relationships: {e}")))?,
            None => Vec::new(),
        };
        let styles = read_part(&mut archive, "word/styles.xml")?
            .map(String::from_utf8)
            .transpose()?;
        let numbering = read_part(&mut archive, "word/numbering.xml")?
            .map(String::from_utf8)
            .transpose()?;

        let mut media = HashMap::new();
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            if entry.is_file() && entry.name().starts_with("word/media/") {
                let name = entry.name().to_string();
                let mut data = Vec::new();
                entry.read_to_end(&mut data)?;
                media.insert(name, data);
            }
        }

        Ok(Self {
            document,
            relationships,
            styles,
            numbering,
            media,
        })
    }
}

fn read_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<Vec<u8>>, MergeError> {
    match archive.by_name(name) {
        Ok(mut file) => {
            let mut data = Vec::new();
            file.read_to_end(&mut data)?;
            Ok(Some(data))
        }
        Err(ZipError::FileNotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn parse_relationships(xml: &str) -> Result<Vec<Relationship>, MergeError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut relationships = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Empty(e) | Event::Start(e) if local_name(e.name().as_ref()) == b"Relationship" => {
                let mut id = None;
                let mut kind = None;
                let mut target = None;
                let mut external = false;
                for attr in e.attributes().flatten() {
                    let raw = String::from_utf8(attr.value.to_vec())?;
                    let value = match unescape(&raw) {
                        Ok(unescaped) => unescaped.into_owned(),
                        Err(_) => raw.clone(),
                    };
                    match attr.key.as_ref() {
                        b"Id" => id = Some(value),
                        b"Type" => kind = Some(value),
                        b"Target" => target = Some(value),
                        b"TargetMode" => external = value == "External",
                        _ => {}
                    }
                }
                if let (Some(id), Some(kind), Some(target)) = (id, kind, target) {
                    relationships.push(Relationship {
                        id,
                        kind,
                        target,
                        external,
                    });
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(relationships)
}

/// Copies the hyperlink and image relationships of `source` into `package`
/// under prefixed ids, along with the media they point at. Returns the id
/// mapping to apply to the body.
fn carry_relationships(
    source: &SourceDocument,
    prefix: &str,
    package: &mut Package,
) -> HashMap<String, String> {
    let mut ids = HashMap::new();
    // Image relationship already carried for each media part.
    let mut carried_media: HashMap<String, String> = HashMap::new();
    for rel in &source.relationships {
        let new_id = format!("{prefix}{}", rel.id);
        if rel.kind == REL_HYPERLINK {
            package.relationships.push(Relationship {
                id: new_id.clone(),
                ..rel.clone()
            });
        } else if rel.kind == REL_IMAGE && !rel.external {
            let part_name = match rel.target.strip_prefix('/') {
                Some(absolute) => absolute.to_string(),
                None => format!("word/{}", rel.target),
            };
            if let Some(existing) = carried_media.get(&part_name) {
                ids.insert(rel.id.clone(), existing.clone());
                continue;
            }
            let Some(data) = source.media.get(&part_name) else {
                warn!(target = %rel.target, "Image relationship without media part, dropping");
                continue;
            };
            let file_name = part_name.rsplit('/').next().unwrap_or(&part_name);
            let name = format!("media/{prefix}{file_name}");
            package.media.push(MediaPart {
                name: name.clone(),
                data: data.clone(),
            });
            package.relationships.push(Relationship {
                id: new_id.clone(),
                kind: rel.kind.clone(),
                target: name,
                external: false,
            });
            carried_media.insert(part_name, new_id.clone());
        } else {
            continue;
        }
        ids.insert(rel.id.clone(), new_id);
    }
    ids
}

/// Content of `<w:body>` minus its trailing section properties, with
/// relationship references rewritten through `ids`. Namespace declarations
/// on the root element are added to `namespaces`.
fn extract_body(
    xml: &str,
    ids: &HashMap<String, String>,
    namespaces: &mut BTreeMap<String, String>,
) -> Result<String, MergeError> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::new());

    let mut rel_prefix = b"r".to_vec();
    let mut in_body = false;
    let mut depth = 0usize;
    let mut skip_from: Option<usize> = None;

    loop {
        let event = reader.read_event()?;
        if !in_body {
            match &event {
                Event::Start(e) if local_name(e.name().as_ref()) == b"document" => {
                    if let Some(prefix) = collect_namespaces(e, namespaces) {
                        rel_prefix = prefix;
                    }
                }
                Event::Start(e) if local_name(e.name().as_ref()) == b"body" => in_body = true,
                Event::Eof => break,
                _ => {}
            }
            continue;
        }

        match event {
            Event::Start(e) => {
                if skip_from.is_none() && depth == 0 && local_name(e.name().as_ref()) == b"sectPr"
                {
                    skip_from = Some(depth);
                } else if skip_from.is_none() {
                    writer.write_event(Event::Start(rewrite_ids(e, ids, &rel_prefix)))?;
                }
                depth += 1;
            }
            Event::End(e) => {
                if depth == 0 {
                    // </w:body>
                    break;
                }
                depth -= 1;
                if skip_from == Some(depth) {
                    skip_from = None;
                } else if skip_from.is_none() {
                    writer.write_event(Event::End(e))?;
                }
            }
            Event::Empty(e) => {
                let section = depth == 0 && local_name(e.name().as_ref()) == b"sectPr";
                if skip_from.is_none() && !section {
                    writer.write_event(Event::Empty(rewrite_ids(e, ids, &rel_prefix)))?;
                }
            }
            Event::Eof => break,
            other => {
                if skip_from.is_none() {
                    writer.write_event(other)?;
                }
            }
        }
    }

    Ok(String::from_utf8(writer.into_inner())?)
}

/// Records `xmlns:*` declarations; returns the prefix bound to the
/// relationships namespace if there is one.
fn collect_namespaces(
    root: &BytesStart<'_>,
    namespaces: &mut BTreeMap<String, String>,
) -> Option<Vec<u8>> {
    let mut rel_prefix = None;
    for attr in root.attributes().flatten() {
        let Some(prefix) = attr.key.as_ref().strip_prefix(b"xmlns:") else {
            continue;
        };
        let prefix = String::from_utf8_lossy(prefix).into_owned();
        let uri = String::from_utf8_lossy(&attr.value).into_owned();
        if uri == NS_REL {
            rel_prefix = Some(prefix.as_bytes().to_vec());
        }
        namespaces.entry(prefix).or_insert(uri);
    }
    rel_prefix
}

fn rewrite_ids<'a>(
    element: BytesStart<'a>,
    ids: &HashMap<String, String>,
    rel_prefix: &[u8],
) -> BytesStart<'a> {
    let is_reference = |key: &[u8]| {
        key.len() > rel_prefix.len()
            && key.starts_with(rel_prefix)
            && key[rel_prefix.len()] == b':'
    };
    let replacement = |value: &[u8]| ids.get(&*String::from_utf8_lossy(value));

    let needs_rewrite = element
        .attributes()
        .flatten()
        .any(|attr| is_reference(attr.key.as_ref()) && replacement(attr.value.as_ref()).is_some());
    if !needs_rewrite {
        return element;
    }

    let name = String::from_utf8_lossy(element.name().as_ref()).into_owned();
    let mut rewritten = BytesStart::new(name);
    for attr in element.attributes().flatten() {
        let key = attr.key.as_ref();
        match replacement(attr.value.as_ref()).filter(|_| is_reference(key)) {
            Some(new_id) => rewritten.push_attribute(Attribute::from((key, new_id.as_bytes()))),
            None => rewritten.push_attribute(Attribute::from((key, attr.value.as_ref()))),
        }
    }
    rewritten
}

fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().position(|&b| b == b':') {
        Some(i) => &name[i + 1..],
        None => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::MockMediaFetcher;
    use crate::docx::DocxAssembler;
    use crate::image_info::fixtures::png_header;
    use crate::model::{
        Block, ConversionResult, Formatting, ImageRun, MediaSource, ParagraphStyle, RunContent,
        StyledRun,
    };
    use std::io::Cursor;

    async fn lesson_docx(dir: &Path, name: &str, text: &str) -> PathBuf {
        let result = ConversionResult {
            blocks: vec![
                Block::Heading {
                    level: 1,
                    runs: vec![StyledRun::text(text, Formatting::default())],
                },
                Block::Paragraph {
                    style: ParagraphStyle::Body,
                    runs: vec![StyledRun {
                        content: RunContent::Hyperlink {
                            text: "more".into(),
                            target: format!("https://example.com/{name}"),
                        },
                        format: Formatting::default(),
                    }],
                },
                Block::Image(ImageRun {
                    source: MediaSource::Bytes(png_header(10, 10)),
                    width: None,
                    height: None,
                }),
            ],
            ..Default::default()
        };
        let doc = DocxAssembler::default()
            .assemble(&result, &MockMediaFetcher::new())
            .await
            .unwrap();
        let path = dir.join(name);
        std::fs::write(&path, doc.bytes).unwrap();
        path
    }

    fn read(bytes: &[u8], name: &str) -> String {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut text = String::new();
        archive.by_name(name).unwrap().read_to_string(&mut text).unwrap();
        text
    }

    #[test]
    fn collects_docx_recursively_sorted_by_lowercase_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("b_lesson")).unwrap();
        std::fs::write(dir.path().join("b_lesson/Beta.docx"), b"x").unwrap();
        std::fs::write(dir.path().join("alpha.DOCX"), b"x").unwrap();
        std::fs::write(dir.path().join("~$alpha.docx"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let files = collect_lesson_files(dir.path(), SortOrder::Name).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["alpha.DOCX", "Beta.docx"]);
    }

    #[test]
    fn sort_order_parses_cli_spellings() {
        assert_eq!("name".parse::<SortOrder>(), Ok(SortOrder::Name));
        assert_eq!("ctime".parse::<SortOrder>(), Ok(SortOrder::Created));
        assert!("size".parse::<SortOrder>().is_err());
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(matches!(merge_documents(&[]), Err(MergeError::NoDocuments)));
    }

    #[test]
    fn non_docx_input_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.docx");
        std::fs::write(&path, b"plain text").unwrap();
        assert!(matches!(
            merge_documents(&[path]),
            Err(MergeError::Malformed { .. })
        ));
    }

    #[tokio::test]
    async fn merged_package_namespaces_ids_and_media() {
        let dir = tempfile::tempdir().unwrap();
        let first = lesson_docx(dir.path(), "one.docx", "Lesson One").await;
        let second = lesson_docx(dir.path(), "two.docx", "Lesson Two").await;

        let bytes = merge_documents(&[first, second]).unwrap();
        let document = read(&bytes, "word/document.xml");

        let toc = document.find("TOC \\o").unwrap();
        let one = document.find("Lesson One").unwrap();
        let two = document.find("Lesson Two").unwrap();
        assert!(toc < one && one < two);
        assert_eq!(document.matches(r#"<w:br w:type="page"/>"#).count(), 2);
        assert_eq!(document.matches("<w:sectPr>").count(), 1);
        assert!(document.contains(r#"r:id="d1_rId1""#));
        assert!(document.contains(r#"r:embed="d2_rId2""#));

        let rels = read(&bytes, "word/_rels/document.xml.rels");
        assert!(rels.contains(r#"Target="media/d1_image1.png""#));
        assert!(rels.contains(r#"Target="media/d2_image1.png""#));
        assert!(rels.contains("https://example.com/two.docx"));

        let mut archive = ZipArchive::new(Cursor::new(bytes.as_slice())).unwrap();
        assert!(archive.by_name("word/media/d2_image1.png").is_ok());
    }

    #[test]
    fn shared_media_part_is_carried_once() {
        let image = |id: &str| Relationship {
            id: id.into(),
            kind: REL_IMAGE.into(),
            target: "media/image1.png".into(),
            external: false,
        };
        let source = Package {
            body: concat!(
                r#"<w:p><w:r><w:drawing><a:blip r:embed="rId1"/></w:drawing></w:r></w:p>"#,
                r#"<w:p><w:r><w:drawing><a:blip r:embed="rId2"/></w:drawing></w:r></w:p>"#
            )
            .into(),
            styles: styles_xml(DEFAULT_FONT),
            numbering: numbering_xml(),
            relationships: vec![image("rId1"), image("rId2")],
            media: vec![MediaPart {
                name: "media/image1.png".into(),
                data: png_header(4, 4),
            }],
            namespaces: BTreeMap::new(),
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.docx");
        std::fs::write(&path, source.to_bytes().unwrap()).unwrap();

        let bytes = merge_documents(&[path]).unwrap();

        let document = read(&bytes, "word/document.xml");
        assert_eq!(document.matches(r#"r:embed="d1_rId1""#).count(), 2);
        let rels = read(&bytes, "word/_rels/document.xml.rels");
        assert_eq!(rels.matches("media/d1_image1.png").count(), 1);

        let archive = ZipArchive::new(Cursor::new(bytes.as_slice())).unwrap();
        let media_parts = archive
            .file_names()
            .filter(|name| name.starts_with("word/media/"))
            .count();
        assert_eq!(media_parts, 1);
    }
}
