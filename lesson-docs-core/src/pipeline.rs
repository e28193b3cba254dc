//! # pipeline: batch conversion and publishing over a working directory
//!
//! Two entry points, both used by the CLI and by the integration tests:
//!
//! - [`convert_all`] converts every pending page in the input folder. Each
//!   page is parsed, converted, assembled into `<output>/<name>/<name>.docx`
//!   and then moved to the processed folder. A page that fails is reported
//!   and left where it is; the rest of the batch carries on.
//! - [`publish`] merges the converted documents of a folder into one package
//!   in the working directory root and hands it to a [`RemoteStore`].
//!
//! Neither step keeps global state: the [`WorkDir`] and options are passed in.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::contract::{MediaFetcher, RemoteStore, StoredObject};
use crate::convert::convert_lesson;
use crate::docx::{AssembleOptions, DocxAssembler, DEFAULT_FONT};
use crate::error::PipelineError;
use crate::fetch::DEFAULT_FETCH_TIMEOUT;
use crate::markup::parse_document;
use crate::media::MediaResolver;
use crate::merge::{collect_lesson_files, merge_documents, SortOrder};
use crate::model::Diagnostic;
use crate::workdir::WorkDir;

const FALLBACK_NAME: &str = "lesson";

#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub font: String,
    pub skip_media: bool,
    pub fetch_timeout: Duration,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            font: DEFAULT_FONT.to_string(),
            skip_media: false,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

/// Outcome for one input page.
#[derive(Debug)]
pub enum DocumentReport {
    Converted {
        input: PathBuf,
        output: PathBuf,
        attachment_count: usize,
        diagnostics: Vec<Diagnostic>,
    },
    Failed {
        input: PathBuf,
        error: PipelineError,
    },
}

impl DocumentReport {
    pub fn input(&self) -> &Path {
        match self {
            DocumentReport::Converted { input, .. } | DocumentReport::Failed { input, .. } => input,
        }
    }
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub documents: Vec<DocumentReport>,
}

impl BatchReport {
    pub fn converted(&self) -> usize {
        self.documents
            .iter()
            .filter(|d| matches!(d, DocumentReport::Converted { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.documents.len() - self.converted()
    }
}

/// Converts every pending `.html` page under `workdir`.
///
/// Only an unreadable input folder fails the call; per-page failures end up
/// in the report.
pub async fn convert_all<F>(
    workdir: &WorkDir,
    options: &ConvertOptions,
    fetcher: &F,
) -> Result<BatchReport, PipelineError>
where
    F: MediaFetcher + ?Sized,
{
    workdir.init()?;
    let pending = pending_pages(&workdir.input())?;
    info!(count = pending.len(), input = %workdir.input().display(), "[CONVERT] Starting batch");

    let assembler = DocxAssembler::new(AssembleOptions {
        font: options.font.clone(),
        fetch_timeout: options.fetch_timeout,
    });

    let mut report = BatchReport::default();
    for path in pending {
        let document = match convert_page(&path, workdir, &assembler, options, fetcher).await {
            Ok(document) => document,
            Err(e) => {
                error!(path = %path.display(), error = %e, "[CONVERT][ERROR] Page failed");
                DocumentReport::Failed {
                    input: path,
                    error: e,
                }
            }
        };
        report.documents.push(document);
    }

    info!(
        converted = report.converted(),
        failed = report.failed(),
        "[CONVERT] Batch finished"
    );
    Ok(report)
}

fn pending_pages(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut pages = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_html = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("html") || ext.eq_ignore_ascii_case("htm"));
        if path.is_file() && is_html {
            pages.push(path);
        }
    }
    pages.sort();
    Ok(pages)
}

async fn convert_page<F>(
    path: &Path,
    workdir: &WorkDir,
    assembler: &DocxAssembler,
    options: &ConvertOptions,
    fetcher: &F,
) -> Result<DocumentReport, PipelineError>
where
    F: MediaFetcher + ?Sized,
{
    debug!(path = %path.display(), "[CONVERT] Reading page");
    let raw = tokio::fs::read(path).await?;
    let html = String::from_utf8_lossy(&raw);
    let document = parse_document(&html);

    let media = MediaResolver::for_file(path).skip_media(options.skip_media);
    let result = convert_lesson(&document, &media)?;

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = [document.title().unwrap_or_default(), stem]
        .iter()
        .map(|candidate| safe_filename(candidate))
        .find(|candidate| !candidate.is_empty())
        .unwrap_or_else(|| FALLBACK_NAME.to_string());

    let assembled = assembler.assemble(&result, fetcher).await?;

    let lesson_dir = workdir.output().join(&name);
    tokio::fs::create_dir_all(&lesson_dir).await?;
    let output = lesson_dir.join(format!("{name}.docx"));
    tokio::fs::write(&output, &assembled.bytes).await?;
    info!(output = %output.display(), "[CONVERT] Saved document");

    move_to_processed(path, &workdir.processed()).await?;

    let mut diagnostics = result.diagnostics;
    diagnostics.extend(assembled.diagnostics);
    for diagnostic in &diagnostics {
        debug!(path = %path.display(), diagnostic = ?diagnostic, "[CONVERT] Recovered");
    }

    Ok(DocumentReport::Converted {
        input: path.to_path_buf(),
        output,
        attachment_count: result.attachment_count,
        diagnostics,
    })
}

async fn move_to_processed(path: &Path, processed: &Path) -> std::io::Result<()> {
    let Some(file_name) = path.file_name() else {
        return Ok(());
    };
    tokio::fs::create_dir_all(processed).await?;
    let target = processed.join(file_name);
    if tokio::fs::rename(path, &target).await.is_err() {
        // rename fails across filesystems
        tokio::fs::copy(path, &target).await?;
        tokio::fs::remove_file(path).await?;
    }
    debug!(from = %path.display(), to = %target.display(), "[CONVERT] Moved page to processed");
    Ok(())
}

/// Keeps alphanumerics, spaces, hyphens and underscores; trailing
/// whitespace is dropped.
pub fn safe_filename(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect::<String>()
        .trim_end()
        .to_string()
}

#[derive(Debug, Clone)]
pub struct PublishOptions {
    /// Folder to collect `.docx` files from; the output folder when `None`.
    pub folder: Option<PathBuf>,
    /// Merged file name; `<folder name>.docx` when `None`.
    pub merged_name: Option<String>,
    pub sort: SortOrder,
}

#[derive(Debug)]
pub struct PublishReport {
    pub merged: PathBuf,
    pub sources: Vec<PathBuf>,
    pub stored: Option<StoredObject>,
}

/// Merges the lesson documents and, when a store is given, uploads the result
/// under the merged file's stem.
pub async fn publish<S>(
    workdir: &WorkDir,
    options: &PublishOptions,
    store: Option<&S>,
) -> Result<PublishReport, PipelineError>
where
    S: RemoteStore + ?Sized,
{
    let folder = options.folder.clone().unwrap_or_else(|| workdir.output());
    let merged_name = options
        .merged_name
        .clone()
        .unwrap_or_else(|| default_merged_name(&folder));
    let merged = workdir.root().join(&merged_name);

    info!(folder = %folder.display(), merged = %merged.display(), "[PUBLISH] Starting");
    let sources = collect_lesson_files(&folder, options.sort)?;
    let bytes = merge_documents(&sources)?;
    tokio::fs::create_dir_all(workdir.root()).await?;
    tokio::fs::write(&merged, &bytes).await?;
    info!(merged = %merged.display(), sources = sources.len(), "[PUBLISH] Merged document written");

    let stored = match store {
        Some(store) => {
            let display_name = merged
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or(merged_name);
            let stored = store
                .store_document(&display_name, bytes)
                .await
                .map_err(|e| {
                    error!(error = %e, "[PUBLISH][ERROR] Upload failed");
                    e
                })?;
            info!(id = %stored.id, link = ?stored.link, "[PUBLISH] Uploaded");
            Some(stored)
        }
        None => {
            warn!("[PUBLISH] No remote store configured, skipping upload");
            None
        }
    };

    Ok(PublishReport {
        merged,
        sources,
        stored,
    })
}

fn default_merged_name(folder: &Path) -> String {
    let base = folder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "merged".to_string());
    format!("{base}.docx")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_filename_strips_punctuation_and_trailing_space() {
        assert_eq!(safe_filename("Lesson 1: Intro / Setup?  "), "Lesson 1 Intro  Setup");
        assert_eq!(safe_filename("week_2-notes"), "week_2-notes");
        assert_eq!(safe_filename("Café"), "Café");
        assert_eq!(safe_filename("!!!"), "");
    }

    #[test]
    fn merged_name_defaults_to_folder_name() {
        assert_eq!(
            default_merged_name(Path::new("/work/converted_docs/")),
            "converted_docs.docx"
        );
    }

    #[test]
    fn pending_pages_are_html_only_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.html", "a.HTM", "notes.txt"] {
            std::fs::write(dir.path().join(name), "x").unwrap();
        }
        let pages = pending_pages(dir.path()).unwrap();
        let names: Vec<_> = pages
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.HTM", "b.html"]);
    }

    #[test]
    fn batch_counts() {
        let report = BatchReport {
            documents: vec![
                DocumentReport::Converted {
                    input: "a.html".into(),
                    output: "a.docx".into(),
                    attachment_count: 0,
                    diagnostics: vec![],
                },
                DocumentReport::Failed {
                    input: "b.html".into(),
                    error: PipelineError::Io(std::io::Error::other("boom")),
                },
            ],
        };
        assert_eq!((report.converted(), report.failed()), (1, 1));
        assert_eq!(report.documents[1].input(), Path::new("b.html"));
    }
}
