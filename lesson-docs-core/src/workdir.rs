//! Working directory layout.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

pub const WORKDIR_ENV: &str = "LESSON_DOCS_WORKDIR";
pub const DEFAULT_DIR_NAME: &str = "lesson-docs";

pub const INPUT_DIR: &str = "saved_html_lessons";
pub const PROCESSED_DIR: &str = "processed_html";
pub const OUTPUT_DIR: &str = "converted_docs";

/// Root of the tool's working files: pending pages, processed pages and
/// converted documents each live in a fixed subdirectory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkDir {
    root: PathBuf,
}

impl WorkDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `explicit`, else `$LESSON_DOCS_WORKDIR`, else `~/lesson-docs`.
    ///
    /// Falls back to a relative `lesson-docs` when no home directory is known.
    pub fn resolve(explicit: Option<PathBuf>) -> Self {
        let root = explicit
            .or_else(|| {
                std::env::var_os(WORKDIR_ENV)
                    .filter(|v| !v.is_empty())
                    .map(PathBuf::from)
            })
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .map(|home| home.join(DEFAULT_DIR_NAME))
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_DIR_NAME))
            });
        debug!(root = %root.display(), "Resolved working directory");
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn input(&self) -> PathBuf {
        self.root.join(INPUT_DIR)
    }

    pub fn processed(&self) -> PathBuf {
        self.root.join(PROCESSED_DIR)
    }

    pub fn output(&self) -> PathBuf {
        self.root.join(OUTPUT_DIR)
    }

    /// Creates the root and its subdirectories; existing ones are left alone.
    pub fn init(&self) -> std::io::Result<()> {
        for dir in [self.input(), self.processed(), self.output()] {
            std::fs::create_dir_all(&dir)?;
        }
        info!(root = %self.root.display(), "Working directory ready");
        Ok(())
    }
}
