///
/// This module implements the CLI interface for lesson-docs: command parsing,
/// argument validation and the async entrypoint shared by `main` and the tests.
///
/// All conversion, merging and pipeline logic lives in the [`lesson-docs-core`] crate.
/// This module is strictly CLI glue: it resolves the working directory, layers
/// flags over the settings file and prints a short summary for the user.
///
/// ## How To Use
/// - For command-line users: use the installed `lesson-docs` binary with `--help`.
/// - For programmatic/integration use: call [`run`] with a constructed [`Cli`].
///
/// [`lesson-docs-core`]: ../../lesson-docs-core/
/// [`Cli`]: struct.Cli.html
/// [`run`]: fn.run.html
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use lesson_docs_core::fetch::HttpMediaFetcher;
use lesson_docs_core::merge::SortOrder;
use lesson_docs_core::pipeline::{
    convert_all, publish, ConvertOptions, DocumentReport, PublishOptions,
};
use lesson_docs_core::workdir::WorkDir;

use crate::load_config::{load_settings, write_default_config};
use crate::upload::DriveClient;

/// CLI for lesson-docs: turn saved lesson pages into documents and publish them.
#[derive(Parser)]
#[clap(
    name = "lesson-docs",
    version,
    about = "Convert saved HTML lessons to DOCX, merge them and upload the result to Google Drive"
)]
pub struct Cli {
    /// Working directory (default: $LESSON_DOCS_WORKDIR, else ~/lesson-docs)
    #[clap(long, global = true)]
    pub workdir: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the working directory layout and a default settings file
    Init,
    /// Convert every saved HTML lesson to DOCX
    Convert {
        /// Font for body text (default: Helvetica)
        #[clap(long)]
        font: Option<String>,
        /// Leave images out instead of embedding them
        #[clap(long)]
        nomedia: bool,
    },
    /// Merge converted lessons into one document and upload it
    Publish {
        /// Folder with lesson .docx files (default: converted_docs)
        #[clap(long)]
        folder_path: Option<PathBuf>,
        /// File name for the merged document (default: <folder name>.docx)
        #[clap(long)]
        merged_name: Option<String>,
        /// How to order lessons
        #[clap(long, value_enum)]
        sort: Option<SortArg>,
        /// Only write the merged document; do not upload it
        #[clap(long)]
        skip_upload: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SortArg {
    /// File name, case-insensitive
    Name,
    /// Creation time, oldest first
    Ctime,
}

impl From<SortArg> for SortOrder {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Name => SortOrder::Name,
            SortArg::Ctime => SortOrder::Created,
        }
    }
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    let workdir = WorkDir::resolve(cli.workdir);
    let settings = load_settings(workdir.root())?;

    match cli.command {
        Commands::Init => {
            tracing::info!(command = "init", root = %workdir.root().display(), "Initialising working directory");
            workdir
                .init()
                .with_context(|| format!("Failed to create {}", workdir.root().display()))?;
            let config = write_default_config(workdir.root())?;
            println!("Working directory ready: {}", workdir.root().display());
            println!("Settings: {}", config.display());
            Ok(())
        }
        Commands::Convert { font, nomedia } => {
            let options = ConvertOptions {
                font: font.unwrap_or(settings.font.clone()),
                skip_media: nomedia || settings.skip_media,
                fetch_timeout: settings.fetch_timeout(),
            };
            tracing::info!(command = "convert", ?options, "Starting conversion");
            let fetcher = HttpMediaFetcher::new(options.fetch_timeout)
                .context("Failed to build media fetcher")?;
            let report = convert_all(&workdir, &options, &fetcher).await?;

            for document in &report.documents {
                match document {
                    DocumentReport::Converted {
                        output,
                        diagnostics,
                        ..
                    } => {
                        println!("Saved: {}", output.display());
                        if !diagnostics.is_empty() {
                            println!("  ({} elements skipped or left out)", diagnostics.len());
                        }
                    }
                    DocumentReport::Failed { input, error } => {
                        eprintln!("Failed: {}: {error}", input.display());
                    }
                }
            }
            println!(
                "All lessons processed: {} converted, {} failed",
                report.converted(),
                report.failed()
            );
            Ok(())
        }
        Commands::Publish {
            folder_path,
            merged_name,
            sort,
            skip_upload,
        } => {
            let options = PublishOptions {
                folder: folder_path,
                merged_name,
                sort: sort.map(SortOrder::from).unwrap_or(settings.sort),
            };
            tracing::info!(command = "publish", ?options, skip_upload, "Starting publish");

            let report = if skip_upload {
                publish::<DriveClient>(&workdir, &options, None).await?
            } else {
                let client = DriveClient::new_from_env()
                    .context("Cannot upload without Google Drive credentials")?;
                publish(&workdir, &options, Some(&client)).await?
            };

            println!(
                "Merged {} lessons into {}",
                report.sources.len(),
                report.merged.display()
            );
            if let Some(stored) = &report.stored {
                println!(
                    "Uploaded to Google Docs: {}",
                    stored.link.as_deref().unwrap_or(&stored.id)
                );
            }
            Ok(())
        }
    }
}
