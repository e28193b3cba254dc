//! `lesson-docs` binary: saved lesson pages in, DOCX and a Google Doc out.

use anyhow::Result;
use clap::Parser;
use lesson_docs::cli::{run, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    // GOOGLE_DRIVE_* and LESSON_DOCS_WORKDIR may come from a .env file.
    dotenvy::dotenv().ok();

    // Logs go to stderr; stdout carries the per-lesson summary.
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    tracing::info!(workdir = ?cli.workdir, "lesson-docs starting");
    let result = run(cli).await;
    if let Err(e) = &result {
        tracing::error!(error = %e, "lesson-docs failed");
    }
    result
}
