//! Output module for persisting results and reporting runs
//!
//! This module handles:
//! - Rewriting the JSON progress snapshot after every batch
//! - Writing per-batch and cumulative CSV tables
//! - Run statistics and the markdown summary

mod markdown;
mod progress;
pub mod stats;
mod table;

pub use markdown::{format_markdown_summary, generate_markdown_summary};
pub use progress::{load_snapshot, render_records, write_records, ProgressPersister};
pub use stats::{print_summary, RunSummary};
pub use table::{append_csv, write_csv};

use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] ::csv::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;
