//! Output module for run summaries, reports and statistics
//!
//! This module provides:
//! - A console summary of a finished run
//! - A markdown report of abandoned URLs grouped by domain and failure kind
//! - Statistics over the crawl database for `--stats`

mod markdown;
mod stats;

pub use markdown::{format_abandoned_report, write_abandoned_report};
pub use stats::{load_statistics, print_statistics, CrawlStatistics};

use crate::crawler::CrawlSummary;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Prints a run summary to stdout
pub fn print_summary(summary: &CrawlSummary) {
    println!("=== Run {} ({}) ===\n", summary.run_id, summary.end_reason);
    println!("  Recipes ingested: {}", summary.done);
    println!("  Abandoned URLs:   {}", summary.abandoned);
    println!("  Left pending:     {}", summary.pending_left);
    println!(
        "  Duration:         {:.1}s",
        summary.duration_ms as f64 / 1000.0
    );

    if !summary.skipped_sites.is_empty() {
        println!("\nSkipped sites:");
        for site in &summary.skipped_sites {
            println!("  - {}: {}", site.domain, site.reason);
        }
    }
    println!();
}
