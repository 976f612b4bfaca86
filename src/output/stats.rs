//! Statistics generation from the crawl database
//!
//! This module provides functionality for extracting and displaying
//! queue and recipe statistics from the storage layer.

use crate::output::OutputResult;
use crate::queue::TaskStatus;
use crate::storage::{RunRecord, Storage};
use std::collections::HashMap;

/// Crawl statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    /// Total number of tasks in the queue table
    pub total_tasks: u64,

    /// Count of tasks by status
    pub tasks_by_status: HashMap<TaskStatus, u64>,

    /// Entries currently held in the abandoned log
    pub abandoned_log_size: u64,

    /// Recipes stored by the SQLite sink
    pub recipes: u64,

    /// Most recent run, if any
    pub last_run: Option<RunRecord>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
pub fn load_statistics(storage: &dyn Storage) -> OutputResult<CrawlStatistics> {
    let mut tasks_by_status = HashMap::new();
    let mut total_tasks = 0;

    for status in [
        TaskStatus::Pending,
        TaskStatus::InFlight,
        TaskStatus::Failed,
        TaskStatus::Done,
        TaskStatus::Abandoned,
    ] {
        let count = storage.count_tasks_by_status(status)?;
        total_tasks += count;
        if count > 0 {
            tasks_by_status.insert(status, count);
        }
    }

    let abandoned_log_size = storage.load_abandoned()?.len() as u64;
    let recipes = storage.count_recipes()?;
    let last_run = storage.get_latest_run()?;

    Ok(CrawlStatistics {
        total_tasks,
        tasks_by_status,
        abandoned_log_size,
        recipes,
        last_run,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Overview:");
    println!("  Tracked URLs: {}", stats.total_tasks);
    println!("  Stored recipes: {}", stats.recipes);
    println!("  Abandoned log entries: {}", stats.abandoned_log_size);
    println!();

    println!("Tasks by Status:");
    let mut status_counts: Vec<_> = stats.tasks_by_status.iter().collect();
    status_counts.sort_by(|a, b| b.1.cmp(a.1));

    for (status, count) in status_counts {
        let percentage = if stats.total_tasks > 0 {
            (*count as f64 / stats.total_tasks as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", status, count, percentage);
    }
    println!();

    match &stats.last_run {
        Some(run) => {
            println!("Last Run:");
            println!("  ID: {}", run.id);
            println!("  Started: {}", run.started_at);
            if let Some(finished) = &run.finished_at {
                println!("  Finished: {}", finished);
            }
            println!("  Status: {}", run.status.to_db_string());
            println!("  Done / Abandoned: {} / {}", run.done, run.abandoned);
        }
        None => println!("No runs recorded yet."),
    }
}
