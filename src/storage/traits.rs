//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::crawler::NormalizedRecipe;
use crate::queue::TaskStatus;
use crate::storage::{AbandonedRecord, RunRecord, RunStatus, TaskRecord};
use std::collections::HashSet;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// The crawl queue writes through every task transition so a later run can
/// resume pending work and skip recently abandoned URLs.
pub trait Storage: Send {
    // ===== Run Management =====

    /// Creates a new crawl run and returns its ID
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Marks a run finished with its outcome counts
    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        done: u64,
        abandoned: u64,
    ) -> StorageResult<()>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    // ===== Task Management =====

    /// Inserts a task, or replaces the stored row for the same key
    fn upsert_task(&mut self, task: &TaskRecord) -> StorageResult<()>;

    /// Updates the status, attempt and last error of a stored task
    fn update_task(
        &mut self,
        key: &str,
        status: TaskStatus,
        attempt: u32,
        last_error: Option<&str>,
    ) -> StorageResult<()>;

    /// Gets a task by its dedup key
    fn get_task(&self, key: &str) -> StorageResult<Option<TaskRecord>>;

    /// Loads tasks in any of the given states, oldest first
    fn load_tasks(&self, statuses: &[TaskStatus]) -> StorageResult<Vec<TaskRecord>>;

    /// Loads the keys of all completed tasks
    fn load_done_keys(&self) -> StorageResult<HashSet<String>>;

    /// Reverts tasks left in flight by an interrupted run to pending
    ///
    /// Returns the number of tasks recovered.
    fn recover_interrupted(&mut self) -> StorageResult<usize>;

    /// Highest sequence number handed out so far
    fn max_task_seq(&self) -> StorageResult<u64>;

    /// Counts tasks in a given state
    fn count_tasks_by_status(&self, status: TaskStatus) -> StorageResult<u64>;

    /// Drops all queue state (tasks and abandoned log); recipes are kept
    fn clear_queue(&mut self) -> StorageResult<()>;

    // ===== Abandoned Log =====

    /// Records (or refreshes) an abandoned URL
    fn record_abandoned(&mut self, record: &AbandonedRecord) -> StorageResult<()>;

    /// Removes an entry, e.g. when its cool-down has passed and it is re-enqueued
    fn remove_abandoned(&mut self, key: &str) -> StorageResult<()>;

    /// Keeps only the `capacity` most recent entries; returns how many were dropped
    fn prune_abandoned(&mut self, capacity: usize) -> StorageResult<usize>;

    /// Loads the abandoned log, oldest first
    fn load_abandoned(&self) -> StorageResult<Vec<AbandonedRecord>>;

    // ===== Recipes =====

    /// Stores a recipe; returns false if one with the same source URL already exists
    fn insert_recipe(&mut self, recipe: &NormalizedRecipe) -> StorageResult<bool>;

    /// Loads a stored recipe by source URL
    fn get_recipe(&self, source_url: &str) -> StorageResult<Option<NormalizedRecipe>>;

    /// Counts stored recipes
    fn count_recipes(&self) -> StorageResult<u64>;
}
