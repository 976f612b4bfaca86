//! Storage module for persisting crawl state
//!
//! This module handles all database operations for the scraper, including:
//! - SQLite database initialization and schema management
//! - Crawl queue persistence and crash recovery
//! - The bounded abandoned-URL log
//! - Run tracking
//! - Recipe rows for the SQLite ingestion sink

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::queue::{FailureKind, TaskStatus};
use chrono::{DateTime, Utc};

/// A task as stored in the database
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRecord {
    pub key: String,
    pub url: String,
    pub domain: String,
    pub attempt: u32,
    pub status: TaskStatus,
    pub discovered_at: DateTime<Utc>,
    pub seq: u64,
    pub last_error: Option<String>,
}

/// An entry of the abandoned log
#[derive(Debug, Clone, PartialEq)]
pub struct AbandonedRecord {
    pub key: String,
    pub url: String,
    pub domain: String,
    pub kind: FailureKind,
    pub message: String,
    pub abandoned_at: DateTime<Utc>,
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
    pub done: u64,
    pub abandoned: u64,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    /// Queue drained
    Completed,
    /// Ended by the stall timeout with work left pending
    Stalled,
    /// Ended by the cancellation signal
    Cancelled,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Stalled => "stalled",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "stalled" => Some(Self::Stalled),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}
