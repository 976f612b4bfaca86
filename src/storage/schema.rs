//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Ladle database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    done_count INTEGER NOT NULL DEFAULT 0,
    abandoned_count INTEGER NOT NULL DEFAULT 0
);

-- Crawl queue: one row per normalized URL
CREATE TABLE IF NOT EXISTS tasks (
    key TEXT PRIMARY KEY,
    url TEXT NOT NULL,
    domain TEXT NOT NULL,
    attempt INTEGER NOT NULL DEFAULT 1,
    status TEXT NOT NULL,
    discovered_at TEXT NOT NULL,
    seq INTEGER NOT NULL,
    last_error TEXT,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
CREATE INDEX IF NOT EXISTS idx_tasks_domain ON tasks(domain);

-- Bounded log of URLs given up on
CREATE TABLE IF NOT EXISTS abandoned_log (
    key TEXT PRIMARY KEY,
    url TEXT NOT NULL,
    domain TEXT NOT NULL,
    failure_kind TEXT NOT NULL,
    message TEXT NOT NULL,
    abandoned_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_abandoned_at ON abandoned_log(abandoned_at);

-- Normalized recipes handed to the SQLite ingestion sink
CREATE TABLE IF NOT EXISTS recipes (
    source_url TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    body TEXT NOT NULL,
    fetched_at TEXT NOT NULL
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
