//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::crawler::NormalizedRecipe;
use crate::queue::{FailureKind, TaskStatus};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{AbandonedRecord, RunRecord, RunStatus, TaskRecord};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashSet;
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens (or creates) the database at `path` and applies the schema
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // WAL lets the queue, the run bookkeeping and the recipe sink each hold a connection
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<TaskRecord> {
    let status: String = row.get(4)?;
    let discovered_at: String = row.get(5)?;
    let seq: i64 = row.get(6)?;
    Ok(TaskRecord {
        key: row.get(0)?,
        url: row.get(1)?,
        domain: row.get(2)?,
        attempt: row.get(3)?,
        status: TaskStatus::from_db_string(&status).unwrap_or(TaskStatus::Pending),
        discovered_at: parse_timestamp(&discovered_at),
        seq: seq as u64,
        last_error: row.get(7)?,
    })
}

fn abandoned_from_row(row: &Row<'_>) -> rusqlite::Result<AbandonedRecord> {
    let kind: String = row.get(3)?;
    let abandoned_at: String = row.get(5)?;
    Ok(AbandonedRecord {
        key: row.get(0)?,
        url: row.get(1)?,
        domain: row.get(2)?,
        kind: FailureKind::from_db_string(&kind).unwrap_or(FailureKind::Parse),
        message: row.get(4)?,
        abandoned_at: parse_timestamp(&abandoned_at),
    })
}

const TASK_COLUMNS: &str =
    "key, url, domain, attempt, status, discovered_at, seq, last_error";

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![
                timestamp(Utc::now()),
                config_hash,
                RunStatus::Running.to_db_string()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        done: u64,
        abandoned: u64,
    ) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, done_count = ?3, abandoned_count = ?4
             WHERE id = ?5",
            params![
                status.to_db_string(),
                timestamp(Utc::now()),
                done as i64,
                abandoned as i64,
                run_id
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status, done_count, abandoned_count
                 FROM runs ORDER BY id DESC LIMIT 1",
                [],
                |row| {
                    let done: i64 = row.get(5)?;
                    let abandoned: i64 = row.get(6)?;
                    Ok(RunRecord {
                        id: row.get(0)?,
                        started_at: row.get(1)?,
                        finished_at: row.get(2)?,
                        config_hash: row.get(3)?,
                        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
                            .unwrap_or(RunStatus::Running),
                        done: done as u64,
                        abandoned: abandoned as u64,
                    })
                },
            )
            .optional()?;

        Ok(run)
    }

    // ===== Task Management =====

    fn upsert_task(&mut self, task: &TaskRecord) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO tasks (key, url, domain, attempt, status, discovered_at, seq, last_error, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(key) DO UPDATE SET
                url = excluded.url,
                domain = excluded.domain,
                attempt = excluded.attempt,
                status = excluded.status,
                discovered_at = excluded.discovered_at,
                seq = excluded.seq,
                last_error = excluded.last_error,
                updated_at = excluded.updated_at",
            params![
                task.key,
                task.url,
                task.domain,
                task.attempt,
                task.status.to_db_string(),
                timestamp(task.discovered_at),
                task.seq as i64,
                task.last_error,
                timestamp(Utc::now()),
            ],
        )?;
        Ok(())
    }

    fn update_task(
        &mut self,
        key: &str,
        status: TaskStatus,
        attempt: u32,
        last_error: Option<&str>,
    ) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE tasks SET status = ?1, attempt = ?2, last_error = ?3, updated_at = ?4 WHERE key = ?5",
            params![
                status.to_db_string(),
                attempt,
                last_error,
                timestamp(Utc::now()),
                key
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::TaskNotFound(key.to_string()));
        }
        Ok(())
    }

    fn get_task(&self, key: &str) -> StorageResult<Option<TaskRecord>> {
        let task = self
            .conn
            .query_row(
                &format!("SELECT {} FROM tasks WHERE key = ?1", TASK_COLUMNS),
                params![key],
                task_from_row,
            )
            .optional()?;
        Ok(task)
    }

    fn load_tasks(&self, statuses: &[TaskStatus]) -> StorageResult<Vec<TaskRecord>> {
        let wanted: HashSet<&str> = statuses.iter().map(|s| s.to_db_string()).collect();
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM tasks ORDER BY seq ASC", TASK_COLUMNS))?;

        let tasks = stmt
            .query_map([], task_from_row)?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .filter(|t| wanted.contains(t.status.to_db_string()))
            .collect();

        Ok(tasks)
    }

    fn load_done_keys(&self) -> StorageResult<HashSet<String>> {
        let mut stmt = self.conn.prepare("SELECT key FROM tasks WHERE status = ?1")?;
        let keys = stmt
            .query_map(params![TaskStatus::Done.to_db_string()], |row| row.get(0))?
            .collect::<Result<HashSet<String>, _>>()?;
        Ok(keys)
    }

    fn recover_interrupted(&mut self) -> StorageResult<usize> {
        let recovered = self.conn.execute(
            "UPDATE tasks SET status = ?1, updated_at = ?2 WHERE status = ?3",
            params![
                TaskStatus::Pending.to_db_string(),
                timestamp(Utc::now()),
                TaskStatus::InFlight.to_db_string()
            ],
        )?;
        Ok(recovered)
    }

    fn max_task_seq(&self) -> StorageResult<u64> {
        let max: Option<i64> = self
            .conn
            .query_row("SELECT MAX(seq) FROM tasks", [], |row| row.get(0))?;
        Ok(max.unwrap_or(0).max(0) as u64)
    }

    fn count_tasks_by_status(&self, status: TaskStatus) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM tasks WHERE status = ?1",
            params![status.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn clear_queue(&mut self) -> StorageResult<()> {
        self.conn
            .execute_batch("DELETE FROM tasks; DELETE FROM abandoned_log;")?;
        Ok(())
    }

    // ===== Abandoned Log =====

    fn record_abandoned(&mut self, record: &AbandonedRecord) -> StorageResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO abandoned_log (key, url, domain, failure_kind, message, abandoned_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.key,
                record.url,
                record.domain,
                record.kind.to_db_string(),
                record.message,
                timestamp(record.abandoned_at),
            ],
        )?;
        Ok(())
    }

    fn remove_abandoned(&mut self, key: &str) -> StorageResult<()> {
        self.conn
            .execute("DELETE FROM abandoned_log WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn prune_abandoned(&mut self, capacity: usize) -> StorageResult<usize> {
        let removed = self.conn.execute(
            "DELETE FROM abandoned_log WHERE key NOT IN (
                SELECT key FROM abandoned_log ORDER BY abandoned_at DESC LIMIT ?1
             )",
            params![capacity as i64],
        )?;
        Ok(removed)
    }

    fn load_abandoned(&self) -> StorageResult<Vec<AbandonedRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT key, url, domain, failure_kind, message, abandoned_at
             FROM abandoned_log ORDER BY abandoned_at ASC",
        )?;
        let records = stmt
            .query_map([], abandoned_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    // ===== Recipes =====

    fn insert_recipe(&mut self, recipe: &NormalizedRecipe) -> StorageResult<bool> {
        let body = serde_json::to_string(recipe)?;
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO recipes (source_url, title, body, fetched_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                recipe.source_url,
                recipe.title,
                body,
                timestamp(recipe.fetched_at)
            ],
        )?;
        Ok(inserted > 0)
    }

    fn get_recipe(&self, source_url: &str) -> StorageResult<Option<NormalizedRecipe>> {
        let body: Option<String> = self
            .conn
            .query_row(
                "SELECT body FROM recipes WHERE source_url = ?1",
                params![source_url],
                |row| row.get(0),
            )
            .optional()?;

        match body {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    fn count_recipes(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM recipes", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
