//! Crawl queue state machine
//!
//! `CrawlQueue` owns every task between discovery and a terminal state. It
//! is a plain synchronous structure: admission checks and the transitions
//! they guard happen inside one `&mut self` call, and the actor in
//! `handle.rs` is its only caller at runtime.

use crate::queue::host::HostState;
use crate::queue::task::{CrawlTask, FailureKind, TaskStatus};
use crate::registry::SiteRegistry;
use crate::storage::{AbandonedRecord, Storage, TaskRecord};
use crate::url::{canonical_domain, fetch_url_form, normalize_url};
use crate::LadleError;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Retry and abandoned-log policy
#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub abandoned_cooldown: chrono::Duration,
    pub abandoned_capacity: usize,
}

impl QueueSettings {
    pub fn from_config(config: &crate::config::CrawlerConfig) -> Self {
        Self {
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            backoff_cap: Duration::from_millis(config.backoff_cap_ms),
            abandoned_cooldown: chrono::Duration::hours(config.abandoned_cooldown_hours as i64),
            abandoned_capacity: config.abandoned_log_capacity.max(1),
        }
    }

    /// Delay before retrying after failed attempt number `attempt`
    ///
    /// `base * 2^attempt`, saturating and capped at `backoff_cap`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt.min(31)).unwrap_or(u32::MAX);
        self.backoff_base
            .checked_mul(factor)
            .unwrap_or(self.backoff_cap)
            .min(self.backoff_cap)
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self::from_config(&crate::config::CrawlerConfig::default())
    }
}

/// Result of an enqueue request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// A new pending task was created
    Queued,
    /// A task for the URL is already pending, in flight or awaiting retry
    AlreadyActive,
    /// The URL was completed by this or an earlier run
    AlreadyDone,
    /// The URL was abandoned recently and is still cooling down
    CoolingDown,
}

/// Result of reporting a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Re-enqueued; eligible again after `delay`
    Retry { attempt: u32, delay: Duration },
    /// Terminal; recorded in the abandoned log
    Abandoned,
}

/// Snapshot of queue counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: usize,
    pub in_flight: usize,
    pub awaiting_retry: usize,
    pub done: u64,
    pub abandoned: u64,
    /// Time since the last successful dispatch, or since the queue opened
    pub idle_for: Duration,
}

impl QueueStats {
    /// True when nothing is left to dispatch and nothing is in flight
    pub fn is_drained(&self) -> bool {
        self.pending == 0 && self.in_flight == 0 && self.awaiting_retry == 0
    }
}

/// Deduplicating crawl queue with per-host admission control
pub struct CrawlQueue {
    registry: Arc<SiteRegistry>,
    settings: QueueSettings,
    storage: Box<dyn Storage>,

    /// Active tasks by dedup key
    tasks: HashMap<String, CrawlTask>,
    /// Dispatchable tasks in FIFO order
    ready: BTreeMap<(DateTime<Utc>, u64), String>,
    done: HashSet<String>,
    abandoned: HashMap<String, AbandonedRecord>,
    abandoned_order: VecDeque<(String, DateTime<Utc>)>,
    hosts: HashMap<String, HostState>,

    next_seq: u64,
    opened_at: Instant,
    last_dispatch: Option<Instant>,
    done_this_run: u64,
    abandoned_this_run: Vec<AbandonedRecord>,
}

impl CrawlQueue {
    /// Opens the queue over `storage`, resuming unfinished work for `domains`
    ///
    /// Tasks left in flight by an interrupted run return to pending. Pending
    /// tasks of sites outside `domains` stay in storage untouched.
    pub fn open(
        mut storage: Box<dyn Storage>,
        registry: Arc<SiteRegistry>,
        settings: QueueSettings,
        domains: &BTreeSet<String>,
    ) -> Result<Self, LadleError> {
        let recovered = storage.recover_interrupted()?;
        if recovered > 0 {
            tracing::info!("Recovered {} tasks left in flight by a previous run", recovered);
        }

        let next_seq = storage.max_task_seq()? + 1;
        let done = storage.load_done_keys()?;

        let mut queue = Self {
            registry,
            settings,
            storage,
            tasks: HashMap::new(),
            ready: BTreeMap::new(),
            done,
            abandoned: HashMap::new(),
            abandoned_order: VecDeque::new(),
            hosts: HashMap::new(),
            next_seq,
            opened_at: Instant::now(),
            last_dispatch: None,
            done_this_run: 0,
            abandoned_this_run: Vec::new(),
        };

        for record in queue.storage.load_abandoned()? {
            queue
                .abandoned_order
                .push_back((record.key.clone(), record.abandoned_at));
            queue.abandoned.insert(record.key.clone(), record);
        }

        let resumable = queue
            .storage
            .load_tasks(&[TaskStatus::Pending, TaskStatus::Failed])?;
        let mut resumed = 0;
        for record in resumable {
            if record.status.is_terminal() {
                continue;
            }
            if !domains.contains(&record.domain) || queue.registry.get_config(&record.domain).is_err() {
                continue;
            }
            let task = CrawlTask {
                key: record.key,
                url: record.url,
                site_domain: record.domain,
                attempt: record.attempt,
                status: record.status,
                discovered_at: record.discovered_at,
                seq: record.seq,
                not_before: None,
                last_error: record.last_error,
            };
            queue.ready.insert((task.discovered_at, task.seq), task.key.clone());
            queue.tasks.insert(task.key.clone(), task);
            resumed += 1;
        }

        if resumed > 0 {
            tracing::info!("Resumed {} pending tasks from storage", resumed);
        }

        Ok(queue)
    }

    /// Adds a URL unless it is already active, done, or cooling down
    pub fn enqueue(&mut self, url: &str, site_domain: &str) -> Result<EnqueueOutcome, LadleError> {
        let site = self.registry.get_config(site_domain)?;
        let key = normalize_url(url)?.to_string();

        if self.tasks.contains_key(&key) {
            return Ok(EnqueueOutcome::AlreadyActive);
        }
        if self.done.contains(&key) {
            return Ok(EnqueueOutcome::AlreadyDone);
        }
        if let Some(entry) = self.abandoned.get(&key) {
            if Utc::now() - entry.abandoned_at < self.settings.abandoned_cooldown {
                return Ok(EnqueueOutcome::CoolingDown);
            }
            self.storage.remove_abandoned(&key)?;
            self.abandoned.remove(&key);
        }

        let fetch_url = fetch_url_form(url)?.to_string();
        let task = CrawlTask::new(key.clone(), fetch_url, site.domain.clone(), self.next_seq);
        self.next_seq += 1;

        self.storage.upsert_task(&to_record(&task))?;
        tracing::debug!("Enqueued {} for {}", task.url, task.site_domain);

        self.ready.insert((task.discovered_at, task.seq), key.clone());
        self.tasks.insert(key, task);
        Ok(EnqueueOutcome::Queued)
    }

    /// Dispatches the oldest eligible task
    ///
    /// A task is eligible when its backoff has elapsed, its host has fewer
    /// than `max_concurrency` tasks in flight, and the host's request delay
    /// has passed since its last dispatch. The chosen task becomes
    /// `InFlight` and the dispatch is recorded against its host.
    pub fn dequeue_next(
        &mut self,
        worker_id: usize,
        now: Instant,
    ) -> Result<Option<CrawlTask>, LadleError> {
        let mut gated_hosts: HashSet<&str> = HashSet::new();
        let mut chosen: Option<(DateTime<Utc>, u64)> = None;

        for (order_key, task_key) in &self.ready {
            let Some(task) = self.tasks.get(task_key) else {
                continue;
            };
            if !task.status.is_dispatchable()
                || gated_hosts.contains(task.site_domain.as_str())
                || !task.is_due(now)
            {
                continue;
            }

            let site = self.registry.get_config(&task.site_domain)?;
            let admitted = self
                .hosts
                .get(&task.site_domain)
                .map_or(true, |host| host.can_dispatch(&site, now));

            if admitted {
                chosen = Some(*order_key);
                break;
            }
            gated_hosts.insert(task.site_domain.as_str());
        }

        let Some(order_key) = chosen else {
            return Ok(None);
        };
        let Some(task_key) = self.ready.get(&order_key).cloned() else {
            return Ok(None);
        };
        let Some(task) = self.tasks.get(&task_key) else {
            return Err(LadleError::UnknownTask(task_key));
        };

        // Nothing changes in memory unless the transition was persisted
        self.storage
            .update_task(&task.key, TaskStatus::InFlight, task.attempt, task.last_error.as_deref())?;

        self.ready.remove(&order_key);
        let Some(task) = self.tasks.get_mut(&task_key) else {
            return Err(LadleError::UnknownTask(task_key));
        };
        task.status = TaskStatus::InFlight;
        task.not_before = None;
        self.hosts
            .entry(task.site_domain.clone())
            .or_default()
            .record_dispatch(now);
        self.last_dispatch = Some(now);

        tracing::debug!(
            "Worker {} took {} (attempt {})",
            worker_id,
            task.url,
            task.attempt
        );
        Ok(Some(task.clone()))
    }

    /// Marks an in-flight task as done
    pub fn report_success(&mut self, task: &CrawlTask) -> Result<(), LadleError> {
        let attempt = self.in_flight(&task.key, TaskStatus::Done)?.attempt;
        self.storage
            .update_task(&task.key, TaskStatus::Done, attempt, None)?;

        let active = self.take_in_flight(&task.key)?;
        self.done.insert(active.key.clone());
        self.done_this_run += 1;

        tracing::debug!("Done: {}", active.url);
        Ok(())
    }

    /// Handles a failed attempt
    ///
    /// Transient failures with attempts left are re-enqueued with an
    /// exponential backoff; everything else is abandoned.
    pub fn report_failure(
        &mut self,
        task: &CrawlTask,
        kind: FailureKind,
        message: &str,
        now: Instant,
    ) -> Result<FailureOutcome, LadleError> {
        let mut active = self.in_flight(&task.key, TaskStatus::Failed)?.clone();
        let site = self.registry.get_config(&active.site_domain)?;
        active.last_error = Some(format!("{}: {}", kind, message));

        if kind.is_transient() && active.attempt < site.max_attempts() {
            let delay = self.settings.backoff_delay(active.attempt);
            active.attempt += 1;
            active.status = TaskStatus::Failed;
            active.not_before = Some(now + delay);

            self.storage.update_task(
                &active.key,
                TaskStatus::Failed,
                active.attempt,
                active.last_error.as_deref(),
            )?;
            self.take_in_flight(&active.key)?;

            tracing::warn!(
                "Retrying {} in {:?} (attempt {} of {}): {}",
                active.url,
                delay,
                active.attempt,
                site.max_attempts(),
                message
            );

            let attempt = active.attempt;
            self.ready
                .insert((active.discovered_at, active.seq), active.key.clone());
            self.tasks.insert(active.key.clone(), active);
            return Ok(FailureOutcome::Retry { attempt, delay });
        }

        let record = AbandonedRecord {
            key: active.key.clone(),
            url: active.url.clone(),
            domain: active.site_domain.clone(),
            kind,
            message: message.to_string(),
            abandoned_at: Utc::now(),
        };
        self.storage.record_abandoned(&record)?;
        self.storage.update_task(
            &active.key,
            TaskStatus::Abandoned,
            active.attempt,
            active.last_error.as_deref(),
        )?;

        self.take_in_flight(&active.key)?;
        self.remember_abandoned(record.clone());
        self.abandoned_this_run.push(record);

        tracing::warn!(
            "Abandoned {} after {} attempt(s): {} ({})",
            active.url,
            active.attempt,
            kind,
            message
        );
        Ok(FailureOutcome::Abandoned)
    }

    /// Returns an in-flight task to pending without consuming an attempt
    ///
    /// Used when a run is cancelled while the task is being fetched.
    pub fn release(&mut self, task: &CrawlTask) -> Result<(), LadleError> {
        let current = self.in_flight(&task.key, TaskStatus::Pending)?.clone();
        self.storage.update_task(
            &current.key,
            TaskStatus::Pending,
            current.attempt,
            current.last_error.as_deref(),
        )?;

        let mut active = self.take_in_flight(&task.key)?;
        active.status = TaskStatus::Pending;

        self.ready
            .insert((active.discovered_at, active.seq), active.key.clone());
        self.tasks.insert(active.key.clone(), active);
        Ok(())
    }

    /// Raises a host's minimum delay between dispatches (e.g. from robots.txt)
    pub fn raise_delay_floor(&mut self, domain: &str, floor: Duration) {
        let host = self.hosts.entry(canonical_domain(domain)).or_default();
        if floor > host.delay_floor {
            tracing::info!("Using request delay of {:?} for {}", floor, domain);
            host.delay_floor = floor;
        }
    }

    /// Current counters
    pub fn stats(&self, now: Instant) -> QueueStats {
        let mut stats = QueueStats {
            done: self.done_this_run,
            abandoned: self.abandoned_this_run.len() as u64,
            idle_for: now.saturating_duration_since(self.last_dispatch.unwrap_or(self.opened_at)),
            ..QueueStats::default()
        };
        for task in self.tasks.values().filter(|t| t.status.is_active()) {
            if !task.status.is_dispatchable() {
                stats.in_flight += 1;
            } else if task.status == TaskStatus::Failed {
                stats.awaiting_retry += 1;
            } else {
                stats.pending += 1;
            }
        }
        stats
    }

    /// Tasks abandoned since the queue was opened
    pub fn abandoned_this_run(&self) -> &[AbandonedRecord] {
        &self.abandoned_this_run
    }

    /// Looks up an active task
    pub fn get(&self, key: &str) -> Option<&CrawlTask> {
        self.tasks.get(key)
    }

    /// Status of a URL as the queue sees it (active, done, or abandoned)
    pub fn status_of(&self, url: &str) -> Option<TaskStatus> {
        let key = normalize_url(url).ok()?.to_string();
        if let Some(task) = self.tasks.get(&key) {
            return Some(task.status);
        }
        if self.done.contains(&key) {
            return Some(TaskStatus::Done);
        }
        if self.abandoned.contains_key(&key) {
            return Some(TaskStatus::Abandoned);
        }
        None
    }

    /// Looks up a task that must be in flight for the transition to `to`
    fn in_flight(&self, key: &str, to: TaskStatus) -> Result<&CrawlTask, LadleError> {
        let task = self
            .tasks
            .get(key)
            .ok_or_else(|| LadleError::UnknownTask(key.to_string()))?;
        if task.status != TaskStatus::InFlight {
            return Err(LadleError::InvalidTransition {
                key: key.to_string(),
                from: task.status,
                to,
            });
        }
        Ok(task)
    }

    /// Removes an in-flight task from the active set and frees its host slot
    ///
    /// Called only after the new status has been written to storage.
    fn take_in_flight(&mut self, key: &str) -> Result<CrawlTask, LadleError> {
        let task = self
            .tasks
            .remove(key)
            .ok_or_else(|| LadleError::UnknownTask(key.to_string()))?;
        if let Some(host) = self.hosts.get_mut(&task.site_domain) {
            host.record_return();
        }
        Ok(task)
    }

    /// Adds an entry to the bounded abandoned log
    fn remember_abandoned(&mut self, record: AbandonedRecord) {
        self.abandoned_order
            .push_back((record.key.clone(), record.abandoned_at));
        self.abandoned.insert(record.key.clone(), record);

        while self.abandoned.len() > self.settings.abandoned_capacity {
            let Some((key, at)) = self.abandoned_order.pop_front() else {
                break;
            };
            // Stale order entries belong to an older abandonment of a re-abandoned URL
            if self.abandoned.get(&key).map(|r| r.abandoned_at) == Some(at) {
                self.abandoned.remove(&key);
            }
        }
        // The entry itself is already stored; an oversized table only delays pruning
        if let Err(e) = self.storage.prune_abandoned(self.settings.abandoned_capacity) {
            tracing::warn!("Failed to prune abandoned log: {}", e);
        }
    }
}

fn to_record(task: &CrawlTask) -> TaskRecord {
    TaskRecord {
        key: task.key.clone(),
        url: task.url.clone(),
        domain: task.site_domain.clone(),
        attempt: task.attempt,
        status: task.status,
        discovered_at: task.discovered_at,
        seq: task.seq,
        last_error: task.last_error.clone(),
    }
}
