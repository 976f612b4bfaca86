//! Crawl coordinator - main crawl orchestration logic
//!
//! This module ties the pipeline together for one run:
//! - Opening the durable queue and recording the run
//! - Discovering recipe URLs site by site and enqueueing them
//! - Driving a fixed pool of workers (dequeue, fetch, parse, ingest, report)
//! - Ending the run on drain, stall or cancellation and summarizing it

use crate::config::Config;
use crate::crawler::fetcher::{build_http_client, fetch_url, FetchResult};
use crate::crawler::parser::parse_recipe;
use crate::queue::{
    spawn_queue, CrawlQueue, CrawlTask, EnqueueOutcome, FailureKind, QueueHandle, QueueSettings,
};
use crate::registry::SiteRegistry;
use crate::robots::fetch_robots;
use crate::sink::{IngestError, IngestSink};
use crate::sitemap::SitemapDiscoverer;
use crate::storage::{RunStatus, SqliteStorage, Storage};
use crate::LadleError;
use futures::StreamExt;
use reqwest::Client;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Which sites a run covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlTarget {
    All,
    Site(String),
}

/// Why a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// No pending or in-flight work was left
    Drained,
    /// Nothing was dispatched for the stall timeout; pending work stays queued
    Stalled,
    /// The cancellation token fired
    Cancelled,
}

impl EndReason {
    fn run_status(self) -> RunStatus {
        match self {
            Self::Drained => RunStatus::Completed,
            Self::Stalled => RunStatus::Stalled,
            Self::Cancelled => RunStatus::Cancelled,
        }
    }
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Drained => "drained",
            Self::Stalled => "stalled",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A URL given up on during the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbandonedUrl {
    pub url: String,
    pub domain: String,
    pub kind: FailureKind,
    pub message: String,
}

/// A site whose discovery failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedSite {
    pub domain: String,
    pub reason: String,
}

/// Outcome of one crawl run
#[derive(Debug, Clone)]
pub struct CrawlSummary {
    pub run_id: i64,
    pub done: u64,
    pub abandoned: u64,
    /// Tasks left queued for a future run
    pub pending_left: u64,
    pub duration_ms: u64,
    pub abandoned_urls: Vec<AbandonedUrl>,
    pub skipped_sites: Vec<SkippedSite>,
    pub end_reason: EndReason,
}

/// Shared, read-only state for workers
struct WorkerContext {
    client: Client,
    registry: Arc<SiteRegistry>,
    sink: Arc<dyn IngestSink>,
    fetch_timeout: Duration,
    poll_interval: Duration,
}

/// Runs crawls over the configured sites
pub struct Crawler {
    config: Config,
    registry: Arc<SiteRegistry>,
    client: Client,
    sink: Arc<dyn IngestSink>,
    database_path: PathBuf,
    config_hash: String,
}

impl Crawler {
    /// Creates a crawler from a validated configuration
    ///
    /// # Arguments
    ///
    /// * `config` - The loaded configuration
    /// * `sink` - Where parsed recipes are delivered
    pub fn new(config: Config, sink: Arc<dyn IngestSink>) -> Result<Self, LadleError> {
        let registry = Arc::new(SiteRegistry::from_config(&config)?);
        let client = build_http_client(&config.user_agent)?;
        let database_path = PathBuf::from(&config.output.database_path);

        Ok(Self {
            config,
            registry,
            client,
            sink,
            database_path,
            config_hash: String::new(),
        })
    }

    /// Records the configuration hash with each run
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = hash.into();
        self
    }

    pub fn registry(&self) -> &SiteRegistry {
        &self.registry
    }

    /// Runs a crawl until the queue drains, stalls, or `cancel` fires
    ///
    /// Discovery and fetching overlap: workers start immediately and take
    /// URLs as discovery enqueues them. Task-level failures never end the
    /// run; only storage or queue infrastructure errors are returned.
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlSummary)` - The run finished (for any [`EndReason`])
    /// * `Err(LadleError::UnknownDomain)` - `target` names an unconfigured site
    pub async fn run(
        &self,
        target: CrawlTarget,
        cancel: CancellationToken,
    ) -> Result<CrawlSummary, LadleError> {
        let started = Instant::now();
        let domains = self.resolve_target(&target)?;

        let mut runs = SqliteStorage::new(&self.database_path)?;
        if let Some(previous) = runs.get_latest_run()? {
            if previous.status == RunStatus::Running {
                tracing::warn!("Previous run {} was interrupted", previous.id);
                runs.finish_run(
                    previous.id,
                    RunStatus::Cancelled,
                    previous.done,
                    previous.abandoned,
                )?;
            }
        }
        let run_id = runs.create_run(&self.config_hash)?;
        tracing::info!(
            "Starting run {} for {} site(s): {}",
            run_id,
            domains.len(),
            domains.iter().cloned().collect::<Vec<_>>().join(", ")
        );

        let queue = CrawlQueue::open(
            Box::new(SqliteStorage::new(&self.database_path)?),
            Arc::clone(&self.registry),
            QueueSettings::from_config(&self.config.crawler),
            &domains,
        )?;
        let (queue, queue_task) = spawn_queue(queue);

        let discovery_done = Arc::new(AtomicBool::new(false));
        let worker_cancel = cancel.child_token();
        let context = Arc::new(WorkerContext {
            client: self.client.clone(),
            registry: Arc::clone(&self.registry),
            sink: Arc::clone(&self.sink),
            fetch_timeout: Duration::from_millis(self.config.crawler.fetch_timeout_ms),
            poll_interval: Duration::from_millis(self.config.crawler.poll_interval_ms.max(1)),
        });

        let mut workers = JoinSet::new();
        for worker_id in 0..self.config.crawler.workers.max(1) as usize {
            workers.spawn(worker_loop(
                worker_id,
                Arc::clone(&context),
                queue.clone(),
                worker_cancel.clone(),
                Arc::clone(&discovery_done),
            ));
        }

        let skipped_sites = self.discover_all(&domains, &queue, &cancel).await;
        discovery_done.store(true, Ordering::SeqCst);
        let discovery_finished = Instant::now();

        let end_reason = self
            .supervise(&mut workers, &queue, &cancel, discovery_finished)
            .await;

        worker_cancel.cancel();
        while let Some(joined) = workers.join_next().await {
            log_worker_exit(joined);
        }

        let stats = queue.stats().await?;
        let abandoned = queue.abandoned().await?;
        drop(queue);
        queue_task.await?;

        let summary = CrawlSummary {
            run_id,
            done: stats.done,
            abandoned: stats.abandoned,
            pending_left: (stats.pending + stats.awaiting_retry + stats.in_flight) as u64,
            duration_ms: started.elapsed().as_millis() as u64,
            abandoned_urls: abandoned
                .into_iter()
                .map(|r| AbandonedUrl {
                    url: r.url,
                    domain: r.domain,
                    kind: r.kind,
                    message: r.message,
                })
                .collect(),
            skipped_sites,
            end_reason,
        };

        runs.finish_run(
            run_id,
            end_reason.run_status(),
            summary.done,
            summary.abandoned,
        )?;

        tracing::info!(
            "Run {} {}: {} done, {} abandoned, {} left pending in {}ms",
            run_id,
            end_reason,
            summary.done,
            summary.abandoned,
            summary.pending_left,
            summary.duration_ms
        );

        Ok(summary)
    }

    fn resolve_target(&self, target: &CrawlTarget) -> Result<BTreeSet<String>, LadleError> {
        match target {
            CrawlTarget::All => Ok(self.registry.list_domains()),
            CrawlTarget::Site(domain) => {
                let site = self.registry.get_config(domain)?;
                Ok(BTreeSet::from([site.domain.clone()]))
            }
        }
    }

    /// Discovers every targeted site in turn; returns the sites that failed
    async fn discover_all(
        &self,
        domains: &BTreeSet<String>,
        queue: &QueueHandle,
        cancel: &CancellationToken,
    ) -> Vec<SkippedSite> {
        let discoverer = SitemapDiscoverer::new(
            self.client.clone(),
            Duration::from_millis(self.config.crawler.fetch_timeout_ms),
            self.config.crawler.sitemap_max_depth,
            self.config.user_agent.crawler_name.clone(),
        );
        let mut skipped = Vec::new();

        for domain in domains {
            if cancel.is_cancelled() {
                break;
            }
            match self.discover_site(&discoverer, domain, queue, cancel).await {
                Ok(queued) => tracing::info!("Discovered {} new recipe URLs for {}", queued, domain),
                Err(LadleError::QueueClosed) => {
                    tracing::error!("Queue stopped during discovery of {}", domain);
                    break;
                }
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", domain, e);
                    skipped.push(SkippedSite {
                        domain: domain.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        skipped
    }

    async fn discover_site(
        &self,
        discoverer: &SitemapDiscoverer,
        domain: &str,
        queue: &QueueHandle,
        cancel: &CancellationToken,
    ) -> Result<usize, LadleError> {
        let site = self.registry.get_config(domain)?;

        let robots = if site.respect_robots {
            let robots = fetch_robots(
                &self.client,
                &site.base_url,
                Duration::from_millis(self.config.crawler.fetch_timeout_ms),
            )
            .await;
            if let Some(delay) = robots.crawl_delay(&self.config.user_agent.crawler_name) {
                queue.raise_delay_floor(&site.domain, delay).await?;
            }
            Some(robots)
        } else {
            None
        };

        let mut urls = discoverer.discover(&site, robots.as_ref());
        let mut queued = 0;

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => break,
                next = urls.next() => next,
            };
            let url = match next {
                Some(Ok(url)) => url,
                Some(Err(e)) => return Err(e),
                None => break,
            };

            match queue.enqueue(&url, &site.domain).await {
                Ok(EnqueueOutcome::Queued) => queued += 1,
                Ok(outcome) => tracing::debug!("Not enqueueing {}: {:?}", url, outcome),
                Err(LadleError::QueueClosed) => return Err(LadleError::QueueClosed),
                Err(e) => tracing::warn!("Failed to enqueue {}: {}", url, e),
            }
        }

        Ok(queued)
    }

    /// Waits for the run to end and reports why
    async fn supervise(
        &self,
        workers: &mut JoinSet<Result<(), LadleError>>,
        queue: &QueueHandle,
        cancel: &CancellationToken,
        discovery_finished: Instant,
    ) -> EndReason {
        let stall_timeout = Duration::from_secs(self.config.crawler.stall_timeout_secs);
        let mut tick = tokio::time::interval((stall_timeout / 10).clamp(
            Duration::from_millis(10),
            Duration::from_secs(1),
        ));

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("Cancellation requested, stopping workers");
                    return EndReason::Cancelled;
                }
                joined = workers.join_next() => match joined {
                    Some(result) => log_worker_exit(result),
                    None => return EndReason::Drained,
                },
                _ = tick.tick() => {
                    let idle = match queue.stats().await {
                        Ok(stats) => stats.idle_for.min(discovery_finished.elapsed()),
                        Err(e) => {
                            tracing::error!("Queue unavailable: {}", e);
                            return EndReason::Stalled;
                        }
                    };
                    if idle >= stall_timeout {
                        tracing::warn!("No task dispatched for {:?}, ending run", idle);
                        return EndReason::Stalled;
                    }
                }
            }
        }
    }
}

fn log_worker_exit(joined: Result<Result<(), LadleError>, tokio::task::JoinError>) {
    match joined {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!("Worker stopped: {}", e),
        Err(e) => tracing::error!("Worker panicked: {}", e),
    }
}

/// One worker: dequeue, fetch, parse, ingest, report, repeat
///
/// Exits when cancelled, or once discovery has finished and the queue has
/// nothing pending, in flight, or awaiting retry.
async fn worker_loop(
    worker_id: usize,
    ctx: Arc<WorkerContext>,
    queue: QueueHandle,
    cancel: CancellationToken,
    discovery_done: Arc<AtomicBool>,
) -> Result<(), LadleError> {
    loop {
        if cancel.is_cancelled() {
            return Ok(());
        }

        let task = match queue.dequeue_next(worker_id).await {
            Ok(Some(task)) => task,
            Err(LadleError::QueueClosed) => return Err(LadleError::QueueClosed),
            Err(e) => {
                // Nothing was dispatched, so the task is still pending
                tracing::error!("Worker {} failed to dequeue: {}", worker_id, e);
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(ctx.poll_interval) => continue,
                }
            }
            Ok(None) => {
                if discovery_done.load(Ordering::SeqCst) && queue.stats().await?.is_drained() {
                    tracing::debug!("Worker {} found the queue drained", worker_id);
                    return Ok(());
                }
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(ctx.poll_interval) => continue,
                }
            }
        };

        let fetched = tokio::select! {
            result = fetch_url(&ctx.client, &task.url, ctx.fetch_timeout) => result,
            _ = cancel.cancelled() => {
                tracing::debug!("Worker {} releasing {} on cancellation", worker_id, task.url);
                if let Err(e) = queue.release(&task).await {
                    tracing::warn!("Worker {} could not release {}: {}", worker_id, task.url, e);
                }
                return Ok(());
            }
        };

        match process_task(&ctx, &queue, &task, fetched).await {
            Ok(()) => {}
            Err(LadleError::QueueClosed) => return Err(LadleError::QueueClosed),
            Err(e) => tracing::error!("Worker {} failed to record {}: {}", worker_id, task.url, e),
        }
    }
}

async fn process_task(
    ctx: &WorkerContext,
    queue: &QueueHandle,
    task: &CrawlTask,
    fetched: FetchResult,
) -> Result<(), LadleError> {
    let page = match fetched {
        FetchResult::Success(page) => page,
        FetchResult::Failure(failure) => {
            queue
                .report_failure(task, failure.kind, failure.message)
                .await?;
            return Ok(());
        }
    };

    let site = ctx.registry.get_config(&task.site_domain)?;
    let recipe = match parse_recipe(&page, &site) {
        Ok(recipe) => recipe,
        Err(e) => {
            queue.report_failure(task, FailureKind::Parse, e.0).await?;
            return Ok(());
        }
    };

    tracing::debug!(
        "Parsed '{}' from {} ({} ingredients, {} steps)",
        recipe.title,
        task.url,
        recipe.ingredients.len(),
        recipe.steps.len()
    );

    match ctx.sink.ingest(recipe).await {
        Ok(()) => queue.report_success(task).await,
        Err(IngestError::Duplicate(url)) => {
            tracing::debug!("Recipe already known: {}", url);
            queue.report_success(task).await
        }
        Err(IngestError::Failed(message)) => {
            queue
                .report_failure(task, FailureKind::Ingest, message)
                .await
                .map(|_| ())
        }
    }
}
