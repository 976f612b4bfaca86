//! Crawl task definitions
//!
//! This module defines the unit of work tracked by the crawl queue, its
//! lifecycle states, and the failure taxonomy that drives retries.
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Instant;

/// Lifecycle state of a crawl task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    // ===== Active States =====
    /// Waiting to be dispatched
    Pending,

    /// Dispatched to a worker
    InFlight,

    /// Last attempt failed; a retry is scheduled once its backoff elapses
    Failed,

    // ===== Terminal States =====
    /// Fetched, parsed and handed to the ingestion sink
    Done,

    /// Given up on; recorded in the abandoned log
    Abandoned,
}

impl TaskStatus {
    /// Returns true if the task still occupies its URL in the queue
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::InFlight | Self::Failed)
    }

    /// Returns true if no further processing will happen in this run
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Abandoned)
    }

    /// Returns true if a worker may pick the task up (subject to backoff and host gates)
    pub fn is_dispatchable(&self) -> bool {
        matches!(self, Self::Pending | Self::Failed)
    }

    /// Converts the status to its database representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Failed => "failed",
            Self::Done => "done",
            Self::Abandoned => "abandoned",
        }
    }

    /// Parses a status from its database representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_flight" => Some(Self::InFlight),
            "failed" => Some(Self::Failed),
            "done" => Some(Self::Done),
            "abandoned" => Some(Self::Abandoned),
            _ => None,
        }
    }

    pub fn all_states() -> [Self; 5] {
        [
            Self::Pending,
            Self::InFlight,
            Self::Failed,
            Self::Done,
            Self::Abandoned,
        ]
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Why a task attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Network, DNS, TLS or timeout failure
    Transport,

    /// HTTP 429 or 503
    RateLimited,

    /// Any other 5xx status
    Http5xx,

    /// 4xx other than 429; the resource is missing or forbidden
    Http4xx,

    /// A status outside the success and error ranges (e.g. an unfollowed redirect)
    UnexpectedStatus,

    /// Page had no usable recipe data
    Parse,

    /// The ingestion sink failed for a reason other than a duplicate
    Ingest,
}

impl FailureKind {
    /// Returns true if retrying can plausibly succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transport | Self::RateLimited | Self::Http5xx | Self::Ingest
        )
    }

    /// Classifies a non-success HTTP status
    pub fn from_status(status: u16) -> Self {
        match status {
            429 | 503 => Self::RateLimited,
            500..=599 => Self::Http5xx,
            400..=499 => Self::Http4xx,
            _ => Self::UnexpectedStatus,
        }
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::RateLimited => "rate_limited",
            Self::Http5xx => "http_5xx",
            Self::Http4xx => "http_4xx",
            Self::UnexpectedStatus => "unexpected_status",
            Self::Parse => "parse",
            Self::Ingest => "ingest",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "transport" => Some(Self::Transport),
            "rate_limited" => Some(Self::RateLimited),
            "http_5xx" => Some(Self::Http5xx),
            "http_4xx" => Some(Self::Http4xx),
            "unexpected_status" => Some(Self::UnexpectedStatus),
            "parse" => Some(Self::Parse),
            "ingest" => Some(Self::Ingest),
            _ => None,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// A URL scheduled for fetching
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlTask {
    /// Normalized URL; the queue's dedup key
    pub key: String,

    /// URL as discovered; this is what gets fetched
    pub url: String,

    /// Canonical domain of the owning site
    pub site_domain: String,

    /// 1-based attempt number
    pub attempt: u32,

    pub status: TaskStatus,

    pub discovered_at: DateTime<Utc>,

    /// Insertion order; breaks ties between equal discovery times
    pub seq: u64,

    /// Earliest dispatch time for a task waiting out its backoff
    pub not_before: Option<Instant>,

    /// Most recent failure, if any
    pub last_error: Option<String>,
}

impl CrawlTask {
    /// Creates a fresh pending task on its first attempt
    pub fn new(key: String, url: String, site_domain: String, seq: u64) -> Self {
        Self {
            key,
            url,
            site_domain,
            attempt: 1,
            status: TaskStatus::Pending,
            discovered_at: Utc::now(),
            seq,
            not_before: None,
            last_error: None,
        }
    }

    /// Returns true if the task's backoff (if any) has elapsed
    pub fn is_due(&self, now: Instant) -> bool {
        self.not_before.map_or(true, |t| now >= t)
    }
}
