//! Ladle: a polite recipe-site scraper
//!
//! This crate discovers recipe pages on an allow-list of cooking sites through
//! their sitemaps, fetches them under per-host politeness limits, extracts
//! structured recipe data and hands normalized recipes to an ingestion sink.

pub mod config;
pub mod crawler;
pub mod output;
pub mod queue;
pub mod registry;
pub mod robots;
pub mod sink;
pub mod sitemap;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Ladle operations
#[derive(Debug, Error)]
pub enum LadleError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Unknown domain: {0}")]
    UnknownDomain(String),

    #[error("Sitemap unavailable for {domain}: {reason}")]
    SitemapUnavailable { domain: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Invalid task transition for {key}: {from:?} -> {to:?}")]
    InvalidTransition {
        key: String,
        from: queue::TaskStatus,
        to: queue::TaskStatus,
    },

    #[error("Task not tracked by the queue: {0}")]
    UnknownTask(String),

    #[error("Crawl queue is no longer running")]
    QueueClosed,

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid domain: {0}")]
    InvalidDomain(String),

    #[error("Invalid selector for {domain}.{field}: {message}")]
    InvalidSelector {
        domain: String,
        field: String,
        message: String,
    },

    #[error("Invalid recipe path pattern for {domain}: {message}")]
    InvalidPattern { domain: String, message: String },
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,
}

/// Result type alias for Ladle operations
pub type Result<T> = std::result::Result<T, LadleError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlSummary, CrawlTarget, Crawler, FailureKind, NormalizedRecipe};
pub use queue::{CrawlTask, TaskStatus};
pub use registry::{SiteConfig, SiteRegistry};
pub use sink::{IngestError, IngestSink};
