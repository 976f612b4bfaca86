use serde::Deserialize;

/// Main configuration structure for Ladle
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    #[serde(default, rename = "site")]
    pub sites: Vec<SiteEntry>,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Number of workers in the fetch pool
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// Deadline for a single page or sitemap fetch (milliseconds)
    #[serde(rename = "fetch-timeout-ms", default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// How long an idle worker waits before asking the queue again (milliseconds)
    #[serde(rename = "poll-interval-ms", default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// A run ends when no task has been dispatched for this long (seconds)
    #[serde(rename = "stall-timeout-secs", default = "default_stall_timeout_secs")]
    pub stall_timeout_secs: u64,

    /// Base of the exponential retry delay (milliseconds)
    #[serde(rename = "backoff-base-ms", default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Upper bound of the retry delay (milliseconds)
    #[serde(rename = "backoff-cap-ms", default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,

    /// How long an abandoned URL is ignored by re-discovery (hours)
    #[serde(
        rename = "abandoned-cooldown-hours",
        default = "default_abandoned_cooldown_hours"
    )]
    pub abandoned_cooldown_hours: u64,

    /// Maximum number of entries kept in the abandoned log
    #[serde(
        rename = "abandoned-log-capacity",
        default = "default_abandoned_log_capacity"
    )]
    pub abandoned_log_capacity: usize,

    /// Maximum nesting of sitemap indexes
    #[serde(rename = "sitemap-max-depth", default = "default_sitemap_max_depth")]
    pub sitemap_max_depth: u32,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            stall_timeout_secs: default_stall_timeout_secs(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
            abandoned_cooldown_hours: default_abandoned_cooldown_hours(),
            abandoned_log_capacity: default_abandoned_log_capacity(),
            sitemap_max_depth: default_sitemap_max_depth(),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the identifying user agent: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Path to the markdown report of abandoned URLs
    #[serde(rename = "report-path")]
    pub report_path: String,
}

/// One supported recipe site
#[derive(Debug, Clone, Deserialize)]
pub struct SiteEntry {
    /// Site domain (e.g., "example.com")
    pub domain: String,

    /// Sitemap or sitemap-index URLs, in the order they are walked
    #[serde(rename = "sitemap-urls", default)]
    pub sitemap_urls: Vec<String>,

    /// Regex matched against a URL path to decide whether it is a recipe page
    #[serde(rename = "recipe-path-pattern")]
    pub recipe_path_pattern: String,

    /// Maximum number of in-flight fetches against this host
    #[serde(rename = "max-concurrency", default = "default_max_concurrency")]
    pub max_concurrency: u32,

    /// Minimum time between dispatches to this host (milliseconds)
    #[serde(rename = "request-delay-ms", default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    /// Number of retries after the first attempt for transient failures
    #[serde(rename = "retry-limit", default = "default_retry_limit")]
    pub retry_limit: u32,

    /// Whether robots.txt is fetched and honored during discovery
    #[serde(rename = "respect-robots", default = "default_true")]
    pub respect_robots: bool,

    /// Selector fallback used when a page has no usable structured data
    #[serde(default)]
    pub selectors: SelectorRules,
}

/// Per-field extraction rules
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct SelectorRules {
    pub title: Option<SelectorRule>,
    pub ingredients: Option<SelectorRule>,
    pub steps: Option<SelectorRule>,
    #[serde(rename = "total-time")]
    pub total_time: Option<SelectorRule>,
    pub servings: Option<SelectorRule>,
}

impl SelectorRules {
    /// Iterates over the configured rules with their field names
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &SelectorRule)> {
        [
            ("title", self.title.as_ref()),
            ("ingredients", self.ingredients.as_ref()),
            ("steps", self.steps.as_ref()),
            ("total-time", self.total_time.as_ref()),
            ("servings", self.servings.as_ref()),
        ]
        .into_iter()
        .filter_map(|(name, rule)| rule.map(|r| (name, r)))
    }
}

/// A CSS selector, optionally reading an attribute instead of element text
///
/// Accepts either a bare string (`"ul.ingredients li"`) or a table
/// (`{ selector = "time", attribute = "datetime" }`).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum SelectorRule {
    Css(String),
    Detailed {
        selector: String,
        attribute: Option<String>,
    },
}

impl SelectorRule {
    pub fn selector(&self) -> &str {
        match self {
            Self::Css(s) => s,
            Self::Detailed { selector, .. } => selector,
        }
    }

    pub fn attribute(&self) -> Option<&str> {
        match self {
            Self::Css(_) => None,
            Self::Detailed { attribute, .. } => attribute.as_deref(),
        }
    }
}

fn default_workers() -> u32 {
    4
}

fn default_fetch_timeout_ms() -> u64 {
    15_000
}

fn default_poll_interval_ms() -> u64 {
    50
}

fn default_stall_timeout_secs() -> u64 {
    120
}

fn default_backoff_base_ms() -> u64 {
    1_000
}

fn default_backoff_cap_ms() -> u64 {
    300_000
}

fn default_abandoned_cooldown_hours() -> u64 {
    24
}

fn default_abandoned_log_capacity() -> usize {
    5_000
}

fn default_sitemap_max_depth() -> u32 {
    3
}

fn default_max_concurrency() -> u32 {
    1
}

fn default_request_delay_ms() -> u64 {
    1_000
}

fn default_retry_limit() -> u32 {
    3
}

fn default_true() -> bool {
    true
}
