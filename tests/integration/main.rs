//! Integration tests for the scraper
//!
//! These tests use wiremock to stand up a fake recipe site and drive whole
//! crawl runs end-to-end against a temporary database.

mod crawl_tests;

use ladle::config::{parse_config, Config};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Knobs that differ between tests
pub struct SiteOptions {
    pub retry_limit: u32,
    pub respect_robots: bool,
    pub sitemap_path: &'static str,
    pub fetch_timeout_ms: u64,
    pub request_delay_ms: u64,
}

impl Default for SiteOptions {
    fn default() -> Self {
        Self {
            retry_limit: 3,
            respect_robots: false,
            sitemap_path: "/sitemap.xml",
            fetch_timeout_ms: 1000,
            request_delay_ms: 0,
        }
    }
}

/// Builds a validated config for a single site served by `server`
pub fn test_config(server: &MockServer, dir: &TempDir, options: SiteOptions) -> Config {
    let toml = format!(
        r#"
[crawler]
workers = 2
fetch-timeout-ms = {fetch_timeout}
poll-interval-ms = 10
stall-timeout-secs = 3
backoff-base-ms = 10
backoff-cap-ms = 50

[user-agent]
crawler-name = "LadleTest"
crawler-version = "0.1.0"
contact-url = "https://example.com/about"
contact-email = "bot@example.com"

[output]
database-path = "{db}"
report-path = "{report}"

[[site]]
domain = "127.0.0.1"
sitemap-urls = ["{sitemap}"]
recipe-path-pattern = "^/recipes/"
max-concurrency = 2
request-delay-ms = {request_delay}
retry-limit = {retry_limit}
respect-robots = {respect_robots}
"#,
        fetch_timeout = options.fetch_timeout_ms,
        db = dir.path().join("ladle.db").display(),
        report = dir.path().join("report.md").display(),
        sitemap = format!("{}{}", server.uri(), options.sitemap_path),
        request_delay = options.request_delay_ms,
        retry_limit = options.retry_limit,
        respect_robots = options.respect_robots,
    );

    parse_config(&toml).expect("test config should be valid")
}

/// A urlset listing the given paths on `server`
pub fn urlset(server: &MockServer, paths: &[&str]) -> String {
    let urls: String = paths
        .iter()
        .map(|p| format!("<url><loc>{}{}</loc></url>", server.uri(), p))
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">{}</urlset>"#,
        urls
    )
}

/// A recipe page carrying JSON-LD structured data
pub fn recipe_page(name: &str) -> String {
    format!(
        r#"<html><head><title>{name} | Example Kitchen</title>
<script type="application/ld+json">
{{
  "@context": "https://schema.org",
  "@type": "Recipe",
  "name": "{name}",
  "recipeIngredient": ["2 cups broth", "1 onion"],
  "recipeInstructions": ["Boil broth.", "Add onion."],
  "totalTime": "PT30M",
  "recipeYield": "4 servings"
}}
</script></head><body><h1>{name}</h1></body></html>"#
    )
}

pub async fn mount_get(server: &MockServer, route: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(response)
        .mount(server)
        .await;
}

/// Number of requests the server saw for `route`
pub async fn hits(server: &MockServer, route: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == route)
        .count()
}
