//! Robots.txt handling module
//!
//! Each site's robots.txt is fetched once at the start of its discovery. It
//! filters discovered URLs, supplies `Sitemap:` locations for sites that
//! configure none, and its `Crawl-delay` raises the host's request delay.

mod parser;

pub use parser::ParsedRobots;

use crate::crawler::{fetch_url, FetchResult};
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// Fetches and parses robots.txt from a site origin
///
/// A missing file (4xx) allows everything. Server and transport failures
/// also fall back to allow-all, with a warning, so an unreachable
/// robots.txt never blocks discovery on its own; the sitemap fetch that
/// follows will surface a dead host.
///
/// # Arguments
///
/// * `client` - The HTTP client to use
/// * `base_url` - Site origin, e.g. `https://example.com/`
/// * `timeout` - Fetch deadline
pub async fn fetch_robots(client: &Client, base_url: &Url, timeout: Duration) -> ParsedRobots {
    let robots_url = match base_url.join("/robots.txt") {
        Ok(u) => u,
        Err(e) => {
            tracing::warn!("Cannot build robots.txt URL for {}: {}", base_url, e);
            return ParsedRobots::allow_all();
        }
    };

    match fetch_url(client, robots_url.as_str(), timeout).await {
        FetchResult::Success(page) => {
            tracing::debug!("Fetched {}", robots_url);
            ParsedRobots::from_content(&page.text())
        }
        FetchResult::Failure(failure) => {
            match failure.status_code {
                Some(code) if (400..500).contains(&code) => {
                    tracing::debug!("No robots.txt at {} (HTTP {})", robots_url, code);
                }
                _ => tracing::warn!(
                    "Could not fetch {}: {}; assuming allow-all",
                    robots_url,
                    failure.message
                ),
            }
            ParsedRobots::allow_all()
        }
    }
}
