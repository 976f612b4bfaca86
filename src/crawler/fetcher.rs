//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the scraper, including:
//! - Building the HTTP client with the identifying user agent string
//! - Single GET requests bounded by an explicit deadline
//! - Classifying transport failures and HTTP status failures
//!
//! The fetcher never retries. Retry policy lives in the crawl queue so that
//! backoff state stays in one place.

use crate::config::UserAgentConfig;
use crate::queue::FailureKind;
use reqwest::{redirect::Policy, Client};
use std::time::Duration;

/// Maximum redirect hops followed before the fetch fails
const MAX_REDIRECTS: usize = 10;

/// A page fetched with a 2xx status
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL that was requested
    pub url: String,
    /// Final URL after redirects
    pub final_url: String,
    pub status_code: u16,
    pub body: Vec<u8>,
}

impl FetchedPage {
    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A failed fetch, classified for the retry policy
#[derive(Debug, Clone)]
pub struct FetchFailure {
    pub url: String,
    /// HTTP status, absent for transport failures
    pub status_code: Option<u16>,
    pub kind: FailureKind,
    pub message: String,
}

/// Result of a fetch operation
#[derive(Debug, Clone)]
pub enum FetchResult {
    Success(FetchedPage),
    Failure(FetchFailure),
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use ladle::config::UserAgentConfig;
/// use ladle::crawler::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "Ladle".to_string(),
///     crawler_version: "0.3".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches a URL with a single GET request
///
/// # Classification
///
/// | Outcome | Result |
/// |---------|--------|
/// | 2xx | `Success` with the raw body |
/// | 429, 503 | `RateLimited` |
/// | Other 5xx | `Http5xx` |
/// | Other 4xx | `Http4xx` |
/// | Any other status | `UnexpectedStatus` |
/// | Timeout, DNS, connect, TLS, body read, redirect limit | `Transport` |
///
/// # Arguments
///
/// * `client` - The HTTP client to use
/// * `url` - The URL to fetch
/// * `timeout` - Deadline covering connect, headers and body
pub async fn fetch_url(client: &Client, url: &str, timeout: Duration) -> FetchResult {
    let response = match client.get(url).timeout(timeout).send().await {
        Ok(response) => response,
        Err(e) => return transport_failure(url, &e),
    };

    let status = response.status();
    let final_url = response.url().to_string();

    if !status.is_success() {
        let code = status.as_u16();
        return FetchResult::Failure(FetchFailure {
            url: url.to_string(),
            status_code: Some(code),
            kind: FailureKind::from_status(code),
            message: format!("HTTP {}", code),
        });
    }

    match response.bytes().await {
        Ok(body) => FetchResult::Success(FetchedPage {
            url: url.to_string(),
            final_url,
            status_code: status.as_u16(),
            body: body.to_vec(),
        }),
        Err(e) => transport_failure(url, &e),
    }
}

fn transport_failure(url: &str, error: &reqwest::Error) -> FetchResult {
    let message = if error.is_timeout() {
        "Request timeout".to_string()
    } else if error.is_connect() {
        format!("Connection failed: {}", error)
    } else if error.is_redirect() {
        format!("Redirect error: {}", error)
    } else {
        error.to_string()
    };

    FetchResult::Failure(FetchFailure {
        url: url.to_string(),
        status_code: None,
        kind: FailureKind::Transport,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_config() -> UserAgentConfig {
        UserAgentConfig {
            crawler_name: "TestLadle".to_string(),
            crawler_version: "1.0".to_string(),
            contact_url: "https://example.com/about".to_string(),
            contact_email: "admin@example.com".to_string(),
        }
    }

    fn failure(result: FetchResult) -> FetchFailure {
        match result {
            FetchResult::Failure(f) => f,
            FetchResult::Success(page) => panic!("expected failure, got {}", page.status_code),
        }
    }

    #[test]
    fn test_build_http_client() {
        assert!(build_http_client(&create_test_config()).is_ok());
    }

    #[tokio::test]
    async fn test_fetch_success_sends_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/recipes/stew"))
            .and(header(
                "user-agent",
                "TestLadle/1.0 (+https://example.com/about; admin@example.com)",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>stew</html>"))
            .mount(&server)
            .await;

        let client = build_http_client(&create_test_config()).unwrap();
        let url = format!("{}/recipes/stew", server.uri());

        match fetch_url(&client, &url, Duration::from_secs(5)).await {
            FetchResult::Success(page) => {
                assert_eq!(page.status_code, 200);
                assert_eq!(page.text(), "<html>stew</html>");
                assert_eq!(page.url, url);
            }
            FetchResult::Failure(f) => panic!("unexpected failure: {:?}", f),
        }
    }

    #[tokio::test]
    async fn test_fetch_classifies_statuses() {
        let server = MockServer::start().await;
        for (route, status) in [("/a", 404), ("/b", 429), ("/c", 503), ("/d", 500)] {
            Mock::given(method("GET"))
                .and(path(route))
                .respond_with(ResponseTemplate::new(status))
                .mount(&server)
                .await;
        }

        let client = build_http_client(&create_test_config()).unwrap();
        let fetch = |route: &str| {
            let client = client.clone();
            let url = format!("{}{}", server.uri(), route);
            async move { failure(fetch_url(&client, &url, Duration::from_secs(5)).await) }
        };

        let not_found = fetch("/a").await;
        assert_eq!(not_found.kind, FailureKind::Http4xx);
        assert_eq!(not_found.status_code, Some(404));
        assert_eq!(fetch("/b").await.kind, FailureKind::RateLimited);
        assert_eq!(fetch("/c").await.kind, FailureKind::RateLimited);
        assert_eq!(fetch("/d").await.kind, FailureKind::Http5xx);
    }

    #[tokio::test]
    async fn test_fetch_timeout_is_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let client = build_http_client(&create_test_config()).unwrap();
        let result = fetch_url(&client, &server.uri(), Duration::from_millis(100)).await;

        let failure = failure(result);
        assert_eq!(failure.kind, FailureKind::Transport);
        assert_eq!(failure.status_code, None);
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        let client = build_http_client(&create_test_config()).unwrap();
        // Port 9 (discard) is essentially never listening
        let result = fetch_url(&client, "http://127.0.0.1:9/", Duration::from_secs(2)).await;
        assert_eq!(failure(result).kind, FailureKind::Transport);
    }
}
