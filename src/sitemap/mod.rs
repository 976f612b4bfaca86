//! Sitemap discovery
//!
//! Walks a site's sitemaps (and any nested sitemap indexes) and yields the
//! recipe page URLs they list, lazily, as a stream. Each call to
//! [`SitemapDiscoverer::discover`] fetches everything anew.

mod xml;

pub use xml::{parse_sitemap, SitemapDocument, SitemapError, SitemapKind};

use crate::crawler::{fetch_url, FetchResult};
use crate::registry::SiteConfig;
use crate::robots::ParsedRobots;
use crate::LadleError;
use async_stream::stream;
use futures::Stream;
use reqwest::Client;
use std::collections::HashSet;
use std::pin::Pin;
use std::time::Duration;
use url::Url;

/// Stream of discovered recipe URLs
pub type DiscoveryStream<'a> = Pin<Box<dyn Stream<Item = Result<String, LadleError>> + Send + 'a>>;

/// Fetches and walks sitemaps for one site at a time
#[derive(Clone)]
pub struct SitemapDiscoverer {
    client: Client,
    timeout: Duration,
    max_depth: u32,
    agent: String,
}

/// A sitemap waiting to be fetched
struct PendingSitemap {
    url: Url,
    depth: u32,
}

impl SitemapDiscoverer {
    /// Creates a discoverer
    ///
    /// # Arguments
    ///
    /// * `client` - Shared HTTP client
    /// * `timeout` - Deadline for each sitemap fetch
    /// * `max_depth` - How many levels of nested sitemap indexes are followed
    /// * `agent` - Product token matched against robots.txt groups
    pub fn new(client: Client, timeout: Duration, max_depth: u32, agent: impl Into<String>) -> Self {
        Self {
            client,
            timeout,
            max_depth,
            agent: agent.into(),
        }
    }

    /// Lists recipe URLs for a site
    ///
    /// Sitemap sources are the site's configured sitemap URLs, else the
    /// `Sitemap:` lines of its robots.txt, else `/sitemap.xml`. Yielded URLs
    /// match the site's recipe path pattern and, when `robots` is given, are
    /// allowed by it.
    ///
    /// A top-level sitemap that cannot be fetched or parsed ends the stream
    /// with [`LadleError::SitemapUnavailable`]. A broken nested sitemap is
    /// logged and skipped.
    pub fn discover<'a>(
        &'a self,
        site: &'a SiteConfig,
        robots: Option<&'a ParsedRobots>,
    ) -> DiscoveryStream<'a> {
        Box::pin(stream! {
            let roots = match self.sitemap_sources(site, robots) {
                Ok(roots) => roots,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            // Depth-first; children are pushed in reverse so document order is kept
            let mut stack: Vec<PendingSitemap> = roots
                .into_iter()
                .rev()
                .map(|url| PendingSitemap { url, depth: 0 })
                .collect();
            let mut visited: HashSet<String> = HashSet::new();
            let mut yielded: HashSet<String> = HashSet::new();

            while let Some(pending) = stack.pop() {
                if !visited.insert(pending.url.to_string()) {
                    tracing::debug!("Sitemap {} already visited, skipping", pending.url);
                    continue;
                }

                let document = match self.fetch_sitemap(&pending.url).await {
                    Ok(doc) => doc,
                    Err(reason) if pending.depth == 0 => {
                        yield Err(LadleError::SitemapUnavailable {
                            domain: site.domain.clone(),
                            reason: format!("{}: {}", pending.url, reason),
                        });
                        return;
                    }
                    Err(reason) => {
                        tracing::warn!("Skipping nested sitemap {}: {}", pending.url, reason);
                        continue;
                    }
                };

                match document.kind {
                    SitemapKind::Index => {
                        if pending.depth >= self.max_depth {
                            tracing::warn!(
                                "Sitemap index {} exceeds nesting depth {}, not following",
                                pending.url,
                                self.max_depth
                            );
                            continue;
                        }
                        let children: Vec<Url> = document
                            .locs
                            .iter()
                            .filter_map(|loc| resolve(&pending.url, loc))
                            .collect();
                        tracing::debug!("Sitemap index {} lists {} sitemaps", pending.url, children.len());
                        for url in children.into_iter().rev() {
                            stack.push(PendingSitemap { url, depth: pending.depth + 1 });
                        }
                    }
                    SitemapKind::UrlSet => {
                        let mut matched = 0usize;
                        for loc in &document.locs {
                            let url = match resolve(&pending.url, loc) {
                                Some(url) if site.is_recipe_url(&url) => url,
                                _ => continue,
                            };
                            if let Some(robots) = robots {
                                if !robots.is_allowed(url.as_str(), &self.agent) {
                                    tracing::debug!("Disallowed by robots.txt: {}", url);
                                    continue;
                                }
                            }
                            if yielded.insert(url.to_string()) {
                                matched += 1;
                                yield Ok(url.to_string());
                            }
                        }
                        tracing::debug!(
                            "Sitemap {} listed {} URLs, {} recipe pages",
                            pending.url,
                            document.locs.len(),
                            matched
                        );
                    }
                }
            }
        })
    }

    fn sitemap_sources(
        &self,
        site: &SiteConfig,
        robots: Option<&ParsedRobots>,
    ) -> Result<Vec<Url>, LadleError> {
        if !site.sitemap_urls.is_empty() {
            return Ok(site.sitemap_urls.clone());
        }

        if let Some(robots) = robots {
            let listed: Vec<Url> = robots
                .sitemaps()
                .iter()
                .filter_map(|s| resolve(&site.base_url, s))
                .collect();
            if !listed.is_empty() {
                tracing::info!("Using {} sitemap(s) from robots.txt for {}", listed.len(), site.domain);
                return Ok(listed);
            }
        }

        let fallback = site
            .base_url
            .join("/sitemap.xml")
            .map_err(|e| LadleError::SitemapUnavailable {
                domain: site.domain.clone(),
                reason: e.to_string(),
            })?;
        Ok(vec![fallback])
    }

    async fn fetch_sitemap(&self, url: &Url) -> Result<SitemapDocument, String> {
        match fetch_url(&self.client, url.as_str(), self.timeout).await {
            FetchResult::Success(page) => parse_sitemap(&page.body).map_err(|e| e.to_string()),
            FetchResult::Failure(failure) => Err(failure.message),
        }
    }
}

/// Resolves a `<loc>` against the sitemap it came from; only http(s) is kept
fn resolve(base: &Url, loc: &str) -> Option<Url> {
    let url = base.join(loc.trim()).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SelectorRules, SiteEntry};
    use futures::StreamExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn site_for(server: &MockServer, sitemaps: Vec<String>) -> SiteConfig {
        SiteConfig::from_entry(&SiteEntry {
            domain: "127.0.0.1".to_string(),
            sitemap_urls: sitemaps,
            recipe_path_pattern: "^/recipes/".to_string(),
            max_concurrency: 1,
            request_delay_ms: 0,
            retry_limit: 3,
            respect_robots: false,
            selectors: SelectorRules::default(),
        })
        .map(|mut site| {
            site.base_url = Url::parse(&format!("{}/", server.uri())).unwrap();
            site
        })
        .unwrap()
    }

    fn discoverer(max_depth: u32) -> SitemapDiscoverer {
        SitemapDiscoverer::new(Client::new(), Duration::from_secs(5), max_depth, "Ladle")
    }

    fn urlset(locs: &[String]) -> String {
        let entries: String = locs
            .iter()
            .map(|l| format!("<url><loc>{}</loc></url>", l))
            .collect();
        format!(
            r#"<?xml version="1.0"?><urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">{}</urlset>"#,
            entries
        )
    }

    fn index(locs: &[String]) -> String {
        let entries: String = locs
            .iter()
            .map(|l| format!("<sitemap><loc>{}</loc></sitemap>", l))
            .collect();
        format!("<sitemapindex>{}</sitemapindex>", entries)
    }

    async fn mount(server: &MockServer, route: &str, body: String) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    async fn collect(stream: DiscoveryStream<'_>) -> (Vec<String>, Vec<LadleError>) {
        let items: Vec<_> = stream.collect().await;
        let mut urls = Vec::new();
        let mut errors = Vec::new();
        for item in items {
            match item {
                Ok(u) => urls.push(u),
                Err(e) => errors.push(e),
            }
        }
        (urls, errors)
    }

    #[tokio::test]
    async fn test_nested_index_yields_only_recipe_urls() {
        let server = MockServer::start().await;
        let base = server.uri();

        for n in 1..=2 {
            let mut locs: Vec<String> = (1..=3)
                .map(|i| format!("{}/recipes/s{}-{}", base, n, i))
                .collect();
            locs.push(format!("{}/about-us-{}", base, n));
            mount(&server, &format!("/sitemap-{}.xml", n), urlset(&locs)).await;
        }
        mount(
            &server,
            "/sitemap_index.xml",
            index(&[
                format!("{}/sitemap-1.xml", base),
                format!("{}/sitemap-2.xml", base),
            ]),
        )
        .await;

        let site = site_for(&server, vec![format!("{}/sitemap_index.xml", base)]);
        let discoverer = discoverer(3);
        let (urls, errors) = collect(discoverer.discover(&site, None)).await;

        assert!(errors.is_empty());
        assert_eq!(urls.len(), 6);
        assert_eq!(urls[0], format!("{}/recipes/s1-1", base));
        assert_eq!(urls[5], format!("{}/recipes/s2-3", base));
        assert!(urls.iter().all(|u| u.contains("/recipes/")));
    }

    #[tokio::test]
    async fn test_discovery_is_restartable() {
        let server = MockServer::start().await;
        let base = server.uri();
        mount(&server, "/sitemap.xml", urlset(&[format!("{}/recipes/a", base)])).await;

        let site = site_for(&server, vec![format!("{}/sitemap.xml", base)]);
        let discoverer = discoverer(3);

        let (first, _) = collect(discoverer.discover(&site, None)).await;
        let (second, _) = collect(discoverer.discover(&site, None)).await;
        assert_eq!(first, second);
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_cyclic_indexes_terminate() {
        let server = MockServer::start().await;
        let base = server.uri();
        mount(&server, "/a.xml", index(&[format!("{}/b.xml", base)])).await;
        mount(
            &server,
            "/b.xml",
            index(&[format!("{}/a.xml", base), format!("{}/leaf.xml", base)]),
        )
        .await;
        mount(&server, "/leaf.xml", urlset(&[format!("{}/recipes/x", base)])).await;

        let site = site_for(&server, vec![format!("{}/a.xml", base)]);
        let (urls, errors) = collect(discoverer(3).discover(&site, None)).await;

        assert!(errors.is_empty());
        assert_eq!(urls, vec![format!("{}/recipes/x", base)]);
    }

    #[tokio::test]
    async fn test_depth_bound() {
        let server = MockServer::start().await;
        let base = server.uri();
        // root -> level1 -> level2 -> leaf; depth 1 only follows the first hop
        mount(&server, "/root.xml", index(&[format!("{}/level1.xml", base)])).await;
        mount(&server, "/level1.xml", index(&[format!("{}/level2.xml", base)])).await;
        mount(&server, "/level2.xml", index(&[format!("{}/leaf.xml", base)])).await;
        mount(&server, "/leaf.xml", urlset(&[format!("{}/recipes/deep", base)])).await;

        let site = site_for(&server, vec![format!("{}/root.xml", base)]);

        let (shallow, _) = collect(discoverer(1).discover(&site, None)).await;
        assert!(shallow.is_empty());

        let (deep, _) = collect(discoverer(3).discover(&site, None)).await;
        assert_eq!(deep, vec![format!("{}/recipes/deep", base)]);
    }

    #[tokio::test]
    async fn test_unavailable_root_sitemap() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let site = site_for(&server, vec![format!("{}/sitemap.xml", server.uri())]);
        let (urls, errors) = collect(discoverer(3).discover(&site, None)).await;

        assert!(urls.is_empty());
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], LadleError::SitemapUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_broken_nested_sitemap_is_skipped() {
        let server = MockServer::start().await;
        let base = server.uri();
        mount(
            &server,
            "/index.xml",
            index(&[format!("{}/gone.xml", base), format!("{}/ok.xml", base)]),
        )
        .await;
        mount(&server, "/ok.xml", urlset(&[format!("{}/recipes/ok", base)])).await;
        Mock::given(method("GET"))
            .and(path("/gone.xml"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let site = site_for(&server, vec![format!("{}/index.xml", base)]);
        let (urls, errors) = collect(discoverer(3).discover(&site, None)).await;

        assert!(errors.is_empty());
        assert_eq!(urls, vec![format!("{}/recipes/ok", base)]);
    }

    #[tokio::test]
    async fn test_robots_filter_and_sitemap_lines() {
        let server = MockServer::start().await;
        let base = server.uri();
        mount(
            &server,
            "/from-robots.xml",
            urlset(&[
                format!("{}/recipes/public", base),
                format!("{}/recipes/members/secret", base),
            ]),
        )
        .await;

        let robots = ParsedRobots::from_content(&format!(
            "User-agent: *\nDisallow: /recipes/members\nSitemap: {}/from-robots.xml",
            base
        ));
        let site = site_for(&server, vec![]);
        let (urls, errors) = collect(discoverer(3).discover(&site, Some(&robots))).await;

        assert!(errors.is_empty());
        assert_eq!(urls, vec![format!("{}/recipes/public", base)]);
    }
}
