//! Site registry
//!
//! Holds the immutable per-site configuration for every supported recipe
//! domain. Built once from the loaded [`Config`] and shared read-only for the
//! lifetime of the process.

use crate::config::{Config, SelectorRules, SiteEntry};
use crate::url::{canonical_domain, host_belongs_to};
use crate::{ConfigError, LadleError};
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Runtime configuration for one supported site
#[derive(Debug, Clone)]
pub struct SiteConfig {
    /// Canonical domain (lowercase, no `www.`)
    pub domain: String,

    /// Origin used for robots.txt and as a fallback sitemap location
    pub base_url: Url,

    /// Sitemap or sitemap-index URLs, walked in order
    pub sitemap_urls: Vec<Url>,

    /// Extraction rules used when structured data is missing
    pub selector_rules: SelectorRules,

    /// Path filter for recipe pages
    pub recipe_path: Regex,

    pub max_concurrency: u32,
    pub request_delay: Duration,
    pub retry_limit: u32,
    pub respect_robots: bool,
}

impl SiteConfig {
    /// Builds a site configuration from its TOML entry
    pub fn from_entry(entry: &SiteEntry) -> Result<Self, ConfigError> {
        let domain = canonical_domain(&entry.domain);

        let sitemap_urls = entry
            .sitemap_urls
            .iter()
            .map(|s| {
                Url::parse(s)
                    .map_err(|e| ConfigError::InvalidUrl(format!("Invalid sitemap URL '{}': {}", s, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        // Prefer the origin the operator pointed us at; it carries the right scheme and port
        let base_url = match sitemap_urls.first() {
            Some(first) => {
                let mut origin = first.clone();
                origin.set_path("/");
                origin.set_query(None);
                origin.set_fragment(None);
                origin
            }
            None => Url::parse(&format!("https://{}/", entry.domain))
                .map_err(|e| ConfigError::InvalidUrl(format!("Invalid domain '{}': {}", entry.domain, e)))?,
        };

        let recipe_path =
            Regex::new(&entry.recipe_path_pattern).map_err(|e| ConfigError::InvalidPattern {
                domain: entry.domain.clone(),
                message: e.to_string(),
            })?;

        Ok(Self {
            domain,
            base_url,
            sitemap_urls,
            selector_rules: entry.selectors.clone(),
            recipe_path,
            max_concurrency: entry.max_concurrency.max(1),
            request_delay: Duration::from_millis(entry.request_delay_ms),
            retry_limit: entry.retry_limit,
            respect_robots: entry.respect_robots,
        })
    }

    /// Returns true if the URL is on this site and its path looks like a recipe page
    pub fn is_recipe_url(&self, url: &Url) -> bool {
        let on_site = url
            .host_str()
            .map(|h| host_belongs_to(h, &self.domain))
            .unwrap_or(false);
        on_site && self.recipe_path.is_match(url.path())
    }

    /// Maximum number of attempts for one task (first try plus retries)
    pub fn max_attempts(&self) -> u32 {
        self.retry_limit.saturating_add(1)
    }
}

/// Read-only lookup of supported sites
#[derive(Debug, Clone, Default)]
pub struct SiteRegistry {
    sites: HashMap<String, Arc<SiteConfig>>,
}

impl SiteRegistry {
    /// Builds the registry from a validated configuration
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let sites = config
            .sites
            .iter()
            .map(|entry| SiteConfig::from_entry(entry).map(|site| (site.domain.clone(), Arc::new(site))))
            .collect::<Result<HashMap<_, _>, _>>()?;
        Ok(Self { sites })
    }

    /// Builds a registry directly from site configurations
    pub fn from_sites(sites: impl IntoIterator<Item = SiteConfig>) -> Self {
        Self {
            sites: sites
                .into_iter()
                .map(|s| (s.domain.clone(), Arc::new(s)))
                .collect(),
        }
    }

    /// Looks up a site by domain
    ///
    /// The lookup is case-insensitive and ignores a `www.` prefix.
    pub fn get_config(&self, domain: &str) -> Result<Arc<SiteConfig>, LadleError> {
        self.sites
            .get(&canonical_domain(domain))
            .cloned()
            .ok_or_else(|| LadleError::UnknownDomain(domain.to_string()))
    }

    /// Returns all registered domains
    pub fn list_domains(&self) -> BTreeSet<String> {
        self.sites.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(domain: &str, sitemaps: Vec<&str>) -> SiteEntry {
        SiteEntry {
            domain: domain.to_string(),
            sitemap_urls: sitemaps.into_iter().map(String::from).collect(),
            recipe_path_pattern: "^/recipes?/".to_string(),
            max_concurrency: 2,
            request_delay_ms: 250,
            retry_limit: 3,
            respect_robots: true,
            selectors: SelectorRules::default(),
        }
    }

    #[test]
    fn test_get_config_is_case_and_www_insensitive() {
        let site = SiteConfig::from_entry(&entry("Cooking.Example.com", vec![])).unwrap();
        let registry = SiteRegistry::from_sites(vec![site]);

        assert!(registry.get_config("cooking.example.com").is_ok());
        assert!(registry.get_config("WWW.cooking.example.com").is_ok());
    }

    #[test]
    fn test_unknown_domain() {
        let registry = SiteRegistry::default();
        match registry.get_config("nowhere.example") {
            Err(LadleError::UnknownDomain(d)) => assert_eq!(d, "nowhere.example"),
            other => panic!("expected UnknownDomain, got {:?}", other),
        }
    }

    #[test]
    fn test_list_domains() {
        let registry = SiteRegistry::from_sites(vec![
            SiteConfig::from_entry(&entry("b.example.com", vec![])).unwrap(),
            SiteConfig::from_entry(&entry("a.example.com", vec![])).unwrap(),
        ]);
        let domains: Vec<_> = registry.list_domains().into_iter().collect();
        assert_eq!(domains, vec!["a.example.com", "b.example.com"]);
    }

    #[test]
    fn test_base_url_follows_first_sitemap() {
        let site =
            SiteConfig::from_entry(&entry("127.0.0.1", vec!["http://127.0.0.1:4321/maps/index.xml"]))
                .unwrap();
        assert_eq!(site.base_url.as_str(), "http://127.0.0.1:4321/");

        let site = SiteConfig::from_entry(&entry("example.com", vec![])).unwrap();
        assert_eq!(site.base_url.as_str(), "https://example.com/");
    }

    #[test]
    fn test_is_recipe_url() {
        let site = SiteConfig::from_entry(&entry("example.com", vec![])).unwrap();

        assert!(site.is_recipe_url(&Url::parse("https://example.com/recipes/stew").unwrap()));
        assert!(site.is_recipe_url(&Url::parse("https://www.example.com/recipe/pie").unwrap()));
        assert!(!site.is_recipe_url(&Url::parse("https://example.com/about").unwrap()));
        assert!(!site.is_recipe_url(&Url::parse("https://other.com/recipes/stew").unwrap()));
    }

    #[test]
    fn test_max_attempts() {
        let site = SiteConfig::from_entry(&entry("example.com", vec![])).unwrap();
        assert_eq!(site.max_attempts(), 4);
    }
}
