use crate::config::types::{Config, CrawlerConfig, SiteEntry, UserAgentConfig};
use crate::url::host_belongs_to;
use crate::ConfigError;
use regex::Regex;
use scraper::Selector;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    validate_sites(&config.sites)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > 64 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 64, got {}",
            config.workers
        )));
    }

    if config.fetch_timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "fetch_timeout_ms must be >= 100ms, got {}ms",
            config.fetch_timeout_ms
        )));
    }

    if config.poll_interval_ms == 0 {
        return Err(ConfigError::Validation(
            "poll_interval_ms must be >= 1ms".to_string(),
        ));
    }

    // A stall shorter than one fetch would end runs while a worker is still waiting on I/O
    if config.stall_timeout_secs.saturating_mul(1000) <= config.fetch_timeout_ms {
        return Err(ConfigError::Validation(format!(
            "stall_timeout_secs ({}s) must exceed fetch_timeout_ms ({}ms)",
            config.stall_timeout_secs, config.fetch_timeout_ms
        )));
    }

    if config.backoff_cap_ms < config.backoff_base_ms {
        return Err(ConfigError::Validation(format!(
            "backoff_cap_ms ({}) must be >= backoff_base_ms ({})",
            config.backoff_cap_ms, config.backoff_base_ms
        )));
    }

    if config.abandoned_log_capacity < 1 {
        return Err(ConfigError::Validation(
            "abandoned_log_capacity must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &crate::config::types::OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.report_path.is_empty() {
        return Err(ConfigError::Validation(
            "report_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates the site list
fn validate_sites(sites: &[SiteEntry]) -> Result<(), ConfigError> {
    if sites.is_empty() {
        return Err(ConfigError::Validation(
            "at least one [[site]] must be configured".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for site in sites {
        validate_site(site)?;

        if !seen.insert(site.domain.to_lowercase()) {
            return Err(ConfigError::Validation(format!(
                "site '{}' is configured more than once",
                site.domain
            )));
        }
    }

    Ok(())
}

/// Validates a single site entry
fn validate_site(site: &SiteEntry) -> Result<(), ConfigError> {
    validate_domain_string(&site.domain)?;

    if site.max_concurrency < 1 {
        return Err(ConfigError::Validation(format!(
            "site '{}': max_concurrency must be >= 1, got {}",
            site.domain, site.max_concurrency
        )));
    }

    if site.sitemap_urls.is_empty() && !site.respect_robots {
        // Without robots.txt there is nowhere else to find a sitemap
        return Err(ConfigError::Validation(format!(
            "site '{}' needs sitemap-urls when respect-robots is disabled",
            site.domain
        )));
    }

    for sitemap in &site.sitemap_urls {
        let url = Url::parse(sitemap).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid sitemap URL '{}': {}", sitemap, e))
        })?;

        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(ConfigError::InvalidUrl(format!(
                "Sitemap URL '{}' must use http or https",
                sitemap
            )));
        }

        let host = url.host_str().unwrap_or_default();
        if !host_belongs_to(host, &site.domain) {
            return Err(ConfigError::InvalidUrl(format!(
                "Sitemap URL '{}' is not on site '{}'",
                sitemap, site.domain
            )));
        }
    }

    Regex::new(&site.recipe_path_pattern).map_err(|e| ConfigError::InvalidPattern {
        domain: site.domain.clone(),
        message: e.to_string(),
    })?;

    for (field, rule) in site.selectors.iter() {
        Selector::parse(rule.selector()).map_err(|e| ConfigError::InvalidSelector {
            domain: site.domain.clone(),
            field: field.to_string(),
            message: format!("{:?}", e),
        })?;
    }

    Ok(())
}

/// Validates a domain string
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidDomain(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidDomain(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
    {
        return Err(ConfigError::InvalidDomain(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::InvalidDomain(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::InvalidDomain(format!(
            "Domain '{}' must contain at least one dot (e.g., 'example.com')",
            domain
        )));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    };

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{SelectorRule, SelectorRules};

    fn site(domain: &str) -> SiteEntry {
        SiteEntry {
            domain: domain.to_string(),
            sitemap_urls: vec![format!("https://{}/sitemap.xml", domain)],
            recipe_path_pattern: "^/recipe/".to_string(),
            max_concurrency: 2,
            request_delay_ms: 100,
            retry_limit: 3,
            respect_robots: true,
            selectors: SelectorRules::default(),
        }
    }

    #[test]
    fn test_validate_domain_string() {
        assert!(validate_domain_string("example.com").is_ok());
        assert!(validate_domain_string("sub.example.com").is_ok());
        assert!(validate_domain_string("127.0.0.1").is_ok());

        assert!(validate_domain_string("").is_err());
        assert!(validate_domain_string("example").is_err());
        assert!(validate_domain_string(".example.com").is_err());
        assert!(validate_domain_string("example.com.").is_err());
        assert!(validate_domain_string("exa mple.com").is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("user@example.com").is_ok());

        assert!(validate_email("").is_err());
        assert!(validate_email("invalid").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@").is_err());
        assert!(validate_email("user@domain").is_err());
        assert!(validate_email("a@b@c.com").is_err());
    }

    #[test]
    fn test_valid_site() {
        assert!(validate_site(&site("example.com")).is_ok());
    }

    #[test]
    fn test_sitemap_on_foreign_host_rejected() {
        let mut entry = site("example.com");
        entry.sitemap_urls = vec!["https://other.org/sitemap.xml".to_string()];
        assert!(matches!(
            validate_site(&entry),
            Err(ConfigError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_sitemap_on_subdomain_accepted() {
        let mut entry = site("example.com");
        entry.sitemap_urls = vec!["https://www.example.com/sitemap.xml".to_string()];
        assert!(validate_site(&entry).is_ok());
    }

    #[test]
    fn test_bad_pattern_rejected() {
        let mut entry = site("example.com");
        entry.recipe_path_pattern = "(unclosed".to_string();
        assert!(matches!(
            validate_site(&entry),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_bad_selector_rejected() {
        let mut entry = site("example.com");
        entry.selectors.steps = Some(SelectorRule::Css("ol[[".to_string()));
        match validate_site(&entry) {
            Err(ConfigError::InvalidSelector { field, .. }) => assert_eq!(field, "steps"),
            other => panic!("expected selector error, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut entry = site("example.com");
        entry.max_concurrency = 0;
        assert!(validate_site(&entry).is_err());
    }

    #[test]
    fn test_no_sitemaps_without_robots_rejected() {
        let mut entry = site("example.com");
        entry.sitemap_urls.clear();
        assert!(validate_site(&entry).is_ok());

        entry.respect_robots = false;
        assert!(validate_site(&entry).is_err());
    }

    #[test]
    fn test_duplicate_sites_rejected() {
        let sites = vec![site("example.com"), site("EXAMPLE.com")];
        assert!(validate_sites(&sites).is_err());
    }

    #[test]
    fn test_stall_must_exceed_fetch_timeout() {
        let config = CrawlerConfig {
            fetch_timeout_ms: 10_000,
            stall_timeout_secs: 10,
            ..CrawlerConfig::default()
        };
        assert!(validate_crawler_config(&config).is_err());

        let config = CrawlerConfig {
            fetch_timeout_ms: 10_000,
            stall_timeout_secs: 11,
            ..CrawlerConfig::default()
        };
        assert!(validate_crawler_config(&config).is_ok());
    }
}
