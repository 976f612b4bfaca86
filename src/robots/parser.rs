//! Robots.txt parser implementation
//!
//! Allow/Disallow matching is delegated to the `robotstxt` crate. The
//! directives it does not expose (`Crawl-delay`, `Sitemap`) are read in a
//! single pass when the file is loaded.

use robotstxt::DefaultMatcher;
use std::time::Duration;

/// A `Crawl-delay` directive and the user agents of its group
#[derive(Debug, Clone)]
struct DelayGroup {
    agents: Vec<String>,
    seconds: f64,
}

/// Parsed robots.txt data
#[derive(Debug, Clone, Default)]
pub struct ParsedRobots {
    /// Raw content; empty means everything is allowed
    content: String,
    delays: Vec<DelayGroup>,
    sitemaps: Vec<String>,
}

impl ParsedRobots {
    /// Parses raw robots.txt content
    pub fn from_content(content: &str) -> Self {
        let mut delays = Vec::new();
        let mut sitemaps = Vec::new();
        let mut group_agents: Vec<String> = Vec::new();
        let mut group_has_rules = false;

        for line in content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();

            match key.trim().to_ascii_lowercase().as_str() {
                "user-agent" => {
                    // A user-agent line after rules starts a new group
                    if group_has_rules {
                        group_agents.clear();
                        group_has_rules = false;
                    }
                    group_agents.push(value.to_ascii_lowercase());
                }
                "crawl-delay" => {
                    group_has_rules = true;
                    match value.parse::<f64>() {
                        Ok(seconds) if seconds.is_finite() && seconds >= 0.0 => {
                            delays.push(DelayGroup {
                                agents: group_agents.clone(),
                                seconds,
                            });
                        }
                        _ => tracing::debug!("Ignoring invalid Crawl-delay '{}'", value),
                    }
                }
                // Sitemap lines are global, independent of any group
                "sitemap" => {
                    if !value.is_empty() {
                        sitemaps.push(value.to_string());
                    }
                }
                _ => group_has_rules = true,
            }
        }

        Self {
            content: content.to_string(),
            delays,
            sitemaps,
        }
    }

    /// A robots file that allows everything
    ///
    /// Used when the site has no robots.txt or it could not be fetched.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Checks if a URL is allowed for the given user agent token
    ///
    /// # Arguments
    ///
    /// * `url` - Absolute URL to check
    /// * `user_agent` - Product token of the crawler (e.g. "Ladle")
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        if self.content.trim().is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, user_agent, url)
    }

    /// Crawl delay for the user agent; a group naming the agent wins over `*`
    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        let agent = user_agent.to_ascii_lowercase();

        let specific = self
            .delays
            .iter()
            .find(|g| g.agents.iter().any(|a| a != "*" && agent.contains(a.as_str())));
        let wildcard = self
            .delays
            .iter()
            .find(|g| g.agents.iter().any(|a| a == "*"));

        specific
            .or(wildcard)
            .map(|g| Duration::from_secs_f64(g.seconds))
    }

    /// URLs listed in `Sitemap:` directives, in file order
    pub fn sitemaps(&self) -> &[String] {
        &self.sitemaps
    }
}
