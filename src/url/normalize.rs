use crate::UrlError;
use url::Url;

/// Click and mailing-list identifiers removed during normalization
///
/// Any `utm_*` parameter is removed as well.
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_eid"];

/// Normalizes a URL into its deduplication key
///
/// Two URLs that normalize to the same key are treated as the same recipe
/// page by the crawl queue. The key is never fetched; tasks keep the URL they
/// were discovered with.
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed or not HTTP(S)
/// 2. Use the https scheme for both http and https
/// 3. Lowercase the host and remove a `www.` prefix
/// 4. Normalize path:
///    - Remove dot segments (. and ..) and empty segments
///    - Remove trailing slash (except for root /)
/// 5. Remove fragment
/// 6. Remove tracking query parameters
/// 7. Sort remaining query parameters alphabetically
/// 8. Remove empty query string
///
/// # Examples
///
/// ```
/// use ladle::url::normalize_url;
///
/// let url = normalize_url("http://WWW.EXAMPLE.COM/recipes/stew/?utm_source=x#top").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/recipes/stew");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if url.scheme() == "http" {
        // Both schemes are special, so this cannot fail
        let _ = url.set_scheme("https");
    }

    let host = url.host_str().ok_or(UrlError::MissingDomain)?.to_lowercase();
    if let Some(stripped) = host.strip_prefix("www.") {
        url.set_host(Some(stripped))
            .map_err(|e| UrlError::Parse(format!("Failed to set host: {}", e)))?;
    }

    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);

    url.set_fragment(None);

    if url.query().is_some() {
        let kept = retained_query_pairs(&url);
        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept);
        }
    }

    Ok(url)
}

/// Parses a discovered URL into the form that is actually fetched
///
/// Only the fragment is dropped; everything else is kept as the site wrote it.
pub fn fetch_url_form(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }
    if url.host_str().is_none() {
        return Err(UrlError::MissingDomain);
    }
    url.set_fragment(None);
    Ok(url)
}

/// Collapses `.`/`..` and empty segments; drops a trailing slash except at the root
fn normalize_path(path: &str) -> String {
    let mut stack: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            other => stack.push(other),
        }
    }
    format!("/{}", stack.join("/"))
}

/// Query pairs without tracking parameters, sorted by key then value
fn retained_query_pairs(url: &Url) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();
    pairs
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}
