/// Canonical form of a configured or observed site domain
///
/// Lowercases and strips a leading `www.` so `www.example.com` and
/// `example.com` name the same site.
pub fn canonical_domain(domain: &str) -> String {
    let lower = domain.trim().to_lowercase();
    match lower.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => lower,
    }
}

/// Returns true if `host` is the site domain itself or one of its subdomains
pub fn host_belongs_to(host: &str, site_domain: &str) -> bool {
    let host = canonical_domain(host);
    let site = canonical_domain(site_domain);
    host == site || host.ends_with(&format!(".{}", site))
}
