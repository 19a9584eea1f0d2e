//! Same-origin scoping and the pre-crawl seed check

use crate::url::normalize::normalize_parsed;
use crate::UrlError;
use url::Url;

/// Schemes that can never lead to a crawlable page
const NON_NAVIGABLE_PREFIXES: &[&str] = &["javascript:", "mailto:", "tel:", "data:"];

/// Decides whether `candidate` stays inside the origin of `base`
///
/// `candidate` is resolved against `base`, so relative links are supported.
/// The resolved URL must share scheme, host and port with `base`, and its
/// serialization must start with the origin string of `base`. Anything that
/// fails to parse is out of scope.
///
/// # Examples
///
/// ```
/// use pagewalk::url::in_scope;
/// use url::Url;
///
/// let base = Url::parse("https://a.com").unwrap();
/// assert!(in_scope(&base, "/x"));
/// assert!(!in_scope(&base, "https://b.com/x"));
/// assert!(!in_scope(&base, "javascript:void(0)"));
/// ```
pub fn in_scope(base: &Url, candidate: &str) -> bool {
    resolve_in_scope(base, &origin_of(base), candidate).is_some()
}

/// Session-owned scope filter with the base origin fixed at creation
#[derive(Debug, Clone)]
pub struct ScopeFilter {
    base: Url,
    origin: String,
}

impl ScopeFilter {
    pub fn new(base: Url) -> Self {
        let origin = origin_of(&base);
        Self { base, origin }
    }

    /// The `scheme://host[:port]` string every in-scope URL starts with
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn in_scope(&self, candidate: &str) -> bool {
        self.resolve(candidate).is_some()
    }

    /// Resolves and normalizes `candidate`, returning it only when in scope
    pub fn resolve(&self, candidate: &str) -> Option<Url> {
        resolve_in_scope(&self.base, &self.origin, candidate)
    }
}

fn origin_of(base: &Url) -> String {
    base.origin().ascii_serialization()
}

fn resolve_in_scope(base: &Url, origin: &str, candidate: &str) -> Option<Url> {
    let candidate = candidate.trim();
    if candidate.is_empty() {
        return None;
    }

    let lowered = candidate.to_ascii_lowercase();
    if NON_NAVIGABLE_PREFIXES
        .iter()
        .any(|prefix| lowered.starts_with(prefix))
    {
        tracing::trace!("Rejecting non-navigable link {}", candidate);
        return None;
    }

    let resolved = base.join(candidate).ok()?;
    let resolved = normalize_parsed(resolved).ok()?;

    let same_origin = resolved.scheme() == base.scheme()
        && resolved.host_str() == base.host_str()
        && resolved.port_or_known_default() == base.port_or_known_default();

    // "null" origins (opaque) never match anything
    if !same_origin || origin == "null" || !resolved.as_str().starts_with(origin) {
        tracing::trace!("Rejecting out-of-scope link {}", resolved);
        return None;
    }

    Some(resolved)
}

/// Validates a seed URL before any resource is touched
///
/// Rejects missing, malformed and non-HTTP(S) seeds, and seeds whose host
/// matches one of the `blocked_hosts` patterns. A pattern is either an exact
/// host (`example.com`) or a wildcard (`*.example.com`) that also matches the
/// bare domain.
///
/// # Returns
///
/// * `Ok(Url)` - The normalized seed URL
/// * `Err(UrlError)` - The seed cannot start a crawl
pub fn check_seed(raw: &str, blocked_hosts: &[String]) -> Result<Url, UrlError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(UrlError::MissingUrl);
    }

    let seed = normalize_parsed(Url::parse(raw).map_err(|e| UrlError::Parse(e.to_string()))?)?;
    let host = seed
        .host_str()
        .map(|h| h.trim_end_matches('.').to_lowercase())
        .ok_or(UrlError::MissingDomain)?;

    if let Some(pattern) = blocked_hosts
        .iter()
        .find(|pattern| matches_host_pattern(pattern, &host))
    {
        tracing::info!("Seed host {} matches blocked pattern {}", host, pattern);
        return Err(UrlError::BlockedHost { host });
    }

    Ok(seed)
}

/// Checks if a host matches a blocklist pattern
///
/// `*.example.com` matches `example.com` and any of its subdomains;
/// any other pattern must match exactly. Comparison is case-insensitive.
pub fn matches_host_pattern(pattern: &str, host: &str) -> bool {
    let pattern = pattern.to_ascii_lowercase();
    let host = host.to_ascii_lowercase();

    match pattern.strip_prefix("*.") {
        Some(base) => host == base || host.ends_with(&format!(".{}", base)),
        None => host == pattern,
    }
}
