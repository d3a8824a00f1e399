//! Origin and request-path canonicalization.
//!
//! Cache keys are origin-relative: path plus query, never the fragment.

use url::Url;

/// Error type for URL canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("cross-origin request: {0}")]
    CrossOrigin(String),
}

/// A request resolved against the shell's origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRequest {
    /// Absolute URL to fetch from the origin.
    pub url: Url,
    /// Cache key (e.g. `/style.css` or `/?lang=en`).
    pub key: String,
}

/// Canonicalize the configured origin.
///
/// Normalization steps:
/// 1. Trim whitespace, default scheme to https:// if missing
/// 2. Only http and https are accepted
/// 3. Lowercase the host
/// 4. Drop path, query and fragment so the result is the origin root
pub fn canonicalize_origin(input: &str) -> Result<Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let url_str = if trimmed.contains("://") { trimmed.to_string() } else { format!("https://{trimmed}") };

    let mut parsed = Url::parse(&url_str).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    if let Some(host) = parsed.host_str() {
        let host = host.to_lowercase();
        parsed
            .set_host(Some(&host))
            .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    }

    parsed.set_path("/");
    parsed.set_query(None);
    parsed.set_fragment(None);

    Ok(parsed)
}

/// Resolve a page request (relative path or absolute URL) against `origin`.
///
/// Absolute URLs must share the origin; the offline shell never caches or
/// serves another origin's resources.
pub fn resolve_request(origin: &Url, raw: &str) -> Result<ResolvedRequest, UrlError> {
    let trimmed = raw.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let mut url = origin.join(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    url.set_fragment(None);

    if url.origin() != origin.origin() {
        return Err(UrlError::CrossOrigin(url.to_string()));
    }

    let key = match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    };

    Ok(ResolvedRequest { url, key })
}
