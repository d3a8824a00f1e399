//! Fetch interception policies.
//!
//! Every request the page makes is claimed here and answered according to
//! the active revision's `FetchPolicy`:
//!
//! - `network_first`: live response when the origin answers; otherwise the
//!   fallback page for navigations and the cached copy for subresources
//! - `cache_first`: cached copy when present; otherwise the live response,
//!   which is not written back
//! - `fallback_only`: the fallback page, always
//!
//! A request that ends with nothing to serve resolves to a tagged 503 rather
//! than an error, so the page never hangs.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use shellcache_client::{FetchResponse, Network, ResolvedRequest};
use shellcache_core::{CacheDb, CachedResponse, Error, FetchPolicy};

use crate::registration::Revision;

/// Header tagging every response the origin did not produce directly.
pub const SOURCE_HEADER: &str = "x-shellcache";

/// Purpose of an intercepted request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestMode {
    /// Loads a top-level document.
    Navigate,
    #[default]
    Subresource,
}

/// A request issued by the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterceptedRequest {
    /// Correlation id echoed back in the reply.
    #[serde(default)]
    pub id: Option<u64>,
    /// Origin-relative path or same-origin absolute URL.
    pub path: String,
    #[serde(default)]
    pub mode: RequestMode,
}

impl InterceptedRequest {
    pub fn navigate(path: impl Into<String>) -> Self {
        Self { id: None, path: path.into(), mode: RequestMode::Navigate }
    }

    pub fn subresource(path: impl Into<String>) -> Self {
        Self { id: None, path: path.into(), mode: RequestMode::Subresource }
    }
}

/// Where an intercepted response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    Network,
    Cache,
    Fallback,
    Unavailable,
}

impl ResponseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Cache => "cache",
            Self::Fallback => "fallback",
            Self::Unavailable => "unavailable",
        }
    }
}

/// Response handed back to the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub source: ResponseSource,
}

impl InterceptedResponse {
    fn from_network(response: FetchResponse) -> Self {
        tracing::debug!(
            url = %response.url,
            final_url = %response.final_url,
            status = response.status.as_u16(),
            fetch_ms = response.fetch_ms,
            "live response"
        );
        Self {
            status: response.status.as_u16(),
            headers: response.header_pairs(),
            body: response.bytes,
            source: ResponseSource::Network,
        }
    }

    fn from_entry(entry: CachedResponse, source: ResponseSource) -> Self {
        let mut headers = entry.headers;
        headers.push((SOURCE_HEADER.to_string(), source.as_str().to_string()));
        Self { status: entry.status, headers, body: Bytes::from(entry.body), source }
    }

    /// Tagged 503 for requests with neither a live nor a cached answer.
    pub fn unavailable(key: &str) -> Self {
        Self {
            status: 503,
            headers: vec![
                ("content-type".to_string(), "text/plain; charset=utf-8".to_string()),
                (SOURCE_HEADER.to_string(), ResponseSource::Unavailable.as_str().to_string()),
            ],
            body: Bytes::from(format!("{key} is unavailable offline")),
            source: ResponseSource::Unavailable,
        }
    }

    /// Value of the first header named `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Answer a request for the active revision.
pub(crate) async fn respond(
    db: &CacheDb, network: &dyn Network, revision: &Revision, mode: RequestMode, request: &ResolvedRequest,
) -> Result<InterceptedResponse, Error> {
    match revision.policy() {
        FetchPolicy::FallbackOnly => serve_fallback(db, revision).await,
        FetchPolicy::CacheFirst => cache_first(db, network, revision, request).await,
        FetchPolicy::NetworkFirst => network_first(db, network, revision, mode, request).await,
    }
}

/// Answer a request while no revision is active: straight to the origin.
pub(crate) async fn passthrough(network: &dyn Network, request: &ResolvedRequest) -> Result<InterceptedResponse, Error> {
    match network.fetch(&request.url).await {
        Ok(response) => Ok(InterceptedResponse::from_network(response)),
        Err(e) if e.is_network_failure() => {
            tracing::debug!(key = %request.key, error = %e, "no active generation and origin unreachable");
            Ok(InterceptedResponse::unavailable(&request.key))
        }
        Err(e) => Err(e),
    }
}

async fn network_first(
    db: &CacheDb, network: &dyn Network, revision: &Revision, mode: RequestMode, request: &ResolvedRequest,
) -> Result<InterceptedResponse, Error> {
    let live = match network.fetch(&request.url).await {
        Ok(response) if revision.fallback_on_server_error() && response.status.is_server_error() => {
            Err(Error::HttpError(format!("{}: status {}", request.key, response.status.as_u16())))
        }
        other => other,
    };

    match live {
        Ok(response) => Ok(InterceptedResponse::from_network(response)),
        Err(e) if e.is_network_failure() => {
            tracing::debug!(key = %request.key, ?mode, error = %e, "origin failed, serving offline copy");
            match mode {
                RequestMode::Navigate => serve_fallback(db, revision).await,
                RequestMode::Subresource => serve_cached(db, revision, &request.key).await,
            }
        }
        Err(e) => Err(e),
    }
}

async fn cache_first(
    db: &CacheDb, network: &dyn Network, revision: &Revision, request: &ResolvedRequest,
) -> Result<InterceptedResponse, Error> {
    if let Some(entry) = db.match_entry(revision.generation(), &request.key).await? {
        tracing::debug!(key = %request.key, generation = revision.generation(), "cache hit");
        return Ok(InterceptedResponse::from_entry(entry, ResponseSource::Cache));
    }

    match network.fetch(&request.url).await {
        Ok(response) => Ok(InterceptedResponse::from_network(response)),
        Err(e) if e.is_network_failure() => {
            tracing::debug!(key = %request.key, error = %e, "cache miss and origin unreachable");
            Ok(InterceptedResponse::unavailable(&request.key))
        }
        Err(e) => Err(e),
    }
}

async fn serve_cached(db: &CacheDb, revision: &Revision, key: &str) -> Result<InterceptedResponse, Error> {
    match db.match_entry(revision.generation(), key).await? {
        Some(entry) => Ok(InterceptedResponse::from_entry(entry, ResponseSource::Cache)),
        None => Ok(InterceptedResponse::unavailable(key)),
    }
}

async fn serve_fallback(db: &CacheDb, revision: &Revision) -> Result<InterceptedResponse, Error> {
    match db.match_entry(revision.generation(), revision.fallback_path()).await? {
        Some(entry) => Ok(InterceptedResponse::from_entry(entry, ResponseSource::Fallback)),
        None => {
            tracing::warn!(
                generation = revision.generation(),
                fallback = revision.fallback_path(),
                "fallback page missing from active generation"
            );
            Ok(InterceptedResponse::unavailable(revision.fallback_path()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_mode_defaults_to_subresource() {
        let request: InterceptedRequest = serde_json::from_str(r#"{"path": "/app.js"}"#).unwrap();
        assert_eq!(request.mode, RequestMode::Subresource);
        assert_eq!(request.id, None);

        let request: InterceptedRequest = serde_json::from_str(r#"{"id": 7, "path": "/", "mode": "navigate"}"#).unwrap();
        assert_eq!(request, InterceptedRequest { id: Some(7), ..InterceptedRequest::navigate("/") });
    }

    #[test]
    fn test_unavailable_is_tagged() {
        let response = InterceptedResponse::unavailable("/reports.json");
        assert_eq!(response.status, 503);
        assert_eq!(response.source, ResponseSource::Unavailable);
        assert_eq!(response.header("X-Shellcache"), Some("unavailable"));
        assert!(String::from_utf8_lossy(&response.body).contains("/reports.json"));
    }

    #[test]
    fn test_cached_entry_keeps_bytes_and_tags_source() {
        let entry = CachedResponse {
            path: "/server-error.html".into(),
            status: 200,
            content_type: Some("text/html".into()),
            headers: vec![("content-type".into(), "text/html".into())],
            body: b"<h1>Server error</h1>".to_vec(),
            stored_at: "2026-01-01T00:00:00Z".into(),
        };

        let response = InterceptedResponse::from_entry(entry, ResponseSource::Fallback);
        assert_eq!(response.body, Bytes::from_static(b"<h1>Server error</h1>"));
        assert_eq!(response.header("content-type"), Some("text/html"));
        assert_eq!(response.header(SOURCE_HEADER), Some("fallback"));
    }
}
