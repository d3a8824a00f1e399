//! Fetch interception policy switch.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How the active generation answers intercepted requests.
///
/// Chosen once in configuration and fixed for the life of the worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchPolicy {
    /// Try the origin; on failure serve the fallback page for navigations and
    /// the cached copy for everything else.
    #[default]
    NetworkFirst,

    /// Serve the cached copy when present, otherwise go to the origin without
    /// caching the result.
    CacheFirst,

    /// Serve the fallback page for every request. Maintenance mode only.
    FallbackOnly,
}

impl FetchPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NetworkFirst => "network_first",
            Self::CacheFirst => "cache_first",
            Self::FallbackOnly => "fallback_only",
        }
    }

    /// Whether this policy blinds the page to live and cached content.
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::FallbackOnly)
    }
}

impl fmt::Display for FetchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_network_first() {
        assert_eq!(FetchPolicy::default(), FetchPolicy::NetworkFirst);
        assert!(!FetchPolicy::default().is_degraded());
    }

    #[test]
    fn test_serde_names() {
        let policy: FetchPolicy = serde_json::from_str("\"cache_first\"").unwrap();
        assert_eq!(policy, FetchPolicy::CacheFirst);
        assert_eq!(serde_json::to_string(&FetchPolicy::FallbackOnly).unwrap(), "\"fallback_only\"");
    }

    #[test]
    fn test_only_fallback_is_degraded() {
        assert!(FetchPolicy::FallbackOnly.is_degraded());
        assert!(!FetchPolicy::CacheFirst.is_degraded());
    }
}
