//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use std::collections::HashSet;

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if `cache_name` or `assets` is empty and
    /// `ConfigError::Invalid` if:
    /// - `origin` is not an http(s) URL
    /// - an asset is not origin-relative or appears twice
    /// - `fallback_path` is not part of `assets`
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_name.trim().is_empty() {
            return Err(ConfigError::Missing {
                field: "cache_name".into(),
                hint: "Set SHELLCACHE_CACHE_NAME to a version string such as ems-pwa-cache-v2".into(),
            });
        }

        match url::Url::parse(&self.origin) {
            Ok(origin) if matches!(origin.scheme(), "http" | "https") && origin.host_str().is_some() => {}
            Ok(origin) => return Err(invalid("origin", format!("unsupported origin: {origin}"))),
            Err(e) => return Err(invalid("origin", e.to_string())),
        }

        if self.assets.is_empty() {
            return Err(ConfigError::Missing {
                field: "assets".into(),
                hint: "The offline shell needs at least the fallback page".into(),
            });
        }

        let mut seen = HashSet::new();
        for asset in &self.assets {
            if !asset.starts_with('/') || asset.starts_with("//") {
                return Err(invalid("assets", format!("{asset} is not an origin-relative path")));
            }
            if !seen.insert(asset.as_str()) {
                return Err(invalid("assets", format!("{asset} is listed more than once")));
            }
        }

        if !seen.contains(self.fallback_path.as_str()) {
            return Err(invalid("fallback_path", format!("{} is not in assets", self.fallback_path)));
        }

        if self.max_bytes == 0 {
            return Err(invalid("max_bytes", "must be greater than 0"));
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(invalid("max_bytes", "must not exceed 50MB"));
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        if self.policy.is_degraded() {
            tracing::warn!(
                policy = %self.policy,
                fallback = %self.fallback_path,
                "fallback_only policy selected; every request will receive the fallback page"
            );
        }

        if self.fallback_on_server_error && self.policy != super::FetchPolicy::NetworkFirst {
            tracing::warn!(
                policy = %self.policy,
                "fallback_on_server_error only applies to network_first and will be ignored"
            );
        }

        Ok(())
    }
}
