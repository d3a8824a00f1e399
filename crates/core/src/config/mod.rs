//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (SHELLCACHE_*)
//! 2. TOML config file (if SHELLCACHE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod policy;
mod validation;

pub use policy::FetchPolicy;
pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (SHELLCACHE_*)
/// 2. TOML config file (if SHELLCACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Generation identifier for this revision of the asset set.
    ///
    /// Must change whenever `assets` changes. Set via SHELLCACHE_CACHE_NAME.
    #[serde(default = "default_cache_name")]
    pub cache_name: String,

    /// Origin the page shell is served from.
    ///
    /// Set via SHELLCACHE_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Ordered asset set populated at install time.
    ///
    /// Set via SHELLCACHE_ASSETS (e.g. `["/", "/index.html"]`).
    #[serde(default = "default_assets")]
    pub assets: Vec<String>,

    /// Page served when live content cannot be obtained. Must be in `assets`.
    #[serde(default = "default_fallback_path")]
    pub fallback_path: String,

    /// Interception policy.
    ///
    /// Set via SHELLCACHE_POLICY: network_first, cache_first or fallback_only.
    #[serde(default)]
    pub policy: FetchPolicy,

    /// Treat 5xx origin responses as network failures under network_first.
    #[serde(default)]
    pub fallback_on_server_error: bool,

    /// Path to SQLite generation store.
    ///
    /// Set via SHELLCACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for origin requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum bytes to fetch per request.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Origin request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_cache_name() -> String {
    "ems-pwa-cache-v2".into()
}

fn default_origin() -> String {
    "http://127.0.0.1:8080".into()
}

fn default_assets() -> Vec<String> {
    ["/", "/index.html", "/style.css", "/app.js", "/manifest.json", "/server-error.html"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_fallback_path() -> String {
    "/server-error.html".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./shellcache.sqlite")
}

fn default_user_agent() -> String {
    "shellcache/0.1".into()
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_timeout_ms() -> u64 {
    20_000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache_name: default_cache_name(),
            origin: default_origin(),
            assets: default_assets(),
            fallback_path: default_fallback_path(),
            policy: FetchPolicy::default(),
            fallback_on_server_error: false,
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("SHELLCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("SHELLCACHE_")
                .ignore(&["config_file"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.cache_name, "ems-pwa-cache-v2");
        assert_eq!(config.assets.len(), 6);
        assert_eq!(config.assets[0], "/");
        assert_eq!(config.fallback_path, "/server-error.html");
        assert_eq!(config.policy, FetchPolicy::NetworkFirst);
        assert!(!config.fallback_on_server_error);
        assert_eq!(config.db_path, PathBuf::from("./shellcache.sqlite"));
        assert_eq!(config.max_bytes, 5_242_880);
    }

    #[test]
    fn test_timeout_duration() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(20_000));
    }

    #[test]
    fn test_load_env_overrides() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("SHELLCACHE_CACHE_NAME", "ems-pwa-cache-v3");
            jail.set_env("SHELLCACHE_POLICY", "cache_first");
            jail.set_env("SHELLCACHE_ASSETS", "[\"/\", \"/offline.html\"]");
            jail.set_env("SHELLCACHE_FALLBACK_PATH", "/offline.html");

            let config = AppConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.cache_name, "ems-pwa-cache-v3");
            assert_eq!(config.policy, FetchPolicy::CacheFirst);
            assert_eq!(config.assets, vec!["/".to_string(), "/offline.html".to_string()]);
            Ok(())
        });
    }

    #[test]
    fn test_load_toml_file_below_env() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "shellcache.toml",
                r#"
                cache_name = "from-file"
                policy = "fallback_only"
                timeout_ms = 5000
                "#,
            )?;
            jail.set_env("SHELLCACHE_CONFIG_FILE", "shellcache.toml");
            jail.set_env("SHELLCACHE_CACHE_NAME", "from-env");

            let config = AppConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.cache_name, "from-env");
            assert_eq!(config.policy, FetchPolicy::FallbackOnly);
            assert_eq!(config.timeout_ms, 5000);
            Ok(())
        });
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("SHELLCACHE_FALLBACK_PATH", "/missing.html");
            assert!(matches!(AppConfig::load(), Err(ConfigError::Invalid { field, .. }) if field == "fallback_path"));
            Ok(())
        });
    }
}
