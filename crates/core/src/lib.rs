//! Core types and shared functionality for shellcache.
//!
//! This crate provides:
//! - Generation store with SQLite backend
//! - Unified error types
//! - Layered configuration and the fetch policy switch

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheDb, CachedResponse, Generation, GenerationState};
pub use config::{AppConfig, ConfigError, FetchPolicy};
pub use error::Error;
