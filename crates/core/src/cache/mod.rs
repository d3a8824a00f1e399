//! SQLite-backed store for versioned cache generations.
//!
//! This module provides the persistent side of the offline shell using SQLite
//! with async access via tokio-rusqlite. It supports:
//!
//! - One row per generation, keyed by its version string
//! - Immutable captured responses per generation
//! - A single-writer activation transaction that purges every other generation
//! - Automatic schema migrations and WAL mode

pub mod connection;
pub mod entries;
pub mod generations;
pub mod hash;
pub mod migrations;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::CachedResponse;
pub use generations::{Generation, GenerationState};
