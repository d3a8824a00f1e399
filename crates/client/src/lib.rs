//! Origin client code for shellcache.
//!
//! This crate provides the HTTP fetch pipeline used to populate generations
//! and to answer network-bound interceptions, plus the `Network` seam the
//! worker is written against.

pub mod fetch;

pub use fetch::{FetchClient, FetchConfig, FetchResponse, Network, ResolvedRequest, canonicalize_origin, resolve_request};
pub use reqwest::{StatusCode, header::HeaderMap};
