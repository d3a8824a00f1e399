//! shellcache worker entry point.
//!
//! Boots the offline shell for the configured origin and answers page
//! requests over stdio. Logging goes to stderr to keep the reply stream on
//! stdout clean.

use std::sync::Arc;

use anyhow::{Context, Result};
use shellcache_client::{FetchClient, FetchConfig, canonicalize_origin};
use shellcache_core::{AppConfig, CacheDb};
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

mod intercept;
mod lifecycle;
mod protocol;
mod registration;

use registration::{Registration, Revision};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("loading configuration")?;
    let origin = canonicalize_origin(&config.origin).context("parsing origin")?;

    tracing::info!(
        origin = %origin,
        generation = %config.cache_name,
        policy = %config.policy,
        "starting shellcache worker on stdio"
    );

    let db = CacheDb::open(&config.db_path).await.context("opening cache store")?;
    let network = FetchClient::new(FetchConfig::from(&config))?;
    let registration = Arc::new(Registration::new(db, Arc::new(network), origin));

    let revision = Arc::new(Revision::from_config(&config));
    registration.resume(&revision).await?;

    match registration.register(Arc::clone(&revision)).await {
        Ok(purged) => tracing::info!(generation = revision.generation(), purged = purged.len(), "registered"),
        Err(e) => tracing::error!(
            generation = revision.generation(),
            state = %revision.state(),
            error = %e,
            "registration failed; serving with the previous generation"
        ),
    }

    let stdin = BufReader::new(tokio::io::stdin());
    protocol::serve(registration, stdin, tokio::io::stdout()).await?;

    tracing::info!("input closed, shutting down");
    Ok(())
}
