//! Registration: the host-side owner of worker revisions.
//!
//! A `Registration` holds the one active revision and drives new revisions
//! through install and activation. Interceptions read the active slot under a
//! shared lock for their whole duration; activation takes the exclusive lock,
//! so a generation is never purged while it is still answering a request.

use std::sync::{Arc, Mutex, PoisonError};

use futures_util::future::try_join_all;
use shellcache_client::{Network, ResolvedRequest, resolve_request};
use shellcache_core::cache::hash::compute_manifest_digest;
use shellcache_core::{AppConfig, CacheDb, CachedResponse, Error, FetchPolicy, Generation};
use tokio::sync::RwLock;
use url::Url;

use crate::intercept::{self, InterceptedRequest, InterceptedResponse};
use crate::lifecycle::WorkerState;

/// One deployed revision of the worker: a generation id, its asset set and
/// the interception policy it serves with.
#[derive(Debug)]
pub struct Revision {
    generation: String,
    assets: Vec<String>,
    manifest_digest: String,
    fallback_path: String,
    policy: FetchPolicy,
    fallback_on_server_error: bool,
    state: Mutex<WorkerState>,
}

impl Revision {
    pub fn new(
        generation: impl Into<String>, assets: Vec<String>, fallback_path: impl Into<String>, policy: FetchPolicy,
    ) -> Self {
        let manifest_digest = compute_manifest_digest(&assets);
        Self {
            generation: generation.into(),
            assets,
            manifest_digest,
            fallback_path: fallback_path.into(),
            policy,
            fallback_on_server_error: false,
            state: Mutex::new(WorkerState::Idle),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.cache_name, config.assets.clone(), &config.fallback_path, config.policy)
            .with_server_error_fallback(config.fallback_on_server_error)
    }

    pub fn with_server_error_fallback(mut self, enabled: bool) -> Self {
        self.fallback_on_server_error = enabled;
        self
    }

    /// A revision that was already active when this process started.
    fn resumed(generation: &Generation, assets: Vec<String>, template: &Revision) -> Self {
        Self {
            generation: generation.id.clone(),
            assets,
            manifest_digest: generation.manifest_digest.clone(),
            fallback_path: template.fallback_path.clone(),
            policy: template.policy,
            fallback_on_server_error: template.fallback_on_server_error,
            state: Mutex::new(WorkerState::Active),
        }
    }

    pub fn generation(&self) -> &str {
        &self.generation
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    pub fn fallback_path(&self) -> &str {
        &self.fallback_path
    }

    pub fn policy(&self) -> FetchPolicy {
        self.policy
    }

    pub fn fallback_on_server_error(&self) -> bool {
        self.fallback_on_server_error
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn advance(&self, next: WorkerState) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let from = *state;
        state.advance(next)?;
        tracing::info!(generation = %self.generation, from = %from, to = %next, "worker state changed");
        if next.is_terminal() {
            tracing::debug!(generation = %self.generation, "revision retired");
        }
        Ok(())
    }
}

/// Host-side registration for one page shell origin.
pub struct Registration {
    db: CacheDb,
    network: Arc<dyn Network>,
    origin: Url,
    active: RwLock<Option<Arc<Revision>>>,
}

impl Registration {
    pub fn new(db: CacheDb, network: Arc<dyn Network>, origin: Url) -> Self {
        Self { db, network, origin, active: RwLock::new(None) }
    }

    /// The revision currently answering requests.
    pub async fn active_revision(&self) -> Option<Arc<Revision>> {
        self.active.read().await.clone()
    }

    /// Adopt the generation a previous process left active.
    ///
    /// The resumed revision serves with `template`'s policy and fallback page.
    /// Returns false when the store has no active generation or a revision is
    /// already active in memory.
    pub async fn resume(&self, template: &Revision) -> Result<bool, Error> {
        let mut slot = self.active.write().await;
        if slot.is_some() {
            return Ok(false);
        }

        let Some(generation) = self.db.active_generation().await? else {
            return Ok(false);
        };

        let assets = self.db.entry_paths(&generation.id).await?;
        tracing::info!(generation = %generation.id, assets = assets.len(), "resumed active generation");
        *slot = Some(Arc::new(Revision::resumed(&generation, assets, template)));
        Ok(true)
    }

    /// Install then activate `revision`.
    pub async fn register(&self, revision: Arc<Revision>) -> Result<Vec<String>, Error> {
        self.install(&revision).await?;
        self.activate(revision).await
    }

    /// Install phase: populate the revision's generation from the origin.
    ///
    /// All assets are fetched concurrently and written in one transaction only
    /// if every fetch succeeded with a success status. A generation that is
    /// already stored with the same manifest is reused without any fetch.
    ///
    /// # Errors
    ///
    /// On any failure the revision ends in `InstallFailed` and the store is
    /// left as it was.
    pub async fn install(&self, revision: &Revision) -> Result<Generation, Error> {
        revision.advance(WorkerState::Installing)?;

        match self.populate(revision).await {
            Ok(generation) => {
                revision.advance(WorkerState::Installed)?;
                Ok(generation)
            }
            Err(e) => {
                tracing::error!(
                    generation = %revision.generation,
                    error = %e,
                    "install failed; previous generation remains authoritative"
                );
                revision.advance(WorkerState::InstallFailed)?;
                Err(e)
            }
        }
    }

    async fn populate(&self, revision: &Revision) -> Result<Generation, Error> {
        if let Some(existing) = self.db.get_generation(&revision.generation).await? {
            if existing.manifest_digest != revision.manifest_digest {
                return Err(Error::ManifestChanged { generation: existing.id });
            }
            tracing::debug!(generation = %existing.id, "generation already stored, skipping fetch");
            return Ok(existing);
        }

        let captures = revision.assets().iter().map(|path| self.capture(path));
        let entries = try_join_all(captures).await.map_err(|e| Error::InstallFailed {
            generation: revision.generation.clone(),
            reason: e.to_string(),
        })?;

        let generation = self
            .db
            .install_generation(&revision.generation, &revision.manifest_digest, entries)
            .await?;
        tracing::info!(generation = %generation.id, assets = generation.asset_count, "generation populated");
        Ok(generation)
    }

    async fn capture(&self, path: &str) -> Result<CachedResponse, Error> {
        let request = self.resolve(path)?;
        let response = self.network.fetch(&request.url).await?;

        if !response.status.is_success() {
            return Err(Error::HttpError(format!("{}: status {}", request.key, response.status.as_u16())));
        }

        tracing::debug!(key = %request.key, final_url = %response.final_url, fetch_ms = response.fetch_ms, "captured");
        Ok(CachedResponse {
            path: request.key,
            status: response.status.as_u16(),
            content_type: response.content_type.clone(),
            headers: response.header_pairs(),
            body: response.bytes.to_vec(),
            stored_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    /// Activation phase: make `revision` authoritative and purge every other
    /// generation.
    ///
    /// Waits for in-flight interceptions on the previous revision to finish.
    /// Returns the purged generation ids.
    pub async fn activate(&self, revision: Arc<Revision>) -> Result<Vec<String>, Error> {
        revision.advance(WorkerState::Activating)?;

        let mut slot = self.active.write().await;

        let purged = match self.db.activate_generation(&revision.generation).await {
            Ok(purged) => purged,
            Err(e) => {
                tracing::error!(generation = %revision.generation, error = %e, "activation failed");
                revision.advance(WorkerState::Installed)?;
                return Err(e);
            }
        };

        revision.advance(WorkerState::Active)?;
        if let Some(previous) = slot.replace(Arc::clone(&revision))
            && let Err(e) = previous.advance(WorkerState::Superseded)
        {
            tracing::warn!(generation = %previous.generation, error = %e, "previous revision was not active");
        }

        tracing::info!(generation = %revision.generation, purged = ?purged, "generation activated");
        Ok(purged)
    }

    /// Fetch phase: answer one page request.
    ///
    /// Concurrent calls are independent. With no active revision the request
    /// goes straight to the origin.
    pub async fn handle_fetch(&self, request: &InterceptedRequest) -> Result<InterceptedResponse, Error> {
        let resolved = self.resolve(&request.path)?;
        let slot = self.active.read().await;

        match slot.as_deref() {
            Some(revision) if revision.state().intercepts() => {
                intercept::respond(&self.db, self.network.as_ref(), revision, request.mode, &resolved).await
            }
            _ => intercept::passthrough(self.network.as_ref(), &resolved).await,
        }
    }

    fn resolve(&self, path: &str) -> Result<ResolvedRequest, Error> {
        resolve_request(&self.origin, path).map_err(|e| Error::InvalidUrl(e.to_string()))
    }
}
