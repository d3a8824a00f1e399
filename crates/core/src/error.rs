//! Unified error types for shellcache.
//!
//! Every variant renders with a stable code prefix so host logs can be
//! grepped without parsing messages.

use tokio_rusqlite::rusqlite;

/// Unified error types for the cache manager.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., malformed protocol line).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// A stored row could not be decoded.
    #[error("CACHE_ERROR: corrupt entry: {0}")]
    CorruptEntry(String),

    /// Invalid URL or request path.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Transport-level failure reaching the origin.
    #[error("NETWORK_ERROR: {0}")]
    Network(String),

    /// Fetch timeout.
    #[error("FETCH_TIMEOUT: {0}")]
    FetchTimeout(String),

    /// Fetch response too large.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// HTTP error response where a success was required.
    #[error("HTTP_ERROR: {0}")]
    HttpError(String),

    /// Install aborted; the previous generation stays authoritative.
    #[error("INSTALL_FAILED: {generation}: {reason}")]
    InstallFailed { generation: String, reason: String },

    /// A generation with this id is already stored.
    #[error("GENERATION_EXISTS: {0}")]
    GenerationExists(String),

    /// The asset set changed but the generation id did not.
    #[error("MANIFEST_CHANGED: generation {generation} was installed from a different asset set")]
    ManifestChanged { generation: String },

    /// Activation requested for a generation that was never installed.
    #[error("NOT_INSTALLED: {0}")]
    NotInstalled(String),

    /// Host I/O failed (protocol stream closed, unreadable input).
    #[error("IO_ERROR: {0}")]
    Io(#[from] std::io::Error),

    /// Lifecycle transition not allowed by the state machine.
    #[error("INVALID_TRANSITION: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::CorruptEntry(err.to_string())
    }
}

impl Error {
    /// Whether this error came from trying to reach the origin.
    ///
    /// Interception policies fall back only on these; store failures propagate.
    pub fn is_network_failure(&self) -> bool {
        matches!(self, Error::Network(_) | Error::FetchTimeout(_) | Error::FetchTooLarge(_) | Error::HttpError(_))
    }
}
