//! Error taxonomy for the storage-and-aggregation core.

use thiserror::Error;

/// Errors surfaced by the hub core.
///
/// Transient store errors are retried by the connection manager up to its
/// configured ceiling; everything else aborts the current high-level call.
/// Ingestion-boundary and background failures are absorbed and logged at
/// their call sites, never propagated to the protocol layer.
#[derive(Debug, Error)]
pub enum HubError {
    /// Lock contention or timeout inside the store. Retryable.
    #[error("transient store error: {0}")]
    TransientStore(String),

    /// Retry ceiling exceeded, or the storage location is unusable.
    #[error("fatal store error: {0}")]
    FatalStore(String),

    /// Malformed label or value at the ingestion boundary.
    #[error("invalid reading: {0}")]
    Data(String),

    /// An aggregation invariant was violated. Should never occur.
    #[error("aggregation invariant violated: {0}")]
    Logic(String),
}

pub type Result<T> = std::result::Result<T, HubError>;

impl HubError {
    pub fn is_transient(&self) -> bool {
        matches!(self, HubError::TransientStore(_))
    }
}

impl From<rusqlite::Error> for HubError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if matches!(
                    e.code,
                    ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
                ) =>
            {
                HubError::TransientStore(err.to_string())
            }
            _ => HubError::FatalStore(err.to_string()),
        }
    }
}
