use thiserror::Error;

pub type Result<T, E = CatalogError> = std::result::Result<T, E>;

/// Errors from catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transaction retry limit reached: {0}")]
    RetryLimit(rusqlite::Error),

    #[error("post-commit hooks require an active transaction")]
    NoActiveTransaction,

    #[error("{entity} has not been created yet")]
    MissingId { entity: &'static str },

    #[error("serializing media info: {0}")]
    MediaJson(#[from] serde_json::Error),
}

/// Classifies errors that warrant re-running an idempotent transaction body.
///
/// Implemented by downstream error types that wrap [`CatalogError`] so that
/// [`crate::Catalog::with_txn`] can see through them.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for CatalogError {
    fn is_retryable(&self) -> bool {
        match self {
            CatalogError::Sqlite(e) => is_busy(e),
            _ => false,
        }
    }
}

pub(crate) fn is_busy(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(ffi, _) if matches!(
            ffi.code,
            rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
        )
    )
}
