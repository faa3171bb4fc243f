use std::sync::{PoisonError, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;

/// Errors surfaced by the flush pipeline.
///
/// `PersistFailure` is the only retryable kind; the core never retries it
/// itself, callers decide. `StaleTarget` must never be retried against the
/// same target: re-resolve placement and dispatch again.
#[derive(Error, Debug, Clone)]
pub enum FlushError {
    #[error("flush already in progress for region {region}")]
    AlreadyInProgress { region: String },

    #[error("stale target: region {region} is not owned by server {server}")]
    StaleTarget { region: String, server: String },

    #[error("persist failure: {0}")]
    PersistFailure(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("lock poisoned: {0}")]
    LockPoisoned(String),
}

impl FlushError {
    /// True for failures a caller may reasonably retry against the same
    /// target once the underlying storage is healthy again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FlushError::PersistFailure(_))
    }
}

/// Extension trait for converting lock errors to FlushError.
pub trait LockResultExt<T> {
    /// Converts a lock error to a FlushError.
    fn map_lock_err(self) -> Result<T, FlushError>;
}

impl<'a, T> LockResultExt<RwLockReadGuard<'a, T>>
    for Result<RwLockReadGuard<'a, T>, PoisonError<RwLockReadGuard<'a, T>>>
{
    #[inline]
    fn map_lock_err(self) -> Result<RwLockReadGuard<'a, T>, FlushError> {
        self.map_err(|e| FlushError::LockPoisoned(e.to_string()))
    }
}

impl<'a, T> LockResultExt<RwLockWriteGuard<'a, T>>
    for Result<RwLockWriteGuard<'a, T>, PoisonError<RwLockWriteGuard<'a, T>>>
{
    #[inline]
    fn map_lock_err(self) -> Result<RwLockWriteGuard<'a, T>, FlushError> {
        self.map_err(|e| FlushError::LockPoisoned(e.to_string()))
    }
}
