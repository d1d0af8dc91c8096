//! Error types surfaced by the decision engine.

use thiserror::Error;
use uuid::Uuid;

/// Errors returned by the lifecycle manager and alert stores.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Alert not found: {0}")]
    AlertNotFound(Uuid),

    #[error("Alert store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid stored record: {0}")]
    InvalidRecord(String),
}

impl EngineError {
    /// Transient failures the caller may retry.
    pub fn is_transient(&self) -> bool {
        // ---
        match self {
            EngineError::StoreUnavailable(_) => true,
            EngineError::Database(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            ),
            _ => false,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
