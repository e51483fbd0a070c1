//! # Sync Error Types
//!
//! Error types for engine operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────────┐  ┌─────────────────────┐ │
//! │  │  Per-request    │  │   Resolution        │  │   Infrastructure    │ │
//! │  │  (4xx)          │  │   (4xx)             │  │   (5xx, retryable)  │ │
//! │  │                 │  │                     │  │                     │ │
//! │  │  Validation     │  │  ConflictNotFound   │  │  Storage            │ │
//! │  │  BatchTooLarge  │  │  InvalidStrategy    │  │  Internal           │ │
//! │  │                 │  │  InvalidMergedData  │  │                     │ │
//! │  │                 │  │  Mutation           │  │                     │ │
//! │  └─────────────────┘  └─────────────────────┘  └─────────────────────┘ │
//! │                                                                         │
//! │  Per-ACTION failures (validation, domain mutation errors) never         │
//! │  surface here: the batch applier captures them inside the response.     │
//! │  An error from apply_batch means the whole request should be retried.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use orderly_core::{ConflictType, ResolutionStrategy, ValidationError};

/// Result type alias for engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Engine error covering batch upload, resolution and feed failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Request Errors
    // =========================================================================
    /// A request-level parameter failed validation.
    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),

    /// The batch exceeds the per-request action limit.
    #[error("Batch of {got} actions exceeds the maximum of {max}")]
    BatchTooLarge { got: usize, max: usize },

    // =========================================================================
    // Resolution Errors
    // =========================================================================
    /// The conflict does not exist (or belongs to another restaurant).
    #[error("Conflict not found: {0}")]
    ConflictNotFound(String),

    /// The strategy cannot be applied to this conflict.
    #[error("Strategy {strategy} cannot resolve this {conflict_type} conflict: {reason}")]
    InvalidResolutionStrategy {
        strategy: ResolutionStrategy,
        conflict_type: ConflictType,
        reason: String,
    },

    /// Merge resolution payload missing or incomplete.
    #[error("Invalid merged data: {0}")]
    InvalidMergedData(String),

    /// The entity mutator rejected a resolution write.
    #[error("Mutation failed: {0}")]
    Mutation(String),

    // =========================================================================
    // Infrastructure Errors
    // =========================================================================
    /// Durable storage unavailable or failing.
    #[error("Storage error: {0}")]
    Storage(#[from] orderly_db::DbError),

    /// Invariant violation inside the engine.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// True when the caller should retry the whole request.
    ///
    /// Idempotency keys make a whole-batch retry safe: already-journaled
    /// actions replay their recorded outcome instead of reapplying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Storage(_))
    }

    /// True when the error is the caller's fault (4xx-class).
    pub fn is_client_error(&self) -> bool {
        !matches!(self, SyncError::Storage(_) | SyncError::Internal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orderly_db::DbError;

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::Storage(DbError::PoolExhausted).is_retryable());

        assert!(!SyncError::ConflictNotFound("c-1".into()).is_retryable());
        assert!(!SyncError::BatchTooLarge { got: 900, max: 500 }.is_retryable());
    }

    #[test]
    fn test_client_error_classification() {
        assert!(SyncError::ConflictNotFound("c-1".into()).is_client_error());
        assert!(SyncError::InvalidMergedData("missing price".into()).is_client_error());

        assert!(!SyncError::Storage(DbError::PoolExhausted).is_client_error());
        assert!(!SyncError::Internal("oops".into()).is_client_error());
    }

    #[test]
    fn test_error_display() {
        let err = SyncError::InvalidResolutionStrategy {
            strategy: ResolutionStrategy::ClientWins,
            conflict_type: ConflictType::DataMismatch,
            reason: "data_mismatch requires operator review".into(),
        };
        assert!(err.to_string().contains("client_wins"));
        assert!(err.to_string().contains("data_mismatch"));
    }
}
