//! # Validation Error Types
//!
//! Typed errors for action validation.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SyncActionValidator (this crate)                                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ValidationError ← field + reason, per action                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  BatchApplier records it as a `failed` journal entry and CONTINUES      │
//! │  with the rest of the batch - one malformed action never aborts         │
//! │  the whole upload.                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// A per-action validation failure.
///
/// Each variant carries the offending field so clients can highlight it
/// in their merge/failure UI.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// A field has an invalid value.
    #[error("{field} is invalid: {reason}")]
    Invalid { field: String, reason: String },

    /// The version counter must start at 1.
    #[error("version must be >= 1, got {got}")]
    VersionTooLow { got: i64 },

    /// The client clock is too far ahead of the server clock.
    #[error("client_timestamp is {ahead_secs}s ahead of server time (tolerance {tolerance_secs}s)")]
    ClockSkew { ahead_secs: i64, tolerance_secs: i64 },
}

impl ValidationError {
    /// Creates a `Required` error for the given field.
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required { field: field.into() }
    }

    /// Creates an `Invalid` error for the given field.
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// The field the error refers to, for per-field UI feedback.
    pub fn field(&self) -> &str {
        match self {
            ValidationError::Required { field } => field,
            ValidationError::Invalid { field, .. } => field,
            ValidationError::VersionTooLow { .. } => "version",
            ValidationError::ClockSkew { .. } => "client_timestamp",
        }
    }
}
