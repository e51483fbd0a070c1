//! # Sync Action Validator
//!
//! Validates and normalizes one inbound mutation envelope.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Deserialization (serde)                                       │
//! │  ├── Unknown entity_type / action rejected as type errors               │
//! │  └── Timestamp format, version as integer                               │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE - envelope invariants                             │
//! │  ├── entity_id present                                                  │
//! │  ├── create/update carry data, delete carries none                      │
//! │  ├── version >= 1                                                       │
//! │  ├── client clock within skew tolerance                                 │
//! │  └── idempotency key normalized (derived when absent)                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: EntityMutator (out of this crate)                             │
//! │  └── Kind-specific schema validation (order totals, stock, ...)         │
//! │                                                                         │
//! │  Defense in depth: each layer catches a different class of garbage      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::action::{SyncAction, ValidatedAction};
use crate::error::{ValidationError, ValidationResult};
use crate::DEFAULT_CLOCK_SKEW_SECS;

/// Namespace for deterministic action ids (UUID v5).
///
/// Derived ids must be stable across retries of the same action so a device
/// that never set an id still gets idempotent replay.
const ACTION_ID_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6f, 0x72, 0x64, 0x65, 0x72, 0x6c, 0x79, 0x2d, 0x73, 0x79, 0x6e, 0x63, 0x2d, 0x69, 0x64,
    0x73,
]);

/// Validates and normalizes inbound [`SyncAction`]s.
///
/// Pure: "now" is an argument so skew checks are deterministic in tests.
#[derive(Debug, Clone)]
pub struct SyncActionValidator {
    /// How far ahead of server time a client timestamp may be.
    skew_tolerance: Duration,
}

impl Default for SyncActionValidator {
    fn default() -> Self {
        SyncActionValidator {
            skew_tolerance: Duration::seconds(DEFAULT_CLOCK_SKEW_SECS),
        }
    }
}

impl SyncActionValidator {
    /// Creates a validator with a custom skew tolerance.
    pub fn new(skew_tolerance: Duration) -> Self {
        SyncActionValidator { skew_tolerance }
    }

    /// Validates one action against the given server time.
    ///
    /// ## Returns
    /// A [`ValidatedAction`] with a guaranteed idempotency key, or the first
    /// [`ValidationError`] encountered.
    ///
    /// ## Normalization
    /// - `id` is trimmed; a blank or absent id is replaced with a
    ///   deterministic UUID v5 over the action's identifying fields, so the
    ///   same retried action always derives the same key
    /// - delete actions have their (ignored) data cleared
    pub fn validate(&self, action: SyncAction, now: DateTime<Utc>) -> ValidationResult<ValidatedAction> {
        let entity_id = action.entity_id.trim();
        if entity_id.is_empty() {
            return Err(ValidationError::required("entity_id"));
        }

        if action.version < 1 {
            return Err(ValidationError::VersionTooLow { got: action.version });
        }

        if action.action.requires_data() && action.data.is_empty() {
            return Err(ValidationError::invalid(
                "data",
                format!("{} requires a non-empty data payload", action.action),
            ));
        }

        let ahead = action.client_timestamp - now;
        if ahead > self.skew_tolerance {
            return Err(ValidationError::ClockSkew {
                ahead_secs: ahead.num_seconds(),
                tolerance_secs: self.skew_tolerance.num_seconds(),
            });
        }

        let id = match action.id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => derive_action_id(&action, entity_id),
        };

        let data = if action.action.requires_data() {
            action.data
        } else {
            // delete carries no payload; drop whatever the client sent
            Default::default()
        };

        Ok(ValidatedAction {
            id,
            entity_type: action.entity_type,
            entity_id: entity_id.to_string(),
            action: action.action,
            data,
            client_timestamp: action.client_timestamp,
            version: action.version,
        })
    }
}

/// Derives a stable idempotency key for an action submitted without one.
///
/// The key is a UUID v5 over the fields that identify a retry of the same
/// queued mutation. Two genuinely different mutations to the same entity
/// differ in at least `client_timestamp`.
fn derive_action_id(action: &SyncAction, entity_id: &str) -> String {
    let name = format!(
        "{}/{}/{}/{}/{}",
        action.entity_type,
        entity_id,
        action.action,
        action.version,
        action.client_timestamp.timestamp_micros(),
    );
    Uuid::new_v5(&ACTION_ID_NAMESPACE, name.as_bytes()).to_string()
}
