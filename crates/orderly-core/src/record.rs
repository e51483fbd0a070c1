//! # Sync Journal Records
//!
//! Server-side journal entry for one processed action, and its status
//! state machine.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    SyncRecord Status Transitions                        │
//! │                                                                         │
//! │                 ┌──────────► completed (terminal)                       │
//! │                 │                 ▲                                     │
//! │   pending ──────┼──────► conflict ┘  (any resolution strategy)          │
//! │                 │                                                       │
//! │                 └──────────► failed (terminal)                          │
//! │                                                                         │
//! │  Records are created once per processed action and NEVER deleted:      │
//! │  they are the audit trail and the idempotency index. Only `status`      │
//! │  (and the failure message) ever mutate.                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::action::{ActionKind, EntityKind};

// =============================================================================
// Sync Status
// =============================================================================

/// Processing status of a journal record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Accepted but not yet applied.
    Pending,
    /// Applied, or conflict resolved (acknowledged-but-rejected counts too).
    Completed,
    /// A conflict was detected; the entity was NOT mutated.
    Conflict,
    /// Validation or domain mutation failed.
    Failed,
}

impl SyncStatus {
    /// The stable wire/storage name of this status.
    pub const fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Completed => "completed",
            SyncStatus::Conflict => "conflict",
            SyncStatus::Failed => "failed",
        }
    }

    /// Whether this status permits a transition to `next`.
    ///
    /// `completed` and `failed` are terminal; `conflict` resolves to
    /// `completed` regardless of strategy.
    pub fn can_transition_to(&self, next: SyncStatus) -> bool {
        matches!(
            (self, next),
            (SyncStatus::Pending, SyncStatus::Completed)
                | (SyncStatus::Pending, SyncStatus::Conflict)
                | (SyncStatus::Pending, SyncStatus::Failed)
                | (SyncStatus::Conflict, SyncStatus::Completed)
        )
    }

    /// Whether this status is terminal.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, SyncStatus::Completed | SyncStatus::Failed)
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SyncStatus::Pending),
            "completed" => Ok(SyncStatus::Completed),
            "conflict" => Ok(SyncStatus::Conflict),
            "failed" => Ok(SyncStatus::Failed),
            other => Err(format!("unknown sync status: {other}")),
        }
    }
}

// =============================================================================
// Sync Record
// =============================================================================

/// Server-side journal entry for one processed [`crate::SyncAction`].
///
/// The `(restaurant_id, action_id)` pair is unique: it is the idempotency
/// index that lets a device resubmit a batch after a dropped connection and
/// get the original outcomes back instead of duplicate applications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRecord {
    /// Server-generated row id (UUID v4).
    pub id: String,

    /// The action's idempotency key.
    pub action_id: String,

    /// Tenant that owns this record.
    pub restaurant_id: String,

    /// Device that submitted the action.
    pub device_id: String,

    pub entity_type: EntityKind,
    pub entity_id: String,
    pub action: ActionKind,

    /// Current processing status.
    pub status: SyncStatus,

    /// Failure message when `status == Failed`.
    pub error: Option<String>,

    /// The entity version the action carried.
    pub version: i64,

    /// When the engine processed the action.
    pub applied_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            SyncStatus::Pending,
            SyncStatus::Completed,
            SyncStatus::Conflict,
            SyncStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<SyncStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_pending_transitions() {
        assert!(SyncStatus::Pending.can_transition_to(SyncStatus::Completed));
        assert!(SyncStatus::Pending.can_transition_to(SyncStatus::Conflict));
        assert!(SyncStatus::Pending.can_transition_to(SyncStatus::Failed));
        assert!(!SyncStatus::Pending.can_transition_to(SyncStatus::Pending));
    }

    #[test]
    fn test_conflict_resolves_to_completed_only() {
        assert!(SyncStatus::Conflict.can_transition_to(SyncStatus::Completed));
        assert!(!SyncStatus::Conflict.can_transition_to(SyncStatus::Failed));
        assert!(!SyncStatus::Conflict.can_transition_to(SyncStatus::Pending));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(SyncStatus::Completed.is_terminal());
        assert!(SyncStatus::Failed.is_terminal());
        assert!(!SyncStatus::Completed.can_transition_to(SyncStatus::Conflict));
        assert!(!SyncStatus::Failed.can_transition_to(SyncStatus::Completed));
    }
}
