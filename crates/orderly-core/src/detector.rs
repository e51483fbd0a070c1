//! # Conflict Detector
//!
//! Compares a validated action against current server entity state and
//! decides no-conflict vs. conflict, field-granularly.
//!
//! ## Detection Rules (in order)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Detection Decision Tree                           │
//! │                                                                         │
//! │  create + snapshot exists ─────────────────► already_exists             │
//! │  update/delete + no snapshot ──────────────► already_deleted            │
//! │  create + no snapshot ─────────────────────► no conflict (apply)        │
//! │                                                                         │
//! │  otherwise compare versions:                                            │
//! │    server <  client ───────────────────────► no conflict (fast-forward) │
//! │    server == client, all values equal ─────► no conflict (fast-forward) │
//! │    server == client, values differ ────────► data_mismatch (manual!)    │
//! │    server >  client:                                                    │
//! │       diff fields empty ───────────────────► no conflict (server moved  │
//! │                                              ahead on fields the client │
//! │                                              never touched)             │
//! │       diff fields non-empty ───────────────► timestamp_conflict         │
//! │                                                                         │
//! │  diff = keys present in action.data whose value differs from the        │
//! │  server snapshot. The client's untouched fields never conflict.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::action::{ActionKind, DataMap, ValidatedAction};
use crate::change::EntitySnapshot;
use crate::conflict::ConflictType;

// =============================================================================
// Detection Outcome
// =============================================================================

/// Outcome of comparing one action against server state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    /// Apply the action and bump the entity version.
    NoConflict,
    /// Register a conflict; the entity must NOT be mutated.
    Conflict {
        conflict_type: ConflictType,
        /// The disputed fields (empty for existence conflicts).
        fields: Vec<String>,
    },
}

impl Detection {
    /// Convenience constructor for a conflict outcome.
    fn conflict(conflict_type: ConflictType, fields: Vec<String>) -> Self {
        Detection::Conflict {
            conflict_type,
            fields,
        }
    }
}

// =============================================================================
// Conflict Detector
// =============================================================================

/// Stateless, field-granular conflict detection.
pub struct ConflictDetector;

impl ConflictDetector {
    /// Compares `action` against the server snapshot (`None` = entity
    /// missing or soft-deleted).
    pub fn detect(action: &ValidatedAction, snapshot: Option<&EntitySnapshot>) -> Detection {
        match (action.action, snapshot) {
            // Rule 1: create against an existing entity
            (ActionKind::Create, Some(_)) => {
                Detection::conflict(ConflictType::AlreadyExists, Vec::new())
            }

            // Rule 2: update/delete against a missing entity
            (ActionKind::Update, None) | (ActionKind::Delete, None) => {
                Detection::conflict(ConflictType::AlreadyDeleted, Vec::new())
            }

            // Fresh create
            (ActionKind::Create, None) => Detection::NoConflict,

            // Rules 3-4: version comparison
            (_, Some(server)) => Self::detect_versioned(action, server),
        }
    }

    /// Rules 3 and 4: the entity exists and the action is update/delete.
    fn detect_versioned(action: &ValidatedAction, server: &EntitySnapshot) -> Detection {
        let diff = diff_fields(&action.data, &server.data);

        if server.version == action.version {
            // Rule 4: equal versions should mean equal data. Divergence here
            // is a client bug; never auto-resolved.
            if diff.is_empty() {
                Detection::NoConflict
            } else {
                Detection::conflict(ConflictType::DataMismatch, diff)
            }
        } else if server.version < action.version {
            // Rule 3: server is not ahead - fast-forward apply.
            Detection::NoConflict
        } else if diff.is_empty() {
            // Server moved ahead, but only on fields the client never
            // touched - still a fast-forward.
            Detection::NoConflict
        } else {
            Detection::conflict(ConflictType::TimestampConflict, diff)
        }
    }
}

/// Keys present in `client` whose value differs from `server`.
///
/// A key missing on the server side counts as differing. Comparison is by
/// JSON value equality; nested structures compare deeply.
pub fn diff_fields(client: &DataMap, server: &DataMap) -> Vec<String> {
    client
        .iter()
        .filter(|(key, value)| server.get(*key) != Some(*value))
        .map(|(key, _)| key.clone())
        .collect()
}
