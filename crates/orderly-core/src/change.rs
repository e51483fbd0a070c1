//! # Change Feed Projections
//!
//! Read-only types for the incremental change feed and the entity
//! snapshot the detector compares against.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::action::{ActionKind, DataMap, EntityKind};

// =============================================================================
// Entity Snapshot
// =============================================================================

/// Current server-held state of one entity.
///
/// This is what the [`crate::ConflictDetector`] compares a client action
/// against. Deleted entities keep their row (soft delete) so the feed can
/// tell other devices to drop them; for detection purposes a deleted
/// snapshot counts as "missing".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub entity_type: EntityKind,
    pub entity_id: String,
    pub restaurant_id: String,
    pub data: DataMap,
    pub version: i64,
    pub deleted: bool,
    pub updated_at: DateTime<Utc>,
}

impl EntitySnapshot {
    /// Snapshot as seen by conflict detection: `None` when soft-deleted.
    pub fn live(&self) -> Option<&EntitySnapshot> {
        if self.deleted {
            None
        } else {
            Some(self)
        }
    }
}

// =============================================================================
// Change Record
// =============================================================================

/// One entry in the incremental change feed.
///
/// A projection of current entity state, not a separately persisted event:
/// the feed retains only the most recent state per entity, never a log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub entity_type: EntityKind,
    pub entity_id: String,
    pub data: DataMap,
    pub action: ActionKind,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl ChangeRecord {
    /// Projects a snapshot into its feed representation.
    ///
    /// The action is derived from state: deleted rows are `delete`, version 1
    /// is the initial `create`, everything else is an `update`.
    pub fn from_snapshot(snapshot: &EntitySnapshot) -> Self {
        let action = if snapshot.deleted {
            ActionKind::Delete
        } else if snapshot.version <= 1 {
            ActionKind::Create
        } else {
            ActionKind::Update
        };

        ChangeRecord {
            entity_type: snapshot.entity_type,
            entity_id: snapshot.entity_id.clone(),
            data: snapshot.data.clone(),
            action,
            version: snapshot.version,
            updated_at: snapshot.updated_at,
        }
    }
}
