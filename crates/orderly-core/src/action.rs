//! # Sync Action Envelope
//!
//! The client-submitted mutation envelope and its vocabulary types.
//!
//! ## Envelope Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SyncAction                                     │
//! │                                                                         │
//! │  id ─────────────── client-stable idempotency key (optional on wire)   │
//! │  entity_type ────── order | product | customer | payment               │
//! │  entity_id ──────── which record to touch                              │
//! │  action ─────────── create | update | delete                           │
//! │  data ───────────── field map (empty for delete)                       │
//! │  client_timestamp ─ when the device queued the mutation                │
//! │  version ────────── entity version the device last saw (>= 1)          │
//! │                                                                         │
//! │  The envelope stays entity-agnostic: `data` is an associative map.     │
//! │  Kind-specific schemas are the EntityMutator collaborator's problem.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Entity `data` payloads are associative maps at the engine boundary.
pub type DataMap = serde_json::Map<String, serde_json::Value>;

// =============================================================================
// Entity Kind
// =============================================================================

/// The business record kinds the engine synchronizes.
///
/// ## Variant Order Matters
/// The declaration order is the change-feed truncation priority: orders and
/// payments are operationally time-critical (open tables, settled checks),
/// product and customer edits can wait a pull cycle. `Ord` derives from this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Order,
    Payment,
    Product,
    Customer,
}

impl EntityKind {
    /// All kinds, in feed priority order.
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Order,
        EntityKind::Payment,
        EntityKind::Product,
        EntityKind::Customer,
    ];

    /// The stable wire/storage name of this kind.
    pub const fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Order => "order",
            EntityKind::Payment => "payment",
            EntityKind::Product => "product",
            EntityKind::Customer => "customer",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "order" => Ok(EntityKind::Order),
            "payment" => Ok(EntityKind::Payment),
            "product" => Ok(EntityKind::Product),
            "customer" => Ok(EntityKind::Customer),
            other => Err(format!("unknown entity type: {other}")),
        }
    }
}

// =============================================================================
// Action Kind
// =============================================================================

/// What the device wants to do to the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Create,
    Update,
    Delete,
}

impl ActionKind {
    /// The stable wire/storage name of this action.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Create => "create",
            ActionKind::Update => "update",
            ActionKind::Delete => "delete",
        }
    }

    /// Create/update carry data; delete must not.
    pub const fn requires_data(&self) -> bool {
        matches!(self, ActionKind::Create | ActionKind::Update)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(ActionKind::Create),
            "update" => Ok(ActionKind::Update),
            "delete" => Ok(ActionKind::Delete),
            other => Err(format!("unknown action: {other}")),
        }
    }
}

// =============================================================================
// Sync Action
// =============================================================================

/// A client-submitted intent to mutate one entity.
///
/// This is the raw wire shape. It becomes a [`ValidatedAction`] after the
/// validator normalizes it; nothing downstream of the validator ever sees
/// a raw `SyncAction`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncAction {
    /// Client-stable idempotency key. Optional on the wire; the validator
    /// derives a deterministic id when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Which kind of entity this touches.
    pub entity_type: EntityKind,

    /// The entity's id within its kind.
    pub entity_id: String,

    /// Create, update, or delete.
    pub action: ActionKind,

    /// Field map for create/update. Must be empty for delete.
    #[serde(default)]
    pub data: DataMap,

    /// When the device queued this mutation (device clock).
    pub client_timestamp: DateTime<Utc>,

    /// The entity version the device last saw. Starts at 1.
    pub version: i64,
}

// =============================================================================
// Validated Action
// =============================================================================

/// A [`SyncAction`] that passed validation and normalization.
///
/// Guarantees:
/// - `id` is present (client-supplied or deterministically derived)
/// - `entity_id` is non-blank
/// - `data` is non-empty for create/update and empty for delete
/// - `version >= 1`
/// - `client_timestamp` is within skew tolerance of server time
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedAction {
    /// The idempotency key, always present.
    pub id: String,
    pub entity_type: EntityKind,
    pub entity_id: String,
    pub action: ActionKind,
    pub data: DataMap,
    pub client_timestamp: DateTime<Utc>,
    pub version: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_kind_roundtrip() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), kind);
        }
        assert!("table".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_entity_kind_feed_priority_order() {
        // Ord derives from declaration order, which IS the feed priority.
        assert!(EntityKind::Order < EntityKind::Payment);
        assert!(EntityKind::Payment < EntityKind::Product);
        assert!(EntityKind::Product < EntityKind::Customer);
    }

    #[test]
    fn test_action_kind_requires_data() {
        assert!(ActionKind::Create.requires_data());
        assert!(ActionKind::Update.requires_data());
        assert!(!ActionKind::Delete.requires_data());
    }

    #[test]
    fn test_sync_action_deserializes_without_id() {
        let action: SyncAction = serde_json::from_value(serde_json::json!({
            "entity_type": "order",
            "entity_id": "ord-1",
            "action": "delete",
            "client_timestamp": "2026-01-15T12:00:00Z",
            "version": 3,
        }))
        .unwrap();

        assert!(action.id.is_none());
        assert!(action.data.is_empty());
        assert_eq!(action.entity_type, EntityKind::Order);
        assert_eq!(action.action, ActionKind::Delete);
    }

    #[test]
    fn test_sync_action_rejects_unknown_kind() {
        let result: Result<SyncAction, _> = serde_json::from_value(serde_json::json!({
            "entity_type": "reservation",
            "entity_id": "r-1",
            "action": "create",
            "data": {"a": 1},
            "client_timestamp": "2026-01-15T12:00:00Z",
            "version": 1,
        }));
        assert!(result.is_err());
    }
}
