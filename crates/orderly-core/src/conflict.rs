//! # Conflict Records
//!
//! Divergence between client-submitted and server-held entity state,
//! and the strategies available to resolve it.
//!
//! ## Conflict Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Conflict Lifecycle                               │
//! │                                                                         │
//! │  Device A uploads stale update ──► detector flags timestamp_conflict    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Conflict created (one per entity)                                      │
//! │       │                                                                 │
//! │  Device B uploads another stale update to the SAME entity               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Proposal appended to the existing conflict - never a duplicate         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Operator resolves: server_wins | client_wins | merge | manual          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Conflict removed, entity re-broadcast through the change feed          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::action::{DataMap, EntityKind};

// =============================================================================
// Conflict Type
// =============================================================================

/// Why the action could not be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// Client update raced a newer server version on overlapping fields.
    TimestampConflict,
    /// Create targeted an entity that already exists.
    AlreadyExists,
    /// Update/delete targeted an entity that no longer exists.
    AlreadyDeleted,
    /// Equal versions with differing values. Should not occur under correct
    /// clients; always routed to manual resolution, never auto-picked.
    DataMismatch,
}

impl ConflictType {
    /// The stable wire/storage name of this conflict type.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ConflictType::TimestampConflict => "timestamp_conflict",
            ConflictType::AlreadyExists => "already_exists",
            ConflictType::AlreadyDeleted => "already_deleted",
            ConflictType::DataMismatch => "data_mismatch",
        }
    }
}

impl std::fmt::Display for ConflictType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ConflictType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "timestamp_conflict" => Ok(ConflictType::TimestampConflict),
            "already_exists" => Ok(ConflictType::AlreadyExists),
            "already_deleted" => Ok(ConflictType::AlreadyDeleted),
            "data_mismatch" => Ok(ConflictType::DataMismatch),
            other => Err(format!("unknown conflict type: {other}")),
        }
    }
}

// =============================================================================
// Client Proposal
// =============================================================================

/// One device's proposed data for a conflicted entity.
///
/// `received_at` is the server-side arrival order; it breaks ties when two
/// proposals share an identical `client_timestamp` (first received wins).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientProposal {
    pub device_id: String,
    pub data: DataMap,
    pub client_timestamp: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
}

// =============================================================================
// Conflict
// =============================================================================

/// An unresolved divergence on one entity.
///
/// At most one live `Conflict` exists per `(entity_type, entity_id)`;
/// additional racing devices append proposals to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    /// Server-generated conflict id (UUID v4).
    pub id: String,

    /// The journal record that first triggered this conflict.
    pub sync_record_id: String,

    /// Tenant that owns the entity.
    pub restaurant_id: String,

    pub entity_type: EntityKind,
    pub entity_id: String,

    pub conflict_type: ConflictType,

    /// The fields where client and server actually disagree.
    pub conflict_fields: Vec<String>,

    /// Proposals from each racing device, in arrival order.
    pub client_proposals: Vec<ClientProposal>,

    /// Server entity state snapshot at detection time.
    pub server_data: DataMap,

    /// Server entity version at detection time.
    pub server_version: i64,

    pub detected_at: DateTime<Utc>,
}

impl Conflict {
    /// The winning proposal under `client_wins`: most recent by
    /// `client_timestamp`, with ties going to the first received.
    ///
    /// Proposals are stored in arrival order, so a strictly-greater
    /// comparison implements first-received-wins for equal timestamps.
    pub fn latest_proposal(&self) -> Option<&ClientProposal> {
        let mut best: Option<&ClientProposal> = None;
        for proposal in &self.client_proposals {
            match best {
                Some(current) if proposal.client_timestamp <= current.client_timestamp => {}
                _ => best = Some(proposal),
            }
        }
        best
    }

    /// Merges fields from a later proposal into `conflict_fields`,
    /// preserving first-seen order without duplicates.
    pub fn merge_fields(&mut self, fields: &[String]) {
        for field in fields {
            if !self.conflict_fields.contains(field) {
                self.conflict_fields.push(field.clone());
            }
        }
    }
}

// =============================================================================
// Resolution Strategy
// =============================================================================

/// How an operator (or client) resolves a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Keep server state; acknowledge the rejected action(s).
    ServerWins,
    /// Apply the most recent client proposal.
    ClientWins,
    /// Apply an explicit operator-supplied merged payload.
    Merge,
    /// Clear the conflict without touching the entity.
    Manual,
}

impl ResolutionStrategy {
    /// The stable wire name of this strategy.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ResolutionStrategy::ServerWins => "server_wins",
            ResolutionStrategy::ClientWins => "client_wins",
            ResolutionStrategy::Merge => "merge",
            ResolutionStrategy::Manual => "manual",
        }
    }
}

impl std::fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResolutionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "server_wins" => Ok(ResolutionStrategy::ServerWins),
            "client_wins" => Ok(ResolutionStrategy::ClientWins),
            "merge" => Ok(ResolutionStrategy::Merge),
            "manual" => Ok(ResolutionStrategy::Manual),
            other => Err(format!("unknown resolution strategy: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn proposal(device: &str, ts_secs: i64, received_secs: i64) -> ClientProposal {
        ClientProposal {
            device_id: device.to_string(),
            data: DataMap::new(),
            client_timestamp: Utc.timestamp_opt(ts_secs, 0).unwrap(),
            received_at: Utc.timestamp_opt(received_secs, 0).unwrap(),
        }
    }

    fn conflict_with(proposals: Vec<ClientProposal>) -> Conflict {
        Conflict {
            id: "c-1".into(),
            sync_record_id: "r-1".into(),
            restaurant_id: "rest-1".into(),
            entity_type: EntityKind::Product,
            entity_id: "p-1".into(),
            conflict_type: ConflictType::TimestampConflict,
            conflict_fields: vec!["price".into()],
            client_proposals: proposals,
            server_data: DataMap::new(),
            server_version: 5,
            detected_at: Utc.timestamp_opt(1000, 0).unwrap(),
        }
    }

    #[test]
    fn test_latest_proposal_by_client_timestamp() {
        let conflict = conflict_with(vec![
            proposal("dev-a", 100, 1),
            proposal("dev-b", 300, 2),
            proposal("dev-c", 200, 3),
        ]);
        assert_eq!(conflict.latest_proposal().unwrap().device_id, "dev-b");
    }

    #[test]
    fn test_latest_proposal_tie_first_received_wins() {
        let conflict = conflict_with(vec![
            proposal("dev-a", 100, 1),
            proposal("dev-b", 100, 2),
        ]);
        assert_eq!(conflict.latest_proposal().unwrap().device_id, "dev-a");
    }

    #[test]
    fn test_latest_proposal_empty() {
        let conflict = conflict_with(vec![]);
        assert!(conflict.latest_proposal().is_none());
    }

    #[test]
    fn test_merge_fields_dedups() {
        let mut conflict = conflict_with(vec![]);
        conflict.merge_fields(&["price".to_string(), "stock_quantity".to_string()]);
        assert_eq!(conflict.conflict_fields, vec!["price", "stock_quantity"]);
    }

    #[test]
    fn test_strategy_roundtrip() {
        for strategy in [
            ResolutionStrategy::ServerWins,
            ResolutionStrategy::ClientWins,
            ResolutionStrategy::Merge,
            ResolutionStrategy::Manual,
        ] {
            assert_eq!(
                strategy.as_str().parse::<ResolutionStrategy>().unwrap(),
                strategy
            );
        }
        assert!("newest_wins".parse::<ResolutionStrategy>().is_err());
    }
}
