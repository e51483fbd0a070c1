//! # Entity Mutator Seam
//!
//! The engine decides WHETHER an action applies; the [`EntityMutator`]
//! decides HOW. Kind-specific schema validation (order totals, stock
//! arithmetic, payment amounts) lives behind this trait so the sync
//! envelope stays entity-agnostic.
//!
//! [`StoreMutator`] is the built-in implementation: straight persistence
//! into the entity store with no domain rules. Deployments that enforce
//! business invariants substitute their own implementation and reject
//! writes with [`MutationError::Domain`]; those surface per-action as
//! `failed` outcomes without aborting the batch.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use orderly_core::{ActionKind, DataMap, EntityKind, EntitySnapshot, ValidatedAction};
use orderly_db::{DbError, EntityRepository};

/// Why a mutation could not be applied.
#[derive(Debug, Error)]
pub enum MutationError {
    /// The entity schema rejected the write (e.g. insufficient stock).
    /// Recorded per-action as `failed`; the batch continues.
    #[error("{0}")]
    Domain(String),

    /// Storage failed. Aborts the request; the client retries the batch.
    #[error(transparent)]
    Storage(#[from] DbError),
}

/// Applies conflict-free mutations to entity state.
#[async_trait]
pub trait EntityMutator: Send + Sync + std::fmt::Debug {
    /// Applies a validated, conflict-free action on top of `current`
    /// (the live snapshot, `None` when the entity is missing or
    /// soft-deleted) and returns the stored state.
    async fn apply(
        &self,
        restaurant_id: &str,
        action: &ValidatedAction,
        current: Option<&EntitySnapshot>,
        now: DateTime<Utc>,
    ) -> Result<EntitySnapshot, MutationError>;

    /// Writes operator-resolved state during conflict resolution,
    /// replacing data and version wholesale.
    async fn overwrite(
        &self,
        restaurant_id: &str,
        kind: EntityKind,
        entity_id: &str,
        data: DataMap,
        version: i64,
        now: DateTime<Utc>,
    ) -> Result<EntitySnapshot, MutationError>;
}

// =============================================================================
// Store Mutator
// =============================================================================

/// The built-in mutator: persistence only, no domain rules.
///
/// ## Rules
/// - create writes the client payload at the client's version
/// - update shallow-merges the client payload over current server data,
///   leaving fields the client never sent untouched
/// - delete soft-deletes, keeping the row so the feed broadcasts it
/// - the new version is `max(server + 1, client)`, so versions stay
///   monotonic whether the client is behind or ahead of the server
#[derive(Debug, Clone)]
pub struct StoreMutator {
    entities: EntityRepository,
}

impl StoreMutator {
    /// Creates a mutator over the entity store.
    pub fn new(entities: EntityRepository) -> Self {
        StoreMutator { entities }
    }

    fn next_version(action: &ValidatedAction, current: Option<&EntitySnapshot>) -> i64 {
        match current {
            Some(server) => (server.version + 1).max(action.version),
            None => action.version,
        }
    }
}

#[async_trait]
impl EntityMutator for StoreMutator {
    async fn apply(
        &self,
        restaurant_id: &str,
        action: &ValidatedAction,
        current: Option<&EntitySnapshot>,
        now: DateTime<Utc>,
    ) -> Result<EntitySnapshot, MutationError> {
        let version = Self::next_version(action, current);

        let snapshot = match action.action {
            ActionKind::Create => EntitySnapshot {
                entity_type: action.entity_type,
                entity_id: action.entity_id.clone(),
                restaurant_id: restaurant_id.to_string(),
                data: action.data.clone(),
                version,
                deleted: false,
                updated_at: now,
            },

            ActionKind::Update => {
                // Partial payloads are legal; untouched fields survive.
                let mut data = current.map(|c| c.data.clone()).unwrap_or_default();
                for (key, value) in &action.data {
                    data.insert(key.clone(), value.clone());
                }
                EntitySnapshot {
                    entity_type: action.entity_type,
                    entity_id: action.entity_id.clone(),
                    restaurant_id: restaurant_id.to_string(),
                    data,
                    version,
                    deleted: false,
                    updated_at: now,
                }
            }

            ActionKind::Delete => EntitySnapshot {
                entity_type: action.entity_type,
                entity_id: action.entity_id.clone(),
                restaurant_id: restaurant_id.to_string(),
                data: current.map(|c| c.data.clone()).unwrap_or_default(),
                version,
                deleted: true,
                updated_at: now,
            },
        };

        self.entities.put(&snapshot).await?;
        Ok(snapshot)
    }

    async fn overwrite(
        &self,
        restaurant_id: &str,
        kind: EntityKind,
        entity_id: &str,
        data: DataMap,
        version: i64,
        now: DateTime<Utc>,
    ) -> Result<EntitySnapshot, MutationError> {
        let snapshot = EntitySnapshot {
            entity_type: kind,
            entity_id: entity_id.to_string(),
            restaurant_id: restaurant_id.to_string(),
            data,
            version,
            deleted: false,
            updated_at: now,
        };

        self.entities.put(&snapshot).await?;
        Ok(snapshot)
    }
}
