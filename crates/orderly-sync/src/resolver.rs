//! # Conflict Resolver
//!
//! Applies a resolution strategy to a stored conflict, mutates the entity
//! accordingly, settles the journal rows that fed the conflict and removes
//! it from the store.
//!
//! ## Strategy Semantics
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  server_wins  entity data/version untouched; feed timestamp bumped      │
//! │               so every device re-pulls the authoritative state          │
//! │                                                                         │
//! │  client_wins  most recent proposal (by client_timestamp, first          │
//! │               received breaks ties) merged over server data;            │
//! │               version = server + 1                                      │
//! │                                                                         │
//! │  merge        operator payload must cover every disputed field;         │
//! │               merged over server data; version = server + 1             │
//! │               (never the stale client version)                          │
//! │                                                                         │
//! │  manual       conflict cleared, entity untouched; feed timestamp        │
//! │               bumped so devices drop their local pending marker         │
//! │                                                                         │
//! │  Every strategy ends the same way: conflict removed, conflicted         │
//! │  journal rows moved to completed, one ChangeRecord emitted.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::clock::Clock;
use crate::error::{SyncError, SyncResult};
use crate::locks::EntityLocks;
use crate::mutator::{EntityMutator, MutationError};
use crate::store::ConflictStore;
use orderly_core::{
    ChangeRecord, Conflict, ConflictType, DataMap, EntityKind, ResolutionStrategy,
};
use orderly_db::{DbError, EntityRepository, SyncRecordRepository};

/// What a resolution did.
#[derive(Debug, Clone, Serialize)]
pub struct ResolutionOutcome {
    pub conflict_id: String,
    pub strategy: ResolutionStrategy,
    pub entity_type: EntityKind,
    pub entity_id: String,
    /// Post-resolution entity version.
    pub new_version: i64,
    /// Conflicted journal rows moved to completed.
    pub records_settled: u64,
    /// The authoritative post-resolution state, as the feed will carry it.
    /// Absent only when the conflicted entity never had a server row.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change: Option<ChangeRecord>,
}

/// Resolves stored conflicts under operator-selected strategies.
#[derive(Debug, Clone)]
pub struct ConflictResolver {
    entities: EntityRepository,
    journal: SyncRecordRepository,
    store: ConflictStore,
    locks: EntityLocks,
    mutator: Arc<dyn EntityMutator>,
    clock: Arc<dyn Clock>,
}

impl ConflictResolver {
    /// Wires a resolver over its collaborators.
    pub fn new(
        entities: EntityRepository,
        journal: SyncRecordRepository,
        store: ConflictStore,
        locks: EntityLocks,
        mutator: Arc<dyn EntityMutator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        ConflictResolver {
            entities,
            journal,
            store,
            locks,
            mutator,
            clock,
        }
    }

    /// Applies `strategy` to one conflict.
    ///
    /// ## Errors
    /// * [`SyncError::ConflictNotFound`] - unknown id, other restaurant's
    ///   conflict, or a concurrent resolution won the lock first
    /// * [`SyncError::InvalidResolutionStrategy`] - strategy not applicable
    /// * [`SyncError::InvalidMergedData`] - merge payload missing or not
    ///   covering every disputed field
    pub async fn resolve(
        &self,
        restaurant_id: &str,
        conflict_id: &str,
        strategy: ResolutionStrategy,
        merged_data: Option<DataMap>,
    ) -> SyncResult<ResolutionOutcome> {
        // Cheap existence check before taking the entity lock.
        let conflict = self
            .store
            .get(restaurant_id, conflict_id)
            .await?
            .ok_or_else(|| SyncError::ConflictNotFound(conflict_id.to_string()))?;

        let _guard = self
            .locks
            .acquire(conflict.entity_type, &conflict.entity_id)
            .await;

        // Re-read under the lock: a concurrent resolve may have cleared it.
        let conflict = self
            .store
            .get(restaurant_id, conflict_id)
            .await?
            .ok_or_else(|| SyncError::ConflictNotFound(conflict_id.to_string()))?;

        validate_strategy(&conflict, strategy, merged_data.as_ref())?;

        let now = self.clock.now();
        match strategy {
            ResolutionStrategy::ServerWins | ResolutionStrategy::Manual => {
                // Entity untouched; re-broadcast current state so rejected
                // devices converge back to it.
                match self
                    .entities
                    .touch(restaurant_id, conflict.entity_type, &conflict.entity_id, now)
                    .await
                {
                    Ok(()) | Err(DbError::NotFound { .. }) => {}
                    Err(err) => return Err(err.into()),
                }
            }

            ResolutionStrategy::ClientWins => {
                let proposal = conflict.latest_proposal().ok_or_else(|| {
                    SyncError::Internal(format!("conflict {conflict_id} has no proposals"))
                })?;
                self.write_resolution(&conflict, proposal.data.clone(), now)
                    .await?;
            }

            ResolutionStrategy::Merge => {
                // Covered by validate_strategy; unwrap-free fallback anyway.
                let merged = merged_data.unwrap_or_default();
                self.write_resolution(&conflict, merged, now).await?;
            }
        }

        let settled = self
            .journal
            .complete_conflicted(restaurant_id, conflict.entity_type, &conflict.entity_id)
            .await?;
        self.store.remove(conflict_id).await?;

        let after = self
            .entities
            .get(restaurant_id, conflict.entity_type, &conflict.entity_id)
            .await?;
        let change = after.as_ref().map(ChangeRecord::from_snapshot);

        info!(
            conflict_id = %conflict_id,
            strategy = %strategy,
            entity_type = %conflict.entity_type,
            entity_id = %conflict.entity_id,
            records_settled = settled,
            "Conflict resolved"
        );

        Ok(ResolutionOutcome {
            conflict_id: conflict_id.to_string(),
            strategy,
            entity_type: conflict.entity_type,
            entity_id: conflict.entity_id,
            new_version: after.map(|s| s.version).unwrap_or(conflict.server_version),
            records_settled: settled,
            change,
        })
    }

    /// Dismisses a conflict without touching the entity. Equivalent to a
    /// manual resolution; exposed separately for the DELETE endpoint.
    pub async fn dismiss(
        &self,
        restaurant_id: &str,
        conflict_id: &str,
    ) -> SyncResult<ResolutionOutcome> {
        self.resolve(restaurant_id, conflict_id, ResolutionStrategy::Manual, None)
            .await
    }

    /// Merges resolution data over current server state and writes it at
    /// the next server version. Stale client versions never win here.
    async fn write_resolution(
        &self,
        conflict: &Conflict,
        payload: DataMap,
        now: chrono::DateTime<chrono::Utc>,
    ) -> SyncResult<()> {
        let current = self
            .entities
            .get(&conflict.restaurant_id, conflict.entity_type, &conflict.entity_id)
            .await?;

        let (mut data, version) = match &current {
            Some(snapshot) if !snapshot.deleted => {
                (snapshot.data.clone(), snapshot.version + 1)
            }
            Some(snapshot) => (DataMap::new(), snapshot.version + 1),
            None => (DataMap::new(), 1),
        };
        for (key, value) in payload {
            data.insert(key, value);
        }

        self.mutator
            .overwrite(
                &conflict.restaurant_id,
                conflict.entity_type,
                &conflict.entity_id,
                data,
                version,
                now,
            )
            .await
            .map_err(|err| match err {
                MutationError::Domain(reason) => SyncError::Mutation(reason),
                MutationError::Storage(err) => SyncError::Storage(err),
            })?;
        Ok(())
    }
}

/// Strategy applicability and merge-payload shape checks.
fn validate_strategy(
    conflict: &Conflict,
    strategy: ResolutionStrategy,
    merged_data: Option<&DataMap>,
) -> SyncResult<()> {
    // data_mismatch means client and server claim the same version with
    // different data; auto-picking the client side would paper over a bug.
    if conflict.conflict_type == ConflictType::DataMismatch
        && strategy == ResolutionStrategy::ClientWins
    {
        return Err(SyncError::InvalidResolutionStrategy {
            strategy,
            conflict_type: conflict.conflict_type,
            reason: "data_mismatch requires operator review; use merge or manual".into(),
        });
    }

    if strategy == ResolutionStrategy::Merge {
        let merged = merged_data.ok_or_else(|| {
            SyncError::InvalidMergedData("merge resolution requires merged_data".into())
        })?;
        if merged.is_empty() {
            return Err(SyncError::InvalidMergedData(
                "merged_data must not be empty".into(),
            ));
        }
        let missing: Vec<&str> = conflict
            .conflict_fields
            .iter()
            .filter(|field| !merged.contains_key(*field))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(SyncError::InvalidMergedData(format!(
                "merged_data must cover every disputed field; missing: {}",
                missing.join(", ")
            )));
        }
    }

    Ok(())
}
