//! # Sync Engine Facade
//!
//! Bundles the applier, resolver, feed provider and status tracker behind
//! one constructor so the HTTP layer wires a single object.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::applier::{BatchApplier, BatchOutcome};
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::SyncResult;
use crate::feed::{ChangeFeedProvider, ChangeSet};
use crate::locks::EntityLocks;
use crate::mutator::{EntityMutator, StoreMutator};
use crate::resolver::{ConflictResolver, ResolutionOutcome};
use crate::status::{SyncStatusReport, SyncStatusTracker};
use crate::store::ConflictStore;
use orderly_core::{Conflict, DataMap, EntityKind, ResolutionStrategy, SyncAction};
use orderly_db::Database;

/// The offline synchronization engine.
///
/// Cheap to clone; all components share the same pool, lock table and
/// conflict store.
#[derive(Debug, Clone)]
pub struct SyncEngine {
    applier: BatchApplier,
    resolver: ConflictResolver,
    feed: ChangeFeedProvider,
    tracker: SyncStatusTracker,
    store: ConflictStore,
}

impl SyncEngine {
    /// Builds an engine with the built-in store mutator and system clock.
    pub fn new(db: &Database, config: EngineConfig) -> Self {
        Self::with_parts(
            db,
            config,
            Arc::new(StoreMutator::new(db.entities())),
            Arc::new(SystemClock),
        )
    }

    /// Builds an engine with injected collaborators (custom entity schemas,
    /// test clocks).
    pub fn with_parts(
        db: &Database,
        config: EngineConfig,
        mutator: Arc<dyn EntityMutator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let locks = EntityLocks::new();
        let store = ConflictStore::new(db.conflicts());

        let applier = BatchApplier::new(
            db.entities(),
            db.sync_records(),
            store.clone(),
            locks.clone(),
            mutator.clone(),
            clock.clone(),
            config.clone(),
        );
        let resolver = ConflictResolver::new(
            db.entities(),
            db.sync_records(),
            store.clone(),
            locks,
            mutator,
            clock.clone(),
        );
        let feed = ChangeFeedProvider::new(db.entities(), clock, config);
        let tracker = SyncStatusTracker::new(db.sync_records(), store.clone());

        SyncEngine {
            applier,
            resolver,
            feed,
            tracker,
            store,
        }
    }

    /// Applies an uploaded batch of device mutations.
    pub async fn upload_batch(
        &self,
        restaurant_id: &str,
        device_id: &str,
        actions: Vec<SyncAction>,
        force_overwrite: bool,
    ) -> SyncResult<BatchOutcome> {
        self.applier
            .apply_batch(restaurant_id, device_id, actions, force_overwrite)
            .await
    }

    /// Serves an incremental change-feed page.
    pub async fn download_changes(
        &self,
        restaurant_id: &str,
        since: Option<DateTime<Utc>>,
        kinds: Option<&[EntityKind]>,
        limit: Option<usize>,
    ) -> SyncResult<ChangeSet> {
        self.feed
            .download_changes(restaurant_id, since, kinds, limit)
            .await
    }

    /// Resolves a stored conflict under the given strategy.
    pub async fn resolve_conflict(
        &self,
        restaurant_id: &str,
        conflict_id: &str,
        strategy: ResolutionStrategy,
        merged_data: Option<DataMap>,
    ) -> SyncResult<ResolutionOutcome> {
        self.resolver
            .resolve(restaurant_id, conflict_id, strategy, merged_data)
            .await
    }

    /// Dismisses a conflict without touching the entity.
    pub async fn dismiss_conflict(
        &self,
        restaurant_id: &str,
        conflict_id: &str,
    ) -> SyncResult<ResolutionOutcome> {
        self.resolver.dismiss(restaurant_id, conflict_id).await
    }

    /// Lists live conflicts, oldest first.
    pub async fn list_conflicts(
        &self,
        restaurant_id: &str,
        limit: i64,
        offset: i64,
    ) -> SyncResult<Vec<Conflict>> {
        self.store.list(restaurant_id, limit, offset).await
    }

    /// Aggregated sync health.
    pub async fn status(
        &self,
        restaurant_id: &str,
        device_id: Option<&str>,
    ) -> SyncResult<SyncStatusReport> {
        self.tracker.get_status(restaurant_id, device_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::status::SyncHealth;
    use chrono::TimeZone;
    use orderly_core::{ActionKind, DataMap};
    use orderly_db::DbConfig;
    use serde_json::json;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn map(pairs: &[(&str, serde_json::Value)]) -> DataMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn update(id: &str, entity_id: &str, version: i64, data: DataMap) -> SyncAction {
        SyncAction {
            id: Some(id.to_string()),
            entity_type: EntityKind::Product,
            entity_id: entity_id.to_string(),
            action: ActionKind::Update,
            data,
            client_timestamp: t(9_000),
            version,
        }
    }

    async fn fixture() -> (Database, SyncEngine, Arc<FixedClock>) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let clock = Arc::new(FixedClock::at(t(10_000)));
        let engine = SyncEngine::with_parts(
            &db,
            EngineConfig::default(),
            Arc::new(StoreMutator::new(db.entities())),
            clock.clone(),
        );
        (db, engine, clock)
    }

    /// Full offline round trip: a device creates and edits entities, pulls
    /// the feed, a second stale device conflicts, the operator merges, and
    /// both devices converge on the merged state.
    #[tokio::test]
    async fn test_end_to_end_convergence() {
        let (_db, engine, clock) = fixture().await;

        // Device A works offline, then uploads its queue.
        let outcome = engine
            .upload_batch(
                "rest-1",
                "dev-a",
                vec![
                    SyncAction {
                        id: Some("a-1".into()),
                        entity_type: EntityKind::Product,
                        entity_id: "p-1".into(),
                        action: ActionKind::Create,
                        data: map(&[("name", json!("Margherita")), ("price", json!(1250))]),
                        client_timestamp: t(9_000),
                        version: 1,
                    },
                    update("a-2", "p-1", 2, map(&[("price", json!(1400))])),
                    update("a-3", "p-1", 3, map(&[("price", json!(1450))])),
                ],
                false,
            )
            .await
            .unwrap();
        assert_eq!(outcome.successful, 3);

        // Device B pulls and is up to date.
        let feed = engine
            .download_changes("rest-1", None, None, None)
            .await
            .unwrap();
        assert_eq!(feed.total_changes, 1); // one entity, latest state only
        let p1 = &feed.changes[&EntityKind::Product][0];
        assert_eq!(p1.data["price"], json!(1450));
        assert_eq!(p1.version, 3);

        // Device B later uploads a stale edit queued against v1.
        clock.advance(chrono::Duration::seconds(60));
        let outcome = engine
            .upload_batch(
                "rest-1",
                "dev-b",
                vec![update("b-1", "p-1", 2, map(&[("price", json!(1300))]))],
                false,
            )
            .await
            .unwrap();
        assert_eq!(outcome.conflicts, 1);
        let conflict_id = outcome.conflicts_detected[0].conflict_id.clone();

        assert_eq!(
            engine.status("rest-1", None).await.unwrap().sync_health,
            SyncHealth::ConflictsDetected
        );

        // Operator merges.
        let resolution = engine
            .resolve_conflict(
                "rest-1",
                &conflict_id,
                ResolutionStrategy::Merge,
                Some(map(&[("price", json!(1350))])),
            )
            .await
            .unwrap();
        assert_eq!(resolution.new_version, 4);
        assert!(engine.list_conflicts("rest-1", 10, 0).await.unwrap().is_empty());

        // Both devices pull from their last watermark and see the merged state.
        let feed = engine
            .download_changes("rest-1", Some(feed.sync_timestamp), None, None)
            .await
            .unwrap();
        let p1 = &feed.changes[&EntityKind::Product][0];
        assert_eq!(p1.data["price"], json!(1350));
        assert_eq!(p1.version, 4);

        assert_eq!(
            engine.status("rest-1", None).await.unwrap().sync_health,
            SyncHealth::Healthy
        );
    }

    #[tokio::test]
    async fn test_dismiss_then_resolve_is_not_found() {
        let (db, engine, _clock) = fixture().await;

        db.entities()
            .put(&orderly_core::EntitySnapshot {
                entity_type: EntityKind::Product,
                entity_id: "p-1".into(),
                restaurant_id: "rest-1".into(),
                data: map(&[("price", json!(1250))]),
                version: 7,
                deleted: false,
                updated_at: t(5_000),
            })
            .await
            .unwrap();

        let outcome = engine
            .upload_batch(
                "rest-1",
                "dev-a",
                vec![update("a-1", "p-1", 5, map(&[("price", json!(1100))]))],
                false,
            )
            .await
            .unwrap();
        let conflict_id = outcome.conflicts_detected[0].conflict_id.clone();

        engine.dismiss_conflict("rest-1", &conflict_id).await.unwrap();

        let err = engine
            .resolve_conflict(
                "rest-1",
                &conflict_id,
                ResolutionStrategy::ServerWins,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::SyncError::ConflictNotFound(_)));
    }
}
