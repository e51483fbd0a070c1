//! # Change Feed Provider
//!
//! Incremental pull interface: everything that changed since a device's
//! last checkpoint, grouped by entity kind.
//!
//! ## At-Least-Once Delivery
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Watermark Protocol                                 │
//! │                                                                         │
//! │  sync_timestamp is captured BEFORE the queries run. Writes that land    │
//! │  while the queries execute can appear in this response AND in the       │
//! │  next one (the client applies idempotently); writes can never fall      │
//! │  into the gap between a response and its watermark.                     │
//! │                                                                         │
//! │  device:  pull(since = T0) ──► {sync_timestamp: T1, changes...}         │
//! │           pull(since = T1) ──► {sync_timestamp: T2, changes...}         │
//! │                                                                         │
//! │  Duplicates across the T1 boundary: acceptable.                         │
//! │  Dropped changes: never.                                                │
//! │                                                                         │
//! │  Truncation consumes the limit kind by kind in priority order           │
//! │  (orders, payments, products, customers), each kind oldest first,       │
//! │  so time-critical records always fit in a small page.                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::SyncResult;
use orderly_core::{ChangeRecord, EntityKind};
use orderly_db::EntityRepository;

/// One page of the change feed.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeSet {
    /// Watermark for the NEXT pull. Pass back verbatim as `since`.
    pub sync_timestamp: DateTime<Utc>,

    /// Changes grouped by kind. BTreeMap iterates in `EntityKind` order,
    /// which is the feed priority order.
    pub changes: BTreeMap<EntityKind, Vec<ChangeRecord>>,

    /// Changes delivered in this page.
    pub total_changes: usize,

    /// Changes available across all requested kinds, delivered or not.
    pub total_available: i64,

    /// True when `total_available > total_changes`; pull again.
    pub truncated: bool,
}

/// Serves the incremental change feed. Read-only; no locking.
#[derive(Debug, Clone)]
pub struct ChangeFeedProvider {
    entities: EntityRepository,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl ChangeFeedProvider {
    /// Wires a provider over the entity store.
    pub fn new(entities: EntityRepository, clock: Arc<dyn Clock>, config: EngineConfig) -> Self {
        ChangeFeedProvider {
            entities,
            clock,
            config,
        }
    }

    /// Computes entities changed since `since`.
    ///
    /// ## Arguments
    /// * `since` - Watermark from the previous pull, inclusive; `None` is a
    ///   full resync
    /// * `kinds` - Kinds to include; `None` means all
    /// * `limit` - Page size; clamped into the configured bounds
    pub async fn download_changes(
        &self,
        restaurant_id: &str,
        since: Option<DateTime<Utc>>,
        kinds: Option<&[EntityKind]>,
        limit: Option<usize>,
    ) -> SyncResult<ChangeSet> {
        let limit = self.config.clamp_feed_limit(limit);

        // Captured before any query so concurrent writes repeat on the next
        // pull instead of falling into a gap.
        let sync_timestamp = self.clock.now();

        // Deduplicate and order the requested kinds by feed priority.
        let requested: Vec<EntityKind> = match kinds {
            None => EntityKind::ALL.to_vec(),
            Some(kinds) => {
                let mut sorted: Vec<EntityKind> = kinds.to_vec();
                sorted.sort();
                sorted.dedup();
                sorted
            }
        };

        let mut changes: BTreeMap<EntityKind, Vec<ChangeRecord>> = BTreeMap::new();
        let mut delivered = 0usize;
        let mut total_available = 0i64;

        for kind in requested {
            total_available += self
                .entities
                .count_changed_since(restaurant_id, kind, since)
                .await?;

            let remaining = limit - delivered;
            if remaining == 0 {
                continue;
            }

            let records = self
                .entities
                .changed_since(restaurant_id, kind, since, remaining as i64)
                .await?;
            if !records.is_empty() {
                delivered += records.len();
                changes.insert(kind, records);
            }
        }

        let truncated = total_available > delivered as i64;
        debug!(
            restaurant_id = %restaurant_id,
            since = ?since,
            delivered,
            total_available,
            truncated,
            "Change feed pull"
        );

        Ok(ChangeSet {
            sync_timestamp,
            changes,
            total_changes: delivered,
            total_available,
            truncated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::TimeZone;
    use orderly_core::{ActionKind, DataMap, EntitySnapshot};
    use orderly_db::{Database, DbConfig};
    use serde_json::json;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    async fn fixture() -> (Database, ChangeFeedProvider, Arc<FixedClock>) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let clock = Arc::new(FixedClock::at(t(10_000)));
        let provider =
            ChangeFeedProvider::new(db.entities(), clock.clone(), EngineConfig::default());
        (db, provider, clock)
    }

    async fn seed(db: &Database, kind: EntityKind, id: &str, secs: i64) {
        let mut data = DataMap::new();
        data.insert("v".into(), json!(secs));
        db.entities()
            .put(&EntitySnapshot {
                entity_type: kind,
                entity_id: id.to_string(),
                restaurant_id: "rest-1".into(),
                data,
                version: 1,
                deleted: false,
                updated_at: t(secs),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_full_resync_groups_by_kind() {
        let (db, provider, _clock) = fixture().await;
        seed(&db, EntityKind::Product, "p-1", 1000).await;
        seed(&db, EntityKind::Order, "o-1", 2000).await;
        seed(&db, EntityKind::Order, "o-2", 3000).await;

        let set = provider
            .download_changes("rest-1", None, None, None)
            .await
            .unwrap();

        assert_eq!(set.total_changes, 3);
        assert_eq!(set.total_available, 3);
        assert!(!set.truncated);
        assert_eq!(set.changes[&EntityKind::Order].len(), 2);
        assert_eq!(set.changes[&EntityKind::Product].len(), 1);

        // Within a kind, oldest first.
        let orders = &set.changes[&EntityKind::Order];
        assert_eq!(orders[0].entity_id, "o-1");
        assert_eq!(orders[1].entity_id, "o-2");
    }

    #[tokio::test]
    async fn test_truncation_spends_limit_in_priority_order() {
        let (db, provider, _clock) = fixture().await;
        // Three changes across two kinds; products are lower priority.
        seed(&db, EntityKind::Product, "p-1", 1000).await;
        seed(&db, EntityKind::Product, "p-2", 1500).await;
        seed(&db, EntityKind::Order, "o-1", 2000).await;

        let set = provider
            .download_changes("rest-1", None, None, Some(1))
            .await
            .unwrap();

        // The single slot goes to the order, not the older products.
        assert_eq!(set.total_changes, 1);
        assert_eq!(set.total_available, 3);
        assert!(set.truncated);
        assert_eq!(set.changes.len(), 1);
        assert_eq!(set.changes[&EntityKind::Order][0].entity_id, "o-1");
    }

    #[tokio::test]
    async fn test_kind_filter() {
        let (db, provider, _clock) = fixture().await;
        seed(&db, EntityKind::Product, "p-1", 1000).await;
        seed(&db, EntityKind::Order, "o-1", 2000).await;

        let set = provider
            .download_changes("rest-1", None, Some(&[EntityKind::Product]), None)
            .await
            .unwrap();

        assert_eq!(set.total_changes, 1);
        assert_eq!(set.total_available, 1);
        assert!(set.changes.contains_key(&EntityKind::Product));
        assert!(!set.changes.contains_key(&EntityKind::Order));
    }

    #[tokio::test]
    async fn test_watermark_never_loses_changes() {
        let (db, provider, clock) = fixture().await;
        seed(&db, EntityKind::Order, "o-1", 9_000).await;

        let first = provider
            .download_changes("rest-1", None, None, None)
            .await
            .unwrap();
        assert_eq!(first.total_changes, 1);

        // A write lands between the two pulls, at the current server time.
        clock.advance(chrono::Duration::seconds(60));
        seed(&db, EntityKind::Order, "o-2", 10_030).await;

        let second = provider
            .download_changes("rest-1", Some(first.sync_timestamp), None, None)
            .await
            .unwrap();

        let delivered: Vec<&str> = second.changes[&EntityKind::Order]
            .iter()
            .map(|c| c.entity_id.as_str())
            .collect();
        assert!(delivered.contains(&"o-2"));
    }

    #[tokio::test]
    async fn test_write_stamped_at_watermark_is_not_lost() {
        let (db, provider, _clock) = fixture().await;
        seed(&db, EntityKind::Order, "o-1", 9_000).await;

        let first = provider
            .download_changes("rest-1", None, None, None)
            .await
            .unwrap();

        // A concurrent write commits after the pull but carries exactly the
        // watermark timestamp. The next pull must still deliver it.
        seed(&db, EntityKind::Order, "o-2", 10_000).await;
        assert_eq!(first.sync_timestamp, t(10_000));

        let second = provider
            .download_changes("rest-1", Some(first.sync_timestamp), None, None)
            .await
            .unwrap();
        let delivered: Vec<&str> = second.changes[&EntityKind::Order]
            .iter()
            .map(|c| c.entity_id.as_str())
            .collect();
        assert!(delivered.contains(&"o-2"));
    }

    #[tokio::test]
    async fn test_soft_deleted_entities_appear_as_deletes() {
        let (db, provider, _clock) = fixture().await;
        seed(&db, EntityKind::Product, "p-1", 1000).await;
        db.entities()
            .mark_deleted("rest-1", EntityKind::Product, "p-1", 2, t(2000))
            .await
            .unwrap();

        let set = provider
            .download_changes("rest-1", None, None, None)
            .await
            .unwrap();

        let change = &set.changes[&EntityKind::Product][0];
        assert_eq!(change.action, ActionKind::Delete);
        assert_eq!(change.version, 2);
    }

    #[tokio::test]
    async fn test_empty_feed() {
        let (_db, provider, clock) = fixture().await;

        let set = provider
            .download_changes("rest-1", None, None, None)
            .await
            .unwrap();

        assert_eq!(set.total_changes, 0);
        assert_eq!(set.total_available, 0);
        assert!(!set.truncated);
        assert!(set.changes.is_empty());
        assert_eq!(set.sync_timestamp, clock.now());
    }
}
