//! # Conflict Store
//!
//! Durable registry of unresolved conflicts, indexed by id, by entity and
//! by restaurant. Enforces the one-live-conflict-per-entity rule: a second
//! device racing onto an already-conflicted entity appends its proposal to
//! the existing record instead of creating a duplicate.
//!
//! Callers must hold the entity lock across `register` and `remove` so
//! detection-and-registration stays atomic (see `locks`).

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::SyncResult;
use orderly_core::{
    ClientProposal, Conflict, ConflictType, EntityKind, EntitySnapshot, ValidatedAction,
};
use orderly_db::ConflictRepository;

/// Conflict registry over durable storage.
#[derive(Debug, Clone)]
pub struct ConflictStore {
    conflicts: ConflictRepository,
}

impl ConflictStore {
    /// Creates a store over the conflict repository.
    pub fn new(conflicts: ConflictRepository) -> Self {
        ConflictStore { conflicts }
    }

    /// Registers a detected conflict, or appends this device's proposal to
    /// the live conflict already on the entity. Returns the conflict id.
    ///
    /// ## Arguments
    /// * `sync_record_id` - Journal row of the action that hit the conflict
    /// * `server` - Live server snapshot at detection time, if any
    #[allow(clippy::too_many_arguments)]
    pub async fn register(
        &self,
        restaurant_id: &str,
        device_id: &str,
        sync_record_id: &str,
        action: &ValidatedAction,
        conflict_type: ConflictType,
        fields: Vec<String>,
        server: Option<&EntitySnapshot>,
        now: DateTime<Utc>,
    ) -> SyncResult<String> {
        let proposal = ClientProposal {
            device_id: device_id.to_string(),
            data: action.data.clone(),
            client_timestamp: action.client_timestamp,
            received_at: now,
        };

        if let Some(mut existing) = self
            .conflicts
            .find_by_entity(restaurant_id, action.entity_type, &action.entity_id)
            .await?
        {
            existing.client_proposals.push(proposal);
            existing.merge_fields(&fields);
            self.conflicts
                .update_proposals(&existing.id, &existing.client_proposals, &existing.conflict_fields)
                .await?;

            debug!(
                conflict_id = %existing.id,
                device_id = %device_id,
                proposals = existing.client_proposals.len(),
                "Appended proposal to existing conflict"
            );
            return Ok(existing.id);
        }

        let conflict = Conflict {
            id: Uuid::new_v4().to_string(),
            sync_record_id: sync_record_id.to_string(),
            restaurant_id: restaurant_id.to_string(),
            entity_type: action.entity_type,
            entity_id: action.entity_id.clone(),
            conflict_type,
            conflict_fields: fields,
            client_proposals: vec![proposal],
            server_data: server.map(|s| s.data.clone()).unwrap_or_default(),
            server_version: server.map(|s| s.version).unwrap_or(0),
            detected_at: now,
        };

        self.conflicts.insert(&conflict).await?;

        info!(
            conflict_id = %conflict.id,
            entity_type = %conflict.entity_type,
            entity_id = %conflict.entity_id,
            conflict_type = %conflict.conflict_type,
            fields = ?conflict.conflict_fields,
            "Conflict recorded"
        );
        Ok(conflict.id)
    }

    /// Fetches a conflict scoped to its restaurant.
    pub async fn get(&self, restaurant_id: &str, conflict_id: &str) -> SyncResult<Option<Conflict>> {
        let conflict = self.conflicts.get(conflict_id).await?;
        Ok(conflict.filter(|c| c.restaurant_id == restaurant_id))
    }

    /// The live conflict on an entity, if any.
    pub async fn find_by_entity(
        &self,
        restaurant_id: &str,
        kind: EntityKind,
        entity_id: &str,
    ) -> SyncResult<Option<Conflict>> {
        Ok(self
            .conflicts
            .find_by_entity(restaurant_id, kind, entity_id)
            .await?)
    }

    /// Lists a restaurant's conflicts, oldest first (FIFO resolution order).
    pub async fn list(
        &self,
        restaurant_id: &str,
        limit: i64,
        offset: i64,
    ) -> SyncResult<Vec<Conflict>> {
        Ok(self.conflicts.list(restaurant_id, limit, offset).await?)
    }

    /// Removes a resolved or dismissed conflict.
    pub async fn remove(&self, conflict_id: &str) -> SyncResult<bool> {
        Ok(self.conflicts.remove(conflict_id).await?)
    }

    /// Live conflict count for a restaurant.
    pub async fn count(&self, restaurant_id: &str) -> SyncResult<i64> {
        Ok(self.conflicts.count(restaurant_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use orderly_core::{ActionKind, DataMap};
    use orderly_db::{Database, DbConfig};
    use serde_json::json;

    async fn test_store() -> (Database, ConflictStore) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let store = ConflictStore::new(db.conflicts());
        (db, store)
    }

    fn stale_update(entity_id: &str, price: i64, ts_secs: i64) -> ValidatedAction {
        let mut data = DataMap::new();
        data.insert("price".into(), json!(price));
        ValidatedAction {
            id: Uuid::new_v4().to_string(),
            entity_type: EntityKind::Product,
            entity_id: entity_id.to_string(),
            action: ActionKind::Update,
            data,
            client_timestamp: Utc.timestamp_opt(ts_secs, 0).unwrap(),
            version: 2,
        }
    }

    #[tokio::test]
    async fn test_register_then_append() {
        let (_db, store) = test_store().await;
        let now = Utc.timestamp_opt(5000, 0).unwrap();

        let first = store
            .register(
                "rest-1",
                "dev-a",
                "rec-1",
                &stale_update("p-1", 1100, 1000),
                ConflictType::TimestampConflict,
                vec!["price".into()],
                None,
                now,
            )
            .await
            .unwrap();

        let second = store
            .register(
                "rest-1",
                "dev-b",
                "rec-2",
                &stale_update("p-1", 1300, 1500),
                ConflictType::TimestampConflict,
                vec!["price".into(), "stock_quantity".into()],
                None,
                now,
            )
            .await
            .unwrap();

        // Same conflict, two proposals, merged field set.
        assert_eq!(first, second);
        let conflict = store.get("rest-1", &first).await.unwrap().unwrap();
        assert_eq!(conflict.client_proposals.len(), 2);
        assert_eq!(conflict.conflict_fields, vec!["price", "stock_quantity"]);
        assert_eq!(store.count("rest-1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_get_is_tenant_scoped() {
        let (_db, store) = test_store().await;
        let now = Utc.timestamp_opt(5000, 0).unwrap();

        let id = store
            .register(
                "rest-1",
                "dev-a",
                "rec-1",
                &stale_update("p-1", 1100, 1000),
                ConflictType::TimestampConflict,
                vec!["price".into()],
                None,
                now,
            )
            .await
            .unwrap();

        assert!(store.get("rest-1", &id).await.unwrap().is_some());
        assert!(store.get("rest-2", &id).await.unwrap().is_none());
    }
}
