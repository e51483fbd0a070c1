//! # Conflict Repository
//!
//! Storage for live conflicts. One row per conflicted entity; resolution
//! deletes the row, it is never archived here.
//!
//! `conflict_fields`, `client_proposals` and `server_data` are stored as
//! JSON text columns and decoded through serde, so the row shape stays
//! stable as the proposal list grows.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::decode_enum;
use orderly_core::{ClientProposal, Conflict, DataMap, EntityKind};

#[derive(sqlx::FromRow)]
struct ConflictRow {
    id: String,
    sync_record_id: String,
    restaurant_id: String,
    entity_type: String,
    entity_id: String,
    conflict_type: String,
    conflict_fields: String,
    client_proposals: String,
    server_data: String,
    server_version: i64,
    detected_at: DateTime<Utc>,
}

impl ConflictRow {
    fn into_conflict(self) -> DbResult<Conflict> {
        let conflict_fields: Vec<String> = serde_json::from_str(&self.conflict_fields)
            .map_err(|e| DbError::decode(format!("conflicts.conflict_fields: {e}")))?;
        let client_proposals: Vec<ClientProposal> = serde_json::from_str(&self.client_proposals)
            .map_err(|e| DbError::decode(format!("conflicts.client_proposals: {e}")))?;
        let server_data: DataMap = serde_json::from_str(&self.server_data)
            .map_err(|e| DbError::decode(format!("conflicts.server_data: {e}")))?;

        Ok(Conflict {
            id: self.id,
            sync_record_id: self.sync_record_id,
            restaurant_id: self.restaurant_id,
            entity_type: decode_enum("entity_type", &self.entity_type)?,
            entity_id: self.entity_id,
            conflict_type: decode_enum("conflict_type", &self.conflict_type)?,
            conflict_fields,
            client_proposals,
            server_data,
            server_version: self.server_version,
            detected_at: self.detected_at,
        })
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, sync_record_id, restaurant_id, entity_type, entity_id,
           conflict_type, conflict_fields, client_proposals, server_data,
           server_version, detected_at
    FROM conflicts
"#;

/// Repository for conflict store operations.
#[derive(Debug, Clone)]
pub struct ConflictRepository {
    pool: SqlitePool,
}

impl ConflictRepository {
    /// Creates a new ConflictRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ConflictRepository { pool }
    }

    /// Inserts a freshly detected conflict.
    ///
    /// The `UNIQUE (restaurant_id, entity_type, entity_id)` constraint
    /// enforces the one-conflict-per-entity rule; a violation means a
    /// concurrent insert won, and the caller should reload and append
    /// instead.
    pub async fn insert(&self, conflict: &Conflict) -> DbResult<()> {
        debug!(
            conflict_id = %conflict.id,
            entity_type = %conflict.entity_type,
            entity_id = %conflict.entity_id,
            conflict_type = %conflict.conflict_type,
            "Recording conflict"
        );

        sqlx::query(
            r#"
            INSERT INTO conflicts (
                id, sync_record_id, restaurant_id, entity_type, entity_id,
                conflict_type, conflict_fields, client_proposals, server_data,
                server_version, detected_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&conflict.id)
        .bind(&conflict.sync_record_id)
        .bind(&conflict.restaurant_id)
        .bind(conflict.entity_type.as_str())
        .bind(&conflict.entity_id)
        .bind(conflict.conflict_type.as_str())
        .bind(serde_json::to_string(&conflict.conflict_fields)?)
        .bind(serde_json::to_string(&conflict.client_proposals)?)
        .bind(serde_json::to_string(&conflict.server_data)?)
        .bind(conflict.server_version)
        .bind(conflict.detected_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fetches a conflict by id.
    pub async fn get(&self, id: &str) -> DbResult<Option<Conflict>> {
        let row: Option<ConflictRow> =
            sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(ConflictRow::into_conflict).transpose()
    }

    /// Fetches the live conflict on an entity, if any.
    pub async fn find_by_entity(
        &self,
        restaurant_id: &str,
        kind: EntityKind,
        entity_id: &str,
    ) -> DbResult<Option<Conflict>> {
        let row: Option<ConflictRow> = sqlx::query_as(&format!(
            "{SELECT_COLUMNS} WHERE restaurant_id = ? AND entity_type = ? AND entity_id = ?"
        ))
        .bind(restaurant_id)
        .bind(kind.as_str())
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ConflictRow::into_conflict).transpose()
    }

    /// Rewrites a conflict's proposal list and field set after an append.
    pub async fn update_proposals(
        &self,
        id: &str,
        proposals: &[ClientProposal],
        fields: &[String],
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE conflicts
            SET client_proposals = ?, conflict_fields = ?
            WHERE id = ?
            "#,
        )
        .bind(serde_json::to_string(proposals)?)
        .bind(serde_json::to_string(fields)?)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("conflict", id));
        }

        Ok(())
    }

    /// Lists a restaurant's live conflicts, oldest first.
    pub async fn list(
        &self,
        restaurant_id: &str,
        limit: i64,
        offset: i64,
    ) -> DbResult<Vec<Conflict>> {
        let rows: Vec<ConflictRow> = sqlx::query_as(&format!(
            r#"
            {SELECT_COLUMNS}
            WHERE restaurant_id = ?
            ORDER BY detected_at ASC, id ASC
            LIMIT ? OFFSET ?
            "#
        ))
        .bind(restaurant_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ConflictRow::into_conflict).collect()
    }

    /// Deletes a resolved conflict. Returns `false` when it was already gone.
    pub async fn remove(&self, id: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM conflicts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Counts a restaurant's live conflicts.
    pub async fn count(&self, restaurant_id: &str) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM conflicts WHERE restaurant_id = ?")
                .bind(restaurant_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::TimeZone;
    use orderly_core::ConflictType;
    use serde_json::json;
    use uuid::Uuid;

    async fn test_repo() -> (Database, ConflictRepository) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.conflicts();
        (db, repo)
    }

    fn proposal(device: &str, secs: i64) -> ClientProposal {
        let mut data = DataMap::new();
        data.insert("price".into(), json!(1100));
        ClientProposal {
            device_id: device.to_string(),
            data,
            client_timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
            received_at: Utc.timestamp_opt(secs + 1, 0).unwrap(),
        }
    }

    fn conflict(entity_id: &str, secs: i64) -> Conflict {
        let mut server_data = DataMap::new();
        server_data.insert("price".into(), json!(1250));

        Conflict {
            id: Uuid::new_v4().to_string(),
            sync_record_id: Uuid::new_v4().to_string(),
            restaurant_id: "rest-1".into(),
            entity_type: EntityKind::Product,
            entity_id: entity_id.to_string(),
            conflict_type: ConflictType::TimestampConflict,
            conflict_fields: vec!["price".into()],
            client_proposals: vec![proposal("dev-a", secs)],
            server_data,
            server_version: 5,
            detected_at: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_get_roundtrip() {
        let (_db, repo) = test_repo().await;

        let c = conflict("p-1", 1000);
        repo.insert(&c).await.unwrap();

        let loaded = repo.get(&c.id).await.unwrap().unwrap();
        assert_eq!(loaded, c);

        assert!(repo.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_one_conflict_per_entity() {
        let (_db, repo) = test_repo().await;

        repo.insert(&conflict("p-1", 1000)).await.unwrap();

        let err = repo.insert(&conflict("p-1", 2000)).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_find_by_entity() {
        let (_db, repo) = test_repo().await;

        let c = conflict("p-1", 1000);
        repo.insert(&c).await.unwrap();

        let found = repo
            .find_by_entity("rest-1", EntityKind::Product, "p-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, c.id);

        assert!(repo
            .find_by_entity("rest-1", EntityKind::Order, "p-1")
            .await
            .unwrap()
            .is_none());
        assert!(repo
            .find_by_entity("rest-2", EntityKind::Product, "p-1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_one_conflict_per_entity_is_tenant_scoped() {
        let (_db, repo) = test_repo().await;

        repo.insert(&conflict("p-1", 1000)).await.unwrap();

        // A different restaurant may hold a conflict on the same entity id.
        let mut other = conflict("p-1", 2000);
        other.restaurant_id = "rest-2".into();
        repo.insert(&other).await.unwrap();

        assert_eq!(repo.count("rest-1").await.unwrap(), 1);
        assert_eq!(repo.count("rest-2").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_proposals_appends() {
        let (_db, repo) = test_repo().await;

        let mut c = conflict("p-1", 1000);
        repo.insert(&c).await.unwrap();

        c.client_proposals.push(proposal("dev-b", 1500));
        c.merge_fields(&["stock_quantity".to_string()]);
        repo.update_proposals(&c.id, &c.client_proposals, &c.conflict_fields)
            .await
            .unwrap();

        let loaded = repo.get(&c.id).await.unwrap().unwrap();
        assert_eq!(loaded.client_proposals.len(), 2);
        assert_eq!(loaded.conflict_fields, vec!["price", "stock_quantity"]);
    }

    #[tokio::test]
    async fn test_list_oldest_first_with_paging() {
        let (_db, repo) = test_repo().await;

        repo.insert(&conflict("p-2", 2000)).await.unwrap();
        repo.insert(&conflict("p-1", 1000)).await.unwrap();
        repo.insert(&conflict("p-3", 3000)).await.unwrap();

        let page = repo.list("rest-1", 2, 0).await.unwrap();
        let ids: Vec<&str> = page.iter().map(|c| c.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["p-1", "p-2"]);

        let rest = repo.list("rest-1", 2, 2).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].entity_id, "p-3");

        assert_eq!(repo.count("rest-1").await.unwrap(), 3);
        assert!(repo.list("rest-2", 10, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove() {
        let (_db, repo) = test_repo().await;

        let c = conflict("p-1", 1000);
        repo.insert(&c).await.unwrap();

        assert!(repo.remove(&c.id).await.unwrap());
        assert!(!repo.remove(&c.id).await.unwrap());
        assert!(repo.get(&c.id).await.unwrap().is_none());
    }
}
