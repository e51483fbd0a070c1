//! # Entity Repository
//!
//! Latest-state storage for synchronized entities.
//!
//! ## State-Not-Log Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Entity Store Semantics                               │
//! │                                                                         │
//! │  One row per (restaurant_id, entity_type, entity_id). Writes            │
//! │  overwrite in place:                                                    │
//! │    create ──► INSERT row            version = client version            │
//! │    update ──► UPDATE data/version   version = server version + 1        │
//! │    delete ──► UPDATE deleted = 1    row stays (soft delete)             │
//! │                                                                         │
//! │  The change feed is a projection over this table ordered by            │
//! │  updated_at. Because rows are overwritten, a burst of updates to       │
//! │  one entity produces ONE feed entry with the final state.              │
//! │                                                                         │
//! │  Soft-deleted rows stay so the feed can tell other devices to drop     │
//! │  the entity. Detection treats them as missing (see EntitySnapshot).    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::decode_enum;
use orderly_core::{ChangeRecord, DataMap, EntityKind, EntitySnapshot};

/// Raw row shape; enum and JSON columns decode in [`EntityRow::into_snapshot`].
#[derive(sqlx::FromRow)]
struct EntityRow {
    entity_type: String,
    entity_id: String,
    restaurant_id: String,
    data: String,
    version: i64,
    deleted: bool,
    updated_at: DateTime<Utc>,
}

impl EntityRow {
    fn into_snapshot(self) -> DbResult<EntitySnapshot> {
        let data: DataMap = serde_json::from_str(&self.data)
            .map_err(|e| DbError::decode(format!("entities.data: {e}")))?;

        Ok(EntitySnapshot {
            entity_type: decode_enum("entity_type", &self.entity_type)?,
            entity_id: self.entity_id,
            restaurant_id: self.restaurant_id,
            data,
            version: self.version,
            deleted: self.deleted,
            updated_at: self.updated_at,
        })
    }
}

/// Repository for entity state operations.
#[derive(Debug, Clone)]
pub struct EntityRepository {
    pool: SqlitePool,
}

impl EntityRepository {
    /// Creates a new EntityRepository.
    pub fn new(pool: SqlitePool) -> Self {
        EntityRepository { pool }
    }

    /// Fetches the current snapshot of an entity, soft-deleted rows included.
    ///
    /// Callers that want detection semantics should go through
    /// [`EntitySnapshot::live`] on the result.
    pub async fn get(
        &self,
        restaurant_id: &str,
        kind: EntityKind,
        entity_id: &str,
    ) -> DbResult<Option<EntitySnapshot>> {
        let row: Option<EntityRow> = sqlx::query_as(
            r#"
            SELECT entity_type, entity_id, restaurant_id, data, version, deleted, updated_at
            FROM entities
            WHERE restaurant_id = ? AND entity_type = ? AND entity_id = ?
            "#,
        )
        .bind(restaurant_id)
        .bind(kind.as_str())
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(EntityRow::into_snapshot).transpose()
    }

    /// Writes a snapshot, inserting or overwriting the existing row.
    ///
    /// ## Arguments
    /// * `snapshot` - Full desired state; `updated_at` becomes the row's
    ///   feed timestamp
    pub async fn put(&self, snapshot: &EntitySnapshot) -> DbResult<()> {
        debug!(
            entity_type = %snapshot.entity_type,
            entity_id = %snapshot.entity_id,
            version = snapshot.version,
            deleted = snapshot.deleted,
            "Writing entity snapshot"
        );

        let data = serde_json::to_string(&snapshot.data)?;

        sqlx::query(
            r#"
            INSERT INTO entities (
                entity_type, entity_id, restaurant_id, data,
                version, deleted, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (restaurant_id, entity_type, entity_id) DO UPDATE SET
                data = excluded.data,
                version = excluded.version,
                deleted = excluded.deleted,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(snapshot.entity_type.as_str())
        .bind(&snapshot.entity_id)
        .bind(&snapshot.restaurant_id)
        .bind(&data)
        .bind(snapshot.version)
        .bind(snapshot.deleted)
        .bind(snapshot.updated_at)
        .bind(snapshot.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Soft-deletes an entity, keeping its data for the feed's delete entry.
    pub async fn mark_deleted(
        &self,
        restaurant_id: &str,
        kind: EntityKind,
        entity_id: &str,
        version: i64,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        debug!(
            entity_type = %kind,
            entity_id = %entity_id,
            version,
            "Soft-deleting entity"
        );

        let result = sqlx::query(
            r#"
            UPDATE entities
            SET deleted = 1, version = ?, updated_at = ?
            WHERE restaurant_id = ? AND entity_type = ? AND entity_id = ?
            "#,
        )
        .bind(version)
        .bind(now)
        .bind(restaurant_id)
        .bind(kind.as_str())
        .bind(entity_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("entity", entity_id));
        }

        Ok(())
    }

    /// Bumps `updated_at` without changing data or version.
    ///
    /// Used after a server_wins resolution so every device's next feed pull
    /// re-broadcasts the authoritative state.
    pub async fn touch(
        &self,
        restaurant_id: &str,
        kind: EntityKind,
        entity_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE entities
            SET updated_at = ?
            WHERE restaurant_id = ? AND entity_type = ? AND entity_id = ?
            "#,
        )
        .bind(now)
        .bind(restaurant_id)
        .bind(kind.as_str())
        .bind(entity_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("entity", entity_id));
        }

        Ok(())
    }

    /// Lists entities of one kind changed since a watermark, oldest first.
    ///
    /// The bound is inclusive: a row stamped exactly at the watermark is
    /// re-delivered rather than risk slipping between two pulls. The feed
    /// contract is at-least-once, so the duplicate is legal and a drop is
    /// not.
    ///
    /// ## Arguments
    /// * `since` - Inclusive lower bound on `updated_at`; `None` means a
    ///   full snapshot pull
    /// * `limit` - Maximum rows to return
    pub async fn changed_since(
        &self,
        restaurant_id: &str,
        kind: EntityKind,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> DbResult<Vec<ChangeRecord>> {
        let rows: Vec<EntityRow> = sqlx::query_as(
            r#"
            SELECT entity_type, entity_id, restaurant_id, data, version, deleted, updated_at
            FROM entities
            WHERE restaurant_id = ?
              AND entity_type = ?
              AND (? IS NULL OR updated_at >= ?)
            ORDER BY updated_at ASC, entity_id ASC
            LIMIT ?
            "#,
        )
        .bind(restaurant_id)
        .bind(kind.as_str())
        .bind(since)
        .bind(since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| Ok(ChangeRecord::from_snapshot(&row.into_snapshot()?)))
            .collect()
    }

    /// Counts entities of one kind changed since a watermark.
    ///
    /// The feed uses this to report how many changes exist beyond a
    /// truncated response.
    pub async fn count_changed_since(
        &self,
        restaurant_id: &str,
        kind: EntityKind,
        since: Option<DateTime<Utc>>,
    ) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM entities
            WHERE restaurant_id = ?
              AND entity_type = ?
              AND (? IS NULL OR updated_at >= ?)
            "#,
        )
        .bind(restaurant_id)
        .bind(kind.as_str())
        .bind(since)
        .bind(since)
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
    use orderly_core::ActionKind;
    use serde_json::json;

    async fn test_repo() -> (Database, EntityRepository) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.entities();
        (db, repo)
    }

    fn snapshot(id: &str, version: i64, secs: i64) -> EntitySnapshot {
        let mut data = DataMap::new();
        data.insert("name".into(), json!("Margherita"));
        data.insert("price".into(), json!(1250));

        EntitySnapshot {
            entity_type: EntityKind::Product,
            entity_id: id.to_string(),
            restaurant_id: "rest-1".into(),
            data,
            version,
            deleted: false,
            updated_at: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_put_and_get_roundtrip() {
        let (_db, repo) = test_repo().await;

        let snap = snapshot("p-1", 1, 1000);
        repo.put(&snap).await.unwrap();

        let loaded = repo.get("rest-1", EntityKind::Product, "p-1").await.unwrap().unwrap();
        assert_eq!(loaded, snap);

        assert!(repo.get("rest-1", EntityKind::Product, "missing").await.unwrap().is_none());
        assert!(repo.get("rest-1", EntityKind::Order, "p-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites_in_place() {
        let (_db, repo) = test_repo().await;

        repo.put(&snapshot("p-1", 1, 1000)).await.unwrap();

        let mut updated = snapshot("p-1", 2, 2000);
        updated.data.insert("price".into(), json!(1400));
        repo.put(&updated).await.unwrap();

        let loaded = repo.get("rest-1", EntityKind::Product, "p-1").await.unwrap().unwrap();
        assert_eq!(loaded.version, 2);
        assert_eq!(loaded.data["price"], json!(1400));

        // Still one row, one feed entry.
        let changes = repo
            .changed_since("rest-1", EntityKind::Product, None, 100)
            .await
            .unwrap();
        assert_eq!(changes.len(), 1);
    }

    #[tokio::test]
    async fn test_mark_deleted_keeps_row() {
        let (_db, repo) = test_repo().await;

        repo.put(&snapshot("p-1", 1, 1000)).await.unwrap();
        repo.mark_deleted(
            "rest-1",
            EntityKind::Product,
            "p-1",
            2,
            Utc.timestamp_opt(2000, 0).unwrap(),
        )
        .await
        .unwrap();

        let loaded = repo.get("rest-1", EntityKind::Product, "p-1").await.unwrap().unwrap();
        assert!(loaded.deleted);
        assert_eq!(loaded.version, 2);
        assert!(loaded.live().is_none());

        let changes = repo
            .changed_since("rest-1", EntityKind::Product, None, 100)
            .await
            .unwrap();
        assert_eq!(changes[0].action, ActionKind::Delete);
    }

    #[tokio::test]
    async fn test_mark_deleted_missing_entity() {
        let (_db, repo) = test_repo().await;

        let err = repo
            .mark_deleted("rest-1", EntityKind::Product, "ghost", 2, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_changed_since_watermark_is_inclusive() {
        let (_db, repo) = test_repo().await;

        repo.put(&snapshot("p-1", 1, 1000)).await.unwrap();
        repo.put(&snapshot("p-2", 1, 2000)).await.unwrap();
        repo.put(&snapshot("p-3", 1, 3000)).await.unwrap();

        let since = Some(Utc.timestamp_opt(2000, 0).unwrap());
        let changes = repo
            .changed_since("rest-1", EntityKind::Product, since, 100)
            .await
            .unwrap();

        // A row stamped exactly at the watermark repeats (at-least-once);
        // a write committing after the pull but within the same microsecond
        // must not vanish between pages.
        let ids: Vec<&str> = changes.iter().map(|c| c.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["p-2", "p-3"]);

        let count = repo
            .count_changed_since("rest-1", EntityKind::Product, since)
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_changed_since_orders_oldest_first_and_limits() {
        let (_db, repo) = test_repo().await;

        repo.put(&snapshot("p-3", 1, 3000)).await.unwrap();
        repo.put(&snapshot("p-1", 1, 1000)).await.unwrap();
        repo.put(&snapshot("p-2", 1, 2000)).await.unwrap();

        let changes = repo
            .changed_since("rest-1", EntityKind::Product, None, 2)
            .await
            .unwrap();
        let ids: Vec<&str> = changes.iter().map(|c| c.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["p-1", "p-2"]);
    }

    #[tokio::test]
    async fn test_changed_since_scoped_by_restaurant() {
        let (_db, repo) = test_repo().await;

        repo.put(&snapshot("p-1", 1, 1000)).await.unwrap();
        let mut other = snapshot("p-2", 1, 1000);
        other.restaurant_id = "rest-2".into();
        repo.put(&other).await.unwrap();

        let changes = repo
            .changed_since("rest-1", EntityKind::Product, None, 100)
            .await
            .unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].entity_id, "p-1");
    }

    #[tokio::test]
    async fn test_same_entity_id_isolated_per_restaurant() {
        let (_db, repo) = test_repo().await;

        repo.put(&snapshot("p-1", 1, 1000)).await.unwrap();
        let mut other = snapshot("p-1", 4, 1000);
        other.restaurant_id = "rest-2".into();
        other.data.insert("price".into(), json!(900));
        repo.put(&other).await.unwrap();

        // Two rows, one per tenant, each reading its own state.
        let mine = repo.get("rest-1", EntityKind::Product, "p-1").await.unwrap().unwrap();
        assert_eq!(mine.version, 1);
        assert_eq!(mine.data["price"], json!(1250));

        let theirs = repo.get("rest-2", EntityKind::Product, "p-1").await.unwrap().unwrap();
        assert_eq!(theirs.version, 4);
        assert_eq!(theirs.data["price"], json!(900));

        // A tenant-scoped delete leaves the other tenant's row alone.
        repo.mark_deleted("rest-1", EntityKind::Product, "p-1", 2, Utc::now())
            .await
            .unwrap();
        let theirs = repo.get("rest-2", EntityKind::Product, "p-1").await.unwrap().unwrap();
        assert!(!theirs.deleted);

        assert!(repo.get("rest-3", EntityKind::Product, "p-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_touch_moves_feed_timestamp_only() {
        let (_db, repo) = test_repo().await;

        repo.put(&snapshot("p-1", 3, 1000)).await.unwrap();
        repo.touch(
            "rest-1",
            EntityKind::Product,
            "p-1",
            Utc.timestamp_opt(5000, 0).unwrap(),
        )
        .await
        .unwrap();

        let loaded = repo.get("rest-1", EntityKind::Product, "p-1").await.unwrap().unwrap();
        assert_eq!(loaded.version, 3);
        assert_eq!(loaded.updated_at, Utc.timestamp_opt(5000, 0).unwrap());
    }
}
