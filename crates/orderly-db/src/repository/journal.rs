//! # Sync Journal Repository
//!
//! Append-mostly journal of every processed action, one row per action.
//!
//! ## Idempotency Index
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  Replay Detection via the Journal                       │
//! │                                                                         │
//! │  UNIQUE (restaurant_id, action_id)                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  A retried batch carries the same action ids. Before applying an       │
//! │  action the applier looks it up here:                                   │
//! │                                                                         │
//! │    found     ──► replay: report the RECORDED outcome, apply nothing     │
//! │    not found ──► first delivery: apply, then insert with final status   │
//! │                                                                         │
//! │  Rows are never deleted. The only in-place change is the               │
//! │  conflict → completed transition when a conflict is resolved.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::decode_enum;
use orderly_core::{EntityKind, SyncRecord, SyncStatus};

#[derive(sqlx::FromRow)]
struct SyncRecordRow {
    id: String,
    action_id: String,
    restaurant_id: String,
    device_id: String,
    entity_type: String,
    entity_id: String,
    action: String,
    status: String,
    error: Option<String>,
    version: i64,
    applied_at: DateTime<Utc>,
}

impl SyncRecordRow {
    fn into_record(self) -> DbResult<SyncRecord> {
        Ok(SyncRecord {
            id: self.id,
            action_id: self.action_id,
            restaurant_id: self.restaurant_id,
            device_id: self.device_id,
            entity_type: decode_enum("entity_type", &self.entity_type)?,
            entity_id: self.entity_id,
            action: decode_enum("action", &self.action)?,
            status: decode_enum("status", &self.status)?,
            error: self.error,
            version: self.version,
            applied_at: self.applied_at,
        })
    }
}

/// Repository for sync journal operations.
#[derive(Debug, Clone)]
pub struct SyncRecordRepository {
    pool: SqlitePool,
}

impl SyncRecordRepository {
    /// Creates a new SyncRecordRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SyncRecordRepository { pool }
    }

    /// Inserts a journal row with its final status.
    ///
    /// A duplicate action id within the restaurant surfaces as
    /// [`DbError::UniqueViolation`]; the applier treats that as a replay
    /// that raced this insert.
    pub async fn insert(&self, record: &SyncRecord) -> DbResult<()> {
        debug!(
            action_id = %record.action_id,
            entity_type = %record.entity_type,
            entity_id = %record.entity_id,
            status = %record.status,
            "Journaling sync action"
        );

        sqlx::query(
            r#"
            INSERT INTO sync_records (
                id, action_id, restaurant_id, device_id, entity_type,
                entity_id, action, status, error, version, applied_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.action_id)
        .bind(&record.restaurant_id)
        .bind(&record.device_id)
        .bind(record.entity_type.as_str())
        .bind(&record.entity_id)
        .bind(record.action.as_str())
        .bind(record.status.as_str())
        .bind(&record.error)
        .bind(record.version)
        .bind(record.applied_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Looks up a previously journaled action for replay detection.
    pub async fn find_by_action(
        &self,
        restaurant_id: &str,
        action_id: &str,
    ) -> DbResult<Option<SyncRecord>> {
        let row: Option<SyncRecordRow> = sqlx::query_as(
            r#"
            SELECT id, action_id, restaurant_id, device_id, entity_type,
                   entity_id, action, status, error, version, applied_at
            FROM sync_records
            WHERE restaurant_id = ? AND action_id = ?
            "#,
        )
        .bind(restaurant_id)
        .bind(action_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SyncRecordRow::into_record).transpose()
    }

    /// Moves one journal row to a new status.
    pub async fn update_status(
        &self,
        id: &str,
        status: SyncStatus,
        error: Option<&str>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE sync_records SET status = ?, error = ? WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("sync_record", id));
        }

        Ok(())
    }

    /// Completes every conflict-status journal row for one entity.
    ///
    /// Resolving a conflict settles all the actions that fed it, however
    /// many devices contributed proposals. Returns the number of rows
    /// transitioned.
    pub async fn complete_conflicted(
        &self,
        restaurant_id: &str,
        kind: EntityKind,
        entity_id: &str,
    ) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE sync_records
            SET status = ?, error = NULL
            WHERE restaurant_id = ? AND entity_type = ? AND entity_id = ? AND status = ?
            "#,
        )
        .bind(SyncStatus::Completed.as_str())
        .bind(restaurant_id)
        .bind(kind.as_str())
        .bind(entity_id)
        .bind(SyncStatus::Conflict.as_str())
        .execute(&self.pool)
        .await?;

        debug!(
            entity_type = %kind,
            entity_id = %entity_id,
            settled = result.rows_affected(),
            "Settled conflicted journal rows"
        );

        Ok(result.rows_affected())
    }

    /// Counts journal rows with a given status, optionally for one device.
    pub async fn count_by_status(
        &self,
        restaurant_id: &str,
        device_id: Option<&str>,
        status: SyncStatus,
    ) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM sync_records
            WHERE restaurant_id = ?
              AND status = ?
              AND (? IS NULL OR device_id = ?)
            "#,
        )
        .bind(restaurant_id)
        .bind(status.as_str())
        .bind(device_id)
        .bind(device_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Timestamp of the most recent journaled action, any status.
    pub async fn last_attempt(
        &self,
        restaurant_id: &str,
        device_id: Option<&str>,
    ) -> DbResult<Option<DateTime<Utc>>> {
        let last: Option<DateTime<Utc>> = sqlx::query_scalar(
            r#"
            SELECT MAX(applied_at)
            FROM sync_records
            WHERE restaurant_id = ?
              AND (? IS NULL OR device_id = ?)
            "#,
        )
        .bind(restaurant_id)
        .bind(device_id)
        .bind(device_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(last)
    }

    /// Status of the most recent journaled action.
    pub async fn last_status(
        &self,
        restaurant_id: &str,
        device_id: Option<&str>,
    ) -> DbResult<Option<SyncStatus>> {
        let raw: Option<String> = sqlx::query_scalar(
            r#"
            SELECT status
            FROM sync_records
            WHERE restaurant_id = ?
              AND (? IS NULL OR device_id = ?)
            ORDER BY applied_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(restaurant_id)
        .bind(device_id)
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;

        raw.map(|s| decode_enum("status", &s)).transpose()
    }

    /// Timestamp of the most recent successfully applied action.
    pub async fn last_success(
        &self,
        restaurant_id: &str,
        device_id: Option<&str>,
    ) -> DbResult<Option<DateTime<Utc>>> {
        let last: Option<DateTime<Utc>> = sqlx::query_scalar(
            r#"
            SELECT MAX(applied_at)
            FROM sync_records
            WHERE restaurant_id = ?
              AND status = ?
              AND (? IS NULL OR device_id = ?)
            "#,
        )
        .bind(restaurant_id)
        .bind(SyncStatus::Completed.as_str())
        .bind(device_id)
        .bind(device_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::TimeZone;
    use orderly_core::ActionKind;
    use uuid::Uuid;

    async fn test_repo() -> (Database, SyncRecordRepository) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.sync_records();
        (db, repo)
    }

    fn record(action_id: &str, device: &str, status: SyncStatus, secs: i64) -> SyncRecord {
        SyncRecord {
            id: Uuid::new_v4().to_string(),
            action_id: action_id.to_string(),
            restaurant_id: "rest-1".into(),
            device_id: device.to_string(),
            entity_type: EntityKind::Order,
            entity_id: "o-1".into(),
            action: ActionKind::Update,
            status,
            error: None,
            version: 2,
            applied_at: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_find_by_action() {
        let (_db, repo) = test_repo().await;

        let rec = record("a-1", "dev-1", SyncStatus::Completed, 1000);
        repo.insert(&rec).await.unwrap();

        let found = repo.find_by_action("rest-1", "a-1").await.unwrap().unwrap();
        assert_eq!(found, rec);

        assert!(repo.find_by_action("rest-1", "a-2").await.unwrap().is_none());
        assert!(repo.find_by_action("rest-2", "a-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_action_id_rejected() {
        let (_db, repo) = test_repo().await;

        repo.insert(&record("a-1", "dev-1", SyncStatus::Completed, 1000))
            .await
            .unwrap();

        let err = repo
            .insert(&record("a-1", "dev-2", SyncStatus::Completed, 2000))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_complete_conflicted_settles_all_devices() {
        let (_db, repo) = test_repo().await;

        repo.insert(&record("a-1", "dev-1", SyncStatus::Conflict, 1000))
            .await
            .unwrap();
        repo.insert(&record("a-2", "dev-2", SyncStatus::Conflict, 1001))
            .await
            .unwrap();
        repo.insert(&record("a-3", "dev-3", SyncStatus::Failed, 1002))
            .await
            .unwrap();

        let settled = repo
            .complete_conflicted("rest-1", EntityKind::Order, "o-1")
            .await
            .unwrap();
        assert_eq!(settled, 2);

        let a1 = repo.find_by_action("rest-1", "a-1").await.unwrap().unwrap();
        assert_eq!(a1.status, SyncStatus::Completed);

        // Failed rows are untouched.
        let a3 = repo.find_by_action("rest-1", "a-3").await.unwrap().unwrap();
        assert_eq!(a3.status, SyncStatus::Failed);
    }

    #[tokio::test]
    async fn test_count_by_status_with_device_filter() {
        let (_db, repo) = test_repo().await;

        repo.insert(&record("a-1", "dev-1", SyncStatus::Conflict, 1000))
            .await
            .unwrap();
        repo.insert(&record("a-2", "dev-2", SyncStatus::Conflict, 1001))
            .await
            .unwrap();
        repo.insert(&record("a-3", "dev-1", SyncStatus::Completed, 1002))
            .await
            .unwrap();

        let all = repo
            .count_by_status("rest-1", None, SyncStatus::Conflict)
            .await
            .unwrap();
        assert_eq!(all, 2);

        let dev1 = repo
            .count_by_status("rest-1", Some("dev-1"), SyncStatus::Conflict)
            .await
            .unwrap();
        assert_eq!(dev1, 1);
    }

    #[tokio::test]
    async fn test_last_attempt_and_last_success() {
        let (_db, repo) = test_repo().await;

        assert!(repo.last_attempt("rest-1", None).await.unwrap().is_none());

        repo.insert(&record("a-1", "dev-1", SyncStatus::Completed, 1000))
            .await
            .unwrap();
        repo.insert(&record("a-2", "dev-1", SyncStatus::Failed, 2000))
            .await
            .unwrap();

        let attempt = repo.last_attempt("rest-1", None).await.unwrap().unwrap();
        assert_eq!(attempt, Utc.timestamp_opt(2000, 0).unwrap());

        let success = repo.last_success("rest-1", None).await.unwrap().unwrap();
        assert_eq!(success, Utc.timestamp_opt(1000, 0).unwrap());

        let status = repo.last_status("rest-1", None).await.unwrap().unwrap();
        assert_eq!(status, SyncStatus::Failed);
        assert!(repo.last_status("rest-2", None).await.unwrap().is_none());
    }
}
