//! # Sync Status Tracker
//!
//! Aggregates journal and conflict counters into a per-restaurant (or
//! per-device) health summary for dashboards and device status bars.

use serde::Serialize;
use tracing::debug;

use crate::error::SyncResult;
use crate::store::ConflictStore;
use chrono::{DateTime, Utc};
use orderly_core::SyncStatus;
use orderly_db::SyncRecordRepository;

/// Coarse health signal derived from the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncHealth {
    /// Nothing outstanding; the most recent action (if any) applied.
    Healthy,
    /// Actions awaiting processing.
    Pending,
    /// Live conflicts need operator attention.
    ConflictsDetected,
    /// The most recent action failed.
    SyncFailed,
}

/// Aggregated sync state for one restaurant, optionally one device.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatusReport {
    pub pending_uploads: i64,
    pub active_conflicts: i64,
    pub failed_actions: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_attempt: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_successful_sync: Option<DateTime<Utc>>,
    pub sync_health: SyncHealth,
}

/// Computes [`SyncStatusReport`]s from the journal and conflict store.
#[derive(Debug, Clone)]
pub struct SyncStatusTracker {
    journal: SyncRecordRepository,
    store: ConflictStore,
}

impl SyncStatusTracker {
    /// Wires a tracker over its stores.
    pub fn new(journal: SyncRecordRepository, store: ConflictStore) -> Self {
        SyncStatusTracker { journal, store }
    }

    /// Builds the status report.
    ///
    /// Health precedence: conflicts outrank a failed last attempt, which
    /// outranks pending work. Conflicts are restaurant-wide even when a
    /// `device_id` filter narrows the journal counters, because a conflict
    /// blocks the entity for every device.
    pub async fn get_status(
        &self,
        restaurant_id: &str,
        device_id: Option<&str>,
    ) -> SyncResult<SyncStatusReport> {
        let pending_uploads = self
            .journal
            .count_by_status(restaurant_id, device_id, SyncStatus::Pending)
            .await?;
        let failed_actions = self
            .journal
            .count_by_status(restaurant_id, device_id, SyncStatus::Failed)
            .await?;
        let active_conflicts = self.store.count(restaurant_id).await?;
        let last_sync_attempt = self.journal.last_attempt(restaurant_id, device_id).await?;
        let last_successful_sync = self.journal.last_success(restaurant_id, device_id).await?;
        let last_status = self.journal.last_status(restaurant_id, device_id).await?;

        let sync_health = if active_conflicts > 0 {
            SyncHealth::ConflictsDetected
        } else if last_status == Some(SyncStatus::Failed) {
            SyncHealth::SyncFailed
        } else if pending_uploads > 0 {
            SyncHealth::Pending
        } else {
            SyncHealth::Healthy
        };

        debug!(
            restaurant_id = %restaurant_id,
            device_id = ?device_id,
            active_conflicts,
            failed_actions,
            health = ?sync_health,
            "Computed sync status"
        );

        Ok(SyncStatusReport {
            pending_uploads,
            active_conflicts,
            failed_actions,
            last_sync_attempt,
            last_successful_sync,
            sync_health,
        })
    }
}
