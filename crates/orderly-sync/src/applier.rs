//! # Batch Applier
//!
//! Orchestrates validator, detector, conflict store and entity mutator for
//! one uploaded batch of queued device mutations.
//!
//! ## Per-Action Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     apply_batch (one device, in order)                  │
//! │                                                                         │
//! │  for each action:                                                       │
//! │    validate ──failed──────────────────► report `failed`, continue       │
//! │       │ ok                                (not journaled: a corrected   │
//! │       ▼                                    resubmit must not replay)    │
//! │    lock (entity_type, entity_id)                                        │
//! │       │                                                                 │
//! │    journal lookup ──seen before──────► replay recorded outcome          │
//! │       │ first delivery                                                  │
//! │       ▼                                                                 │
//! │    detect against live snapshot                                         │
//! │       ├── no conflict ──► mutate ──ok──► journal `completed`            │
//! │       │                          └─domain err─► journal `failed`        │
//! │       └── conflict ─────► register/append in store, journal `conflict`  │
//! │                           (entity NEVER mutated while disputed)         │
//! │    unlock, next action                                                  │
//! │                                                                         │
//! │  Storage failure aborts the REQUEST; journaled actions stay committed   │
//! │  and replay their outcome when the client retries the batch.            │
//! │  Deadline expiry returns partial results; the rest stay un-journaled.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::{SyncError, SyncResult};
use crate::locks::EntityLocks;
use crate::mutator::{EntityMutator, MutationError};
use crate::store::ConflictStore;
use orderly_core::{
    ActionKind, Conflict, ConflictDetector, ConflictType, Detection, EntityKind, EntitySnapshot,
    SyncAction, SyncActionValidator, SyncRecord, SyncStatus, ValidatedAction,
};
use orderly_db::{DbError, EntityRepository, SyncRecordRepository};

// =============================================================================
// Outcome Types
// =============================================================================

/// Per-action outcome inside a batch response.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedAction {
    pub action_id: String,
    pub entity_type: EntityKind,
    pub entity_id: String,
    pub action: ActionKind,
    pub status: SyncStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict_id: Option<String>,
    /// True when this outcome was served from the journal (idempotent retry).
    pub replayed: bool,
}

/// A conflict surfaced by this batch, new or appended-to.
#[derive(Debug, Clone, Serialize)]
pub struct ConflictSummary {
    pub conflict_id: String,
    pub action_id: String,
    pub entity_type: EntityKind,
    pub entity_id: String,
    pub conflict_type: ConflictType,
    pub conflict_fields: Vec<String>,
}

/// Result of one batch upload.
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    /// Actions submitted (processed or not).
    #[serde(rename = "total_actions")]
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub conflicts: usize,
    #[serde(rename = "processed_actions")]
    pub processed: Vec<ProcessedAction>,
    pub conflicts_detected: Vec<ConflictSummary>,
    /// True when the deadline expired before the whole batch was processed.
    /// Unprocessed actions are absent from `processed` and safe to resubmit.
    pub deadline_exceeded: bool,
}

impl BatchOutcome {
    fn tally(&mut self) {
        self.successful = self
            .processed
            .iter()
            .filter(|p| p.status == SyncStatus::Completed)
            .count();
        self.failed = self
            .processed
            .iter()
            .filter(|p| p.status == SyncStatus::Failed)
            .count();
        self.conflicts = self
            .processed
            .iter()
            .filter(|p| p.status == SyncStatus::Conflict)
            .count();
    }
}

// =============================================================================
// Batch Applier
// =============================================================================

/// Applies ordered mutation batches from one device.
#[derive(Debug, Clone)]
pub struct BatchApplier {
    validator: SyncActionValidator,
    entities: EntityRepository,
    journal: SyncRecordRepository,
    store: ConflictStore,
    locks: EntityLocks,
    mutator: Arc<dyn EntityMutator>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl BatchApplier {
    /// Wires an applier over its collaborators.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        entities: EntityRepository,
        journal: SyncRecordRepository,
        store: ConflictStore,
        locks: EntityLocks,
        mutator: Arc<dyn EntityMutator>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        BatchApplier {
            validator: SyncActionValidator::new(config.skew_tolerance),
            entities,
            journal,
            store,
            locks,
            mutator,
            clock,
            config,
        }
    }

    /// Processes a batch strictly in client-supplied order.
    ///
    /// One bad action never aborts the batch: validation and domain
    /// failures are captured per-action. Only storage failure escapes as
    /// an error, and then every journaled action stays committed.
    ///
    /// `force_overwrite` applies conflicting actions anyway instead of
    /// registering conflicts; the client's data wins immediately.
    pub async fn apply_batch(
        &self,
        restaurant_id: &str,
        device_id: &str,
        actions: Vec<SyncAction>,
        force_overwrite: bool,
    ) -> SyncResult<BatchOutcome> {
        if actions.len() > self.config.max_batch_actions {
            return Err(SyncError::BatchTooLarge {
                got: actions.len(),
                max: self.config.max_batch_actions,
            });
        }

        let started = self.clock.now();
        let mut outcome = BatchOutcome {
            total: actions.len(),
            successful: 0,
            failed: 0,
            conflicts: 0,
            processed: Vec::with_capacity(actions.len()),
            conflicts_detected: Vec::new(),
            deadline_exceeded: false,
        };

        info!(
            restaurant_id = %restaurant_id,
            device_id = %device_id,
            actions = outcome.total,
            force_overwrite,
            "Applying sync batch"
        );

        for action in actions {
            if self.clock.now() - started > self.config.batch_deadline {
                warn!(
                    restaurant_id = %restaurant_id,
                    device_id = %device_id,
                    processed = outcome.processed.len(),
                    total = outcome.total,
                    "Batch deadline expired, returning partial results"
                );
                outcome.deadline_exceeded = true;
                break;
            }

            let (processed, summary) = self
                .process_action(restaurant_id, device_id, action, force_overwrite)
                .await?;
            outcome.processed.push(processed);
            if let Some(summary) = summary {
                outcome.conflicts_detected.push(summary);
            }
        }

        outcome.tally();
        info!(
            restaurant_id = %restaurant_id,
            device_id = %device_id,
            successful = outcome.successful,
            failed = outcome.failed,
            conflicts = outcome.conflicts,
            "Batch applied"
        );
        Ok(outcome)
    }

    /// Runs one action through validate → replay check → detect → apply,
    /// holding the entity lock from the replay check onward.
    async fn process_action(
        &self,
        restaurant_id: &str,
        device_id: &str,
        action: SyncAction,
        force_overwrite: bool,
    ) -> SyncResult<(ProcessedAction, Option<ConflictSummary>)> {
        let now = self.clock.now();

        let validated = match self.validator.validate(action.clone(), now) {
            Ok(validated) => validated,
            Err(err) => {
                debug!(
                    entity_type = %action.entity_type,
                    entity_id = %action.entity_id,
                    error = %err,
                    "Action rejected by validator"
                );
                // Not journaled: a corrected resubmit with the same id must
                // be processed fresh, not replayed as a failure.
                return Ok((
                    ProcessedAction {
                        action_id: action.id.unwrap_or_default(),
                        entity_type: action.entity_type,
                        entity_id: action.entity_id,
                        action: action.action,
                        status: SyncStatus::Failed,
                        error: Some(err.to_string()),
                        conflict_id: None,
                        replayed: false,
                    },
                    None,
                ));
            }
        };

        let _guard = self
            .locks
            .acquire(validated.entity_type, &validated.entity_id)
            .await;

        if let Some(prior) = self
            .journal
            .find_by_action(restaurant_id, &validated.id)
            .await?
        {
            return self.replay(prior).await;
        }

        let snapshot = self
            .entities
            .get(restaurant_id, validated.entity_type, &validated.entity_id)
            .await?;
        let live = snapshot.as_ref().and_then(|s| s.live());

        match ConflictDetector::detect(&validated, live) {
            Detection::Conflict {
                conflict_type,
                fields,
            } if !force_overwrite => {
                self.register_conflict(
                    restaurant_id,
                    device_id,
                    validated,
                    conflict_type,
                    fields,
                    live,
                    now,
                )
                .await
            }
            _ => {
                self.apply_action(restaurant_id, device_id, validated, live, now)
                    .await
            }
        }
    }

    /// Serves a previously journaled action's recorded outcome.
    async fn replay(
        &self,
        prior: SyncRecord,
    ) -> SyncResult<(ProcessedAction, Option<ConflictSummary>)> {
        debug!(
            action_id = %prior.action_id,
            status = %prior.status,
            "Replaying journaled outcome"
        );

        // Point the device at the live conflict again, if still unresolved.
        let conflict = if prior.status == SyncStatus::Conflict {
            self.store
                .find_by_entity(&prior.restaurant_id, prior.entity_type, &prior.entity_id)
                .await?
        } else {
            None
        };

        let summary = conflict.as_ref().map(|c| summarize(c, &prior.action_id));
        Ok((
            ProcessedAction {
                action_id: prior.action_id,
                entity_type: prior.entity_type,
                entity_id: prior.entity_id,
                action: prior.action,
                status: prior.status,
                error: prior.error,
                conflict_id: conflict.map(|c| c.id),
                replayed: true,
            },
            summary,
        ))
    }

    /// No conflict (or forced): delegate the mutation and journal the result.
    async fn apply_action(
        &self,
        restaurant_id: &str,
        device_id: &str,
        validated: ValidatedAction,
        live: Option<&EntitySnapshot>,
        now: DateTime<Utc>,
    ) -> SyncResult<(ProcessedAction, Option<ConflictSummary>)> {
        let (status, error) = match self
            .mutator
            .apply(restaurant_id, &validated, live, now)
            .await
        {
            Ok(_) => (SyncStatus::Completed, None),
            Err(MutationError::Domain(reason)) => {
                debug!(
                    entity_type = %validated.entity_type,
                    entity_id = %validated.entity_id,
                    reason = %reason,
                    "Mutation rejected by entity schema"
                );
                (SyncStatus::Failed, Some(reason))
            }
            Err(MutationError::Storage(err)) => return Err(err.into()),
        };

        let record = SyncRecord {
            id: Uuid::new_v4().to_string(),
            action_id: validated.id.clone(),
            restaurant_id: restaurant_id.to_string(),
            device_id: device_id.to_string(),
            entity_type: validated.entity_type,
            entity_id: validated.entity_id.clone(),
            action: validated.action,
            status,
            error: error.clone(),
            version: validated.version,
            applied_at: now,
        };
        self.journal_or_replay(record).await
    }

    /// Conflict path: register or append, then journal with status conflict.
    #[allow(clippy::too_many_arguments)]
    async fn register_conflict(
        &self,
        restaurant_id: &str,
        device_id: &str,
        validated: ValidatedAction,
        conflict_type: ConflictType,
        fields: Vec<String>,
        live: Option<&EntitySnapshot>,
        now: DateTime<Utc>,
    ) -> SyncResult<(ProcessedAction, Option<ConflictSummary>)> {
        let record_id = Uuid::new_v4().to_string();
        let conflict_id = self
            .store
            .register(
                restaurant_id,
                device_id,
                &record_id,
                &validated,
                conflict_type,
                fields.clone(),
                live,
                now,
            )
            .await?;

        let record = SyncRecord {
            id: record_id,
            action_id: validated.id.clone(),
            restaurant_id: restaurant_id.to_string(),
            device_id: device_id.to_string(),
            entity_type: validated.entity_type,
            entity_id: validated.entity_id.clone(),
            action: validated.action,
            status: SyncStatus::Conflict,
            error: None,
            version: validated.version,
            applied_at: now,
        };
        let (processed, _) = self.journal_or_replay(record).await?;

        let summary = ConflictSummary {
            conflict_id: conflict_id.clone(),
            action_id: validated.id,
            entity_type: validated.entity_type,
            entity_id: validated.entity_id,
            conflict_type,
            conflict_fields: fields,
        };
        Ok((
            ProcessedAction {
                conflict_id: Some(conflict_id),
                ..processed
            },
            Some(summary),
        ))
    }

    /// Journals a fresh record; a unique-key race means a concurrent retry
    /// of the same action won, so fall back to its recorded outcome.
    async fn journal_or_replay(
        &self,
        record: SyncRecord,
    ) -> SyncResult<(ProcessedAction, Option<ConflictSummary>)> {
        match self.journal.insert(&record).await {
            Ok(()) => Ok((
                ProcessedAction {
                    action_id: record.action_id,
                    entity_type: record.entity_type,
                    entity_id: record.entity_id,
                    action: record.action,
                    status: record.status,
                    error: record.error,
                    conflict_id: None,
                    replayed: false,
                },
                None,
            )),
            Err(DbError::UniqueViolation { .. }) => {
                let prior = self
                    .journal
                    .find_by_action(&record.restaurant_id, &record.action_id)
                    .await?
                    .ok_or_else(|| {
                        SyncError::Internal(format!(
                            "journal row for action {} vanished after unique violation",
                            record.action_id
                        ))
                    })?;
                self.replay(prior).await
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Response summary for an already-stored conflict.
fn summarize(conflict: &Conflict, action_id: &str) -> ConflictSummary {
    ConflictSummary {
        conflict_id: conflict.id.clone(),
        action_id: action_id.to_string(),
        entity_type: conflict.entity_type,
        entity_id: conflict.entity_id.clone(),
        conflict_type: conflict.conflict_type,
        conflict_fields: conflict.conflict_fields.clone(),
    }
}
