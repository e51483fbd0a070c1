//! HTTP handlers for the sync endpoints.
//!
//! ```text
//! POST   /sync/upload-batch              apply device mutations
//! GET    /sync/download-changes          incremental change feed
//! POST   /sync/resolve-conflict/{id}     resolve a stored conflict
//! GET    /sync/conflicts                 list live conflicts
//! DELETE /sync/conflicts/{id}            dismiss a conflict (manager+)
//! GET    /sync/status                    aggregated sync health
//! POST   /sync/force-sync                full feed snapshot (manager+)
//! GET    /health                         liveness + storage check
//! ```
//!
//! Upload response codes encode the batch outcome:
//! 200 every action applied, 206 conflicts were detected (or the batch
//! deadline cut processing short), 207 at least one action hard-failed.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use orderly_core::{DataMap, EntityKind, ResolutionStrategy, SyncAction};
use orderly_sync::BatchOutcome;

use crate::context::RequestContext;
use crate::error::ApiError;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sync/upload-batch", post(upload_batch))
        .route("/sync/download-changes", get(download_changes))
        .route("/sync/resolve-conflict/{conflict_id}", post(resolve_conflict))
        .route("/sync/conflicts", get(list_conflicts))
        .route("/sync/conflicts/{conflict_id}", delete(dismiss_conflict))
        .route("/sync/status", get(sync_status))
        .route("/sync/force-sync", post(force_sync))
        .with_state(state)
}

// =============================================================================
// Upload
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct UploadBatchRequest {
    /// Overrides the `x-device-id` header when present.
    #[serde(default)]
    pub device_id: Option<String>,
    /// Apply conflicting actions anyway instead of parking them.
    #[serde(default)]
    pub force_overwrite: bool,
    pub sync_actions: Vec<SyncAction>,
}

fn upload_status(outcome: &BatchOutcome) -> StatusCode {
    if outcome.failed > 0 {
        StatusCode::MULTI_STATUS
    } else if outcome.conflicts > 0 || outcome.deadline_exceeded {
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    }
}

async fn upload_batch(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(req): Json<UploadBatchRequest>,
) -> Result<(StatusCode, Json<BatchOutcome>), ApiError> {
    let device_id = req
        .device_id
        .or(ctx.device_id)
        .ok_or_else(|| {
            ApiError::BadRequest(
                "device_id required in body or x-device-id header".to_string(),
            )
        })?;

    tracing::info!(
        restaurant_id = %ctx.restaurant_id,
        device_id = %device_id,
        actions = req.sync_actions.len(),
        force_overwrite = req.force_overwrite,
        "upload batch"
    );

    let outcome = state
        .engine()
        .upload_batch(
            &ctx.restaurant_id,
            &device_id,
            req.sync_actions,
            req.force_overwrite,
        )
        .await?;

    Ok((upload_status(&outcome), Json(outcome)))
}

// =============================================================================
// Change feed
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct DownloadChangesQuery {
    /// Watermark from the previous pull. Absent means "from the beginning".
    #[serde(default)]
    pub last_sync_timestamp: Option<DateTime<Utc>>,
    /// Comma-separated entity kinds, e.g. `order,product`.
    #[serde(default)]
    pub entity_types: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

fn parse_entity_types(raw: &str) -> Result<Vec<EntityKind>, ApiError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<EntityKind>()
                .map_err(|e: String| ApiError::BadRequest(e))
        })
        .collect()
}

async fn download_changes(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<DownloadChangesQuery>,
) -> Result<Json<orderly_sync::ChangeSet>, ApiError> {
    let kinds = match query.entity_types.as_deref() {
        Some(raw) => Some(parse_entity_types(raw)?),
        None => None,
    };

    let changes = state
        .engine()
        .download_changes(
            &ctx.restaurant_id,
            query.last_sync_timestamp,
            kinds.as_deref(),
            query.limit,
        )
        .await?;

    tracing::debug!(
        restaurant_id = %ctx.restaurant_id,
        delivered = changes.total_changes,
        truncated = changes.truncated,
        "download changes"
    );

    Ok(Json(changes))
}

// =============================================================================
// Conflicts
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ResolveConflictRequest {
    pub resolution_strategy: ResolutionStrategy,
    #[serde(default)]
    pub merged_data: Option<DataMap>,
}

async fn resolve_conflict(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(conflict_id): Path<String>,
    Json(req): Json<ResolveConflictRequest>,
) -> Result<Json<orderly_sync::ResolutionOutcome>, ApiError> {
    tracing::info!(
        restaurant_id = %ctx.restaurant_id,
        conflict_id = %conflict_id,
        strategy = ?req.resolution_strategy,
        "resolve conflict"
    );

    let outcome = state
        .engine()
        .resolve_conflict(
            &ctx.restaurant_id,
            &conflict_id,
            req.resolution_strategy,
            req.merged_data,
        )
        .await?;

    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct ListConflictsQuery {
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

async fn list_conflicts(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<ListConflictsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let offset = query.offset.unwrap_or(0).max(0);

    let conflicts = state
        .engine()
        .list_conflicts(&ctx.restaurant_id, limit, offset)
        .await?;

    Ok(Json(json!({
        "total": conflicts.len(),
        "conflicts": conflicts,
    })))
}

async fn dismiss_conflict(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(conflict_id): Path<String>,
) -> Result<Json<orderly_sync::ResolutionOutcome>, ApiError> {
    ctx.require_manager()?;

    tracing::info!(
        restaurant_id = %ctx.restaurant_id,
        conflict_id = %conflict_id,
        "dismiss conflict"
    );

    let outcome = state
        .engine()
        .dismiss_conflict(&ctx.restaurant_id, &conflict_id)
        .await?;

    Ok(Json(outcome))
}

// =============================================================================
// Status & force sync
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    #[serde(default)]
    pub device_id: Option<String>,
}

async fn sync_status(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<StatusQuery>,
) -> Result<Json<orderly_sync::SyncStatusReport>, ApiError> {
    let device_id = query.device_id.or(ctx.device_id);
    let report = state
        .engine()
        .status(&ctx.restaurant_id, device_id.as_deref())
        .await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
pub struct ForceSyncRequest {
    #[serde(default)]
    pub entity_types: Option<Vec<EntityKind>>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Full feed snapshot regardless of watermark. Used when a device's local
/// store is suspect and needs a rebuild from server state.
async fn force_sync(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(req): Json<ForceSyncRequest>,
) -> Result<Json<orderly_sync::ChangeSet>, ApiError> {
    ctx.require_manager()?;

    tracing::info!(restaurant_id = %ctx.restaurant_id, "force sync");

    let changes = state
        .engine()
        .download_changes(
            &ctx.restaurant_id,
            None,
            req.entity_types.as_deref(),
            req.limit,
        )
        .await?;

    Ok(Json(changes))
}

// =============================================================================
// Health
// =============================================================================

async fn health(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    if state.db().health_check().await {
        Ok(Json(json!({ "status": "ok" })))
    } else {
        Err(ApiError::Unavailable("database unreachable".to_string()))
    }
}
