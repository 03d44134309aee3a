//! Handlers for the `/notifications` resource.
//!
//! The academy always comes from the bearer token, never from the path.

use academy_core::delivery::QueueStatus;
use academy_core::types::{DbId, Timestamp};
use academy_db::models::queue::{QueueEntry, QueueListQuery};
use academy_notify::fanout::{enqueue_notification, EnqueueOptions, EnqueueOutcome};
use academy_notify::gateway::SendResult;
use academy_notify::operations::{self, ManualSendRequest};
use academy_notify::rate_limit::RateDecision;
use academy_notify::worker::SweepSummary;
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{TimeDelta, Utc};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::middleware::rbac::{RequireAdmin, RequireSuperAdmin};
use crate::response::DataResponse;
use crate::state::AppState;

/// Window for the per-user manual send limit.
const MANUAL_SEND_WINDOW_SECS: i64 = 60;

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

/// Query parameters for the enqueue trigger.
#[derive(Debug, Default, Deserialize)]
pub struct EnqueueParams {
    /// Send no earlier than this instant instead of the quiet-hours schedule.
    pub scheduled_at: Option<Timestamp>,
}

/// POST /api/v1/notifications/attendance/{attendance_id}/enqueue
///
/// Gate the attendance mark and enqueue one entry per eligible contact.
/// Skips are a successful outcome with `skipped: true` and a reason.
pub async fn enqueue_attendance(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(attendance_id): Path<DbId>,
    Query(params): Query<EnqueueParams>,
) -> AppResult<Json<DataResponse<EnqueueOutcome>>> {
    let outcome = enqueue_notification(
        &*state.store,
        auth.tenant,
        attendance_id,
        Some(auth.user_id),
        Utc::now(),
        &state.notify.timezone,
        &EnqueueOptions {
            scheduled_at: params.scheduled_at,
        },
    )
    .await?;

    Ok(Json(DataResponse { data: outcome }))
}

// ---------------------------------------------------------------------------
// Manual send
// ---------------------------------------------------------------------------

/// POST /api/v1/notifications/send
///
/// Send one message immediately. Rate limited per user within the academy.
pub async fn send_manual(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
    Json(body): Json<ManualSendRequest>,
) -> AppResult<Json<DataResponse<SendResult>>> {
    let key = format!("{}:{}", user.tenant, user.user_id);
    let decision = state
        .rate_limiter
        .hit(
            &key,
            state.notify.manual_send_limit_per_minute,
            TimeDelta::seconds(MANUAL_SEND_WINDOW_SECS),
            Utc::now(),
        )
        .await;

    if let RateDecision::Limited { retry_after } = decision {
        tracing::warn!(tenant_id = %user.tenant, user_id = user.user_id, "Manual send rate limited");
        return Err(AppError::TooManyRequests {
            retry_after_secs: retry_after.num_seconds(),
        });
    }

    let result = operations::send_manual(
        &*state.store,
        &*state.gateway,
        user.tenant,
        user.user_id,
        &body,
    )
    .await?;

    Ok(Json(DataResponse { data: result }))
}

// ---------------------------------------------------------------------------
// Sweep
// ---------------------------------------------------------------------------

/// POST /api/v1/notifications/retry-sweep
///
/// Run one delivery sweep now, across every academy. The sweep keeps
/// running if the request times out or the client goes away.
pub async fn retry_sweep(
    RequireSuperAdmin(user): RequireSuperAdmin,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<SweepSummary>>> {
    let summary = state.worker.sweep(Utc::now()).await?;
    tracing::info!(
        user_id = user.user_id,
        processed = summary.processed,
        reclaimed = summary.reclaimed,
        "Manual notification sweep finished"
    );
    Ok(Json(DataResponse { data: summary }))
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

/// GET /api/v1/notifications/queue
///
/// List the academy's queue entries, newest first.
pub async fn list_queue(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
    Query(params): Query<QueueListQuery>,
) -> AppResult<Json<DataResponse<Vec<QueueEntry>>>> {
    let status = match params.status.as_deref() {
        None | Some("") => None,
        Some(name) => Some(
            QueueStatus::from_name(name)
                .ok_or_else(|| AppError::BadRequest(format!("Unknown queue status '{name}'")))?,
        ),
    };

    let entries = state
        .store
        .list_entries(user.tenant, status, &params)
        .await?;
    Ok(Json(DataResponse { data: entries }))
}

/// POST /api/v1/notifications/queue/{id}/resend
///
/// Put a FAILED entry back in the queue. 409 if it is not FAILED or another
/// active entry already covers the same recipient and mark.
pub async fn resend(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<QueueEntry>>> {
    let entry =
        operations::resend_entry(&*state.store, user.tenant, id, user.user_id, Utc::now())
            .await?;
    Ok(Json(DataResponse { data: entry }))
}
