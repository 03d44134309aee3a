//! Route definitions for the `/notifications` resource.
//!
//! All endpoints require authentication.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::notification;
use crate::state::AppState;

/// Routes mounted at `/notifications`.
///
/// ```text
/// POST   /attendance/{attendance_id}/enqueue  -> enqueue_attendance
/// POST   /send                                -> send_manual
/// POST   /retry-sweep                         -> retry_sweep
/// GET    /queue                               -> list_queue
/// POST   /queue/{id}/resend                   -> resend
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/attendance/{attendance_id}/enqueue",
            post(notification::enqueue_attendance),
        )
        .route("/send", post(notification::send_manual))
        .route("/retry-sweep", post(notification::retry_sweep))
        .route("/queue", get(notification::list_queue))
        .route("/queue/{id}/resend", post(notification::resend))
}
