pub mod health;
pub mod notification;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /notifications/attendance/{attendance_id}/enqueue   trigger (any staff)
/// /notifications/send                                 manual send (admin)
/// /notifications/retry-sweep                          run a sweep (super admin)
/// /notifications/queue                                list (admin)
/// /notifications/queue/{id}/resend                    resend FAILED (admin)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/notifications", notification::router())
}
