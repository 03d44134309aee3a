//! Audit log entity models and DTOs.
//!
//! Audit logs are append-only and have no `updated_at`.

use academy_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const ACTION_NOTIFICATION_ENQUEUED: &str = "NOTIFICATION_ENQUEUED";
pub const ACTION_NOTIFICATION_SKIPPED: &str = "NOTIFICATION_SKIPPED";
pub const ACTION_NOTIFICATION_MANUAL_SEND: &str = "NOTIFICATION_MANUAL_SEND";
pub const ACTION_NOTIFICATION_RESEND: &str = "NOTIFICATION_RESEND";

pub const ENTITY_ATTENDANCE: &str = "attendance";
pub const ENTITY_QUEUE_ENTRY: &str = "notification_queue";

/// A single audit log entry.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AuditLog {
    pub id: DbId,
    pub academy_id: DbId,
    pub user_id: Option<DbId>,
    pub action_type: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<DbId>,
    pub details_json: Option<serde_json::Value>,
    pub created_at: Timestamp,
}

/// DTO for inserting a new audit log entry. The tenant is passed separately.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAuditLog {
    pub user_id: Option<DbId>,
    pub action_type: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<DbId>,
    pub details_json: Option<serde_json::Value>,
}
