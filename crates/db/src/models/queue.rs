//! Notification queue entity models and DTOs.

use std::collections::BTreeMap;

use academy_core::delivery::{QueueStatus, StatusId};
use academy_core::types::{DbId, TenantId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

/// Flat `name -> value` map substituted into the provider template.
pub type TemplateVariables = BTreeMap<String, String>;

/// A row from the `notification_queue` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct QueueEntry {
    pub id: DbId,
    pub academy_id: DbId,
    pub channel: String,
    pub event_type: String,
    pub attendance_id: DbId,
    pub attendance_status: String,
    pub student_id: DbId,
    pub parent_contact_id: DbId,
    pub recipient_phone: String,
    pub template_code: String,
    pub sender_key: String,
    pub variables: Json<TemplateVariables>,
    pub status_id: StatusId,
    pub scheduled_at: Timestamp,
    pub next_retry_at: Timestamp,
    pub attempts: i32,
    pub claimed_at: Option<Timestamp>,
    pub sent_at: Option<Timestamp>,
    pub provider_message_id: Option<String>,
    pub last_error_code: Option<String>,
    pub last_error_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl QueueEntry {
    /// Decoded status. Unknown ids (not in the lookup table) read as `None`.
    pub fn status(&self) -> Option<QueueStatus> {
        QueueStatus::from_id(self.status_id)
    }
}

/// DTO for inserting a queue entry. Status starts at PENDING, attempts at 0.
#[derive(Debug, Clone)]
pub struct NewQueueEntry {
    pub channel: String,
    pub event_type: String,
    pub attendance_id: DbId,
    pub attendance_status: String,
    pub student_id: DbId,
    pub parent_contact_id: DbId,
    pub recipient_phone: String,
    pub template_code: String,
    pub sender_key: String,
    pub variables: TemplateVariables,
    pub scheduled_at: Timestamp,
    pub next_retry_at: Timestamp,
}

/// A due row found by the cross-tenant sweep scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct DueEntry {
    pub id: DbId,
    pub academy_id: DbId,
}

impl DueEntry {
    pub fn tenant(&self) -> TenantId {
        TenantId(self.academy_id)
    }
}

/// Outcome recorded on a failed delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryError {
    pub code: String,
    pub message: String,
}

/// Filter parameters for listing a tenant's queue.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueueListQuery {
    pub status: Option<String>,
    pub attendance_id: Option<DbId>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
