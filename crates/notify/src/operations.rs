//! Staff-facing operations: ad hoc sends and resending failed entries.

use academy_core::delivery::QueueStatus;
use academy_core::phone::{is_valid_recipient, normalize_phone};
use academy_core::types::{DbId, TenantId, Timestamp};
use academy_db::models::audit::{
    CreateAuditLog, ACTION_NOTIFICATION_MANUAL_SEND, ACTION_NOTIFICATION_RESEND,
    ENTITY_QUEUE_ENTRY,
};
use academy_db::models::queue::{QueueEntry, TemplateVariables};
use serde::Deserialize;

use crate::error::StoreError;
use crate::fanout::record_audit;
use crate::gateway::{MessageGateway, SendRequest, SendResult};
use crate::store::NotificationStore;

#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error("'{0}' is not a deliverable phone number")]
    InvalidRecipient(String),

    #[error("No active template with code '{0}'")]
    TemplateNotFound(String),

    #[error("Queue entry {0} not found")]
    EntryNotFound(DbId),

    #[error("Queue entry {id} is {} and cannot be resent", .status.as_str())]
    NotResendable { id: DbId, status: QueueStatus },

    #[error("Another active notification exists for queue entry {0}")]
    DuplicateActive(DbId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

// ---------------------------------------------------------------------------
// Manual send
// ---------------------------------------------------------------------------

/// Body of an ad hoc send.
#[derive(Debug, Clone, Deserialize)]
pub struct ManualSendRequest {
    pub phone: String,
    pub template_code: String,
    #[serde(default)]
    pub params: TemplateVariables,
    /// Optional id of the person being messaged, recorded in the audit entry.
    #[serde(default)]
    pub recipient_id: Option<DbId>,
}

/// Send one message immediately, outside the queue.
///
/// The sender key comes from the tenant's active template with the given
/// code. Gateway failures are returned in the [`SendResult`], not as errors.
pub async fn send_manual(
    store: &dyn NotificationStore,
    gateway: &dyn MessageGateway,
    tenant: TenantId,
    acting_user_id: DbId,
    request: &ManualSendRequest,
) -> Result<SendResult, OperationError> {
    let phone = normalize_phone(&request.phone);
    if !is_valid_recipient(&phone) {
        return Err(OperationError::InvalidRecipient(request.phone.clone()));
    }

    let template = store
        .active_template_by_code(tenant, &request.template_code)
        .await?
        .ok_or_else(|| OperationError::TemplateNotFound(request.template_code.clone()))?;

    let result = gateway
        .send(&SendRequest {
            sender_key: template.sender_key,
            template_code: template.template_code,
            recipient_phone: phone,
            variables: request.params.clone(),
        })
        .await;

    tracing::info!(
        tenant_id = %tenant,
        user_id = acting_user_id,
        template_code = %request.template_code,
        success = result.success,
        "Manual notification sent"
    );

    record_audit(
        store,
        tenant,
        CreateAuditLog {
            user_id: Some(acting_user_id),
            action_type: ACTION_NOTIFICATION_MANUAL_SEND.to_string(),
            entity_type: None,
            entity_id: request.recipient_id,
            details_json: Some(serde_json::json!({
                "template_code": request.template_code,
                "recipient_id": request.recipient_id,
                "success": result.success,
                "provider_message_id": result.provider_message_id,
                "error_code": result.error_code,
            })),
        },
    )
    .await;

    Ok(result)
}

// ---------------------------------------------------------------------------
// Resend
// ---------------------------------------------------------------------------

/// Put a FAILED entry back in the queue with a fresh attempt budget.
///
/// Refused when another active entry covers the same attendance, status and
/// contact and the academy does not allow resending.
pub async fn resend_entry(
    store: &dyn NotificationStore,
    tenant: TenantId,
    id: DbId,
    acting_user_id: DbId,
    now: Timestamp,
) -> Result<QueueEntry, OperationError> {
    let entry = store
        .find_entry(tenant, id)
        .await?
        .ok_or(OperationError::EntryNotFound(id))?;

    match entry.status() {
        Some(QueueStatus::Failed) => {}
        Some(status) => return Err(OperationError::NotResendable { id, status }),
        None => return Err(OperationError::EntryNotFound(id)),
    }

    let allow_resend = store
        .settings(tenant)
        .await?
        .is_some_and(|s| s.allow_resend_on_status_change);
    if !allow_resend && store.has_active_sibling(tenant, &entry).await? {
        return Err(OperationError::DuplicateActive(id));
    }

    let Some(reset) = store.reset_for_resend(tenant, id, now).await? else {
        // Moved out of FAILED between the read and the update.
        let status = store
            .find_entry(tenant, id)
            .await?
            .and_then(|e| e.status())
            .ok_or(OperationError::EntryNotFound(id))?;
        return Err(OperationError::NotResendable { id, status });
    };

    tracing::info!(tenant_id = %tenant, queue_id = id, user_id = acting_user_id, "Queue entry resent");

    record_audit(
        store,
        tenant,
        CreateAuditLog {
            user_id: Some(acting_user_id),
            action_type: ACTION_NOTIFICATION_RESEND.to_string(),
            entity_type: Some(ENTITY_QUEUE_ENTRY.to_string()),
            entity_id: Some(id),
            details_json: Some(serde_json::json!({
                "attendance_id": entry.attendance_id,
                "previous_attempts": entry.attempts,
                "previous_error_code": entry.last_error_code,
            })),
        },
    )
    .await;

    Ok(reset)
}
