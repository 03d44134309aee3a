//! Queue writer: turns one gated attendance mark into N queue entries.

use academy_core::channels::{CHANNEL_ALIMTALK, EVENT_TYPE_ATTENDANCE};
use academy_core::phone::normalize_phone;
use academy_core::quiet_hours::QuietHours;
use academy_core::template::{render_variables, TemplateContext};
use academy_core::types::{DbId, TenantId, Timestamp};
use academy_db::models::audit::{
    CreateAuditLog, ACTION_NOTIFICATION_ENQUEUED, ACTION_NOTIFICATION_SKIPPED, ENTITY_ATTENDANCE,
};
use academy_db::models::queue::NewQueueEntry;
use academy_db::models::settings::AcademyNotificationSettings;
use chrono::FixedOffset;
use serde::Serialize;

use crate::gate::{self, GateDecision, Recipients, SkipReason};
use crate::store::{NotificationStore, StoreResult};

#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    /// Send no earlier than this, bypassing the quiet-hours calculation.
    pub scheduled_at: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnqueueOutcome {
    pub skipped: bool,
    pub reason: Option<SkipReason>,
    pub queue_ids: Vec<DbId>,
}

impl EnqueueOutcome {
    fn skipped(reason: SkipReason) -> Self {
        Self {
            skipped: true,
            reason: Some(reason),
            queue_ids: Vec::new(),
        }
    }
}

/// Earliest send time for the academy at `now`.
///
/// Unparseable quiet-hours strings are logged and treated as no quiet hours.
pub fn schedule_for(
    settings: &AcademyNotificationSettings,
    now: Timestamp,
    tz: &FixedOffset,
) -> Timestamp {
    if !settings.quiet_hours_enabled {
        return now;
    }
    match QuietHours::parse(&settings.quiet_hours_start, &settings.quiet_hours_end) {
        Ok(window) => window.schedule_for(now, tz),
        Err(e) => {
            tracing::warn!(
                tenant_id = settings.academy_id,
                start = %settings.quiet_hours_start,
                end = %settings.quiet_hours_end,
                error = %e,
                "Ignoring invalid quiet hours"
            );
            now
        }
    }
}

/// Build one PENDING entry per contact, all sharing one variable map.
pub fn build_entries(
    recipients: &Recipients,
    now: Timestamp,
    tz: &FixedOffset,
    options: &EnqueueOptions,
) -> Vec<NewQueueEntry> {
    let ctx = &recipients.context;
    let variables = render_variables(
        &TemplateContext {
            academy_name: ctx.academy_name.clone(),
            student_name: ctx.student_name.clone(),
            class_name: ctx.class_name.clone(),
            session_starts_at: ctx.session_starts_at,
            template_type: recipients.template_type,
            teacher_name: ctx.teacher_name.clone().unwrap_or_default(),
        },
        tz,
    );

    let scheduled_at = options
        .scheduled_at
        .unwrap_or_else(|| schedule_for(&recipients.settings, now, tz));

    recipients
        .contacts
        .iter()
        .map(|contact| NewQueueEntry {
            channel: CHANNEL_ALIMTALK.to_string(),
            event_type: EVENT_TYPE_ATTENDANCE.to_string(),
            attendance_id: ctx.attendance_id,
            attendance_status: ctx.status.clone(),
            student_id: ctx.student_id,
            parent_contact_id: contact.id,
            recipient_phone: normalize_phone(&contact.phone),
            template_code: recipients.template.template_code.clone(),
            sender_key: recipients.template.sender_key.clone(),
            variables: variables.clone(),
            scheduled_at,
            next_retry_at: scheduled_at,
        })
        .collect()
}

/// Gate an attendance mark and, if it passes, enqueue one entry per contact.
///
/// Calling this twice for an unchanged mark creates no new rows the second
/// time unless the academy allows resending. The duplicate check is repeated
/// atomically with the insert, so two concurrent calls cannot both enqueue.
pub async fn enqueue_notification(
    store: &dyn NotificationStore,
    tenant: TenantId,
    attendance_id: DbId,
    acting_user_id: Option<DbId>,
    now: Timestamp,
    tz: &FixedOffset,
    options: &EnqueueOptions,
) -> StoreResult<EnqueueOutcome> {
    let recipients = match gate::evaluate(store, tenant, attendance_id).await? {
        GateDecision::Proceed(r) => r,
        GateDecision::Skip(reason) => {
            return Ok(skip(store, tenant, attendance_id, acting_user_id, reason).await);
        }
    };

    let entries = build_entries(&recipients, now, tz, options);
    let skip_if_active = !recipients.settings.allow_resend_on_status_change;
    let queue_ids = store
        .insert_entries(tenant, &entries, skip_if_active)
        .await?;
    if queue_ids.is_empty() {
        // Another enqueue for the same mark committed after the gate ran.
        return Ok(
            skip(store, tenant, attendance_id, acting_user_id, SkipReason::DedupSkip).await,
        );
    }

    tracing::info!(
        tenant_id = %tenant,
        attendance_id,
        status = %recipients.context.status,
        contact_count = entries.len(),
        resend = recipients.resend,
        "Attendance notification enqueued"
    );

    record_audit(
        store,
        tenant,
        CreateAuditLog {
            user_id: acting_user_id,
            action_type: ACTION_NOTIFICATION_ENQUEUED.to_string(),
            entity_type: Some(ENTITY_ATTENDANCE.to_string()),
            entity_id: Some(attendance_id),
            details_json: Some(serde_json::json!({
                "attendance_id": attendance_id,
                "status": recipients.context.status,
                "template_type": recipients.template_type,
                "contact_count": entries.len(),
                "queue_ids": queue_ids,
                "scheduled_at": entries.first().map(|e| e.scheduled_at),
                "resend": recipients.resend,
            })),
        },
    )
    .await;

    Ok(EnqueueOutcome {
        skipped: false,
        reason: None,
        queue_ids,
    })
}

async fn skip(
    store: &dyn NotificationStore,
    tenant: TenantId,
    attendance_id: DbId,
    acting_user_id: Option<DbId>,
    reason: SkipReason,
) -> EnqueueOutcome {
    tracing::debug!(
        tenant_id = %tenant,
        attendance_id,
        reason = %reason,
        "Attendance notification skipped"
    );
    record_audit(
        store,
        tenant,
        CreateAuditLog {
            user_id: acting_user_id,
            action_type: ACTION_NOTIFICATION_SKIPPED.to_string(),
            entity_type: Some(ENTITY_ATTENDANCE.to_string()),
            entity_id: Some(attendance_id),
            details_json: Some(serde_json::json!({
                "attendance_id": attendance_id,
                "reason": reason.code(),
            })),
        },
    )
    .await;
    EnqueueOutcome::skipped(reason)
}

/// Best-effort audit write. Failures are logged and dropped.
pub(crate) async fn record_audit(
    store: &dyn NotificationStore,
    tenant: TenantId,
    entry: CreateAuditLog,
) {
    if let Err(e) = store.record_audit(tenant, &entry).await {
        tracing::warn!(
            tenant_id = %tenant,
            action = %entry.action_type,
            error = %e,
            "Failed to write audit log"
        );
    }
}
