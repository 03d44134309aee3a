//! Policy and dedup gate.
//!
//! Decides whether an attendance mark warrants parent messages. Checks run
//! cheapest first and stop at the first failing one:
//!
//! 1. attendance exists (within the tenant)
//! 2. session is scheduled or completed
//! 3. status maps to a template type
//! 4. channel enabled and per-status toggle on
//! 5. no active queue entry for (attendance, status), unless resend is allowed
//! 6. at least one active, opted-in contact
//! 7. an active template for the type

use std::fmt;

use academy_core::attendance::TemplateType;
use academy_core::types::{DbId, TenantId};
use academy_db::models::attendance::AttendanceContext;
use academy_db::models::contact::ParentContact;
use academy_db::models::settings::AcademyNotificationSettings;
use academy_db::models::template::MessageTemplate;
use serde::Serialize;

use crate::store::{NotificationStore, StoreResult};

/// Why no message is warranted. Skips are expected outcomes, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkipReason {
    SourceNotFound,
    SessionNotNotifiable,
    StatusNotNotifiable,
    Disabled,
    PolicyOffForStatus,
    DedupSkip,
    NoOptedInContacts,
    NoActiveTemplate,
}

impl SkipReason {
    pub fn code(self) -> &'static str {
        match self {
            Self::SourceNotFound => "SOURCE_NOT_FOUND",
            Self::SessionNotNotifiable => "SESSION_NOT_NOTIFIABLE",
            Self::StatusNotNotifiable => "STATUS_NOT_NOTIFIABLE",
            Self::Disabled => "DISABLED",
            Self::PolicyOffForStatus => "POLICY_OFF_FOR_STATUS",
            Self::DedupSkip => "DEDUP_SKIP",
            Self::NoOptedInContacts => "NO_OPTED_IN_CONTACTS",
            Self::NoActiveTemplate => "NO_ACTIVE_TEMPLATE",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Everything the fan-out needs once the gate lets a mark through.
#[derive(Debug, Clone)]
pub struct Recipients {
    pub context: AttendanceContext,
    pub template_type: TemplateType,
    pub contacts: Vec<ParentContact>,
    pub template: MessageTemplate,
    pub settings: AcademyNotificationSettings,
    /// An active entry already exists and the academy allows resending.
    pub resend: bool,
}

#[derive(Debug, Clone)]
pub enum GateDecision {
    Proceed(Box<Recipients>),
    Skip(SkipReason),
}

/// Run the gate for one attendance mark.
pub async fn evaluate(
    store: &dyn NotificationStore,
    tenant: TenantId,
    attendance_id: DbId,
) -> StoreResult<GateDecision> {
    use GateDecision::Skip;

    let Some(context) = store.find_attendance(tenant, attendance_id).await? else {
        return Ok(Skip(SkipReason::SourceNotFound));
    };

    match context.session_status() {
        Ok(status) if status.is_notifiable() => {}
        Ok(_) => return Ok(Skip(SkipReason::SessionNotNotifiable)),
        Err(e) => {
            tracing::warn!(tenant_id = %tenant, attendance_id, error = %e, "Unreadable session status");
            return Ok(Skip(SkipReason::SessionNotNotifiable));
        }
    }

    let template_type = match context.attendance_status() {
        Ok(status) => match status.template_type() {
            Some(t) => t,
            None => return Ok(Skip(SkipReason::StatusNotNotifiable)),
        },
        Err(e) => {
            tracing::warn!(tenant_id = %tenant, attendance_id, error = %e, "Unreadable attendance status");
            return Ok(Skip(SkipReason::StatusNotNotifiable));
        }
    };

    let settings = match store.settings(tenant).await? {
        Some(s) if s.enabled => s,
        _ => return Ok(Skip(SkipReason::Disabled)),
    };
    if !settings.allows(template_type) {
        return Ok(Skip(SkipReason::PolicyOffForStatus));
    }

    let duplicate = store
        .has_active_entry(tenant, attendance_id, &context.status)
        .await?;
    if duplicate && !settings.allow_resend_on_status_change {
        return Ok(Skip(SkipReason::DedupSkip));
    }

    let contacts = store.eligible_contacts(tenant, context.student_id).await?;
    if contacts.is_empty() {
        return Ok(Skip(SkipReason::NoOptedInContacts));
    }

    let Some(template) = store.active_template(tenant, template_type).await? else {
        return Ok(Skip(SkipReason::NoActiveTemplate));
    };

    Ok(GateDecision::Proceed(Box::new(Recipients {
        context,
        template_type,
        contacts,
        template,
        settings,
        resend: duplicate,
    })))
}
