//! Per-academy notification settings.

use academy_core::attendance::TemplateType;
use academy_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `academy_notification_settings` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AcademyNotificationSettings {
    pub academy_id: DbId,
    pub enabled: bool,
    pub notify_absent: bool,
    pub notify_late: bool,
    pub notify_excused: bool,
    pub quiet_hours_enabled: bool,
    pub quiet_hours_start: String,
    pub quiet_hours_end: String,
    pub allow_resend_on_status_change: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl AcademyNotificationSettings {
    /// Per-status send toggle for the mapped template type.
    pub fn allows(&self, template_type: TemplateType) -> bool {
        match template_type {
            TemplateType::Absent => self.notify_absent,
            TemplateType::Late => self.notify_late,
            TemplateType::Excused => self.notify_excused,
        }
    }
}
