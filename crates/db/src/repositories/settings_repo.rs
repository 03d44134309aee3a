//! Repository for the `academy_notification_settings` table.

use academy_core::types::TenantId;
use sqlx::PgPool;

use crate::models::settings::AcademyNotificationSettings;

const COLUMNS: &str = "\
    academy_id, enabled, notify_absent, notify_late, notify_excused, \
    quiet_hours_enabled, quiet_hours_start, quiet_hours_end, \
    allow_resend_on_status_change, created_at, updated_at";

pub struct NotificationSettingsRepo;

impl NotificationSettingsRepo {
    /// Settings for the academy, or `None` if it never configured notifications.
    pub async fn find(
        pool: &PgPool,
        tenant: TenantId,
    ) -> Result<Option<AcademyNotificationSettings>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM academy_notification_settings WHERE academy_id = $1");
        sqlx::query_as::<_, AcademyNotificationSettings>(&query)
            .bind(tenant.get())
            .fetch_optional(pool)
            .await
    }
}
