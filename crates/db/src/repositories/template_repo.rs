//! Repository for the `message_templates` table.

use academy_core::attendance::TemplateType;
use academy_core::types::TenantId;
use sqlx::PgPool;

use crate::models::template::MessageTemplate;

const COLUMNS: &str =
    "id, academy_id, template_type, template_code, sender_key, is_active, created_at, updated_at";

pub struct MessageTemplateRepo;

impl MessageTemplateRepo {
    /// The academy's active template for a message type. The newest wins
    /// if more than one is active.
    pub async fn find_active(
        pool: &PgPool,
        tenant: TenantId,
        template_type: TemplateType,
    ) -> Result<Option<MessageTemplate>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM message_templates \
             WHERE academy_id = $1 AND template_type = $2 AND is_active = true \
             ORDER BY id DESC LIMIT 1"
        );
        sqlx::query_as::<_, MessageTemplate>(&query)
            .bind(tenant.get())
            .bind(template_type.as_str())
            .fetch_optional(pool)
            .await
    }

    /// The academy's active template registered under a provider template code.
    pub async fn find_active_by_code(
        pool: &PgPool,
        tenant: TenantId,
        template_code: &str,
    ) -> Result<Option<MessageTemplate>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM message_templates \
             WHERE academy_id = $1 AND template_code = $2 AND is_active = true \
             ORDER BY id DESC LIMIT 1"
        );
        sqlx::query_as::<_, MessageTemplate>(&query)
            .bind(tenant.get())
            .bind(template_code)
            .fetch_optional(pool)
            .await
    }
}
