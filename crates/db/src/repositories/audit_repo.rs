//! Repository for the `audit_logs` table.

use academy_core::types::TenantId;
use sqlx::PgPool;

use crate::models::audit::{AuditLog, CreateAuditLog};

const COLUMNS: &str =
    "id, academy_id, user_id, action_type, entity_type, entity_id, details_json, created_at";

pub struct AuditLogRepo;

impl AuditLogRepo {
    /// Append one audit entry stamped with the tenant.
    pub async fn insert(
        pool: &PgPool,
        tenant: TenantId,
        entry: &CreateAuditLog,
    ) -> Result<AuditLog, sqlx::Error> {
        let query = format!(
            "INSERT INTO audit_logs \
                 (academy_id, user_id, action_type, entity_type, entity_id, details_json) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AuditLog>(&query)
            .bind(tenant.get())
            .bind(entry.user_id)
            .bind(&entry.action_type)
            .bind(&entry.entity_type)
            .bind(entry.entity_id)
            .bind(&entry.details_json)
            .fetch_one(pool)
            .await
    }
}
