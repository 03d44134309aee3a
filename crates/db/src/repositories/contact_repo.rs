//! Repository for the `parent_contacts` table.

use academy_core::attendance::CONTACT_STATUS_ACTIVE;
use academy_core::types::{DbId, TenantId};
use sqlx::PgPool;

use crate::models::contact::ParentContact;

const COLUMNS: &str =
    "id, academy_id, student_id, name, phone, opted_in, status, created_at, updated_at";

pub struct ParentContactRepo;

impl ParentContactRepo {
    /// Active, opted-in contacts of a student, oldest first.
    pub async fn list_eligible(
        pool: &PgPool,
        tenant: TenantId,
        student_id: DbId,
    ) -> Result<Vec<ParentContact>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM parent_contacts \
             WHERE academy_id = $1 AND student_id = $2 \
               AND opted_in = true AND status = $3 \
             ORDER BY id ASC"
        );
        sqlx::query_as::<_, ParentContact>(&query)
            .bind(tenant.get())
            .bind(student_id)
            .bind(CONTACT_STATUS_ACTIVE)
            .fetch_all(pool)
            .await
    }
}
