//! Parent contact entity.

use academy_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `parent_contacts` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ParentContact {
    pub id: DbId,
    pub academy_id: DbId,
    pub student_id: DbId,
    pub name: String,
    pub phone: String,
    pub opted_in: bool,
    pub status: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
