//! Attendance read model joined with its session, class, student and academy.

use academy_core::attendance::{AttendanceStatus, SessionStatus};
use academy_core::error::CoreError;
use academy_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// One attendance mark with everything a parent message needs.
///
/// Produced by a single tenant-scoped join; the pipeline never loads the
/// pieces separately.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AttendanceContext {
    pub attendance_id: DbId,
    pub academy_id: DbId,
    pub academy_name: String,
    pub student_id: DbId,
    pub student_name: String,
    pub status: String,
    pub session_id: DbId,
    pub session_status: String,
    pub session_starts_at: Timestamp,
    pub class_id: DbId,
    pub class_name: String,
    pub teacher_name: Option<String>,
}

impl AttendanceContext {
    pub fn attendance_status(&self) -> Result<AttendanceStatus, CoreError> {
        self.status.parse()
    }

    pub fn session_status(&self) -> Result<SessionStatus, CoreError> {
        self.session_status.parse()
    }
}
