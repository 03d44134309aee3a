//! Read-only access to attendance marks owned by the attendance collaborator.

use academy_core::types::{DbId, TenantId};
use sqlx::PgPool;

use crate::models::attendance::AttendanceContext;

pub struct AttendanceRepo;

impl AttendanceRepo {
    /// Load an attendance mark with its session, class, student and academy.
    ///
    /// Every joined table is constrained to the same academy, so a row from
    /// another tenant is indistinguishable from a missing one.
    pub async fn find_context(
        pool: &PgPool,
        tenant: TenantId,
        attendance_id: DbId,
    ) -> Result<Option<AttendanceContext>, sqlx::Error> {
        sqlx::query_as::<_, AttendanceContext>(
            "SELECT a.id AS attendance_id, a.academy_id, ac.name AS academy_name, \
                    st.id AS student_id, st.name AS student_name, a.status, \
                    s.id AS session_id, s.status AS session_status, \
                    s.starts_at AS session_starts_at, \
                    c.id AS class_id, c.name AS class_name, u.name AS teacher_name \
             FROM attendances a \
             JOIN academies ac ON ac.id = a.academy_id \
             JOIN students st ON st.id = a.student_id AND st.academy_id = a.academy_id \
             JOIN class_sessions s ON s.id = a.session_id AND s.academy_id = a.academy_id \
             JOIN classes c ON c.id = s.class_id AND c.academy_id = a.academy_id \
             LEFT JOIN users u ON u.id = c.teacher_id AND u.academy_id = a.academy_id \
             WHERE a.id = $1 AND a.academy_id = $2",
        )
        .bind(attendance_id)
        .bind(tenant.get())
        .fetch_optional(pool)
        .await
    }
}
