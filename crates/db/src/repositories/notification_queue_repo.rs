//! Repository for the `notification_queue` table.
//!
//! Uses [`QueueStatus`] for every status literal. Each transition is a
//! conditional `UPDATE ... WHERE status_id = <expected>` so two workers can
//! never both move the same row, and a terminal row never moves again.
//! Transitions out of PROCESSING also match `claimed_at` against the lease
//! returned by [`claim`](NotificationQueueRepo::claim), so a worker whose
//! claim was reclaimed cannot record an outcome over the next claim.

use academy_core::delivery::{QueueStatus, ACTIVE_STATUSES};
use academy_core::types::{DbId, TenantId, Timestamp};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::queue::{DeliveryError, DueEntry, NewQueueEntry, QueueEntry, QueueListQuery};

/// Column list for `notification_queue` queries.
const COLUMNS: &str = "\
    id, academy_id, channel, event_type, attendance_id, attendance_status, \
    student_id, parent_contact_id, recipient_phone, template_code, sender_key, \
    variables, status_id, scheduled_at, next_retry_at, attempts, \
    claimed_at, sent_at, provider_message_id, last_error_code, last_error_message, \
    created_at, updated_at";

/// Maximum page size for queue listing.
const MAX_LIMIT: i64 = 100;

/// Default page size for queue listing.
const DEFAULT_LIMIT: i64 = 50;

/// Error code recorded when a stale claim is reclaimed.
pub const ERROR_CLAIM_EXPIRED: &str = "CLAIM_EXPIRED";

pub struct NotificationQueueRepo;

impl NotificationQueueRepo {
    // -----------------------------------------------------------------------
    // Fan-out
    // -----------------------------------------------------------------------

    /// Insert one PENDING row per entry in a single transaction, returning
    /// the new ids in input order.
    ///
    /// The transaction holds an advisory lock on the attendance mark, so
    /// concurrent fan-outs for the same mark serialize here. With
    /// `skip_if_active`, the active-entry check is repeated under that lock
    /// and nothing is inserted when it finds one.
    pub async fn insert_many(
        pool: &PgPool,
        tenant: TenantId,
        entries: &[NewQueueEntry],
        skip_if_active: bool,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        let Some(first) = entries.first() else {
            return Ok(Vec::new());
        };

        let mut tx = pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(first.attendance_id)
            .execute(&mut *tx)
            .await?;

        if skip_if_active {
            let active: bool = sqlx::query_scalar(
                "SELECT EXISTS ( \
                     SELECT 1 FROM notification_queue \
                     WHERE academy_id = $1 AND attendance_id = $2 AND attendance_status = $3 \
                       AND status_id IN ($4, $5, $6) \
                 )",
            )
            .bind(tenant.get())
            .bind(first.attendance_id)
            .bind(&first.attendance_status)
            .bind(ACTIVE_STATUSES[0].id())
            .bind(ACTIVE_STATUSES[1].id())
            .bind(ACTIVE_STATUSES[2].id())
            .fetch_one(&mut *tx)
            .await?;
            if active {
                return Ok(Vec::new());
            }
        }

        let mut ids = Vec::with_capacity(entries.len());

        for entry in entries {
            let id: DbId = sqlx::query_scalar(
                "INSERT INTO notification_queue \
                     (academy_id, channel, event_type, attendance_id, attendance_status, \
                      student_id, parent_contact_id, recipient_phone, template_code, \
                      sender_key, variables, status_id, scheduled_at, next_retry_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
                 RETURNING id",
            )
            .bind(tenant.get())
            .bind(&entry.channel)
            .bind(&entry.event_type)
            .bind(entry.attendance_id)
            .bind(&entry.attendance_status)
            .bind(entry.student_id)
            .bind(entry.parent_contact_id)
            .bind(&entry.recipient_phone)
            .bind(&entry.template_code)
            .bind(&entry.sender_key)
            .bind(Json(&entry.variables))
            .bind(QueueStatus::Pending.id())
            .bind(entry.scheduled_at)
            .bind(entry.next_retry_at)
            .fetch_one(&mut *tx)
            .await?;
            ids.push(id);
        }

        tx.commit().await?;
        Ok(ids)
    }

    /// Whether any active (PENDING, PROCESSING or SENT) row exists for the
    /// attendance mark and status.
    pub async fn has_active_for_attendance(
        pool: &PgPool,
        tenant: TenantId,
        attendance_id: DbId,
        attendance_status: &str,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT EXISTS ( \
                 SELECT 1 FROM notification_queue \
                 WHERE academy_id = $1 AND attendance_id = $2 AND attendance_status = $3 \
                   AND status_id IN ($4, $5, $6) \
             )",
        )
        .bind(tenant.get())
        .bind(attendance_id)
        .bind(attendance_status)
        .bind(ACTIVE_STATUSES[0].id())
        .bind(ACTIVE_STATUSES[1].id())
        .bind(ACTIVE_STATUSES[2].id())
        .fetch_one(pool)
        .await
    }

    /// Whether another active row targets the same (attendance, status,
    /// contact) triple as `entry_id`.
    pub async fn has_active_sibling(
        pool: &PgPool,
        tenant: TenantId,
        entry: &QueueEntry,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT EXISTS ( \
                 SELECT 1 FROM notification_queue \
                 WHERE academy_id = $1 AND attendance_id = $2 AND attendance_status = $3 \
                   AND parent_contact_id = $4 AND id <> $5 \
                   AND status_id IN ($6, $7, $8) \
             )",
        )
        .bind(tenant.get())
        .bind(entry.attendance_id)
        .bind(&entry.attendance_status)
        .bind(entry.parent_contact_id)
        .bind(entry.id)
        .bind(ACTIVE_STATUSES[0].id())
        .bind(ACTIVE_STATUSES[1].id())
        .bind(ACTIVE_STATUSES[2].id())
        .fetch_one(pool)
        .await
    }

    // -----------------------------------------------------------------------
    // Delivery
    // -----------------------------------------------------------------------

    /// Pending rows due at `now`, across all tenants, oldest first.
    ///
    /// Returns only ids and owning tenants; the worker must claim each row
    /// through the tenant-scoped [`claim`](Self::claim) before acting.
    pub async fn find_due(
        pool: &PgPool,
        now: Timestamp,
        limit: i64,
    ) -> Result<Vec<DueEntry>, sqlx::Error> {
        sqlx::query_as::<_, DueEntry>(
            "SELECT id, academy_id FROM notification_queue \
             WHERE status_id = $1 AND next_retry_at <= $2 \
             ORDER BY next_retry_at ASC, id ASC \
             LIMIT $3",
        )
        .bind(QueueStatus::Pending.id())
        .bind(now)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Atomically move a due PENDING row to PROCESSING, stamping
    /// `claimed_at = at`.
    ///
    /// `at` must be the moment of the claim itself, not the start of the
    /// sweep, since stale-claim recovery measures the lease from it.
    /// Returns `None` when the row is not PENDING, not yet due, or belongs
    /// to another tenant. Exactly one of several concurrent callers wins.
    pub async fn claim(
        pool: &PgPool,
        tenant: TenantId,
        id: DbId,
        at: Timestamp,
    ) -> Result<Option<QueueEntry>, sqlx::Error> {
        let query = format!(
            "UPDATE notification_queue \
             SET status_id = $3, claimed_at = $4, updated_at = NOW() \
             WHERE id = $1 AND academy_id = $2 AND status_id = $5 AND next_retry_at <= $4 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, QueueEntry>(&query)
            .bind(id)
            .bind(tenant.get())
            .bind(QueueStatus::Processing.id())
            .bind(at)
            .bind(QueueStatus::Pending.id())
            .fetch_optional(pool)
            .await
    }

    /// PROCESSING -> SENT, if the row still holds `lease`.
    pub async fn mark_sent(
        pool: &PgPool,
        tenant: TenantId,
        id: DbId,
        lease: Timestamp,
        attempts: i32,
        provider_message_id: Option<&str>,
        now: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE notification_queue \
             SET status_id = $3, attempts = $4, provider_message_id = $5, sent_at = $6, \
                 claimed_at = NULL, last_error_code = NULL, last_error_message = NULL, \
                 updated_at = NOW() \
             WHERE id = $1 AND academy_id = $2 AND status_id = $7 AND claimed_at = $8",
        )
        .bind(id)
        .bind(tenant.get())
        .bind(QueueStatus::Sent.id())
        .bind(attempts)
        .bind(provider_message_id)
        .bind(now)
        .bind(QueueStatus::Processing.id())
        .bind(lease)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// PROCESSING -> PENDING with an advanced `next_retry_at`, if the row
    /// still holds `lease`.
    pub async fn schedule_retry(
        pool: &PgPool,
        tenant: TenantId,
        id: DbId,
        lease: Timestamp,
        attempts: i32,
        next_retry_at: Timestamp,
        error: &DeliveryError,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE notification_queue \
             SET status_id = $3, attempts = $4, next_retry_at = $5, claimed_at = NULL, \
                 last_error_code = $6, last_error_message = $7, updated_at = NOW() \
             WHERE id = $1 AND academy_id = $2 AND status_id = $8 AND claimed_at = $9",
        )
        .bind(id)
        .bind(tenant.get())
        .bind(QueueStatus::Pending.id())
        .bind(attempts)
        .bind(next_retry_at)
        .bind(&error.code)
        .bind(&error.message)
        .bind(QueueStatus::Processing.id())
        .bind(lease)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// PROCESSING -> FAILED, if the row still holds `lease`.
    pub async fn mark_failed(
        pool: &PgPool,
        tenant: TenantId,
        id: DbId,
        lease: Timestamp,
        attempts: i32,
        error: &DeliveryError,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE notification_queue \
             SET status_id = $3, attempts = $4, claimed_at = NULL, \
                 last_error_code = $5, last_error_message = $6, updated_at = NOW() \
             WHERE id = $1 AND academy_id = $2 AND status_id = $7 AND claimed_at = $8",
        )
        .bind(id)
        .bind(tenant.get())
        .bind(QueueStatus::Failed.id())
        .bind(attempts)
        .bind(&error.code)
        .bind(&error.message)
        .bind(QueueStatus::Processing.id())
        .bind(lease)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Release PROCESSING rows whose claim is older than `cutoff`.
    ///
    /// The abandoned claim counts as an attempt: rows that still have
    /// attempts left go back to PENDING, the rest become FAILED. Runs
    /// across tenants as a maintenance step of the sweep.
    pub async fn reclaim_stale(
        pool: &PgPool,
        cutoff: Timestamp,
        max_attempts: i32,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE notification_queue \
             SET attempts = attempts + 1, \
                 status_id = CASE WHEN attempts + 1 >= $2 THEN $3 ELSE $4 END, \
                 claimed_at = NULL, last_error_code = $5, \
                 last_error_message = 'processing claim expired before completion', \
                 updated_at = NOW() \
             WHERE status_id = $6 AND claimed_at < $1",
        )
        .bind(cutoff)
        .bind(max_attempts)
        .bind(QueueStatus::Failed.id())
        .bind(QueueStatus::Pending.id())
        .bind(ERROR_CLAIM_EXPIRED)
        .bind(QueueStatus::Processing.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    // -----------------------------------------------------------------------
    // Operational
    // -----------------------------------------------------------------------

    /// Find a queue entry by id within the tenant.
    pub async fn find_by_id(
        pool: &PgPool,
        tenant: TenantId,
        id: DbId,
    ) -> Result<Option<QueueEntry>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM notification_queue WHERE id = $1 AND academy_id = $2");
        sqlx::query_as::<_, QueueEntry>(&query)
            .bind(id)
            .bind(tenant.get())
            .fetch_optional(pool)
            .await
    }

    /// List the tenant's entries, newest first, with optional filters.
    pub async fn list(
        pool: &PgPool,
        tenant: TenantId,
        status: Option<QueueStatus>,
        params: &QueueListQuery,
    ) -> Result<Vec<QueueEntry>, sqlx::Error> {
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let offset = params.offset.unwrap_or(0).max(0);

        let query = format!(
            "SELECT {COLUMNS} FROM notification_queue \
             WHERE academy_id = $1 \
               AND ($2::SMALLINT IS NULL OR status_id = $2) \
               AND ($3::BIGINT IS NULL OR attendance_id = $3) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $4 OFFSET $5"
        );
        sqlx::query_as::<_, QueueEntry>(&query)
            .bind(tenant.get())
            .bind(status.map(QueueStatus::id))
            .bind(params.attendance_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// FAILED -> PENDING with a fresh attempt budget, due at `now`.
    pub async fn reset_for_resend(
        pool: &PgPool,
        tenant: TenantId,
        id: DbId,
        now: Timestamp,
    ) -> Result<Option<QueueEntry>, sqlx::Error> {
        let query = format!(
            "UPDATE notification_queue \
             SET status_id = $3, attempts = 0, next_retry_at = $4, claimed_at = NULL, \
                 last_error_code = NULL, last_error_message = NULL, updated_at = NOW() \
             WHERE id = $1 AND academy_id = $2 AND status_id = $5 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, QueueEntry>(&query)
            .bind(id)
            .bind(tenant.get())
            .bind(QueueStatus::Pending.id())
            .bind(now)
            .bind(QueueStatus::Failed.id())
            .fetch_optional(pool)
            .await
    }
}
