//! Persistence seam for the pipeline.
//!
//! [`NotificationStore`] is the narrow, tenant-parameterised repository
//! interface the gate, fan-out, worker and operational paths use. The
//! Postgres implementation delegates to the `academy-db` repositories.

use academy_core::attendance::TemplateType;
use academy_core::delivery::QueueStatus;
use academy_core::types::{DbId, TenantId, Timestamp};
use academy_db::models::attendance::AttendanceContext;
use academy_db::models::audit::CreateAuditLog;
use academy_db::models::contact::ParentContact;
use academy_db::models::queue::{DeliveryError, DueEntry, NewQueueEntry, QueueEntry, QueueListQuery};
use academy_db::models::settings::AcademyNotificationSettings;
use academy_db::models::template::MessageTemplate;
use academy_db::repositories::{
    AttendanceRepo, AuditLogRepo, MessageTemplateRepo, NotificationQueueRepo,
    NotificationSettingsRepo, ParentContactRepo,
};
use academy_db::DbPool;
use async_trait::async_trait;

use crate::error::StoreError;

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Whether the backing store is reachable.
    async fn health_check(&self) -> StoreResult<()>;

    // --- gate inputs (read-only collaborator data) ---

    async fn find_attendance(
        &self,
        tenant: TenantId,
        attendance_id: DbId,
    ) -> StoreResult<Option<AttendanceContext>>;

    async fn settings(&self, tenant: TenantId) -> StoreResult<Option<AcademyNotificationSettings>>;

    async fn eligible_contacts(
        &self,
        tenant: TenantId,
        student_id: DbId,
    ) -> StoreResult<Vec<ParentContact>>;

    async fn active_template(
        &self,
        tenant: TenantId,
        template_type: TemplateType,
    ) -> StoreResult<Option<MessageTemplate>>;

    async fn active_template_by_code(
        &self,
        tenant: TenantId,
        template_code: &str,
    ) -> StoreResult<Option<MessageTemplate>>;

    // --- queue writes ---

    /// Whether a PENDING, PROCESSING or SENT entry exists for the mark.
    async fn has_active_entry(
        &self,
        tenant: TenantId,
        attendance_id: DbId,
        attendance_status: &str,
    ) -> StoreResult<bool>;

    /// Insert PENDING entries for one attendance mark atomically.
    ///
    /// With `skip_if_active`, inserts nothing and returns no ids when an
    /// active entry for the mark already exists at insert time.
    async fn insert_entries(
        &self,
        tenant: TenantId,
        entries: &[NewQueueEntry],
        skip_if_active: bool,
    ) -> StoreResult<Vec<DbId>>;

    async fn record_audit(&self, tenant: TenantId, entry: &CreateAuditLog) -> StoreResult<()>;

    // --- delivery ---

    /// Due PENDING entries across every tenant. The only cross-tenant read.
    async fn find_due(&self, now: Timestamp, limit: i64) -> StoreResult<Vec<DueEntry>>;

    /// Release PROCESSING entries claimed before `cutoff`. Cross-tenant.
    async fn reclaim_stale(&self, cutoff: Timestamp, max_attempts: i32) -> StoreResult<u64>;

    /// Claim a due PENDING entry, stamping `claimed_at = at`.
    ///
    /// The returned entry's `claimed_at` is the lease the terminal
    /// transitions below must present.
    async fn claim(
        &self,
        tenant: TenantId,
        id: DbId,
        at: Timestamp,
    ) -> StoreResult<Option<QueueEntry>>;

    /// The three transitions out of PROCESSING apply only while the entry
    /// still carries `lease`; a reclaimed and re-claimed entry rejects them.
    async fn mark_sent(
        &self,
        tenant: TenantId,
        id: DbId,
        lease: Timestamp,
        attempts: i32,
        provider_message_id: Option<&str>,
        now: Timestamp,
    ) -> StoreResult<bool>;

    async fn schedule_retry(
        &self,
        tenant: TenantId,
        id: DbId,
        lease: Timestamp,
        attempts: i32,
        next_retry_at: Timestamp,
        error: &DeliveryError,
    ) -> StoreResult<bool>;

    async fn mark_failed(
        &self,
        tenant: TenantId,
        id: DbId,
        lease: Timestamp,
        attempts: i32,
        error: &DeliveryError,
    ) -> StoreResult<bool>;

    // --- operational ---

    async fn find_entry(&self, tenant: TenantId, id: DbId) -> StoreResult<Option<QueueEntry>>;

    async fn list_entries(
        &self,
        tenant: TenantId,
        status: Option<QueueStatus>,
        params: &QueueListQuery,
    ) -> StoreResult<Vec<QueueEntry>>;

    /// Whether another active entry targets the same attendance, status and contact.
    async fn has_active_sibling(&self, tenant: TenantId, entry: &QueueEntry) -> StoreResult<bool>;

    async fn reset_for_resend(
        &self,
        tenant: TenantId,
        id: DbId,
        now: Timestamp,
    ) -> StoreResult<Option<QueueEntry>>;
}

// ---------------------------------------------------------------------------
// Postgres
// ---------------------------------------------------------------------------

/// [`NotificationStore`] backed by the `academy-db` repositories.
#[derive(Clone)]
pub struct PgNotificationStore {
    pool: DbPool,
}

impl PgNotificationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn health_check(&self) -> StoreResult<()> {
        Ok(academy_db::health_check(&self.pool).await?)
    }

    async fn find_attendance(
        &self,
        tenant: TenantId,
        attendance_id: DbId,
    ) -> StoreResult<Option<AttendanceContext>> {
        Ok(AttendanceRepo::find_context(&self.pool, tenant, attendance_id).await?)
    }

    async fn settings(&self, tenant: TenantId) -> StoreResult<Option<AcademyNotificationSettings>> {
        Ok(NotificationSettingsRepo::find(&self.pool, tenant).await?)
    }

    async fn eligible_contacts(
        &self,
        tenant: TenantId,
        student_id: DbId,
    ) -> StoreResult<Vec<ParentContact>> {
        Ok(ParentContactRepo::list_eligible(&self.pool, tenant, student_id).await?)
    }

    async fn active_template(
        &self,
        tenant: TenantId,
        template_type: TemplateType,
    ) -> StoreResult<Option<MessageTemplate>> {
        Ok(MessageTemplateRepo::find_active(&self.pool, tenant, template_type).await?)
    }

    async fn active_template_by_code(
        &self,
        tenant: TenantId,
        template_code: &str,
    ) -> StoreResult<Option<MessageTemplate>> {
        Ok(MessageTemplateRepo::find_active_by_code(&self.pool, tenant, template_code).await?)
    }

    async fn has_active_entry(
        &self,
        tenant: TenantId,
        attendance_id: DbId,
        attendance_status: &str,
    ) -> StoreResult<bool> {
        Ok(NotificationQueueRepo::has_active_for_attendance(
            &self.pool,
            tenant,
            attendance_id,
            attendance_status,
        )
        .await?)
    }

    async fn insert_entries(
        &self,
        tenant: TenantId,
        entries: &[NewQueueEntry],
        skip_if_active: bool,
    ) -> StoreResult<Vec<DbId>> {
        Ok(NotificationQueueRepo::insert_many(&self.pool, tenant, entries, skip_if_active).await?)
    }

    async fn record_audit(&self, tenant: TenantId, entry: &CreateAuditLog) -> StoreResult<()> {
        AuditLogRepo::insert(&self.pool, tenant, entry).await?;
        Ok(())
    }

    async fn find_due(&self, now: Timestamp, limit: i64) -> StoreResult<Vec<DueEntry>> {
        Ok(NotificationQueueRepo::find_due(&self.pool, now, limit).await?)
    }

    async fn reclaim_stale(&self, cutoff: Timestamp, max_attempts: i32) -> StoreResult<u64> {
        Ok(NotificationQueueRepo::reclaim_stale(&self.pool, cutoff, max_attempts).await?)
    }

    async fn claim(
        &self,
        tenant: TenantId,
        id: DbId,
        at: Timestamp,
    ) -> StoreResult<Option<QueueEntry>> {
        Ok(NotificationQueueRepo::claim(&self.pool, tenant, id, at).await?)
    }

    async fn mark_sent(
        &self,
        tenant: TenantId,
        id: DbId,
        lease: Timestamp,
        attempts: i32,
        provider_message_id: Option<&str>,
        now: Timestamp,
    ) -> StoreResult<bool> {
        Ok(NotificationQueueRepo::mark_sent(
            &self.pool,
            tenant,
            id,
            lease,
            attempts,
            provider_message_id,
            now,
        )
        .await?)
    }

    async fn schedule_retry(
        &self,
        tenant: TenantId,
        id: DbId,
        lease: Timestamp,
        attempts: i32,
        next_retry_at: Timestamp,
        error: &DeliveryError,
    ) -> StoreResult<bool> {
        Ok(NotificationQueueRepo::schedule_retry(
            &self.pool,
            tenant,
            id,
            lease,
            attempts,
            next_retry_at,
            error,
        )
        .await?)
    }

    async fn mark_failed(
        &self,
        tenant: TenantId,
        id: DbId,
        lease: Timestamp,
        attempts: i32,
        error: &DeliveryError,
    ) -> StoreResult<bool> {
        Ok(
            NotificationQueueRepo::mark_failed(&self.pool, tenant, id, lease, attempts, error)
                .await?,
        )
    }

    async fn find_entry(&self, tenant: TenantId, id: DbId) -> StoreResult<Option<QueueEntry>> {
        Ok(NotificationQueueRepo::find_by_id(&self.pool, tenant, id).await?)
    }

    async fn list_entries(
        &self,
        tenant: TenantId,
        status: Option<QueueStatus>,
        params: &QueueListQuery,
    ) -> StoreResult<Vec<QueueEntry>> {
        Ok(NotificationQueueRepo::list(&self.pool, tenant, status, params).await?)
    }

    async fn has_active_sibling(&self, tenant: TenantId, entry: &QueueEntry) -> StoreResult<bool> {
        Ok(NotificationQueueRepo::has_active_sibling(&self.pool, tenant, entry).await?)
    }

    async fn reset_for_resend(
        &self,
        tenant: TenantId,
        id: DbId,
        now: Timestamp,
    ) -> StoreResult<Option<QueueEntry>> {
        Ok(NotificationQueueRepo::reset_for_resend(&self.pool, tenant, id, now).await?)
    }
}
