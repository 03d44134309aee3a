//! In-memory [`NotificationStore`] and scripted [`MessageGateway`] for tests.
//!
//! Enabled with the `testing` feature. The store keeps every table in one
//! `tokio::sync::Mutex`, so each trait call is atomic the same way a single
//! conditional `UPDATE` is in Postgres.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use academy_core::attendance::{TemplateType, CONTACT_STATUS_ACTIVE};
use academy_core::delivery::{state_machine, QueueStatus, ACTIVE_STATUSES};
use academy_core::types::{DbId, TenantId, Timestamp};
use academy_db::models::attendance::AttendanceContext;
use academy_db::models::audit::CreateAuditLog;
use academy_db::models::contact::ParentContact;
use academy_db::models::queue::{
    DeliveryError, DueEntry, NewQueueEntry, QueueEntry, QueueListQuery,
};
use academy_db::models::settings::AcademyNotificationSettings;
use academy_db::models::template::MessageTemplate;
use academy_db::repositories::notification_queue_repo::ERROR_CLAIM_EXPIRED;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use sqlx::types::Json;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::gateway::{MessageGateway, SendRequest, SendResult};
use crate::store::{NotificationStore, StoreResult};

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Tables {
    attendances: Vec<AttendanceContext>,
    settings: HashMap<DbId, AcademyNotificationSettings>,
    contacts: Vec<ParentContact>,
    templates: Vec<MessageTemplate>,
    queue: Vec<QueueEntry>,
    audits: Vec<(TenantId, CreateAuditLog)>,
    next_queue_id: DbId,
}

impl Tables {
    fn queue_mut(&mut self, tenant: TenantId, id: DbId) -> Option<&mut QueueEntry> {
        self.queue
            .iter_mut()
            .find(|e| e.id == id && e.academy_id == tenant.get())
    }

    /// Whether the entry is PROCESSING under exactly `lease`.
    fn holds_lease(&mut self, tenant: TenantId, id: DbId, lease: Timestamp) -> bool {
        self.queue_mut(tenant, id).is_some_and(|e| {
            e.status_id == QueueStatus::Processing.id() && e.claimed_at == Some(lease)
        })
    }

    /// Apply `update` only if the entry is in `expected` and the state
    /// machine permits moving it to `to`.
    fn transition(
        &mut self,
        tenant: TenantId,
        id: DbId,
        expected: QueueStatus,
        to: QueueStatus,
        update: impl FnOnce(&mut QueueEntry),
    ) -> bool {
        let Some(entry) = self.queue_mut(tenant, id) else {
            return false;
        };
        if entry.status_id != expected.id() || !state_machine::can_transition(expected, to) {
            return false;
        }
        entry.status_id = to.id();
        entry.updated_at = Utc::now();
        update(entry);
        true
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_audit: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_attendance(&self, attendance: AttendanceContext) {
        self.tables.lock().await.attendances.push(attendance);
    }

    pub async fn set_attendance_status(&self, attendance_id: DbId, status: &str) {
        let mut tables = self.tables.lock().await;
        if let Some(a) = tables
            .attendances
            .iter_mut()
            .find(|a| a.attendance_id == attendance_id)
        {
            a.status = status.to_string();
        }
    }

    pub async fn put_settings(&self, settings: AcademyNotificationSettings) {
        self.tables
            .lock()
            .await
            .settings
            .insert(settings.academy_id, settings);
    }

    pub async fn add_contact(&self, contact: ParentContact) {
        self.tables.lock().await.contacts.push(contact);
    }

    pub async fn add_template(&self, template: MessageTemplate) {
        self.tables.lock().await.templates.push(template);
    }

    /// Make every `record_audit` call fail.
    pub fn fail_audit_writes(&self, fail: bool) {
        self.fail_audit.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of every queue row, across tenants, in insertion order.
    pub async fn entries(&self) -> Vec<QueueEntry> {
        self.tables.lock().await.queue.clone()
    }

    pub async fn entry(&self, id: DbId) -> Option<QueueEntry> {
        self.tables
            .lock()
            .await
            .queue
            .iter()
            .find(|e| e.id == id)
            .cloned()
    }

    pub async fn audits(&self) -> Vec<(TenantId, CreateAuditLog)> {
        self.tables.lock().await.audits.clone()
    }

    /// Overwrite a row directly, bypassing the state machine.
    pub async fn update_entry(&self, id: DbId, update: impl FnOnce(&mut QueueEntry)) {
        let mut tables = self.tables.lock().await;
        if let Some(entry) = tables.queue.iter_mut().find(|e| e.id == id) {
            update(entry);
        }
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn find_attendance(
        &self,
        tenant: TenantId,
        attendance_id: DbId,
    ) -> StoreResult<Option<AttendanceContext>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .attendances
            .iter()
            .find(|a| a.attendance_id == attendance_id && a.academy_id == tenant.get())
            .cloned())
    }

    async fn settings(&self, tenant: TenantId) -> StoreResult<Option<AcademyNotificationSettings>> {
        Ok(self.tables.lock().await.settings.get(&tenant.get()).cloned())
    }

    async fn eligible_contacts(
        &self,
        tenant: TenantId,
        student_id: DbId,
    ) -> StoreResult<Vec<ParentContact>> {
        let tables = self.tables.lock().await;
        let mut contacts: Vec<ParentContact> = tables
            .contacts
            .iter()
            .filter(|c| {
                c.academy_id == tenant.get()
                    && c.student_id == student_id
                    && c.opted_in
                    && c.status == CONTACT_STATUS_ACTIVE
            })
            .cloned()
            .collect();
        contacts.sort_by_key(|c| c.id);
        Ok(contacts)
    }

    async fn active_template(
        &self,
        tenant: TenantId,
        template_type: TemplateType,
    ) -> StoreResult<Option<MessageTemplate>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .templates
            .iter()
            .filter(|t| {
                t.academy_id == tenant.get()
                    && t.is_active
                    && t.template_type == template_type.as_str()
            })
            .max_by_key(|t| t.id)
            .cloned())
    }

    async fn active_template_by_code(
        &self,
        tenant: TenantId,
        template_code: &str,
    ) -> StoreResult<Option<MessageTemplate>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .templates
            .iter()
            .filter(|t| {
                t.academy_id == tenant.get() && t.is_active && t.template_code == template_code
            })
            .max_by_key(|t| t.id)
            .cloned())
    }

    async fn has_active_entry(
        &self,
        tenant: TenantId,
        attendance_id: DbId,
        attendance_status: &str,
    ) -> StoreResult<bool> {
        let tables = self.tables.lock().await;
        Ok(tables.queue.iter().any(|e| {
            e.academy_id == tenant.get()
                && e.attendance_id == attendance_id
                && e.attendance_status == attendance_status
                && is_active(e)
        }))
    }

    async fn insert_entries(
        &self,
        tenant: TenantId,
        entries: &[NewQueueEntry],
        skip_if_active: bool,
    ) -> StoreResult<Vec<DbId>> {
        let mut tables = self.tables.lock().await;
        if let (true, Some(first)) = (skip_if_active, entries.first()) {
            let active = tables.queue.iter().any(|e| {
                e.academy_id == tenant.get()
                    && e.attendance_id == first.attendance_id
                    && e.attendance_status == first.attendance_status
                    && is_active(e)
            });
            if active {
                return Ok(Vec::new());
            }
        }
        let now = Utc::now();
        let mut ids = Vec::with_capacity(entries.len());
        for new in entries {
            tables.next_queue_id += 1;
            let id = tables.next_queue_id;
            tables.queue.push(QueueEntry {
                id,
                academy_id: tenant.get(),
                channel: new.channel.clone(),
                event_type: new.event_type.clone(),
                attendance_id: new.attendance_id,
                attendance_status: new.attendance_status.clone(),
                student_id: new.student_id,
                parent_contact_id: new.parent_contact_id,
                recipient_phone: new.recipient_phone.clone(),
                template_code: new.template_code.clone(),
                sender_key: new.sender_key.clone(),
                variables: Json(new.variables.clone()),
                status_id: QueueStatus::Pending.id(),
                scheduled_at: new.scheduled_at,
                next_retry_at: new.next_retry_at,
                attempts: 0,
                claimed_at: None,
                sent_at: None,
                provider_message_id: None,
                last_error_code: None,
                last_error_message: None,
                created_at: now,
                updated_at: now,
            });
            ids.push(id);
        }
        Ok(ids)
    }

    async fn record_audit(&self, tenant: TenantId, entry: &CreateAuditLog) -> StoreResult<()> {
        if self.fail_audit.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("audit log offline".into()));
        }
        self.tables.lock().await.audits.push((tenant, entry.clone()));
        Ok(())
    }

    async fn find_due(&self, now: Timestamp, limit: i64) -> StoreResult<Vec<DueEntry>> {
        let tables = self.tables.lock().await;
        let mut due: Vec<&QueueEntry> = tables
            .queue
            .iter()
            .filter(|e| e.status_id == QueueStatus::Pending.id() && e.next_retry_at <= now)
            .collect();
        due.sort_by_key(|e| (e.next_retry_at, e.id));
        Ok(due
            .into_iter()
            .take(usize::try_from(limit).unwrap_or(0))
            .map(|e| DueEntry {
                id: e.id,
                academy_id: e.academy_id,
            })
            .collect())
    }

    async fn reclaim_stale(&self, cutoff: Timestamp, max_attempts: i32) -> StoreResult<u64> {
        let mut tables = self.tables.lock().await;
        let mut reclaimed = 0;
        for entry in tables.queue.iter_mut() {
            let stale = entry.status_id == QueueStatus::Processing.id()
                && entry.claimed_at.is_some_and(|at| at < cutoff);
            if !stale {
                continue;
            }
            entry.attempts += 1;
            entry.status_id = if entry.attempts >= max_attempts {
                QueueStatus::Failed.id()
            } else {
                QueueStatus::Pending.id()
            };
            entry.claimed_at = None;
            entry.last_error_code = Some(ERROR_CLAIM_EXPIRED.to_string());
            entry.last_error_message = Some("processing claim expired before completion".into());
            reclaimed += 1;
        }
        Ok(reclaimed)
    }

    async fn claim(
        &self,
        tenant: TenantId,
        id: DbId,
        at: Timestamp,
    ) -> StoreResult<Option<QueueEntry>> {
        let mut tables = self.tables.lock().await;
        let due = tables
            .queue_mut(tenant, id)
            .is_some_and(|e| e.next_retry_at <= at);
        if !due {
            return Ok(None);
        }
        let claimed = tables.transition(
            tenant,
            id,
            QueueStatus::Pending,
            QueueStatus::Processing,
            |e| e.claimed_at = Some(at),
        );
        if !claimed {
            return Ok(None);
        }
        Ok(tables.queue_mut(tenant, id).map(|e| e.clone()))
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
        let mut tables = self.tables.lock().await;
        if !tables.holds_lease(tenant, id, lease) {
            return Ok(false);
        }
        Ok(tables.transition(tenant, id, QueueStatus::Processing, QueueStatus::Sent, |e| {
            e.attempts = attempts;
            e.provider_message_id = provider_message_id.map(str::to_string);
            e.sent_at = Some(now);
            e.claimed_at = None;
            e.last_error_code = None;
            e.last_error_message = None;
        }))
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
        let mut tables = self.tables.lock().await;
        if !tables.holds_lease(tenant, id, lease) {
            return Ok(false);
        }
        Ok(tables.transition(
            tenant,
            id,
            QueueStatus::Processing,
            QueueStatus::Pending,
            |e| {
                e.attempts = attempts;
                e.next_retry_at = next_retry_at;
                e.claimed_at = None;
                e.last_error_code = Some(error.code.clone());
                e.last_error_message = Some(error.message.clone());
            },
        ))
    }

    async fn mark_failed(
        &self,
        tenant: TenantId,
        id: DbId,
        lease: Timestamp,
        attempts: i32,
        error: &DeliveryError,
    ) -> StoreResult<bool> {
        let mut tables = self.tables.lock().await;
        if !tables.holds_lease(tenant, id, lease) {
            return Ok(false);
        }
        Ok(tables.transition(tenant, id, QueueStatus::Processing, QueueStatus::Failed, |e| {
            e.attempts = attempts;
            e.claimed_at = None;
            e.last_error_code = Some(error.code.clone());
            e.last_error_message = Some(error.message.clone());
        }))
    }

    async fn find_entry(&self, tenant: TenantId, id: DbId) -> StoreResult<Option<QueueEntry>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .queue
            .iter()
            .find(|e| e.id == id && e.academy_id == tenant.get())
            .cloned())
    }

    async fn list_entries(
        &self,
        tenant: TenantId,
        status: Option<QueueStatus>,
        params: &QueueListQuery,
    ) -> StoreResult<Vec<QueueEntry>> {
        let tables = self.tables.lock().await;
        let limit = params.limit.unwrap_or(50).clamp(1, 100) as usize;
        let offset = params.offset.unwrap_or(0).max(0) as usize;
        let mut rows: Vec<QueueEntry> = tables
            .queue
            .iter()
            .filter(|e| e.academy_id == tenant.get())
            .filter(|e| status.map_or(true, |s| e.status_id == s.id()))
            .filter(|e| params.attendance_id.map_or(true, |a| e.attendance_id == a))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    async fn has_active_sibling(&self, tenant: TenantId, entry: &QueueEntry) -> StoreResult<bool> {
        let tables = self.tables.lock().await;
        Ok(tables.queue.iter().any(|e| {
            e.academy_id == tenant.get()
                && e.id != entry.id
                && e.attendance_id == entry.attendance_id
                && e.attendance_status == entry.attendance_status
                && e.parent_contact_id == entry.parent_contact_id
                && is_active(e)
        }))
    }

    async fn reset_for_resend(
        &self,
        tenant: TenantId,
        id: DbId,
        now: Timestamp,
    ) -> StoreResult<Option<QueueEntry>> {
        let mut tables = self.tables.lock().await;
        let Some(entry) = tables.queue_mut(tenant, id) else {
            return Ok(None);
        };
        if entry.status_id != QueueStatus::Failed.id() {
            return Ok(None);
        }
        entry.status_id = QueueStatus::Pending.id();
        entry.attempts = 0;
        entry.next_retry_at = now;
        entry.claimed_at = None;
        entry.last_error_code = None;
        entry.last_error_message = None;
        entry.updated_at = Utc::now();
        Ok(Some(entry.clone()))
    }
}

fn is_active(entry: &QueueEntry) -> bool {
    ACTIVE_STATUSES.iter().any(|s| s.id() == entry.status_id)
}

// ---------------------------------------------------------------------------
// ScriptedGateway
// ---------------------------------------------------------------------------

/// Gateway that replays queued results, then a fallback, and records calls.
#[derive(Debug)]
pub struct ScriptedGateway {
    script: Mutex<VecDeque<SendResult>>,
    fallback: SendResult,
    requests: Mutex<Vec<SendRequest>>,
    calls: AtomicUsize,
    delay: Duration,
}

impl ScriptedGateway {
    /// Every call succeeds with a generated message id.
    pub fn succeeding() -> Self {
        Self::with_fallback(SendResult::sent(None))
    }

    pub fn with_fallback(fallback: SendResult) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    /// Queue results returned, in order, before the fallback.
    pub fn then(self, results: impl IntoIterator<Item = SendResult>) -> Self {
        let script = results.into_iter().collect();
        Self {
            script: Mutex::new(script),
            ..self
        }
    }

    /// Sleep before answering, to widen race windows in concurrency tests.
    pub fn with_delay(self, delay: Duration) -> Self {
        Self { delay, ..self }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn requests(&self) -> Vec<SendRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl MessageGateway for ScriptedGateway {
    async fn send(&self, request: &SendRequest) -> SendResult {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().await.push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let scripted = self.script.lock().await.pop_front();
        scripted.unwrap_or_else(|| {
            let mut result = self.fallback.clone();
            if result.success && result.provider_message_id.is_none() {
                result.provider_message_id = Some(format!("MID-{n}"));
            }
            result
        })
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Row builders with sensible defaults for tests.
pub mod fixtures {
    use super::*;

    /// 2025-03-10 07:30 UTC, i.e. 16:30 in UTC+09:00.
    pub fn session_start() -> Timestamp {
        Utc.with_ymd_and_hms(2025, 3, 10, 7, 30, 0)
            .single()
            .unwrap_or_default()
    }

    pub fn attendance(
        academy_id: DbId,
        attendance_id: DbId,
        student_id: DbId,
        status: &str,
    ) -> AttendanceContext {
        AttendanceContext {
            attendance_id,
            academy_id,
            academy_name: "Sunrise Math".into(),
            student_id,
            student_name: "Kim Minji".into(),
            status: status.into(),
            session_id: 500 + attendance_id,
            session_status: "COMPLETED".into(),
            session_starts_at: session_start(),
            class_id: 70,
            class_name: "Algebra II".into(),
            teacher_name: Some("Park".into()),
        }
    }

    /// Enabled, every toggle on, quiet hours off, resend disallowed.
    pub fn settings(academy_id: DbId) -> AcademyNotificationSettings {
        let now = Utc::now();
        AcademyNotificationSettings {
            academy_id,
            enabled: true,
            notify_absent: true,
            notify_late: true,
            notify_excused: true,
            quiet_hours_enabled: false,
            quiet_hours_start: "22:00".into(),
            quiet_hours_end: "08:00".into(),
            allow_resend_on_status_change: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn contact(academy_id: DbId, id: DbId, student_id: DbId, phone: &str) -> ParentContact {
        let now = Utc::now();
        ParentContact {
            id,
            academy_id,
            student_id,
            name: format!("Parent {id}"),
            phone: phone.into(),
            opted_in: true,
            status: CONTACT_STATUS_ACTIVE.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn template(academy_id: DbId, id: DbId, template_type: TemplateType) -> MessageTemplate {
        let now = Utc::now();
        MessageTemplate {
            id,
            academy_id,
            template_type: template_type.as_str().into(),
            template_code: format!("TPL_{}", template_type.as_str()),
            sender_key: format!("sender-{academy_id}"),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}
