#![allow(dead_code)]

use std::sync::Arc;

use academy_core::attendance::TemplateType;
use academy_core::quiet_hours::timezone_from_offset_minutes;
use academy_core::types::{DbId, TenantId, Timestamp};
use academy_notify::config::NotifyConfig;
use academy_notify::fanout::{enqueue_notification, EnqueueOptions, EnqueueOutcome};
use academy_notify::testing::{fixtures, MemoryStore};
use chrono::{DateTime, FixedOffset, TimeZone, Utc};

pub const ACADEMY: TenantId = TenantId(1);
pub const OTHER_ACADEMY: TenantId = TenantId(2);

pub const ATTENDANCE_ID: DbId = 10;
pub const STUDENT_ID: DbId = 100;

/// Attendance and student owned by [`OTHER_ACADEMY`].
pub const OTHER_ATTENDANCE_ID: DbId = 20;
pub const OTHER_STUDENT_ID: DbId = 200;

pub fn kst() -> FixedOffset {
    timezone_from_offset_minutes(540).unwrap()
}

/// An instant whose KST wall clock reads 2025-03-10 `hour:minute`.
pub fn kst_at(hour: u32, minute: u32) -> DateTime<Utc> {
    kst()
        .with_ymd_and_hms(2025, 3, 10, hour, minute, 0)
        .single()
        .unwrap()
        .with_timezone(&Utc)
}

/// Mid-afternoon, outside any quiet window used in the tests.
pub fn afternoon() -> Timestamp {
    kst_at(15, 0)
}

/// Store with academy 1 fully configured: one attendance mark with the
/// given status, a contact per phone and active templates for every type.
/// Academy 2 gets a mark and one contact of its own.
pub async fn seeded_store(status: &str, phones: &[&str]) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());

    store
        .add_attendance(fixtures::attendance(
            ACADEMY.get(),
            ATTENDANCE_ID,
            STUDENT_ID,
            status,
        ))
        .await;
    store.put_settings(fixtures::settings(ACADEMY.get())).await;
    for (i, phone) in phones.iter().enumerate() {
        store
            .add_contact(fixtures::contact(
                ACADEMY.get(),
                i as DbId + 1,
                STUDENT_ID,
                phone,
            ))
            .await;
    }
    for (i, t) in [TemplateType::Absent, TemplateType::Late, TemplateType::Excused]
        .into_iter()
        .enumerate()
    {
        store
            .add_template(fixtures::template(ACADEMY.get(), i as DbId + 1, t))
            .await;
    }

    store
        .add_attendance(fixtures::attendance(
            OTHER_ACADEMY.get(),
            OTHER_ATTENDANCE_ID,
            OTHER_STUDENT_ID,
            "ABSENT",
        ))
        .await;
    store.put_settings(fixtures::settings(OTHER_ACADEMY.get())).await;
    store
        .add_contact(fixtures::contact(
            OTHER_ACADEMY.get(),
            50,
            OTHER_STUDENT_ID,
            "010-9999-0000",
        ))
        .await;
    store
        .add_template(fixtures::template(OTHER_ACADEMY.get(), 50, TemplateType::Absent))
        .await;

    store
}

pub async fn enqueue(store: &MemoryStore, tenant: TenantId, attendance_id: DbId, now: Timestamp) -> EnqueueOutcome {
    enqueue_notification(
        store,
        tenant,
        attendance_id,
        Some(7),
        now,
        &kst(),
        &EnqueueOptions::default(),
    )
    .await
    .unwrap()
}

/// Worker configuration with a short attempt ceiling for retry tests.
pub fn worker_config(max_attempts: i32) -> NotifyConfig {
    let mut config = NotifyConfig::default();
    config.retry.max_attempts = max_attempts;
    config.sweep_concurrency = 4;
    config
}
