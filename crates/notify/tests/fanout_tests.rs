//! Queue writer: row shape, idempotence, quiet hours and audit behaviour.

mod common;

use academy_core::delivery::QueueStatus;
use academy_core::template::{VAR_ATTENDANCE_STATUS, VAR_SESSION_DATE, VAR_SESSION_TIME, VAR_STUDENT_NAME};
use academy_db::models::audit::{ACTION_NOTIFICATION_ENQUEUED, ACTION_NOTIFICATION_SKIPPED};
use academy_notify::fanout::{enqueue_notification, EnqueueOptions};
use academy_notify::gate::SkipReason;
use academy_notify::testing::fixtures;
use chrono::{TimeDelta, TimeZone};
use common::*;

#[tokio::test]
async fn one_pending_row_per_contact_with_identical_variables() {
    let store = seeded_store(
        "ABSENT",
        &["010-1111-2222", "010 3333 4444", "+82 10-5555-6666"],
    )
    .await;
    let now = afternoon();

    let outcome = enqueue(&store, ACADEMY, ATTENDANCE_ID, now).await;

    assert!(!outcome.skipped);
    assert_eq!(outcome.reason, None);
    assert_eq!(outcome.queue_ids.len(), 3);

    let rows = store.entries().await;
    assert_eq!(rows.len(), 3);
    let phones: Vec<&str> = rows.iter().map(|r| r.recipient_phone.as_str()).collect();
    assert_eq!(phones, ["01011112222", "01033334444", "821055556666"]);

    for row in &rows {
        assert_eq!(row.status(), Some(QueueStatus::Pending));
        assert_eq!(row.attempts, 0);
        assert_eq!(row.academy_id, ACADEMY.get());
        assert_eq!(row.attendance_status, "ABSENT");
        assert_eq!(row.template_code, "TPL_ABSENT");
        assert_eq!(row.sender_key, "sender-1");
        assert_eq!(row.scheduled_at, now);
        assert_eq!(row.next_retry_at, now);
        assert_eq!(row.variables.0, rows[0].variables.0);
    }

    let vars = &rows[0].variables.0;
    assert_eq!(vars[VAR_STUDENT_NAME], "Kim Minji");
    assert_eq!(vars[VAR_SESSION_DATE], "2025-03-10");
    assert_eq!(vars[VAR_SESSION_TIME], "16:30");
    assert_eq!(vars[VAR_ATTENDANCE_STATUS], "absent");
}

#[tokio::test]
async fn second_trigger_for_same_mark_creates_nothing() {
    let store = seeded_store("LATE", &["010-1111-2222", "010-3333-4444"]).await;

    let first = enqueue(&store, ACADEMY, ATTENDANCE_ID, afternoon()).await;
    let second = enqueue(&store, ACADEMY, ATTENDANCE_ID, afternoon()).await;

    assert_eq!(first.queue_ids.len(), 2);
    assert!(second.skipped);
    assert_eq!(second.reason, Some(SkipReason::DedupSkip));
    assert!(second.queue_ids.is_empty());
    assert_eq!(store.entries().await.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_triggers_for_same_mark_enqueue_once() {
    let store = seeded_store("ABSENT", &["010-1111-2222", "010-3333-4444"]).await;

    let outcomes = futures::future::join_all((0..8).map(|_| {
        let store = store.clone();
        tokio::spawn(async move { enqueue(&store, ACADEMY, ATTENDANCE_ID, afternoon()).await })
    }))
    .await;

    let outcomes: Vec<_> = outcomes.into_iter().map(|r| r.unwrap()).collect();
    assert_eq!(outcomes.iter().filter(|o| !o.skipped).count(), 1);
    assert!(outcomes
        .iter()
        .filter(|o| o.skipped)
        .all(|o| o.reason == Some(SkipReason::DedupSkip)));
    assert_eq!(store.entries().await.len(), 2);
}

#[tokio::test]
async fn status_change_enqueues_for_the_new_status() {
    let store = seeded_store("LATE", &["010-1111-2222"]).await;
    enqueue(&store, ACADEMY, ATTENDANCE_ID, afternoon()).await;

    store.set_attendance_status(ATTENDANCE_ID, "ABSENT").await;
    let outcome = enqueue(&store, ACADEMY, ATTENDANCE_ID, afternoon()).await;

    assert_eq!(outcome.queue_ids.len(), 1);
    let rows = store.entries().await;
    assert_eq!(rows[0].attendance_status, "LATE");
    assert_eq!(rows[1].attendance_status, "ABSENT");
    assert_eq!(rows[1].template_code, "TPL_ABSENT");
}

#[tokio::test]
async fn resend_allowed_enqueues_again() {
    let store = seeded_store("ABSENT", &["010-1111-2222"]).await;
    let mut settings = fixtures::settings(ACADEMY.get());
    settings.allow_resend_on_status_change = true;
    store.put_settings(settings).await;

    enqueue(&store, ACADEMY, ATTENDANCE_ID, afternoon()).await;
    let again = enqueue(&store, ACADEMY, ATTENDANCE_ID, afternoon()).await;

    assert!(!again.skipped);
    assert_eq!(store.entries().await.len(), 2);
}

#[tokio::test]
async fn disabled_channel_creates_no_rows_and_audits_the_reason() {
    let store = seeded_store("ABSENT", &["010-1111-2222"]).await;
    let mut settings = fixtures::settings(ACADEMY.get());
    settings.enabled = false;
    store.put_settings(settings).await;

    let outcome = enqueue(&store, ACADEMY, ATTENDANCE_ID, afternoon()).await;

    assert!(outcome.skipped);
    assert_eq!(outcome.reason, Some(SkipReason::Disabled));
    assert!(store.entries().await.is_empty());

    let audits = store.audits().await;
    assert_eq!(audits.len(), 1);
    let (tenant, audit) = &audits[0];
    assert_eq!(*tenant, ACADEMY);
    assert_eq!(audit.action_type, ACTION_NOTIFICATION_SKIPPED);
    assert_eq!(audit.user_id, Some(7));
    assert_eq!(audit.details_json.as_ref().unwrap()["reason"], "DISABLED");
}

#[tokio::test]
async fn toggle_off_creates_no_rows() {
    let store = seeded_store("LATE", &["010-1111-2222"]).await;
    let mut settings = fixtures::settings(ACADEMY.get());
    settings.notify_late = false;
    store.put_settings(settings).await;

    let outcome = enqueue(&store, ACADEMY, ATTENDANCE_ID, afternoon()).await;

    assert_eq!(outcome.reason, Some(SkipReason::PolicyOffForStatus));
    assert!(store.entries().await.is_empty());
}

#[tokio::test]
async fn no_contacts_creates_no_rows() {
    let store = seeded_store("ABSENT", &[]).await;

    let outcome = enqueue(&store, ACADEMY, ATTENDANCE_ID, afternoon()).await;

    assert_eq!(outcome.reason, Some(SkipReason::NoOptedInContacts));
    assert!(outcome.reason.unwrap().code().contains("CONTACTS"));
    assert!(store.entries().await.is_empty());
}

#[tokio::test]
async fn enqueued_audit_summarises_the_fan_out() {
    let store = seeded_store("ABSENT", &["010-1111-2222", "010-3333-4444"]).await;

    let outcome = enqueue(&store, ACADEMY, ATTENDANCE_ID, afternoon()).await;

    let audits = store.audits().await;
    assert_eq!(audits.len(), 1);
    let details = audits[0].1.details_json.clone().unwrap();
    assert_eq!(audits[0].1.action_type, ACTION_NOTIFICATION_ENQUEUED);
    assert_eq!(details["attendance_id"], ATTENDANCE_ID);
    assert_eq!(details["status"], "ABSENT");
    assert_eq!(details["contact_count"], 2);
    assert_eq!(details["queue_ids"], serde_json::json!(outcome.queue_ids));
}

#[tokio::test]
async fn audit_failure_does_not_fail_the_enqueue() {
    let store = seeded_store("ABSENT", &["010-1111-2222"]).await;
    store.fail_audit_writes(true);

    let outcome = enqueue(&store, ACADEMY, ATTENDANCE_ID, afternoon()).await;

    assert_eq!(outcome.queue_ids.len(), 1);
    assert!(store.audits().await.is_empty());
}

#[tokio::test]
async fn quiet_hours_defer_to_the_window_end() {
    let store = seeded_store("ABSENT", &["010-1111-2222"]).await;
    let mut settings = fixtures::settings(ACADEMY.get());
    settings.quiet_hours_enabled = true;
    settings.quiet_hours_start = "21:00".into();
    settings.quiet_hours_end = "08:00".into();
    store.put_settings(settings).await;

    let now = kst_at(23, 15);
    enqueue(&store, ACADEMY, ATTENDANCE_ID, now).await;

    let expected = kst()
        .with_ymd_and_hms(2025, 3, 11, 8, 0, 0)
        .single()
        .unwrap()
        .with_timezone(&chrono::Utc);
    let row = &store.entries().await[0];
    assert_eq!(row.scheduled_at, expected);
    assert_eq!(row.next_retry_at, expected);
}

#[tokio::test]
async fn outside_quiet_hours_sends_now() {
    let store = seeded_store("ABSENT", &["010-1111-2222"]).await;
    let mut settings = fixtures::settings(ACADEMY.get());
    settings.quiet_hours_enabled = true;
    settings.quiet_hours_start = "21:00".into();
    settings.quiet_hours_end = "08:00".into();
    store.put_settings(settings).await;

    let now = kst_at(8, 0);
    enqueue(&store, ACADEMY, ATTENDANCE_ID, now).await;

    assert_eq!(store.entries().await[0].scheduled_at, now);
}

#[tokio::test]
async fn malformed_quiet_hours_are_ignored() {
    let store = seeded_store("ABSENT", &["010-1111-2222"]).await;
    let mut settings = fixtures::settings(ACADEMY.get());
    settings.quiet_hours_enabled = true;
    settings.quiet_hours_start = "late evening".into();
    store.put_settings(settings).await;

    let now = kst_at(23, 0);
    enqueue(&store, ACADEMY, ATTENDANCE_ID, now).await;

    assert_eq!(store.entries().await[0].scheduled_at, now);
}

#[tokio::test]
async fn explicit_schedule_overrides_quiet_hours() {
    let store = seeded_store("ABSENT", &["010-1111-2222"]).await;
    let now = afternoon();
    let later = now + TimeDelta::hours(2);

    enqueue_notification(
        &*store,
        ACADEMY,
        ATTENDANCE_ID,
        None,
        now,
        &kst(),
        &EnqueueOptions {
            scheduled_at: Some(later),
        },
    )
    .await
    .unwrap();

    let row = &store.entries().await[0];
    assert_eq!(row.scheduled_at, later);
    assert_eq!(row.next_retry_at, later);
}

#[tokio::test]
async fn tenants_only_reach_their_own_contacts() {
    let store = seeded_store("ABSENT", &["010-1111-2222"]).await;

    enqueue(&store, ACADEMY, ATTENDANCE_ID, afternoon()).await;
    enqueue(&store, OTHER_ACADEMY, OTHER_ATTENDANCE_ID, afternoon()).await;

    let rows = store.entries().await;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].academy_id, ACADEMY.get());
    assert_eq!(rows[0].recipient_phone, "01011112222");
    assert_eq!(rows[1].academy_id, OTHER_ACADEMY.get());
    assert_eq!(rows[1].recipient_phone, "01099990000");
    assert_eq!(rows[1].sender_key, "sender-2");
}
