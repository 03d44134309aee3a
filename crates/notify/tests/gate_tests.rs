//! Skip reasons and check ordering of the policy and dedup gate.

mod common;

use academy_core::attendance::TemplateType;
use academy_notify::gate::{evaluate, GateDecision, SkipReason};
use academy_notify::testing::fixtures;
use assert_matches::assert_matches;
use common::*;

async fn skip_reason(store: &academy_notify::testing::MemoryStore, attendance_id: i64) -> SkipReason {
    match evaluate(store, ACADEMY, attendance_id).await.unwrap() {
        GateDecision::Skip(reason) => reason,
        GateDecision::Proceed(r) => panic!("expected skip, got proceed for {:?}", r.context),
    }
}

#[tokio::test]
async fn proceeds_with_contacts_and_template() {
    let store = seeded_store("LATE", &["010-1111-2222", "010-3333-4444"]).await;

    let decision = evaluate(&*store, ACADEMY, ATTENDANCE_ID).await.unwrap();

    let recipients = assert_matches!(decision, GateDecision::Proceed(r) => r);
    assert_eq!(recipients.template_type, TemplateType::Late);
    assert_eq!(recipients.contacts.len(), 2);
    assert_eq!(recipients.template.template_code, "TPL_LATE");
    assert!(!recipients.resend);
}

#[tokio::test]
async fn unknown_attendance_is_source_not_found() {
    let store = seeded_store("ABSENT", &["010-1111-2222"]).await;
    assert_eq!(skip_reason(&store, 999).await, SkipReason::SourceNotFound);
}

#[tokio::test]
async fn other_tenants_attendance_is_invisible() {
    let store = seeded_store("ABSENT", &["010-1111-2222"]).await;
    assert_eq!(
        skip_reason(&store, OTHER_ATTENDANCE_ID).await,
        SkipReason::SourceNotFound
    );
}

#[tokio::test]
async fn cancelled_session_is_not_notifiable() {
    let store = academy_notify::testing::MemoryStore::new();
    let mut attendance = fixtures::attendance(ACADEMY.get(), ATTENDANCE_ID, STUDENT_ID, "ABSENT");
    attendance.session_status = "CANCELLED".into();
    store.add_attendance(attendance).await;
    // Everything else is missing too; the session check must win.
    assert_eq!(
        skip_reason(&store, ATTENDANCE_ID).await,
        SkipReason::SessionNotNotifiable
    );
}

#[tokio::test]
async fn present_is_not_notifiable() {
    let store = seeded_store("PRESENT", &["010-1111-2222"]).await;
    assert_eq!(
        skip_reason(&store, ATTENDANCE_ID).await,
        SkipReason::StatusNotNotifiable
    );
}

#[tokio::test]
async fn missing_settings_count_as_disabled() {
    let store = academy_notify::testing::MemoryStore::new();
    store
        .add_attendance(fixtures::attendance(ACADEMY.get(), ATTENDANCE_ID, STUDENT_ID, "ABSENT"))
        .await;
    assert_eq!(skip_reason(&store, ATTENDANCE_ID).await, SkipReason::Disabled);
}

#[tokio::test]
async fn disabled_channel_skips() {
    let store = seeded_store("ABSENT", &["010-1111-2222"]).await;
    let mut settings = fixtures::settings(ACADEMY.get());
    settings.enabled = false;
    store.put_settings(settings).await;

    assert_eq!(skip_reason(&store, ATTENDANCE_ID).await, SkipReason::Disabled);
}

#[tokio::test]
async fn per_status_toggle_skips_only_that_status() {
    let store = seeded_store("EXCUSED", &["010-1111-2222"]).await;
    let mut settings = fixtures::settings(ACADEMY.get());
    settings.notify_excused = false;
    store.put_settings(settings).await;

    assert_eq!(
        skip_reason(&store, ATTENDANCE_ID).await,
        SkipReason::PolicyOffForStatus
    );

    store.set_attendance_status(ATTENDANCE_ID, "ABSENT").await;
    assert_matches!(
        evaluate(&*store, ACADEMY, ATTENDANCE_ID).await.unwrap(),
        GateDecision::Proceed(_)
    );
}

#[tokio::test]
async fn opted_out_and_inactive_contacts_are_not_recipients() {
    let store = seeded_store("ABSENT", &[]).await;
    let mut opted_out = fixtures::contact(ACADEMY.get(), 1, STUDENT_ID, "010-1111-2222");
    opted_out.opted_in = false;
    let mut inactive = fixtures::contact(ACADEMY.get(), 2, STUDENT_ID, "010-3333-4444");
    inactive.status = "INACTIVE".into();
    store.add_contact(opted_out).await;
    store.add_contact(inactive).await;

    assert_eq!(
        skip_reason(&store, ATTENDANCE_ID).await,
        SkipReason::NoOptedInContacts
    );
}

#[tokio::test]
async fn inactive_template_skips() {
    let store = academy_notify::testing::MemoryStore::new();
    store
        .add_attendance(fixtures::attendance(ACADEMY.get(), ATTENDANCE_ID, STUDENT_ID, "ABSENT"))
        .await;
    store.put_settings(fixtures::settings(ACADEMY.get())).await;
    store
        .add_contact(fixtures::contact(ACADEMY.get(), 1, STUDENT_ID, "010-1111-2222"))
        .await;
    let mut template = fixtures::template(ACADEMY.get(), 1, TemplateType::Absent);
    template.is_active = false;
    store.add_template(template).await;
    // Another academy's active template must not be borrowed.
    store
        .add_template(fixtures::template(OTHER_ACADEMY.get(), 2, TemplateType::Absent))
        .await;

    assert_eq!(
        skip_reason(&store, ATTENDANCE_ID).await,
        SkipReason::NoActiveTemplate
    );
}

#[tokio::test]
async fn dedup_hit_with_resend_allowed_proceeds_as_resend() {
    let store = seeded_store("ABSENT", &["010-1111-2222"]).await;
    enqueue(&store, ACADEMY, ATTENDANCE_ID, afternoon()).await;

    assert_eq!(skip_reason(&store, ATTENDANCE_ID).await, SkipReason::DedupSkip);

    let mut settings = fixtures::settings(ACADEMY.get());
    settings.allow_resend_on_status_change = true;
    store.put_settings(settings).await;

    let recipients = assert_matches!(
        evaluate(&*store, ACADEMY, ATTENDANCE_ID).await.unwrap(),
        GateDecision::Proceed(r) => r
    );
    assert!(recipients.resend);
}
