//! Manual send and resend paths.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use academy_core::delivery::QueueStatus;
use academy_db::models::audit::{ACTION_NOTIFICATION_MANUAL_SEND, ACTION_NOTIFICATION_RESEND};
use academy_notify::gateway::{SendResult, ERROR_TRANSPORT};
use academy_notify::operations::{resend_entry, send_manual, ManualSendRequest, OperationError};
use academy_notify::testing::{fixtures, MemoryStore, ScriptedGateway};
use academy_notify::worker::DeliveryWorker;
use assert_matches::assert_matches;
use chrono::TimeDelta;
use common::*;

fn manual(phone: &str, template_code: &str) -> ManualSendRequest {
    ManualSendRequest {
        phone: phone.into(),
        template_code: template_code.into(),
        params: BTreeMap::from([("student_name".to_string(), "Lee".to_string())]),
        recipient_id: Some(42),
    }
}

/// Enqueue one entry and drive it to FAILED with a permanent error.
async fn failed_entry(store: &Arc<MemoryStore>) -> i64 {
    let gateway = Arc::new(ScriptedGateway::with_fallback(SendResult::failure(
        ERROR_TRANSPORT,
        "timeout",
        false,
    )));
    let id = enqueue(store, ACADEMY, ATTENDANCE_ID, afternoon()).await.queue_ids[0];
    DeliveryWorker::new(store.clone(), gateway, &worker_config(5))
        .sweep(afternoon())
        .await
        .unwrap();
    id
}

#[tokio::test]
async fn manual_send_uses_the_templates_sender_key() {
    let store = seeded_store("ABSENT", &[]).await;
    let gateway = ScriptedGateway::succeeding();

    let result = send_manual(&*store, &gateway, ACADEMY, 7, &manual("010-2222-3333", "TPL_LATE"))
        .await
        .unwrap();

    assert!(result.success);
    let requests = gateway.requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].sender_key, "sender-1");
    assert_eq!(requests[0].recipient_phone, "01022223333");
    assert_eq!(requests[0].variables["student_name"], "Lee");
    assert!(store.entries().await.is_empty());

    let audits = store.audits().await;
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].1.action_type, ACTION_NOTIFICATION_MANUAL_SEND);
    assert_eq!(audits[0].1.user_id, Some(7));
    assert_eq!(audits[0].1.entity_id, Some(42));
}

#[tokio::test]
async fn manual_send_rejects_bad_phone() {
    let store = seeded_store("ABSENT", &[]).await;
    let gateway = ScriptedGateway::succeeding();

    let err = send_manual(&*store, &gateway, ACADEMY, 7, &manual("12", "TPL_LATE"))
        .await
        .unwrap_err();

    assert_matches!(err, OperationError::InvalidRecipient(_));
    assert_eq!(gateway.calls(), 0);
}

#[tokio::test]
async fn manual_send_cannot_use_another_tenants_template() {
    let store = seeded_store("ABSENT", &[]).await;
    let mut foreign = fixtures::template(OTHER_ACADEMY.get(), 90, academy_core::attendance::TemplateType::Absent);
    foreign.template_code = "TPL_FOREIGN".into();
    store.add_template(foreign).await;
    let gateway = ScriptedGateway::succeeding();

    let err = send_manual(&*store, &gateway, ACADEMY, 7, &manual("010-2222-3333", "TPL_FOREIGN"))
        .await
        .unwrap_err();

    assert_matches!(err, OperationError::TemplateNotFound(code) if code == "TPL_FOREIGN");
    assert_eq!(gateway.calls(), 0);
}

#[tokio::test]
async fn gateway_failure_is_returned_not_raised() {
    let store = seeded_store("ABSENT", &[]).await;
    let gateway = ScriptedGateway::with_fallback(SendResult::failure("HTTP_500", "boom", true));

    let result = send_manual(&*store, &gateway, ACADEMY, 7, &manual("010-2222-3333", "TPL_LATE"))
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.error_code.as_deref(), Some("HTTP_500"));
}

#[tokio::test]
async fn failed_entry_can_be_resent() {
    let store = seeded_store("ABSENT", &["010-1111-2222"]).await;
    let id = failed_entry(&store).await;
    let now = afternoon() + TimeDelta::minutes(5);

    let entry = resend_entry(&*store, ACADEMY, id, 7, now).await.unwrap();

    assert_eq!(entry.status(), Some(QueueStatus::Pending));
    assert_eq!(entry.attempts, 0);
    assert_eq!(entry.next_retry_at, now);
    assert_eq!(entry.last_error_code, None);

    let audits = store.audits().await;
    assert_eq!(audits.last().unwrap().1.action_type, ACTION_NOTIFICATION_RESEND);

    let gateway = Arc::new(ScriptedGateway::succeeding());
    let summary = DeliveryWorker::new(store.clone(), gateway, &worker_config(5))
        .sweep(now)
        .await
        .unwrap();
    assert_eq!(summary.succeeded, 1);
}

#[tokio::test]
async fn only_failed_entries_can_be_resent() {
    let store = seeded_store("ABSENT", &["010-1111-2222"]).await;
    let id = enqueue(&store, ACADEMY, ATTENDANCE_ID, afternoon()).await.queue_ids[0];

    let err = resend_entry(&*store, ACADEMY, id, 7, afternoon()).await.unwrap_err();

    assert_matches!(
        err,
        OperationError::NotResendable {
            status: QueueStatus::Pending,
            ..
        }
    );
}

#[tokio::test]
async fn resend_refused_while_a_sibling_is_active() {
    let store = seeded_store("ABSENT", &["010-1111-2222"]).await;
    let id = failed_entry(&store).await;
    // The failed row no longer blocks the gate, so a new trigger enqueues.
    let again = enqueue(&store, ACADEMY, ATTENDANCE_ID, afternoon()).await;
    assert_eq!(again.queue_ids.len(), 1);

    let err = resend_entry(&*store, ACADEMY, id, 7, afternoon()).await.unwrap_err();
    assert_matches!(err, OperationError::DuplicateActive(_));

    let mut settings = fixtures::settings(ACADEMY.get());
    settings.allow_resend_on_status_change = true;
    store.put_settings(settings).await;
    assert!(resend_entry(&*store, ACADEMY, id, 7, afternoon()).await.is_ok());
}

#[tokio::test]
async fn resend_cannot_reach_another_tenants_entry() {
    let store = seeded_store("ABSENT", &["010-1111-2222"]).await;
    let id = failed_entry(&store).await;

    let err = resend_entry(&*store, OTHER_ACADEMY, id, 7, afternoon()).await.unwrap_err();

    assert_matches!(err, OperationError::EntryNotFound(found) if found == id);
    assert_eq!(
        store.entry(id).await.unwrap().status(),
        Some(QueueStatus::Failed)
    );
}
