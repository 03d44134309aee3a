//! AlimTalk client against a local provider stub.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use academy_notify::config::GatewayConfig;
use academy_notify::gateway::{
    AlimTalkClient, CredentialSource, Credentials, MessageGateway, SendRequest,
    ERROR_MISSING_CREDENTIALS, ERROR_TRANSPORT,
};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Form, Router};

type Captured = Arc<Mutex<Vec<HashMap<String, String>>>>;

#[derive(Clone)]
struct Stub {
    status: StatusCode,
    body: &'static str,
    captured: Captured,
}

async fn send_handler(
    State(stub): State<Stub>,
    Form(form): Form<HashMap<String, String>>,
) -> (StatusCode, &'static str) {
    stub.captured.lock().unwrap().push(form);
    (stub.status, stub.body)
}

/// Serve `POST /akv10/alimtalk/send` on an ephemeral port.
async fn spawn_provider(status: StatusCode, body: &'static str) -> (String, Captured) {
    let captured: Captured = Arc::default();
    let app = Router::new()
        .route("/akv10/alimtalk/send", post(send_handler))
        .with_state(Stub {
            status,
            body,
            captured: captured.clone(),
        });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}/akv10/alimtalk"), captured)
}

fn client(base_url: String, retryable_codes: Vec<i64>) -> AlimTalkClient {
    AlimTalkClient::new(&GatewayConfig {
        base_url,
        retryable_codes,
    })
    .unwrap()
    .with_credentials(CredentialSource::Fixed(Credentials {
        api_key: "test-key".into(),
        user_id: "academy".into(),
    }))
}

fn request() -> SendRequest {
    SendRequest {
        sender_key: "sender-1".into(),
        template_code: "TPL_ABSENT".into(),
        recipient_phone: "01011112222".into(),
        variables: BTreeMap::from([
            ("student_name".to_string(), "Kim Minji".to_string()),
            ("attendance_status".to_string(), "absent".to_string()),
        ]),
    }
}

#[tokio::test]
async fn posts_one_form_encoded_message() {
    let (base_url, captured) = spawn_provider(
        StatusCode::OK,
        r#"{"code":0,"message":"success","info":{"mid":"MID-777"}}"#,
    )
    .await;

    let result = client(base_url, vec![]).send(&request()).await;

    assert!(result.success);
    assert_eq!(result.provider_message_id.as_deref(), Some("MID-777"));

    let forms = captured.lock().unwrap().clone();
    assert_eq!(forms.len(), 1);
    let form = &forms[0];
    assert_eq!(form["apikey"], "test-key");
    assert_eq!(form["userid"], "academy");
    assert_eq!(form["senderkey"], "sender-1");
    assert_eq!(form["tpl_code"], "TPL_ABSENT");
    assert_eq!(form["receiver_1"], "01011112222");
    assert_eq!(form["failover"], "N");
    let variables: BTreeMap<String, String> = serde_json::from_str(&form["variables_1"]).unwrap();
    assert_eq!(variables, request().variables);
}

#[tokio::test]
async fn provider_rejection_is_reported() {
    let (base_url, _) = spawn_provider(
        StatusCode::OK,
        r#"{"code":-99,"message":"unregistered template"}"#,
    )
    .await;

    let result = client(base_url, vec![]).send(&request()).await;

    assert!(!result.success);
    assert_eq!(result.error_code.as_deref(), Some("PROVIDER_-99"));
    assert_eq!(result.error_message.as_deref(), Some("unregistered template"));
    assert!(!result.retryable);
}

#[tokio::test]
async fn configured_provider_code_is_retryable() {
    let (base_url, _) = spawn_provider(StatusCode::OK, r#"{"code":-101,"message":"busy"}"#).await;

    let result = client(base_url, vec![-101]).send(&request()).await;

    assert!(result.retryable);
}

#[tokio::test]
async fn server_errors_are_retryable() {
    let (base_url, _) = spawn_provider(StatusCode::SERVICE_UNAVAILABLE, "down").await;

    let result = client(base_url, vec![]).send(&request()).await;

    assert_eq!(result.error_code.as_deref(), Some("HTTP_503"));
    assert!(result.retryable);
}

#[tokio::test]
async fn client_errors_are_permanent() {
    let (base_url, _) = spawn_provider(StatusCode::FORBIDDEN, "no").await;

    let result = client(base_url, vec![]).send(&request()).await;

    assert_eq!(result.error_code.as_deref(), Some("HTTP_403"));
    assert!(!result.retryable);
}

#[tokio::test]
async fn unreachable_provider_is_a_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = client(format!("http://{addr}/akv10/alimtalk"), vec![])
        .send(&request())
        .await;

    assert_eq!(result.error_code.as_deref(), Some(ERROR_TRANSPORT));
    assert!(result.retryable);
}

#[tokio::test]
async fn missing_credentials_fail_without_a_request() {
    let (base_url, captured) = spawn_provider(StatusCode::OK, r#"{"code":0}"#).await;

    let result = client(base_url, vec![])
        .with_credentials(CredentialSource::Fixed(Credentials {
            api_key: String::new(),
            user_id: String::new(),
        }))
        .send(&request())
        .await;

    assert_eq!(result.error_code.as_deref(), Some(ERROR_MISSING_CREDENTIALS));
    assert!(!result.retryable);
    assert!(captured.lock().unwrap().is_empty());
}
