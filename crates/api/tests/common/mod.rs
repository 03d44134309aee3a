#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use academy_api::auth::jwt::{generate_access_token, JwtConfig};
use academy_api::config::ServerConfig;
use academy_api::routes;
use academy_api::state::AppState;
use academy_core::attendance::TemplateType;
use academy_core::roles::{ROLE_OWNER, ROLE_SUPER_ADMIN, ROLE_TEACHER};
use academy_core::types::{DbId, TenantId};
use academy_notify::config::NotifyConfig;
use academy_notify::rate_limit::MemoryRateLimiter;
use academy_notify::testing::{fixtures, MemoryStore, ScriptedGateway};
use academy_notify::worker::DeliveryWorker;
use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub const ACADEMY: TenantId = TenantId(1);
pub const OTHER_ACADEMY: TenantId = TenantId(2);
pub const ATTENDANCE_ID: DbId = 10;
pub const STUDENT_ID: DbId = 100;
pub const OTHER_ATTENDANCE_ID: DbId = 20;

pub const OWNER_ID: DbId = 7;
pub const TEACHER_ID: DbId = 8;

const JWT_SECRET: &str = "test-secret-that-is-long-enough-for-hmac";

pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        jwt: JwtConfig {
            secret: JWT_SECRET.to_string(),
            access_token_expiry_mins: 15,
        },
    }
}

pub fn token(user_id: DbId, tenant: TenantId, role: &str) -> String {
    generate_access_token(user_id, tenant, role, &test_config().jwt).unwrap()
}

pub fn owner_token() -> String {
    token(OWNER_ID, ACADEMY, ROLE_OWNER)
}

pub fn teacher_token() -> String {
    token(TEACHER_ID, ACADEMY, ROLE_TEACHER)
}

pub fn super_admin_token() -> String {
    token(1, ACADEMY, ROLE_SUPER_ADMIN)
}

/// Handles on the fakes behind a test router.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<ScriptedGateway>,
}

/// Academy 1 with an ABSENT mark, two contacts and a template per type.
/// Academy 2 has a mark and a contact of its own.
pub async fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());

    store
        .add_attendance(fixtures::attendance(
            ACADEMY.get(),
            ATTENDANCE_ID,
            STUDENT_ID,
            "ABSENT",
        ))
        .await;
    store.put_settings(fixtures::settings(ACADEMY.get())).await;
    store
        .add_contact(fixtures::contact(ACADEMY.get(), 1, STUDENT_ID, "010-1111-2222"))
        .await;
    store
        .add_contact(fixtures::contact(ACADEMY.get(), 2, STUDENT_ID, "010-3333-4444"))
        .await;
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
            200,
            "ABSENT",
        ))
        .await;
    store.put_settings(fixtures::settings(OTHER_ACADEMY.get())).await;
    store
        .add_contact(fixtures::contact(OTHER_ACADEMY.get(), 50, 200, "010-9999-0000"))
        .await;
    store
        .add_template(fixtures::template(OTHER_ACADEMY.get(), 50, TemplateType::Absent))
        .await;

    store
}

pub async fn build_test_app() -> TestApp {
    build_test_app_with(seeded_store().await, ScriptedGateway::succeeding(), 30).await
}

/// Build the full router with the production middleware stack over the
/// given fakes.
pub async fn build_test_app_with(
    store: Arc<MemoryStore>,
    gateway: ScriptedGateway,
    manual_send_limit_per_minute: u32,
) -> TestApp {
    let gateway = Arc::new(gateway);
    let notify = NotifyConfig {
        manual_send_limit_per_minute,
        ..NotifyConfig::default()
    };
    let worker = Arc::new(DeliveryWorker::new(store.clone(), gateway.clone(), &notify));

    let state = AppState {
        store: store.clone(),
        gateway: gateway.clone(),
        worker,
        rate_limiter: Arc::new(MemoryRateLimiter::new()),
        config: Arc::new(test_config()),
        notify: Arc::new(notify),
    };

    let cors = CorsLayer::new()
        .allow_origin(["http://localhost:5173".parse().unwrap()])
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600));

    let request_id_header = HeaderName::from_static("x-request-id");

    let router = Router::new()
        .merge(routes::health::router())
        .nest("/api/v1", routes::api_routes())
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(30),
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(cors)
        .with_state(state);

    TestApp {
        router,
        store,
        gateway,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: &Router, uri: &str, token: Option<&str>) -> Response {
    send(app, Method::GET, uri, token, None).await
}

pub async fn post(
    app: &Router,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Response {
    send(app, Method::POST, uri, token, body).await
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    let body = match body {
        Some(json) => {
            builder = builder.header(CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    app.clone().oneshot(builder.body(body).unwrap()).await.unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
