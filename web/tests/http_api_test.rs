//! End-to-end HTTP tests over the in-memory services.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use gatepass_core::mocks::{
    GatewayBehavior, InMemoryEventCatalog, InMemoryRegistrationStore, MockOrderGateway, test_clock,
};
use gatepass_core::signature::HmacSigner;
use gatepass_core::{
    CheckInProcessor, EventId, GatewayError, LedgerSettings, Money, RegistrationLedger,
    SubjectId, TenantId, TokenCodec, WebhookReconciler,
};
use gatepass_web::extractors::{SUBJECT_ID_HEADER, SUBJECT_ROLE_HEADER, TENANT_ID_HEADER};
use gatepass_web::{AppState, CORRELATION_ID_HEADER, WEBHOOK_SIGNATURE_HEADER, router};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

const SIGNING_SECRET: &str = "http-test-ticket-signing-secret-0123456789";
const WEBHOOK_SECRET: &str = "http-test-webhook-secret";

struct TestApp {
    app: Router,
    store: InMemoryRegistrationStore,
    catalog: InMemoryEventCatalog,
    gateway: MockOrderGateway,
    tenant: TenantId,
}

fn test_app() -> TestApp {
    let clock = Arc::new(test_clock());
    let store = InMemoryRegistrationStore::new();
    let catalog = InMemoryEventCatalog::new();
    let gateway = MockOrderGateway::new();
    let codec = Arc::new(TokenCodec::new(SIGNING_SECRET, clock.clone()).unwrap());

    let ledger = Arc::new(RegistrationLedger::new(
        Arc::new(store.clone()),
        Arc::new(catalog.clone()),
        Arc::new(gateway.clone()),
        codec.clone(),
        clock.clone(),
        LedgerSettings::default(),
    ));
    let check_in = Arc::new(CheckInProcessor::new(Arc::new(store.clone()), codec, clock));
    let webhooks = Arc::new(WebhookReconciler::new(ledger.clone(), WEBHOOK_SECRET).unwrap());

    let state = AppState::new(ledger, check_in, webhooks, Arc::new(store.clone()));

    TestApp {
        app: router(state),
        store,
        catalog,
        gateway,
        tenant: TenantId::new(),
    }
}

struct Caller {
    subject: SubjectId,
    role: &'static str,
    tenant: TenantId,
}

impl Caller {
    fn member(tenant: TenantId) -> Self {
        Self {
            subject: SubjectId::new(),
            role: "member",
            tenant,
        }
    }

    fn organizer(tenant: TenantId) -> Self {
        Self {
            subject: SubjectId::new(),
            role: "organizer",
            tenant,
        }
    }

    fn request(&self, method: &str, uri: &str, body: Body) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(SUBJECT_ID_HEADER, self.subject.to_string())
            .header(SUBJECT_ROLE_HEADER, self.role)
            .header(TENANT_ID_HEADER, self.tenant.to_string())
            .header("content-type", "application/json")
            .body(body)
            .unwrap()
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn register(t: &TestApp, caller: &Caller, event: EventId) -> (StatusCode, Value) {
    send(
        &t.app,
        caller.request(
            "POST",
            &format!("/api/events/{event}/registrations"),
            Body::empty(),
        ),
    )
    .await
}

async fn scan(t: &TestApp, scanner: &Caller, token: &str) -> (StatusCode, Value) {
    send(
        &t.app,
        scanner.request(
            "POST",
            "/api/check-ins",
            Body::from(serde_json::json!({ "token": token }).to_string()),
        ),
    )
    .await
}

async fn deliver_webhook(t: &TestApp, body: &str, signature: &str) -> (StatusCode, Value) {
    send(
        &t.app,
        Request::builder()
            .method("POST")
            .uri("/api/webhooks/payments")
            .header(WEBHOOK_SIGNATURE_HEADER, signature)
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
}

fn captured(order_id: &str) -> String {
    format!(
        r#"{{"event":"payment.captured","payload":{{"payment":{{"entity":{{"id":"pay_1","order_id":"{order_id}"}}}}}}}}"#
    )
}

fn sign(body: &str) -> String {
    HmacSigner::new(WEBHOOK_SECRET.as_bytes())
        .unwrap()
        .sign(body.as_bytes())
}

#[tokio::test]
async fn test_free_event_register_and_check_in() {
    let t = test_app();
    let event = t.catalog.add_free_event(t.tenant);
    let member = Caller::member(t.tenant);
    let organizer = Caller::organizer(t.tenant);

    let (status, body) = register(&t, &member, event).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["payment_state"], "PAID");
    assert!(body.get("payment_order").is_none());
    let token = body["ticket_token"].as_str().unwrap().to_string();

    let (status, body) = scan(&t, &organizer, &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "checked_in");

    let (status, body) = scan(&t, &organizer, &token).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "ALREADY_CHECKED_IN");
}

#[tokio::test]
async fn test_paid_event_webhook_then_check_in() {
    let t = test_app();
    let event = t
        .catalog
        .add_paid_event(t.tenant, Money::new(500, "INR".parse().unwrap()));
    let member = Caller::member(t.tenant);
    let organizer = Caller::organizer(t.tenant);

    let (status, body) = register(&t, &member, event).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["payment_state"], "PENDING");
    assert_eq!(body["payment_order"]["amount_minor"], 500);
    assert_eq!(body["payment_order"]["currency"], "INR");
    let order_id = body["payment_order"]["order_id"].as_str().unwrap().to_string();
    let token = body["ticket_token"].as_str().unwrap().to_string();

    let (status, body) = scan(&t, &organizer, &token).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["code"], "PAYMENT_INCOMPLETE");

    let payload = captured(&order_id);
    let (status, body) = deliver_webhook(&t, &payload, &sign(&payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, _) = scan(&t, &organizer, &token).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_forged_webhook_is_acknowledged_but_ignored() {
    let t = test_app();
    let event = t
        .catalog
        .add_paid_event(t.tenant, Money::new(500, "INR".parse().unwrap()));
    let member = Caller::member(t.tenant);
    let (_, body) = register(&t, &member, event).await;
    let order_id = body["payment_order"]["order_id"].as_str().unwrap().to_string();

    let payload = captured(&order_id);
    let (status, _) = deliver_webhook(&t, &payload, &"0".repeat(64)).await;
    assert_eq!(status, StatusCode::OK);

    let (_, mine) = send(
        &t.app,
        member.request("GET", "/api/registrations/me", Body::empty()),
    )
    .await;
    assert_eq!(mine[0]["payment_state"], "PENDING");
}

#[tokio::test]
async fn test_webhook_storage_outage_asks_for_redelivery() {
    let t = test_app();
    t.store.set_unavailable(true);

    let payload = captured("order_mock_1");
    let (status, body) = deliver_webhook(&t, &payload, &sign(&payload)).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "SERVICE_UNAVAILABLE");
}

#[tokio::test]
async fn test_duplicate_registration_conflicts() {
    let t = test_app();
    let event = t.catalog.add_free_event(t.tenant);
    let member = Caller::member(t.tenant);

    let (first, _) = register(&t, &member, event).await;
    let (second, body) = register(&t, &member, event).await;

    assert_eq!(first, StatusCode::CREATED);
    assert_eq!(second, StatusCode::CONFLICT);
    assert_eq!(body["code"], "ALREADY_REGISTERED");
    assert_eq!(t.store.len(), 1);
}

#[tokio::test]
async fn test_other_tenants_event_is_not_found() {
    let t = test_app();
    let event = t.catalog.add_free_event(TenantId::new());

    let (status, body) = register(&t, &Caller::member(t.tenant), event).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "EVENT_NOT_FOUND");
}

#[tokio::test]
async fn test_gateway_failure_is_bad_gateway() {
    let t = test_app();
    t.gateway.set_behavior(GatewayBehavior::Fail(
        GatewayError::Transport("connection refused".to_string()),
    ));
    let event = t
        .catalog
        .add_paid_event(t.tenant, Money::new(500, "INR".parse().unwrap()));

    let (status, body) = register(&t, &Caller::member(t.tenant), event).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "PAYMENT_GATEWAY_ERROR");
    assert!(t.store.is_empty());
}

#[tokio::test]
async fn test_members_cannot_scan() {
    let t = test_app();
    let event = t.catalog.add_free_event(t.tenant);
    let member = Caller::member(t.tenant);
    let (_, body) = register(&t, &member, event).await;
    let token = body["ticket_token"].as_str().unwrap().to_string();

    let (status, body) = scan(&t, &member, &token).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");
}

#[tokio::test]
async fn test_staff_of_other_tenant_cannot_scan() {
    let t = test_app();
    let event = t.catalog.add_free_event(t.tenant);
    let (_, body) = register(&t, &Caller::member(t.tenant), event).await;
    let token = body["ticket_token"].as_str().unwrap().to_string();

    let (status, body) = scan(&t, &Caller::organizer(TenantId::new()), &token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (status, body) = scan(&t, &Caller::organizer(t.tenant), &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "checked_in");
}

#[tokio::test]
async fn test_invalid_token_and_bad_body() {
    let t = test_app();
    let organizer = Caller::organizer(t.tenant);

    let (status, body) = scan(&t, &organizer, "not-a-ticket").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "INVALID_TOKEN");

    let (status, body) = send(
        &t.app,
        organizer.request("POST", "/api/check-ins", Body::from("{\"ticket\":1}")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_missing_identity_is_unauthorized() {
    let t = test_app();
    let event = t.catalog.add_free_event(t.tenant);

    let (status, body) = send(
        &t.app,
        Request::builder()
            .method("POST")
            .uri(format!("/api/events/{event}/registrations"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_event_listing_is_staff_only_and_hides_tokens() {
    let t = test_app();
    let event = t.catalog.add_free_event(t.tenant);
    let member = Caller::member(t.tenant);
    register(&t, &member, event).await;
    let uri = format!("/api/events/{event}/registrations");

    let (status, _) = send(&t.app, member.request("GET", &uri, Body::empty())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let organizer = Caller::organizer(t.tenant);
    let (status, body) = send(&t.app, organizer.request("GET", &uri, Body::empty())).await;
    assert_eq!(status, StatusCode::OK);
    let listed = body.as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["subject_id"], member.subject.to_string());
    assert!(listed[0].get("ticket_token").is_none());

    let outsider = Caller::organizer(TenantId::new());
    let (status, _) = send(&t.app, outsider.request("GET", &uri, Body::empty())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_my_registrations_include_tokens() {
    let t = test_app();
    let member = Caller::member(t.tenant);
    let first = t.catalog.add_free_event(t.tenant);
    let second = t.catalog.add_free_event(t.tenant);
    register(&t, &member, first).await;
    register(&t, &member, second).await;

    let (status, body) = send(
        &t.app,
        member.request("GET", "/api/registrations/me", Body::empty()),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let mine = body.as_array().unwrap();
    assert_eq!(mine.len(), 2);
    assert!(mine.iter().all(|r| r["ticket_token"].is_string()));
}

#[tokio::test]
async fn test_health_and_readiness() {
    let t = test_app();
    let get = |uri: &str| Request::builder().uri(uri).body(Body::empty()).unwrap();

    let (status, body) = send(&t.app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = send(&t.app, get("/ready")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);

    t.store.set_unavailable(true);
    let (status, body) = send(&t.app, get("/ready")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["database"], false);
}

#[tokio::test]
async fn test_responses_carry_correlation_id() {
    let t = test_app();
    let response = t
        .app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert!(response.headers().contains_key(CORRELATION_ID_HEADER));
}
