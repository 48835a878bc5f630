//! Integration tests for the bot server.

use std::sync::{Arc, OnceLock};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use bot::{AppState, Config};
use common::{Money, UserId};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use store::{InMemoryShopStore, ProductDraft};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

const ADMIN: i64 = 1;
const CUSTOMER: i64 = 100;
const CHANNEL: i64 = -1000;

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup() -> (axum::Router, Arc<AppState<InMemoryShopStore>>) {
    let config = Config {
        admin_ids: vec![UserId::new(ADMIN)],
        group_chat_id: Some(common::ChatId::new(CHANNEL)),
        ..Config::default()
    };
    let state = bot::create_default_state(InMemoryShopStore::new(), &config);
    let app = bot::create_app(state.clone(), get_metrics_handle());
    (app, state)
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn post_update(app: &axum::Router, user: i64, payload: Value) -> Value {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/updates")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({"user_id": user, "chat_id": user, "payload": payload}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

async fn get(app: &axum::Router, uri: &str) -> axum::response::Response {
    app.clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let (app, _) = setup();

    let response = get(&app, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["outbox_pending"], 0);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _) = setup();
    post_update(&app, CUSTOMER, json!({"type": "text", "text": "/help"})).await;

    let response = get(&app, "/metrics").await;
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = String::from_utf8(body.to_vec()).unwrap();
    assert!(body.contains("bot_outbox_pending"));
    assert!(body.contains("bot_updates_total"));
}

#[tokio::test]
async fn test_start_returns_menu() {
    let (app, _) = setup();

    let json = post_update(
        &app,
        CUSTOMER,
        json!({"type": "text", "text": "/start"}),
    )
    .await;

    let reply = &json["replies"][0];
    assert_eq!(reply["chat_id"], CUSTOMER);
    assert_eq!(reply["buttons"][0][0]["callback_data"], "catalog");
}

#[tokio::test]
async fn test_malformed_update_is_rejected() {
    let (app, _) = setup();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/updates")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"user_id": 1, "payload": {"type": "sticker"}}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_purchase_flow_over_http() {
    let (app, state) = setup();
    let tea = state
        .dispatcher
        .shop()
        .catalog
        .upsert(ProductDraft::new("Tea", Money::from_major(5)).with_stock(3))
        .await
        .unwrap();

    let json = post_update(
        &app,
        CUSTOMER,
        json!({"type": "callback", "data": format!("buy:{}", tea.id)}),
    )
    .await;
    assert_eq!(json["replies"][0]["text"], "Tea added to your cart (1 in cart).");

    post_update(&app, CUSTOMER, json!({"type": "callback", "data": "checkout"})).await;
    let json = post_update(
        &app,
        CUSTOMER,
        json!({"type": "contact", "phone_number": "+7 900 000 00 01"}),
    )
    .await;
    let text = json["replies"][0]["text"].as_str().unwrap();
    assert!(text.contains("Order #1 (pending)"));
    assert!(text.contains("Total: 5.00"));

    let outbox = body_json(get(&app, "/outbox").await).await;
    let ops = outbox["operations"].as_array().unwrap();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0]["op"], "send");
    assert_eq!(ops[0]["chat_id"], CHANNEL);

    // Drained operations are gone.
    let outbox = body_json(get(&app, "/outbox").await).await;
    assert!(outbox["operations"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_status_change_notifies_customer_and_channel() {
    let (app, state) = setup();
    let tea = state
        .dispatcher
        .shop()
        .catalog
        .upsert(ProductDraft::new("Tea", Money::from_major(5)).with_stock(3))
        .await
        .unwrap();
    post_update(
        &app,
        CUSTOMER,
        json!({"type": "callback", "data": format!("buy:{}", tea.id)}),
    )
    .await;
    post_update(&app, CUSTOMER, json!({"type": "callback", "data": "checkout"})).await;
    post_update(&app, CUSTOMER, json!({"type": "text", "text": "+7 900 000 00 01"})).await;
    state.outbox.drain().await;

    let json = post_update(
        &app,
        ADMIN,
        json!({"type": "callback", "data": "set_status:1:processing"}),
    )
    .await;
    assert!(json["replies"][0]["text"].as_str().unwrap().contains("(processing)"));

    let ops = state.outbox.drain().await;
    let ops = serde_json::to_value(ops).unwrap();
    assert_eq!(ops[0]["op"], "send");
    assert_eq!(ops[0]["chat_id"], CUSTOMER);
    assert_eq!(ops[1]["op"], "edit");
    assert_eq!(ops[1]["chat_id"], CHANNEL);
}

#[tokio::test]
async fn test_customer_cannot_change_status() {
    let (app, _) = setup();

    let json = post_update(
        &app,
        CUSTOMER,
        json!({"type": "text", "text": "/set_status 1 shipped"}),
    )
    .await;
    assert_eq!(
        json["replies"][0]["text"],
        "This command is for administrators only."
    );
}
