use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use jsonwebtoken::{EncodingKey, Header, encode};
use lostfound_infra::config::AppConfig;
use lostfound_infra::repositories::{
    InMemoryItemRepository, InMemoryNotificationRepository, InMemoryUserDirectory,
};
use serde::Serialize;
use serde_json::{Value, json};
use time::{Duration, OffsetDateTime, format_description::well_known::Rfc3339};
use tower::ServiceExt;

use crate::routes;
use crate::state::AppState;

const SECRET: &str = "test-secret";

#[derive(Serialize)]
struct Claims {
    sub: String,
    name: Option<String>,
    exp: usize,
}

fn test_config() -> AppConfig {
    AppConfig {
        app_env: "test".to_string(),
        port: 0,
        log_level: "info".to_string(),
        data_backend: "memory".to_string(),
        surreal_endpoint: "ws://127.0.0.1:8000".to_string(),
        surreal_ns: "lostfound".to_string(),
        surreal_db: "test".to_string(),
        surreal_user: "root".to_string(),
        surreal_pass: "root".to_string(),
        jwt_secret: SECRET.to_string(),
        store_timeout_ms: 5_000,
        seed_user_ids: String::new(),
    }
}

fn test_token(sub: &str) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time")
        .as_secs();
    let claims = Claims {
        sub: sub.to_string(),
        name: None,
        exp: (now + 3600) as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("token")
}

fn test_app() -> axum::Router {
    let state = AppState::with_repositories(
        test_config(),
        Arc::new(InMemoryItemRepository::new()),
        Arc::new(InMemoryNotificationRepository::new()),
        Arc::new(InMemoryUserDirectory::seeded(["user-a", "user-b", "user-c"])),
    );
    routes::router(state)
}

fn rfc3339_from_now(offset: Duration) -> String {
    (OffsetDateTime::now_utc() + offset)
        .format(&Rfc3339)
        .expect("format")
}

async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    user: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("authorization", format!("Bearer {}", test_token(user)));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json")
    };
    (status, value)
}

async fn create_item(app: &axum::Router, owner: &str, title: &str, coordinates: Option<(f64, f64)>) -> String {
    let mut payload = json!({ "title": title, "category": "Electronics" });
    if let Some((latitude, longitude)) = coordinates {
        payload["latitude"] = json!(latitude);
        payload["longitude"] = json!(longitude);
    }
    let (status, body) = send(app, "POST", "/v1/items", Some(owner), Some(payload)).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["item_id"].as_str().expect("item_id").to_string()
}

async fn propose_meetup(app: &axum::Router) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/v1/notifications",
        Some("user-a"),
        Some(json!({
            "recipient_id": "user-b",
            "text": "I found your headphones, can we meet?",
            "is_meetup": true,
            "location": "Library lobby",
            "meet_time": rfc3339_from_now(Duration::days(1)),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["kind"], "meetup_proposal");
    assert_eq!(body["is_meetup"], true);
    assert_eq!(body["sender_id"], "user-a");
    body["notification_id"]
        .as_str()
        .expect("notification_id")
        .to_string()
}

async fn inbox(app: &axum::Router, user: &str) -> Value {
    let (status, body) = send(
        app,
        "GET",
        &format!("/v1/users/{user}/notifications"),
        Some(user),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body
}

#[tokio::test]
async fn health_reports_environment() {
    let app = test_app();
    let (status, body) = send(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["environment"], "test");
}

#[tokio::test]
async fn nearby_orders_items_within_radius() {
    let app = test_app();
    let here = create_item(&app, "user-a", "Keys", Some((28.6024, -81.2003))).await;
    let one_km = create_item(&app, "user-a", "Phone", Some((28.6114, -81.2003))).await;
    create_item(&app, "user-a", "Bike", Some((29.5024, -81.2003))).await;

    let (status, body) = send(
        &app,
        "GET",
        "/v1/items/nearby?lat=28.6024&lng=-81.2003&radius_km=10",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["count"], 2);
    assert_eq!(body["radius_km"], 10.0);
    assert_eq!(body["search_location"]["latitude"], 28.6024);
    let results = body["results"].as_array().expect("results");
    assert_eq!(results[0]["item_id"], here.as_str());
    assert_eq!(results[0]["distance"], 0.0);
    assert_eq!(results[1]["item_id"], one_km.as_str());
    assert_eq!(results[1]["distance"], 1.0);
}

#[tokio::test]
async fn search_around_an_item_skips_the_item_itself() {
    let app = test_app();
    let lost = create_item(&app, "user-a", "Wallet", Some((28.6024, -81.2003))).await;
    let found = create_item(&app, "user-b", "Wallet", Some((28.6114, -81.2003))).await;

    let (status, body) = send(
        &app,
        "GET",
        &format!("/v1/items/{lost}/nearby?radius_km=3"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["count"], 1);
    assert_eq!(body["results"][0]["item_id"], found.as_str());
    assert_eq!(body["radius_km"], 3.0);
}

#[tokio::test]
async fn nearby_rejects_invalid_latitude() {
    let app = test_app();
    let (status, body) = send(
        &app,
        "GET",
        "/v1/items/nearby?lat=91&lng=-81.2003",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_coordinates");
    assert_eq!(
        body["error"]["message"],
        "Invalid latitude. Must be between -90 and 90"
    );
}

#[tokio::test]
async fn nearby_requires_both_coordinates_and_a_positive_radius() {
    let app = test_app();
    let (status, body) = send(&app, "GET", "/v1/items/nearby?lat=10", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "missing_parameters");
    assert_eq!(body["error"]["message"], "Latitude and longitude required");

    let (status, body) = send(
        &app,
        "GET",
        "/v1/items/nearby?lat=10&lng=10&radius_km=-2",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_error");
}

#[tokio::test]
async fn items_without_coordinates_never_match() {
    let app = test_app();
    let unlocated = create_item(&app, "user-a", "Scarf", None).await;

    for uri in [
        "/v1/items/nearby?lat=0&lng=0&radius_km=20000",
        "/v1/items/nearby?lat=28.6024&lng=-81.2003",
    ] {
        let (status, body) = send(&app, "GET", uri, None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 0);
    }

    let (status, body) = send(
        &app,
        "GET",
        &format!("/v1/items/{unlocated}/nearby"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "item has no location");
}

#[tokio::test]
async fn nearby_spans_the_antimeridian() {
    let app = test_app();
    let east = create_item(&app, "user-a", "Buoy", Some((0.0, 179.99))).await;
    let (status, body) = send(
        &app,
        "GET",
        "/v1/items/nearby?lat=0&lng=-179.99&radius_km=5",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["results"][0]["item_id"], east.as_str());
}

#[tokio::test]
async fn claimed_items_drop_out_of_search() {
    let app = test_app();
    let item_id = create_item(&app, "user-a", "Umbrella", Some((40.0, -74.0))).await;

    let (status, _) = send(
        &app,
        "POST",
        &format!("/v1/items/{item_id}/claim"),
        Some("user-a"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        "POST",
        &format!("/v1/items/{item_id}/claim"),
        Some("user-b"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "claimed");

    let (status, _) = send(
        &app,
        "POST",
        &format!("/v1/items/{item_id}/claim"),
        Some("user-c"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = send(&app, "GET", "/v1/items/nearby?lat=40&lng=-74", None, None).await;
    assert_eq!(body["count"], 0);

    let claimer = inbox(&app, "user-b").await;
    assert_eq!(claimer["count"], 1);
    assert_eq!(claimer["unread_count"], 1);
    assert_eq!(claimer["results"][0]["text"], "You claimed: Umbrella");
    assert_eq!(claimer["results"][0]["item_id"], item_id.as_str());
    assert_eq!(claimer["results"][0]["is_meetup"], false);
    assert_eq!(inbox(&app, "user-c").await["count"], 0);
}

#[tokio::test]
async fn only_the_owner_changes_item_status() {
    let app = test_app();
    let item_id = create_item(&app, "user-a", "Laptop", None).await;
    let uri = format!("/v1/items/{item_id}/status");

    let (status, _) = send(&app, "PATCH", &uri, Some("user-b"), Some(json!({ "status": "found" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) =
        send(&app, "PATCH", &uri, Some("user-a"), Some(json!({ "status": "found" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "found");

    let (status, body) = send(&app, "GET", "/v1/items?status=found", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
}

#[tokio::test]
async fn mutating_routes_require_a_token() {
    let app = test_app();
    let (status, body) = send(
        &app,
        "POST",
        "/v1/items",
        None,
        Some(json!({ "title": "Keys" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthorized");
}

#[tokio::test]
async fn proposal_in_the_past_is_rejected() {
    let app = test_app();
    let (status, body) = send(
        &app,
        "POST",
        "/v1/notifications",
        Some("user-a"),
        Some(json!({
            "recipient_id": "user-b",
            "text": "Meet?",
            "is_meetup": true,
            "location": "Library",
            "meet_time": rfc3339_from_now(Duration::hours(-1)),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "Meet time must be in the future");
    assert_eq!(inbox(&app, "user-b").await["count"], 0);
}

#[tokio::test]
async fn create_notification_validates_and_scopes_sender() {
    let app = test_app();
    let (status, body) = send(
        &app,
        "POST",
        "/v1/notifications",
        Some("user-a"),
        Some(json!({ "recipient_id": "user-b" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"]["message"],
        "User ID and notification text are required"
    );

    let (status, body) = send(
        &app,
        "POST",
        "/v1/notifications",
        Some("user-a"),
        Some(json!({ "recipient_id": "user-b", "text": "Meet?", "is_meetup": true })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"]["message"],
        "Location and meet time are required for meet-up notifications"
    );

    let (status, _) = send(
        &app,
        "POST",
        "/v1/notifications",
        Some("user-a"),
        Some(json!({ "recipient_id": "user-b", "sender_id": "user-c", "text": "hi" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        "POST",
        "/v1/notifications",
        Some("user-a"),
        Some(json!({ "recipient_id": "nobody", "text": "hi" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "recipient not found");
}

#[tokio::test]
async fn accepting_replaces_the_proposal() {
    let app = test_app();
    let proposal_id = propose_meetup(&app).await;

    let (status, body) = send(
        &app,
        "GET",
        &format!("/v1/notifications/{proposal_id}"),
        Some("user-b"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["notification"]["is_read"], true);
    assert_eq!(body["actions"], json!(["accept", "contest", "deny"]));

    let (status, body) = send(
        &app,
        "POST",
        &format!("/v1/notifications/{proposal_id}/accept"),
        Some("user-b"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["outcome"], "accepted");
    assert_eq!(body["proposal_id"], proposal_id.as_str());

    let (status, _) = send(
        &app,
        "GET",
        &format!("/v1/notifications/{proposal_id}"),
        Some("user-b"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let sender = inbox(&app, "user-a").await;
    assert_eq!(sender["count"], 1);
    assert_eq!(sender["results"][0]["is_meetup"], false);
    assert_eq!(sender["results"][0]["sender_id"], "user-b");

    let recipient = inbox(&app, "user-b").await;
    assert_eq!(recipient["count"], 1);
    assert_eq!(recipient["unread_count"], 0);
    assert_eq!(recipient["results"][0]["recipient_id"], "user-b");

    let (status, _) = send(
        &app,
        "POST",
        &format!("/v1/notifications/{proposal_id}/deny"),
        Some("user-b"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn contest_then_deny_round_trip() {
    let app = test_app();
    let proposal_id = propose_meetup(&app).await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("/v1/notifications/{proposal_id}/contest"),
        Some("user-b"),
        Some(json!({ "location": "Cafe", "meet_time": "tomorrow" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "meet_time must be an RFC 3339 timestamp");

    let (status, body) = send(
        &app,
        "POST",
        &format!("/v1/notifications/{proposal_id}/contest"),
        Some("user-b"),
        Some(json!({ "location": "Cafe", "meet_time": rfc3339_from_now(Duration::days(2)) })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["outcome"], "contested");

    let sender = inbox(&app, "user-a").await;
    assert_eq!(sender["count"], 1);
    let counter = &sender["results"][0];
    assert_eq!(counter["is_meetup"], true);
    assert_eq!(counter["location"], "Cafe");
    let counter_id = counter["notification_id"].as_str().expect("id").to_string();

    let (status, body) = send(
        &app,
        "POST",
        &format!("/v1/notifications/{counter_id}/deny"),
        Some("user-a"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["outcome"], "denied");

    let (_, body) = send(
        &app,
        "GET",
        "/v1/users/user-b/notifications?is_meetup=false&is_read=false",
        Some("user-b"),
        None,
    )
    .await;
    assert_eq!(body["count"], 1);
    assert!(
        body["results"][0]["text"]
            .as_str()
            .expect("text")
            .contains("declined your meet-up at Cafe")
    );
}

#[tokio::test]
async fn plain_messages_offer_no_actions_and_cannot_be_resolved() {
    let app = test_app();
    let (status, body) = send(
        &app,
        "POST",
        "/v1/notifications",
        Some("user-a"),
        Some(json!({ "recipient_id": "user-b", "text": "Your wallet is at the front desk" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["notification_id"].as_str().expect("id").to_string();

    let (_, body) = send(&app, "GET", &format!("/v1/notifications/{id}"), Some("user-b"), None).await;
    assert_eq!(body["actions"], json!([]));

    let (status, body) = send(
        &app,
        "POST",
        &format!("/v1/notifications/{id}/accept"),
        Some("user-b"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["message"], "notification is not a meet-up proposal");
}

#[tokio::test]
async fn notification_scope_is_enforced() {
    let app = test_app();
    let proposal_id = propose_meetup(&app).await;

    let (status, _) = send(&app, "GET", "/v1/users/user-b/notifications", Some("user-c"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/v1/notifications/{proposal_id}"),
        Some("user-c"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        "POST",
        &format!("/v1/notifications/{proposal_id}/accept"),
        Some("user-a"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        "POST",
        "/v1/users/user-b/notifications/read-all",
        Some("user-b"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updated"], 1);

    let (status, body) = send(
        &app,
        "DELETE",
        "/v1/users/user-b/notifications",
        Some("user-b"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 1);
}

#[tokio::test]
async fn malformed_bodies_and_queries_use_the_error_envelope() {
    let app = test_app();

    let (status, body) = send(
        &app,
        "POST",
        "/v1/notifications",
        Some("user-a"),
        Some(json!({ "recipient_id": "user-b", "text": "Meet?", "is_meetup": "true" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_error");
    let message = body["error"]["message"].as_str().expect("message");
    assert!(!message.contains("invalid type"), "{message}");

    let (status, body) = send(&app, "POST", "/v1/items", Some("user-a"), Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_error");
    let message = body["error"]["message"].as_str().expect("message");
    assert!(!message.contains("missing field"), "{message}");

    let (status, body) = send(
        &app,
        "GET",
        "/v1/users/user-b/notifications?limit=many",
        Some("user-b"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_error");
}

#[tokio::test]
async fn clearing_one_inbox_leaves_other_recipients_alone() {
    let app = test_app();
    for (recipient, text) in [("user-b", "Is this your scarf?"), ("user-c", "Is this your hat?")] {
        let (status, body) = send(
            &app,
            "POST",
            "/v1/notifications",
            Some("user-a"),
            Some(json!({ "recipient_id": recipient, "text": text })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
    }

    let (status, body) = send(
        &app,
        "POST",
        "/v1/users/user-b/notifications/read-all",
        Some("user-b"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updated"], 1);

    let other = inbox(&app, "user-c").await;
    assert_eq!(other["count"], 1);
    assert_eq!(other["unread_count"], 1);
    assert_eq!(other["results"][0]["is_read"], false);

    let (status, body) = send(
        &app,
        "DELETE",
        "/v1/users/user-b/notifications",
        Some("user-b"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 1);

    assert_eq!(inbox(&app, "user-b").await["count"], 0);
    let other = inbox(&app, "user-c").await;
    assert_eq!(other["count"], 1);
    assert_eq!(other["unread_count"], 1);
    assert_eq!(other["results"][0]["text"], "Is this your hat?");
}
