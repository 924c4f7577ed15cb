use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt; // for `oneshot`

use counting_back::{
    config::{AppConfig, SlackConfig},
    dao::game_store::InMemoryGameStore,
    routes,
    state::AppState,
};

const TOKEN: &str = "secret";

async fn app() -> Router {
    let config = AppConfig {
        slack: SlackConfig {
            verification_token: Some(TOKEN.into()),
            channel_id: Some("C1".into()),
        },
        ..AppConfig::default()
    };
    let state = AppState::with_store(config, Arc::new(InMemoryGameStore::new())).await;
    routes::router(state)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let (status, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

async fn post_json(app: &Router, uri: &str, payload: Value) -> (StatusCode, Vec<u8>) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap();
    send(app, request).await
}

async fn post_form(app: &Router, uri: &str, form: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form.to_owned()))
        .unwrap();
    let (status, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

fn message(user: &str, text: &str, ts: &str) -> Value {
    json!({
        "type": "event_callback",
        "token": TOKEN,
        "event_id": format!("Ev{ts}"),
        "event": {
            "type": "message",
            "channel": "C1",
            "user": user,
            "text": text,
            "ts": ts,
        }
    })
}

async fn count(app: &Router, user: &str, text: &str, ts: &str) -> Value {
    let (status, body) = post_json(app, "/slack/events", message(user, text, ts)).await;
    assert_eq!(status, StatusCode::OK);
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn url_verification_echoes_the_challenge() {
    let app = app().await;
    let (status, body) = post_json(
        &app,
        "/slack/events",
        json!({ "type": "url_verification", "token": TOKEN, "challenge": "3eZbrw1aB" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"3eZbrw1aB");
}

#[tokio::test]
async fn wrong_token_is_rejected() {
    let app = app().await;
    let mut payload = message("U1", "1", "1700000000.000100");
    payload["token"] = json!("forged");

    let (status, _) = post_json(&app, "/slack/events", payload).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = post_form(&app, "/slack/leaderboard", "token=forged&text=").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn counting_through_slack_updates_public_endpoints() {
    let app = app().await;

    let (status, body) = get_json(&app, "/api/currentNumber").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "number": 0 }));

    let ack = count(&app, "U1", "1", "1700000000.000100").await;
    assert_eq!(ack, json!({ "outcome": "accepted", "sequence_id": 1 }));

    // Slack redelivers the same message.
    let ack = count(&app, "U1", "1", "1700000000.000100").await;
    assert_eq!(ack["outcome"], "rejected_duplicate");

    assert_eq!(count(&app, "U2", "2", "1700000001.000100").await["outcome"], "accepted");
    assert_eq!(
        count(&app, "U2", "3", "1700000002.000100").await["outcome"],
        "rejected_consecutive_sender"
    );
    assert_eq!(count(&app, "U1", "3 !", "1700000003.000100").await["outcome"], "accepted");
    assert_eq!(count(&app, "U2", "3x", "1700000004.000100").await["outcome"], "rejected_unparsable");

    // Chatter and other channels are acknowledged without counting.
    let ack = count(&app, "U2", "nice one", "1700000005.000100").await;
    assert_eq!(ack, json!({ "outcome": null, "sequence_id": null }));

    let (_, body) = get_json(&app, "/api/currentNumber").await;
    assert_eq!(body["number"], 3);

    let (status, body) = get_json(&app, "/api/leaderboard").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["entries"],
        json!([
            { "user_id": "U1", "valid_count": 2 },
            { "user_id": "U2", "valid_count": 1 },
        ])
    );

    let (status, body) = get_json(&app, "/api/history?limit=2").await;
    assert_eq!(status, StatusCode::OK);
    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["sequence_id"], 6);
    assert_eq!(entries[0]["outcome"], "rejected_unparsable");
    assert_eq!(entries[0]["parsed_number"], Value::Null);
    assert_eq!(entries[1]["sequence_id"], 5);
    assert_eq!(entries[1]["resulting_state"]["last_valid_number"], 3);

    let (_, body) = get_json(&app, "/api/state").await;
    assert_eq!(body["last_valid_number"], 3);
    assert_eq!(body["last_sender_id"], "U1");
    assert_eq!(body["version"], 3);
}

#[tokio::test]
async fn wrong_number_resets_the_count() {
    let app = app().await;
    count(&app, "U1", "1", "1.1").await;
    count(&app, "U2", "2", "1.2").await;

    assert_eq!(
        count(&app, "U1", "5", "1.3").await["outcome"],
        "rejected_wrong_number"
    );

    let (_, body) = get_json(&app, "/api/currentNumber").await;
    assert_eq!(body["number"], 0);
    assert_eq!(count(&app, "U1", "1", "1.4").await["outcome"], "accepted");
}

#[tokio::test]
async fn list_limits_are_validated() {
    let app = app().await;

    let (status, _) = get_json(&app, "/api/leaderboard?limit=101").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get_json(&app, "/api/history?limit=ten").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = get_json(&app, "/api/leaderboard?limit=0").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["entries"], json!([]));
}

#[tokio::test]
async fn slash_commands_render_ephemeral_text() {
    let app = app().await;
    count(&app, "U1", "1", "1.1").await;

    let (status, body) =
        post_form(&app, "/slack/leaderboard", "token=secret&command=%2Fleaderboard&text=").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response_type"], "ephemeral");
    assert_eq!(body["text"], "*Leaderboard*\n1. <@U1>: 1 count");

    let (status, body) =
        post_form(&app, "/slack/eventsCommand", "token=secret&command=%2Fevents&text=5").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["text"].as_str().unwrap().contains("<@U1> posted 1: counted"));

    let (status, body) =
        post_form(&app, "/slack/leaderboard", "token=secret&command=%2Fleaderboard&text=lots").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["text"].as_str().unwrap().contains("Usage: `/leaderboard [count]`"));
}

#[tokio::test]
async fn degraded_mode_reports_unavailable() {
    let app = routes::router(AppState::new(AppConfig::default()));

    let request = Request::builder()
        .uri("/api/currentNumber")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, b"Error retrieving number");

    let (status, _) = get_json(&app, "/api/state").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, body) = get_json(&app, "/healthcheck").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");

    let (status, _) = post_json(&app, "/slack/events", message("U1", "1", "1.1")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}
