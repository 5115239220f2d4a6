use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use chrono::{Duration, TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::util::ServiceExt;
use uuid::Uuid;

use crate::clock::ManualClock;
use crate::kernel::{build_app, Plugin};
use crate::plugins::auth::{issue_token, IdentityVerifier};
use crate::plugins::auth::middleware::OPERATOR_TOKEN_HEADER;
use crate::rate_limit::InMemoryRateLimiter;

use super::plugin::StoriesPlugin;
use super::service::{StoryLimits, StoryService};
use super::store::InMemoryStoryStore;
use super::sweeper::ExpirationSweeper;

const SECRET: &str = "stories-http-secret";
const OPERATOR: &str = "op-secret";

async fn app(clock: Arc<ManualClock>, operator_token: Option<&str>) -> Router {
    let store = InMemoryStoryStore::new().into_arc();
    let service = StoryService::new(
        store.clone(),
        InMemoryRateLimiter::new(64).into_arc(),
        clock.clone(),
        StoryLimits::default(),
    );
    let sweeper = Arc::new(ExpirationSweeper::new(store, clock));
    let plugin = StoriesPlugin::new(
        service,
        sweeper,
        IdentityVerifier::new(SECRET),
        operator_token.map(str::to_string),
    );
    let plugins: Vec<Box<dyn Plugin>> = vec![Box::new(plugin)];
    build_app(&plugins, None).await
}

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()))
}

fn bearer(user: Uuid) -> String {
    format!("Bearer {}", issue_token(SECRET, user, Duration::hours(1)).unwrap())
}

async fn send(app: &Router, method: Method, uri: &str, auth: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(a) = auth {
        req = req.header("authorization", a);
    }
    let req = match body {
        Some(b) => req.header("content-type", "application/json").body(Body::from(b.to_string())).unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, json)
}

fn one_image() -> Value {
    json!({ "media": [{ "url": "/uploads/a.jpg", "mime": "image/jpeg" }] })
}

#[tokio::test]
async fn create_then_fetch_story() {
    let app = app(clock(), None).await;
    let owner = Uuid::new_v4();
    let auth = bearer(owner);

    let (status, created) = send(&app, Method::POST, "/stories", Some(&auth), Some(one_image())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["owner"], owner.to_string());
    assert_eq!(created["is_expired"], false);
    assert_eq!(created["remaining"]["hours"], 24);
    assert_eq!(created["likes_count"], 0);

    let id = created["id"].as_str().unwrap();
    let (status, fetched) = send(&app, Method::GET, &format!("/stories/{}", id), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["media"][0]["url"], "/uploads/a.jpg");
}

#[tokio::test]
async fn create_requires_a_valid_token() {
    let app = app(clock(), None).await;
    let (status, body) = send(&app, Method::POST, "/stories", None, Some(one_image())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "missing_token");

    let (status, body) = send(&app, Method::POST, "/stories", Some("Bearer nope"), Some(one_image())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "invalid_token");
}

#[tokio::test]
async fn invalid_payload_is_a_validation_error() {
    let app = app(clock(), None).await;
    let auth = bearer(Uuid::new_v4());
    let (status, body) = send(&app, Method::POST, "/stories", Some(&auth), Some(json!({ "media": [] }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");

    let (status, body) = send(&app, Method::POST, "/stories", Some(&auth), Some(json!({ "files": 3 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");
}

#[tokio::test]
async fn rate_limit_surfaces_as_429() {
    let app = app(clock(), None).await;
    let auth = bearer(Uuid::new_v4());
    for _ in 0..5 {
        let (status, _) = send(&app, Method::POST, "/stories", Some(&auth), Some(one_image())).await;
        assert_eq!(status, StatusCode::CREATED);
    }
    let (status, body) = send(&app, Method::POST, "/stories", Some(&auth), Some(one_image())).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "rate_limited");
}

#[tokio::test]
async fn like_toggle_reflects_viewer() {
    let app = app(clock(), None).await;
    let owner = bearer(Uuid::new_v4());
    let viewer = bearer(Uuid::new_v4());
    let (_, created) = send(&app, Method::POST, "/stories", Some(&owner), Some(one_image())).await;
    let id = created["id"].as_str().unwrap().to_string();

    let (status, liked) = send(&app, Method::POST, &format!("/stories/{}/like", id), Some(&viewer), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(liked, json!({ "is_liked": true, "likes_count": 1 }));

    let (_, seen) = send(&app, Method::GET, &format!("/stories/{}", id), Some(&viewer), None).await;
    assert_eq!(seen["is_liked"], true);
    let (_, anon) = send(&app, Method::GET, &format!("/stories/{}", id), None, None).await;
    assert_eq!(anon["is_liked"], false);
    assert_eq!(anon["likes_count"], 1);

    let (_, liked_list) = send(&app, Method::GET, "/stories/where?liked=true", Some(&viewer), None).await;
    assert_eq!(liked_list["total"], 1);
}

#[tokio::test]
async fn foreign_changes_are_forbidden() {
    let app = app(clock(), None).await;
    let owner = bearer(Uuid::new_v4());
    let other = bearer(Uuid::new_v4());
    let (_, created) = send(&app, Method::POST, "/stories", Some(&owner), Some(one_image())).await;
    let uri = format!("/stories/{}", created["id"].as_str().unwrap());

    let (status, body) = send(&app, Method::DELETE, &uri, Some(&other), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden");

    let (status, _) = send(&app, Method::PUT, &uri, Some(&other), Some(one_image())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, deleted) = send(&app, Method::DELETE, &uri, Some(&owner), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted["id"], created["id"]);

    let (status, body) = send(&app, Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn expired_stories_drop_out_of_active_listing() {
    let clock = clock();
    let app = app(clock.clone(), None).await;
    let auth = bearer(Uuid::new_v4());
    send(&app, Method::POST, "/stories", Some(&auth), Some(one_image())).await;

    let (_, page) = send(&app, Method::GET, "/stories/active", None, None).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["page"], 1);
    assert_eq!(page["page_size"], 10);
    assert_eq!(page["has_more"], false);

    clock.advance(Duration::hours(24) + Duration::seconds(1));
    let (_, page) = send(&app, Method::GET, "/stories/active", None, None).await;
    assert_eq!(page["total"], 0);

    let (_, page) = send(&app, Method::GET, "/stories?include_expired=true", None, None).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["is_expired"], true);
    assert_eq!(page["items"][0]["remaining"]["total_ms"], 0);
}

#[tokio::test]
async fn bulk_delete_reports_per_id_outcome() {
    let app = app(clock(), None).await;
    let auth = bearer(Uuid::new_v4());
    let (_, a) = send(&app, Method::POST, "/stories", Some(&auth), Some(one_image())).await;
    let ghost = Uuid::new_v4();

    let body = json!({ "ids": [a["id"], ghost] });
    let (status, out) = send(&app, Method::DELETE, "/stories/bulk-delete", Some(&auth), Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(out["deleted_ids"], json!([a["id"]]));
    assert_eq!(out["failed_ids"], json!([ghost]));
}

#[tokio::test]
async fn cleanup_endpoint_needs_operator_token() {
    let clock = clock();
    let app = app(clock.clone(), Some(OPERATOR)).await;
    let auth = bearer(Uuid::new_v4());
    send(&app, Method::POST, "/stories", Some(&auth), Some(one_image())).await;
    clock.advance(Duration::hours(25));

    let (status, _) = send(&app, Method::POST, "/stories/cleanup-expired", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = |token: &str| {
        Request::builder()
            .method(Method::POST)
            .uri("/stories/cleanup-expired")
            .header(OPERATOR_TOKEN_HEADER, token)
            .body(Body::empty())
            .unwrap()
    };
    let resp = app.clone().oneshot(req("wrong")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = app.clone().oneshot(req(OPERATOR)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(resp.into_body(), 64 * 1024).await.unwrap();
    let out: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(out["found"], 1);
    assert_eq!(out["deleted"], 1);
}

#[tokio::test]
async fn cleanup_endpoint_is_closed_without_configured_token() {
    let app = app(clock(), None).await;
    let req = Request::builder()
        .method(Method::POST)
        .uri("/stories/cleanup-expired")
        .header(OPERATOR_TOKEN_HEADER, "anything")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn huge_offsets_report_the_page_without_overflowing() {
    let app = app(clock(), None).await;
    let auth = bearer(Uuid::new_v4());
    send(&app, Method::POST, "/stories", Some(&auth), Some(one_image())).await;

    let (status, page) = send(&app, Method::GET, "/stories/where?limit=1&offset=4294967295", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["page"], 4_294_967_296u64);
    assert_eq!(page["items"], json!([]));
    assert_eq!(page["total"], 1);
    assert_eq!(page["has_more"], false);

    let uri = format!("/stories/where?offset={}", u64::MAX);
    let (status, body) = send(&app, Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");
}
