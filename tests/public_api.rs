mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use figflag::application::admin::{
    AdminConfigService, AdminFlagService,
    configs::UpdateConfigCommand,
    flags::UpdateFlagCommand,
};
use figflag::cache::{CacheInvalidator, FreshnessCache, derive_key};
use serde_json::{Value, json};

use common::{InMemoryStore, TestApp, body_string};

fn etag_of(response: &axum::http::Response<Body>) -> String {
    response
        .headers()
        .get(header::ETAG)
        .and_then(|value| value.to_str().ok())
        .expect("etag header")
        .to_string()
}

#[tokio::test]
async fn cold_then_warm_reads_are_byte_identical() {
    let app = TestApp::new();

    let first = app.get("/public/acme/prod").await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers()[header::CONTENT_TYPE], "application/json");
    assert_eq!(
        first.headers()[header::CACHE_CONTROL],
        "public, max-age=5, stale-while-revalidate=60"
    );
    let first_etag = etag_of(&first);
    let first_body = body_string(first).await;

    let document: Value = serde_json::from_str(&first_body).expect("json body");
    assert_eq!(document["project"], "acme");
    assert_eq!(document["environment"], "prod");
    assert_eq!(document["flags"], json!({"new_ui": true}));
    assert_eq!(document["configs"], json!({"theme": {"color": "blue"}}));
    assert!(document["timestamp"].is_string());

    app.wait_for_cache_entries(1).await;

    let second = app.get("/public/acme/prod").await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(etag_of(&second), first_etag);
    assert_eq!(body_string(second).await, first_body);
}

#[tokio::test]
async fn matching_if_none_match_yields_empty_304_on_both_paths() {
    let app = TestApp::new();

    let first = app.get("/public/acme/prod").await;
    let etag = etag_of(&first);
    app.wait_for_cache_entries(1).await;

    let cached = app
        .send(
            Request::builder()
                .uri("/public/acme/prod")
                .header(header::IF_NONE_MATCH, etag.as_str())
                .body(Body::empty())
                .expect("request should build"),
        )
        .await;
    assert_eq!(cached.status(), StatusCode::NOT_MODIFIED);
    assert_eq!(etag_of(&cached), etag);
    assert!(cached.headers().contains_key(header::CACHE_CONTROL));
    assert!(body_string(cached).await.is_empty());

    // A wildcard validator also short-circuits a cold miss.
    let cold = TestApp::new();
    let response = cold
        .send(
            Request::builder()
                .uri("/public/acme/prod")
                .header(header::IF_NONE_MATCH, "*")
                .body(Body::empty())
                .expect("request should build"),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    assert!(body_string(response).await.is_empty());
}

#[tokio::test]
async fn stale_validator_gets_full_body() {
    let app = TestApp::new();

    let response = app
        .send(
            Request::builder()
                .uri("/public/acme/prod")
                .header(header::IF_NONE_MATCH, "\"0000000000000000\"")
                .body(Body::empty())
                .expect("request should build"),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(!body_string(response).await.is_empty());
}

#[tokio::test]
async fn environment_of_another_project_is_not_found() {
    let app = TestApp::new();

    let response = app.get("/public/acme/staging").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        body_string(response).await,
        r#"{"error":"environment_not_found"}"#
    );
}

#[tokio::test]
async fn unknown_project_is_not_found() {
    let app = TestApp::new();

    let response = app.get("/public/nobody/prod").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_string(response).await, r#"{"error":"project_not_found"}"#);
}

#[tokio::test]
async fn malformed_config_value_is_served_as_string() {
    let store = InMemoryStore::seeded();
    store.insert_prod_config("banner", Some("not-json{{{"));
    store.insert_prod_config("cleared", None);
    let app = TestApp::with_store(store);

    let response = app.get("/public/acme/prod").await;
    let document: Value =
        serde_json::from_str(&body_string(response).await).expect("json body");

    assert_eq!(document["configs"]["banner"], json!("not-json{{{"));
    assert_eq!(document["configs"]["cleared"], Value::Null);
}

#[tokio::test]
async fn admin_write_busts_the_cached_snapshot() {
    let app = TestApp::new();
    let invalidator = Arc::new(CacheInvalidator::new(app.cache.clone()));
    let flags = AdminFlagService::new(
        app.store.clone(),
        app.store.clone(),
        app.store.clone(),
        app.store.clone(),
        invalidator.clone(),
    );
    let configs = AdminConfigService::new(
        app.store.clone(),
        app.store.clone(),
        app.store.clone(),
        app.store.clone(),
        invalidator,
    );

    let before = app.get("/public/acme/prod").await;
    let before_etag = etag_of(&before);
    app.wait_for_cache_entries(1).await;

    flags
        .update_flag(UpdateFlagCommand {
            id: "flag_new_ui".into(),
            enabled: Some(false),
            ..UpdateFlagCommand::default()
        })
        .await
        .expect("flag update should succeed");

    let key = derive_key("acme", "prod");
    assert_eq!(
        app.cache.get(&key).await.expect("memory cache get"),
        None,
        "entry must be gone right after invalidation"
    );

    let after = app.get("/public/acme/prod").await;
    assert_ne!(etag_of(&after), before_etag);
    let document: Value = serde_json::from_str(&body_string(after).await).expect("json body");
    assert_eq!(document["flags"]["new_ui"], json!(false));

    app.wait_for_cache_entries(1).await;
    configs
        .update_config(UpdateConfigCommand {
            id: "cfg_theme".into(),
            value: Some(json!({"color": "green"})),
            ..UpdateConfigCommand::default()
        })
        .await
        .expect("config update should succeed");

    let response = app.get("/public/acme/prod").await;
    let document: Value =
        serde_json::from_str(&body_string(response).await).expect("json body");
    assert_eq!(document["configs"]["theme"], json!({"color": "green"}));
}

#[tokio::test]
async fn store_outage_is_a_generic_server_error() {
    let store = InMemoryStore::seeded();
    store.fail_reads(true);
    let app = TestApp::with_store(store);

    let response = app.get("/public/acme/prod").await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_string(response).await, r#"{"error":"internal_error"}"#);
}

#[tokio::test]
async fn health_endpoint_reflects_store_reachability() {
    let app = TestApp::new();
    assert_eq!(app.get("/_health/db").await.status(), StatusCode::NO_CONTENT);

    app.store.fail_reads(true);
    assert_eq!(
        app.get("/_health/db").await.status(),
        StatusCode::SERVICE_UNAVAILABLE
    );
}

#[tokio::test]
async fn preflight_allows_conditional_requests_from_any_origin() {
    let app = TestApp::new();

    let response = app
        .send(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/public/acme/prod")
                .header(header::ORIGIN, "https://app.example")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
                .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "if-none-match")
                .body(Body::empty())
                .expect("request should build"),
        )
        .await;

    assert!(response.status().is_success());
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(response.headers()[header::ACCESS_CONTROL_MAX_AGE], "86400");
}

#[tokio::test]
async fn simple_requests_expose_validators() {
    let app = TestApp::new();

    let response = app
        .send(
            Request::builder()
                .uri("/public/acme/prod")
                .header(header::ORIGIN, "https://app.example")
                .body(Body::empty())
                .expect("request should build"),
        )
        .await;

    let exposed = response.headers()[header::ACCESS_CONTROL_EXPOSE_HEADERS]
        .to_str()
        .expect("ascii header")
        .to_ascii_lowercase();
    assert!(exposed.contains("etag"));
    assert!(exposed.contains("cache-control"));
}

#[tokio::test]
async fn unknown_routes_use_json_errors() {
    let app = TestApp::new();

    let response = app.get("/public/acme").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_string(response).await, r#"{"error":"not_found"}"#);
}
