use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};
use snaplink_cache::MokaLinkCache;
use snaplink_gateway::extract::OWNER_HEADER;
use snaplink_gateway::{App, AppState};
use snaplink_generator::RandomGenerator;
use snaplink_resolver::ResolverSettings;
use snaplink_shortener::AllocatorSettings;
use snaplink_storage::InMemoryRepository;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

const BASE_URL: &str = "http://sn.ap";

fn router() -> Router {
    let state = AppState::from_backends(
        Arc::new(InMemoryRepository::new()),
        Arc::new(MokaLinkCache::new()),
        RandomGenerator::default(),
        AllocatorSettings::default(),
        ResolverSettings::default(),
        BASE_URL,
    );
    App::router(state)
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    owner: Option<&str>,
    body: Option<Value>,
) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(owner) = owner {
        builder = builder.header(OWNER_HEADER, owner);
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    app.clone().oneshot(request).await.unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn shorten(app: &Router, body: Value, owner: Option<&str>) -> Value {
    let response = send(app, "POST", "/links/shorten", owner, Some(body)).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    json_body(response).await
}

#[tokio::test]
async fn health_is_ok() {
    let app = router();
    let response = send(&app, "GET", "/health", None, None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "status": "ok" }));
}

#[tokio::test]
async fn shorten_resolve_and_count() {
    let app = router();

    let created = shorten(&app, json!({ "original_url": "example.com" }), None).await;
    let code = created["short_code"].as_str().unwrap().to_string();
    assert_eq!(created["original_url"], "https://example.com");
    assert_eq!(created["short_url"], format!("{BASE_URL}/{code}"));

    let response = send(&app, "GET", &format!("/links/{code}"), None, None).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers()[header::LOCATION],
        "https://example.com"
    );

    let response = send(&app, "GET", &format!("/links/{code}/stats"), None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let stats = json_body(response).await;
    assert_eq!(stats["clicks"], 1);
    assert!(!stats["last_used"].is_null());
}

#[tokio::test]
async fn unknown_and_malformed_codes_are_404() {
    let app = router();

    let response = send(&app, "GET", "/links/nothere", None, None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(&app, "GET", "/links/a", None, None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(&app, "GET", "/links/nothere/stats", None, None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"], "not_found");
}

#[tokio::test]
async fn past_expiry_is_rejected_and_expired_links_are_gone() {
    let app = router();

    let response = send(
        &app,
        "POST",
        "/links/shorten",
        None,
        Some(json!({ "original_url": "example.com", "expires_at": "2000-01-01T00:00:00Z" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let soon = jiff::Timestamp::now() + jiff::SignedDuration::from_secs(1);
    shorten(
        &app,
        json!({ "original_url": "example.com", "custom_alias": "shortlived", "expires_at": soon }),
        None,
    )
    .await;
    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

    let response = send(&app, "GET", "/links/shortlived", None, None).await;
    assert_eq!(response.status(), StatusCode::GONE);
}

#[tokio::test]
async fn custom_alias_conflicts() {
    let app = router();

    shorten(&app, json!({ "original_url": "example.com", "custom_alias": "mine" }), None).await;
    let response = send(
        &app,
        "POST",
        "/links/shorten",
        None,
        Some(json!({ "original_url": "other.com", "custom_alias": "mine" })),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(response).await["error"], "conflict");
}

#[tokio::test]
async fn invalid_bodies_are_400() {
    let app = router();

    let response = send(&app, "POST", "/links/shorten", None, Some(json!({ "url": "x" }))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(
        &app,
        "POST",
        "/links/shorten",
        None,
        Some(json!({ "original_url": "not a url at all" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn only_the_owner_may_update_or_delete() {
    let app = router();
    let owner = Uuid::new_v4().to_string();
    let stranger = Uuid::new_v4().to_string();

    shorten(
        &app,
        json!({ "original_url": "example.com", "custom_alias": "owned" }),
        Some(&owner),
    )
    .await;

    let update = json!({ "original_url": "example.org" });
    let response = send(&app, "PUT", "/links/owned", Some(&stranger), Some(update.clone())).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let response = send(&app, "DELETE", "/links/owned", None, None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send(&app, "PUT", "/links/owned", Some(&owner), Some(update)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["original_url"], "https://example.org");

    let response = send(&app, "GET", "/links/owned", None, None).await;
    assert_eq!(response.headers()[header::LOCATION], "https://example.org");

    let response = send(&app, "DELETE", "/links/owned", Some(&owner), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = send(&app, "DELETE", "/links/owned", Some(&owner), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let response = send(&app, "GET", "/links/owned", None, None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_owner_header_is_401() {
    let app = router();

    let response = send(
        &app,
        "POST",
        "/links/shorten",
        Some("not-a-uuid"),
        Some(json!({ "original_url": "example.com" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(&app, "GET", "/account/links", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn search_lists_live_matches() {
    let app = router();

    shorten(&app, json!({ "original_url": "example.com", "custom_alias": "one" }), None).await;
    shorten(&app, json!({ "original_url": "https://example.com", "custom_alias": "two" }), None).await;
    shorten(&app, json!({ "original_url": "other.com", "custom_alias": "three" }), None).await;

    let response = send(
        &app,
        "GET",
        "/links/search?original_url=example.com",
        None,
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let found = json_body(response).await;
    let urls: Vec<&str> = found
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["short_url"].as_str().unwrap())
        .collect();
    assert_eq!(urls, vec!["http://sn.ap/one", "http://sn.ap/two"]);

    let response = send(&app, "GET", "/links/search", None, None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn account_links_and_cleanup() {
    let app = router();
    let owner = Uuid::new_v4().to_string();

    shorten(&app, json!({ "original_url": "a.com", "custom_alias": "acct1" }), Some(&owner)).await;
    shorten(&app, json!({ "original_url": "b.com", "custom_alias": "acct2" }), Some(&owner)).await;
    shorten(&app, json!({ "original_url": "c.com", "custom_alias": "anon1" }), None).await;

    send(&app, "GET", "/links/acct1", None, None).await;
    send(&app, "GET", "/links/acct1", None, None).await;

    let response = send(&app, "GET", "/account/links", Some(&owner), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let report = json_body(response).await;
    assert_eq!(report["links"].as_array().unwrap().len(), 2);
    assert_eq!(report["total_clicks"], 2);

    let response = send(
        &app,
        "DELETE",
        "/account/links/unused?hours=25",
        Some(&owner),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Everything was created within the last hour.
    let response = send(&app, "DELETE", "/account/links/unused", Some(&owner), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["removed"], 0);
}
