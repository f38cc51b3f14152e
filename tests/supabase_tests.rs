//! The router wired to the real provider client, with the provider mocked
//! over HTTP.

mod common;

use atlas::auth::CookieMethods;
use atlas::cookies::BrowserCookies;
use atlas::{AppConfig, AppState, SupabaseClient};
use axum::http::StatusCode;
use common::{body_text, get, location, send, set_cookies};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const STORAGE_KEY: &str = "sb-127-auth-token";

fn user() -> serde_json::Value {
    json!({ "id": "u1", "email": "ada@example.com", "role": "authenticated" })
}

fn session(access_token: &str, expires_at: Option<i64>) -> serde_json::Value {
    let mut session = json!({
        "access_token": access_token,
        "refresh_token": format!("refresh-{}", access_token),
        "expires_in": 3600,
        "token_type": "bearer",
        "user": user(),
    });
    if let Some(expires_at) = expires_at {
        session["expires_at"] = json!(expires_at);
    }
    session
}

fn router(server: &MockServer) -> axum::Router {
    atlas::app(AppState::new(AppConfig::new(&server.uri(), "anon-key")))
}

/// Sign in once through the client and return the session cookie it stored.
async fn stored_session_cookie(server: &MockServer, session_body: serde_json::Value) -> String {
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "password"))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_body))
        .expect(1)
        .mount(server)
        .await;

    let cookies = BrowserCookies::isolated();
    let config = AppConfig::new(&server.uri(), "anon-key");
    let client = SupabaseClient::new(&config, reqwest::Client::new(), cookies.clone());
    client
        .auth
        .sign_in_with_password("ada@example.com", "secret1")
        .await
        .unwrap();

    let value = cookies.get(STORAGE_KEY).unwrap();
    assert!(value.starts_with("base64-"));
    format!("{}={}", STORAGE_KEY, value)
}

#[tokio::test]
async fn test_callback_stores_session_cookie() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "pkce"))
        .respond_with(ResponseTemplate::new(200).set_body_json(session("access-1", None)))
        .expect(1)
        .mount(&server)
        .await;

    let cookie = format!("{}-code-verifier=verifier-123", STORAGE_KEY);
    let response = send(
        &router(&server),
        get("/auth/callback?code=abc&next=/dashboard/items", Some(&cookie)),
    )
    .await;

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), "/dashboard/items");

    let cookies = set_cookies(&response);
    assert!(cookies
        .iter()
        .any(|c| c.starts_with(&format!("{}=base64-", STORAGE_KEY))));
    assert!(cookies
        .iter()
        .any(|c| c.starts_with(&format!("{}-code-verifier=;", STORAGE_KEY))));
}

#[tokio::test]
async fn test_callback_without_verifier_fails() {
    let server = MockServer::start().await;

    let response = send(&router(&server), get("/auth/callback?code=abc", None)).await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert!(location(&response).starts_with("/login?error="));
}

#[tokio::test]
async fn test_guard_refreshes_and_forwards_session() {
    let server = MockServer::start().await;
    // Already expired: the guard must refresh before anything else.
    let stale = stored_session_cookie(&server, session("stale-token", Some(1_000))).await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(session("fresh-token", None)))
        .expect(1)
        .mount(&server)
        .await;

    // Only answers to the refreshed token, so the page must see the
    // cookie the guard wrote.
    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .and(header("authorization", "Bearer fresh-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(user()))
        .expect(1)
        .mount(&server)
        .await;

    let response = send(&router(&server), get("/dashboard", Some(&stale))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookies(&response)
        .iter()
        .any(|c| c.starts_with(&format!("{}=base64-", STORAGE_KEY))));
    assert!(body_text(response).await.contains("ada@example.com"));
}

#[tokio::test]
async fn test_rejected_refresh_counts_as_signed_out() {
    let server = MockServer::start().await;
    let stale = stored_session_cookie(&server, session("stale-token", Some(1_000))).await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "refresh_token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Invalid Refresh Token: Already Used"
        })))
        .mount(&server)
        .await;

    let response = send(&router(&server), get("/dashboard", Some(&stale))).await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), "/login?next=%2Fdashboard");
    assert!(set_cookies(&response)
        .iter()
        .any(|c| c.starts_with(&format!("{}=;", STORAGE_KEY))));
}

#[tokio::test]
async fn test_items_page_reads_through_postgrest() {
    let server = MockServer::start().await;
    let cookie = stored_session_cookie(&server, session("access-1", None)).await;

    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(user()))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/items"))
        .and(query_param("order", "created_at.desc"))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": "9b2c",
            "user_id": "u1",
            "title": "Buy milk",
            "description": null,
            "is_complete": false,
            "created_at": "2024-05-01T10:00:00+00:00"
        }])))
        .expect(1)
        .mount(&server)
        .await;

    let response = send(&router(&server), get("/dashboard/items", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("Buy milk"));
}

#[tokio::test]
async fn test_item_cache_follows_verified_user() {
    let server = MockServer::start().await;

    // Both cookies claim u1; only the first token belongs to u1.
    let owner = stored_session_cookie(&MockServer::start().await, session("owner-token", None)).await;
    let other = stored_session_cookie(&MockServer::start().await, session("other-token", None)).await;

    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .and(header("authorization", "Bearer owner-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(user()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .and(header("authorization", "Bearer other-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "u2",
            "email": "mallory@example.com",
            "role": "authenticated"
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/items"))
        .and(header("authorization", "Bearer owner-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": "9b2c",
            "user_id": "u1",
            "title": "Private plans",
            "description": null,
            "is_complete": false,
            "created_at": "2024-05-01T10:00:00+00:00"
        }])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/items"))
        .and(header("authorization", "Bearer other-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let app = router(&server);

    let page = body_text(send(&app, get("/dashboard/items", Some(&owner))).await).await;
    assert!(page.contains("Private plans"));

    let page = body_text(send(&app, get("/dashboard/items", Some(&other))).await).await;
    assert!(page.contains("mallory@example.com"));
    assert!(!page.contains("Private plans"));
    assert!(page.contains("No items yet."));
}
