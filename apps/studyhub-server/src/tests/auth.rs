//! Registration, login and bearer token tests.

use axum::http::{Method, StatusCode};
use serde_json::json;

use super::common::*;
use crate::auth::TokenKeys;

#[tokio::test]
async fn register_requires_whitelisted_email() {
    let app = TestApp::new().await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({ "email": "nobody@example.com", "name": "Nobody", "password": PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "EMAIL_NOT_WHITELISTED");

    app.whitelist("casey@example.com").await;
    let (status, body) = app
        .call(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({ "email": "Casey@Example.com", "name": "Casey", "password": PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["email"], "casey@example.com");
    assert_eq!(body["verified"], true);
    assert!(body.get("password_hash").is_none());

    let (status, body) = app
        .call(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({ "email": "casey@example.com", "name": "Casey", "password": PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "EMAIL_TAKEN");
}

#[tokio::test]
async fn register_validates_payload() {
    let app = TestApp::new().await;
    app.whitelist("short@example.com").await;

    for payload in [
        json!({ "email": "short@example.com", "name": "Short", "password": "1234567" }),
        json!({ "email": "not-an-email", "name": "X", "password": PASSWORD }),
        json!({ "email": "short@example.com", "name": "", "password": PASSWORD }),
        json!({ "email": "short@example.com" }),
    ] {
        let (status, body) = app
            .call(Method::POST, "/api/auth/register", None, Some(payload))
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{body}");
        assert_eq!(body["code"], "VALIDATION_FAILED");
    }
}

#[tokio::test]
async fn login_checks_password() {
    let app = TestApp::new().await;
    let caller = app.signup("robin").await;
    assert!(!caller.token.is_empty());

    let (status, body) = app
        .call(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": "robin@example.com", "password": "wrong password" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "INVALID_CREDENTIALS");

    // unknown accounts look the same as wrong passwords
    let (status, body) = app
        .call(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": "ghost@example.com", "password": PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "INVALID_CREDENTIALS");
}

#[tokio::test]
async fn bearer_gate() {
    let app = TestApp::new().await;
    let caller = app.signup("sam").await;

    let (status, body) = app.call(Method::GET, "/api/users/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHENTICATED");

    let (status, body) = app
        .call(Method::GET, "/api/users/me", Some("garbage"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "INVALID_CREDENTIAL");

    // signed with someone else's secret
    let foreign = TokenKeys::new(b"some-other-secret-some-other-secret", chrono::Duration::hours(1))
        .issue(&studyhub_storage::UserId::new())
        .unwrap();
    let (status, body) = app
        .call(Method::GET, "/api/users/me", Some(&foreign.token), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "INVALID_CREDENTIAL");

    let (status, body) = app.get("/api/users/me", &caller).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], caller.id.as_str());
}

#[tokio::test]
async fn profile_update_and_activity() {
    let app = TestApp::new().await;
    let caller = app.signup("jo").await;

    let (status, body) = app
        .call(
            Method::PATCH,
            "/api/users/me",
            Some(&caller.token),
            Some(json!({ "bio": "compilers", "github_url": "https://github.com/jo" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["bio"], "compilers");
    assert_eq!(body["name"], "jo");

    let (status, body) = app
        .call(
            Method::PATCH,
            "/api/users/me",
            Some(&caller.token),
            Some(json!({ "blog_url": "ftp://example.com" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "VALIDATION_FAILED");

    let (status, body) = app.get("/api/users/me/activity", &caller).await;
    assert_eq!(status, StatusCode::OK);
    let actions: Vec<_> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["action"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(actions, vec!["user.profile_updated", "user.registered"]);

    let (status, _) = app.get("/api/users/me/activity?limit=5000", &caller).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn metrics_endpoint_renders() {
    let app = TestApp::new().await;
    let (status, _) = app.call(Method::GET, "/metrics", None, None).await;
    assert_eq!(status, StatusCode::OK);
}
