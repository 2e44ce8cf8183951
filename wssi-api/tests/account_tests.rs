//! Self-service key issuance, registration and login

mod helpers;

use axum::http::StatusCode;
use helpers::{error_code, TestApp};
use serde_json::json;

#[tokio::test]
async fn test_keys_request_returns_free_key_with_zero_limit() {
    let app = TestApp::new().await;
    let (status, body) = app
        .post_json("/api/v1/keys/request", &[], json!({"email": "free@example.com", "tier": "free"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "free@example.com");
    assert_eq!(body["tier"], "free");
    assert_eq!(body["rate_limit"], 0);
    assert!(body["api_key"].as_str().unwrap().starts_with("wssi-free-"));
}

#[tokio::test]
async fn test_requested_free_key_is_hard_limited() {
    let app = TestApp::new().await;
    let (_, body) = app
        .post_json("/api/v1/keys/request", &[], json!({"email": "limited@example.com"}))
        .await;
    let key = body["api_key"].as_str().unwrap();

    let (status, body) = app.get("/wssi/current", &[("X-API-Key", key)]).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(error_code(&body), "RATE_LIMIT_EXCEEDED");
}

#[tokio::test]
async fn test_keys_request_validation() {
    let app = TestApp::new().await;

    let (status, body) = app
        .post_json("/api/v1/keys/request", &[], json!({"email": "not-an-email"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "INVALID_REQUEST");

    let (status, body) = app
        .post_json("/api/v1/keys/request", &[], json!({"email": "big@example.com", "tier": "enterprise"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "CONTACT_SALES_REQUIRED");

    let (status, body) = app
        .post_json("/api/v1/keys/request", &[], json!({"email": "x@example.com", "tier": "platinum"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "INVALID_TIER");

    let (status, body) = app.post_json("/api/v1/keys/request", &[], json!({"tier": "basic"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "INVALID_REQUEST");
}

#[tokio::test]
async fn test_register_and_login_rotate_api_keys() {
    let app = TestApp::new().await;
    let (status, register) = app
        .post_json(
            "/api/v1/auth/register",
            &[],
            json!({
                "email": "auth@example.com",
                "password": "ValidPass123",
                "tier": "basic",
                "first_name": "Py",
                "last_name": "Test"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let first_key = register["api_key"].as_str().unwrap().to_string();
    assert!(first_key.starts_with("wssi-basic-"));
    assert!(register["access_token"].as_str().is_some_and(|t| !t.is_empty()));
    assert!(register["refresh_token"].as_str().is_some_and(|t| !t.is_empty()));
    assert_eq!(register["user"]["email"], "auth@example.com");
    assert_eq!(register["user"]["first_name"], "Py");

    let (status, login) = app
        .post_json(
            "/api/v1/auth/login",
            &[],
            json!({"email": "Auth@Example.com", "password": "ValidPass123"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let second_key = login["api_key"].as_str().unwrap().to_string();
    assert!(second_key.starts_with("wssi-basic-"));
    assert_ne!(second_key, first_key);

    let (status, body) = app
        .post_json("/api/v1/auth/key-login", &[], json!({"api_key": first_key}))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), "AUTH_INVALID");

    let (status, body) = app
        .post_json("/api/v1/auth/key-login", &[], json!({"api_key": second_key}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tier"], "basic");
    assert_eq!(body["rate_limit"], 10_000);
}

#[tokio::test]
async fn test_register_rejects_duplicates_and_weak_passwords() {
    let app = TestApp::new().await;
    let body = json!({"email": "dup@example.com", "password": "ValidPass123"});

    let (status, _) = app.post_json("/api/v1/auth/register", &[], body.clone()).await;
    assert_eq!(status, StatusCode::OK);

    let (status, resp) = app.post_json("/api/v1/auth/register", &[], body).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&resp), "EMAIL_EXISTS");

    let (status, resp) = app
        .post_json(
            "/api/v1/auth/register",
            &[],
            json!({"email": "weak@example.com", "password": "short"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&resp), "INVALID_REQUEST");
}

#[tokio::test]
async fn test_login_rejects_bad_credentials() {
    let app = TestApp::new().await;
    app.post_json(
        "/api/v1/auth/register",
        &[],
        json!({"email": "login@example.com", "password": "ValidPass123"}),
    )
    .await;

    for body in [
        json!({"email": "login@example.com", "password": "WrongPass123"}),
        json!({"email": "nobody@example.com", "password": "ValidPass123"}),
    ] {
        let (status, resp) = app.post_json("/api/v1/auth/login", &[], body).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(error_code(&resp), "INVALID_CREDENTIALS");
    }
}

#[tokio::test]
async fn test_key_login_does_not_consume_quota() {
    let app = TestApp::new().await;
    let (_, body) = app
        .post_json("/api/v1/keys/request", &[], json!({"email": "quota@example.com"}))
        .await;
    let key = body["api_key"].as_str().unwrap();

    // Free keys have no quota at all, yet key login still succeeds
    for _ in 0..2 {
        let (status, body) = app.post_json("/api/v1/auth/key-login", &[], json!({"api_key": key})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tier"], "free");
    }
}
