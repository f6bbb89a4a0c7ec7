//! Authentication flow tests
//!
//! Registration, login, bearer-token resolution and session revocation
//! through the full router.

mod common;

use axum::http::{Method, StatusCode};
use chatbot_projects_api::core::auth::token_hash;
use chrono::{Duration, Utc};
use common::TestApp;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn test_register_login_and_me_agree() {
    let app = TestApp::new().await;
    let (_, user_id) = app.register("ada@example.com").await;

    let (status, json) = app
        .request(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": "Ada@Example.com", "password": "secret-password" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["user"]["id"], user_id);
    assert!(json["data"]["user"].get("passwordHash").is_none());

    let token = json["data"]["token"].as_str().unwrap();
    let (status, json) = app.get("/api/auth/me", token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["user"]["id"], user_id);
    assert_eq!(json["data"]["user"]["email"], "ada@example.com");
}

#[tokio::test]
async fn test_duplicate_email_is_rejected() {
    let app = TestApp::new().await;
    app.register("ada@example.com").await;

    let (status, json) = app
        .request(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({ "email": "ada@example.com", "password": "another-one", "name": "Ada" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
    assert_eq!(app.count("users").await, 1);
}

#[tokio::test]
async fn test_registration_validation() {
    let app = TestApp::new().await;

    for body in [
        json!({ "email": "ada@example.com", "password": "short", "name": "Ada" }),
        json!({ "email": "not-an-email", "password": "secret-password", "name": "Ada" }),
        json!({ "email": "ada@example.com", "password": "secret-password" }),
    ] {
        let (status, json) = app
            .request(Method::POST, "/api/auth/register", None, Some(body))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{json}");
        assert!(json["message"].is_string());
    }
    assert_eq!(app.count("users").await, 0);
}

#[tokio::test]
async fn test_bad_login_is_uniform() {
    let app = TestApp::new().await;
    app.register("ada@example.com").await;

    let (wrong_password, wrong_password_json) = app
        .request(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": "ada@example.com", "password": "not-the-password" })),
        )
        .await;
    let (unknown_email, unknown_email_json) = app
        .request(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": "nobody@example.com", "password": "secret-password" })),
        )
        .await;

    assert_eq!(wrong_password, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_email, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password_json["message"], unknown_email_json["message"]);
}

#[tokio::test]
async fn test_missing_or_invalid_token() {
    let app = TestApp::new().await;

    let (status, json) = app
        .request(Method::GET, "/api/projects", None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["success"], false);

    let (status, _) = app.get("/api/auth/me", "not-a-real-token").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_revokes_token() {
    let app = TestApp::new().await;
    let (token, _) = app.register("ada@example.com").await;

    let (status, json) = app
        .request(Method::POST, "/api/auth/logout", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);

    let (status, _) = app.get("/api/auth/me", &token).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.count("sessions").await, 0);
}

#[tokio::test]
async fn test_expired_session_does_not_authenticate() {
    let app = TestApp::new().await;
    let (_, user_id) = app.register("ada@example.com").await;

    let token = "expired-token";
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO sessions (id, user_id, token_hash, created_at, expires_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4())
    .bind(Uuid::parse_str(&user_id).unwrap())
    .bind(token_hash(token))
    .bind(now - Duration::hours(2))
    .bind(now - Duration::hours(1))
    .execute(&app.pool)
    .await
    .unwrap();

    let (status, _) = app.get("/api/auth/me", token).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_route_uses_envelope() {
    let app = TestApp::new().await;

    let (status, json) = app
        .request(Method::GET, "/api/does-not-exist", None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["success"], false);
}
