//! Shared setup for the HTTP integration tests.
//!
//! Every test gets its own in-memory database behind a single pooled
//! connection, so tests can run in parallel without interfering.

#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use chatbot_projects_api::config::Settings;
use chatbot_projects_api::infrastructure::database::migrate;
use chatbot_projects_api::{app, service_provider};
use serde_json::Value;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::collections::HashMap;
use std::str::FromStr;
use tower::ServiceExt;

pub const BOUNDARY: &str = "----chatbot-test-boundary";

/// Settings with no remote service configured unless `overrides` says so.
pub fn test_settings(overrides: &[(&str, &str)]) -> Settings {
    let vars: HashMap<String, String> = overrides
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Settings::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

pub async fn setup_test_db() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .unwrap();
    migrate(&pool).await.unwrap();
    pool
}

pub struct TestApp {
    pub router: Router,
    pub pool: SqlitePool,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_settings(test_settings(&[])).await
    }

    pub async fn with_settings(settings: Settings) -> Self {
        let pool = setup_test_db().await;
        let provider = service_provider(settings.clone(), pool.clone()).unwrap();

        TestApp {
            router: app(provider, &settings),
            pool,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(token), Some(body)).await
    }

    /// Registers a user and returns `(token, user id)`.
    pub async fn register(&self, email: &str) -> (String, String) {
        let (status, json) = self
            .request(
                Method::POST,
                "/api/auth/register",
                None,
                Some(serde_json::json!({
                    "email": email,
                    "password": "secret-password",
                    "name": "Test User",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{json}");

        (
            json["data"]["token"].as_str().unwrap().to_owned(),
            json["data"]["user"]["id"].as_str().unwrap().to_owned(),
        )
    }

    /// Creates a project and returns its id.
    pub async fn create_project(&self, token: &str, name: &str) -> String {
        let (status, json) = self
            .post(
                "/api/projects",
                token,
                serde_json::json!({ "name": name, "systemPrompt": "You are helpful." }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{json}");
        json["data"]["project"]["id"].as_str().unwrap().to_owned()
    }

    /// Creates a chat and returns its id.
    pub async fn create_chat(&self, token: &str, project_id: &str) -> String {
        let (status, json) = self
            .post(
                &format!("/api/chat/projects/{project_id}/chats"),
                token,
                serde_json::json!({}),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{json}");
        json["data"]["chat"]["id"].as_str().unwrap().to_owned()
    }

    pub async fn upload(
        &self,
        token: &str,
        project_id: &str,
        files: &[(&str, &str)],
    ) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri(format!("/api/files/projects/{project_id}/upload"))
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(files)))
            .unwrap();
        self.send(request).await
    }

    pub async fn count(&self, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }
}

/// A `multipart/form-data` body with one `files` part per `(filename, content)`.
pub fn multipart_body(files: &[(&str, &str)]) -> String {
    let mut body = String::new();
    for (filename, content) in files {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{filename}\"\r\nContent-Type: text/plain\r\n\r\n{content}\r\n"
        ));
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));
    body
}
