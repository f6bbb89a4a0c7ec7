use crate::core::traits::AuthService;
use crate::error::ApiError;
use crate::infrastructure::entities::User;
use async_trait::async_trait;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, FromRequestParts, Path, Request};
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use axum::Json;
use di_axum::Inject;
use log::error;
use serde::Serialize;
use std::any::Any;
use uuid::Uuid;

pub mod auth;
pub mod chats;
pub mod files;
pub mod health;
pub mod projects;

/// The `{success, data?, message?}` envelope every `/api` response uses.
#[derive(Serialize, Debug)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(ApiResponse {
            success: true,
            data: Some(data),
            message: None,
        })
    }

    pub fn created(data: T) -> (StatusCode, Json<Self>) {
        (StatusCode::CREATED, Self::ok(data))
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Json<Self> {
        Json(ApiResponse {
            success: true,
            data: None,
            message: Some(message.into()),
        })
    }
}

/// The raw token from an `Authorization: Bearer <token>` header.
#[derive(Debug)]
pub struct BearerToken(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, ApiError> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or_else(|| ApiError::unauthorized("Access token required"))?;

        header
            .to_str()
            .ok()
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(|token| BearerToken(token.to_owned()))
            .ok_or_else(|| ApiError::unauthorized("Malformed authorization header"))
    }
}

/// The user behind a valid, unexpired bearer token.
#[derive(Debug)]
pub struct ExtractUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for ExtractUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, ApiError> {
        let BearerToken(token) = BearerToken::from_request_parts(parts, state).await?;
        let Inject(auth_service) = Inject::<dyn AuthService>::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError::Internal("auth service is not registered".to_owned()))?;

        Ok(ExtractUser(auth_service.authenticate(&token).await?))
    }
}

/// `Json` whose rejections use the error envelope.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, ApiError> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| ApiError::validation(e.body_text()))?;
        Ok(JsonBody(value))
    }
}

/// A single `:id` path segment parsed as a UUID.
#[derive(Debug)]
pub struct PathId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for PathId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, ApiError> {
        let Path(id) = Path::<Uuid>::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError::validation("Invalid id"))?;
        Ok(PathId(id))
    }
}

pub async fn not_found() -> ApiError {
    ApiError::not_found("Route not found")
}

pub fn panic_response(_panic: Box<dyn Any + Send + 'static>) -> Response {
    error!("request handler panicked");
    ApiError::Internal("request handler panicked".to_owned()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn parts_with(header: Option<HeaderValue>) -> Parts {
        let mut request = axum::http::Request::builder().body(()).unwrap();
        if let Some(value) = header {
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        request.into_parts().0
    }

    #[tokio::test]
    async fn test_bearer_token_extracted() {
        let mut parts = parts_with(Some(HeaderValue::from_static("Bearer abc123")));
        let BearerToken(token) = BearerToken::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(token, "abc123");
    }

    #[tokio::test]
    async fn test_bearer_token_missing() {
        let mut parts = parts_with(None);
        let err = BearerToken::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_bearer_token_wrong_scheme() {
        for value in ["Basic abc", "Bearer ", "abc"] {
            let mut parts = parts_with(Some(HeaderValue::from_static(value)));
            let err = BearerToken::from_request_parts(&mut parts, &())
                .await
                .unwrap_err();
            assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[tokio::test]
    async fn test_bearer_token_invalid_utf8() {
        let mut parts = parts_with(Some(HeaderValue::from_bytes(&[0xFF, 0xFE]).unwrap()));
        assert!(BearerToken::from_request_parts(&mut parts, &()).await.is_err());
    }

    #[test]
    fn test_envelope_skips_empty_fields() {
        let Json(body) = ApiResponse::ok(1);
        assert_eq!(
            serde_json::to_value(body).unwrap(),
            serde_json::json!({ "success": true, "data": 1 })
        );

        let Json(body) = ApiResponse::message("done");
        assert_eq!(
            serde_json::to_value(body).unwrap(),
            serde_json::json!({ "success": true, "message": "done" })
        );
    }
}
