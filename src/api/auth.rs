//! Account endpoints

use crate::api::auth::schemas::{AuthPayload, Credentials, Registration, UserPayload};
use crate::api::{ApiResponse, BearerToken, ExtractUser, JsonBody};
use crate::core::traits::AuthService;
use crate::error::ApiResult;
use axum::Router;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use di_axum::Inject;

pub fn router() -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/me", get(me))
        .route("/logout", post(logout))
}

async fn register(
    Inject(auth_service): Inject<dyn AuthService>,
    JsonBody(registration): JsonBody<Registration>,
) -> ApiResult<impl IntoResponse> {
    let session = auth_service
        .register(
            &registration.email,
            &registration.password,
            &registration.name,
        )
        .await?;

    Ok(ApiResponse::created(AuthPayload::from(session)))
}

async fn login(
    Inject(auth_service): Inject<dyn AuthService>,
    JsonBody(credentials): JsonBody<Credentials>,
) -> ApiResult<impl IntoResponse> {
    let session = auth_service
        .login(&credentials.email, &credentials.password)
        .await?;

    Ok(ApiResponse::ok(AuthPayload::from(session)))
}

async fn me(
    Inject(auth_service): Inject<dyn AuthService>,
    ExtractUser(user): ExtractUser,
) -> ApiResult<impl IntoResponse> {
    let user = auth_service.me(user.id).await?;
    Ok(ApiResponse::ok(UserPayload { user: user.into() }))
}

async fn logout(
    Inject(auth_service): Inject<dyn AuthService>,
    ExtractUser(_user): ExtractUser,
    BearerToken(token): BearerToken,
) -> ApiResult<impl IntoResponse> {
    auth_service.logout(&token).await?;
    Ok(ApiResponse::message("Logged out"))
}

pub mod schemas {
    use crate::core::traits::AuthSession;
    use crate::infrastructure::entities;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    #[derive(Deserialize, Debug)]
    pub struct Registration {
        #[serde(default)]
        pub email: String,
        #[serde(default)]
        pub password: String,
        #[serde(default)]
        pub name: String,
    }

    #[derive(Deserialize, Debug)]
    pub struct Credentials {
        #[serde(default)]
        pub email: String,
        #[serde(default)]
        pub password: String,
    }

    #[derive(Serialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub struct User {
        pub id: Uuid,
        pub email: String,
        pub name: String,
        pub created_at: DateTime<Utc>,
    }

    impl From<entities::User> for User {
        fn from(user: entities::User) -> Self {
            User {
                id: user.id,
                email: user.email,
                name: user.name,
                created_at: user.created_at,
            }
        }
    }

    #[derive(Serialize, Debug)]
    pub struct UserPayload {
        pub user: User,
    }

    #[derive(Serialize, Debug)]
    pub struct AuthPayload {
        pub user: User,
        pub token: String,
    }

    impl From<AuthSession> for AuthPayload {
        fn from(session: AuthSession) -> Self {
            AuthPayload {
                user: session.user.into(),
                token: session.token,
            }
        }
    }
}
