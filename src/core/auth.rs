//! Accounts and bearer-token sessions.
//!
//! Passwords are stored as argon2id PHC strings. Tokens are 32 random bytes,
//! handed to the client once; the database only keeps their blake3 hash.

use crate::config::Settings;
use crate::core::traits::{AuthService, AuthSession};
use crate::error::{ApiError, ApiResult};
use crate::infrastructure::entities::{Session, User};
use crate::infrastructure::traits::UserRepository;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{Duration, Utc};
use di::{Ref, injectable};
use log::info;
use rand::RngCore;
use rand::rngs::OsRng;
use uuid::Uuid;

pub const MIN_PASSWORD_LENGTH: usize = 6;

const INVALID_CREDENTIALS: &str = "Invalid email or password";

pub async fn hash_password(password: &str) -> ApiResult<String> {
    let password = password.to_owned();
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| ApiError::Internal(format!("password hashing failed: {e}")))
    })
    .await
    .map_err(|e| ApiError::Internal(format!("password hashing task failed: {e}")))?
}

pub async fn verify_password(password: &str, password_hash: &str) -> ApiResult<bool> {
    let password = password.to_owned();
    let password_hash = password_hash.to_owned();
    tokio::task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&password_hash)
            .map_err(|e| ApiError::Internal(format!("stored password hash is invalid: {e}")))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    })
    .await
    .map_err(|e| ApiError::Internal(format!("password verification task failed: {e}")))?
}

pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn token_hash(token: &str) -> String {
    blake3::hash(token.as_bytes()).to_hex().to_string()
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_registration(email: &str, password: &str, name: &str) -> ApiResult<()> {
    let valid_email = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && !domain.is_empty())
        && !email.contains(char::is_whitespace);
    if !valid_email {
        return Err(ApiError::validation("A valid email is required"));
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::validation(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    if name.trim().is_empty() {
        return Err(ApiError::validation("Name is required"));
    }
    Ok(())
}

#[injectable(AuthService)]
pub struct MyAuthService {
    users: Ref<dyn UserRepository>,
    settings: Ref<Settings>,
}

impl MyAuthService {
    async fn issue_session(&self, user: User) -> ApiResult<AuthSession> {
        let token = generate_token();
        let now = Utc::now();

        self.users
            .create_session(Session {
                id: Uuid::new_v4(),
                user_id: user.id,
                token_hash: token_hash(&token),
                created_at: now,
                expires_at: now + Duration::hours(self.settings.session_ttl_hours),
            })
            .await?;

        Ok(AuthSession { user, token })
    }
}

#[async_trait]
impl AuthService for MyAuthService {
    async fn register(&self, email: &str, password: &str, name: &str) -> ApiResult<AuthSession> {
        let email = normalize_email(email);
        validate_registration(&email, password, name)?;

        if self.users.find_user_by_email(&email).await?.is_some() {
            return Err(ApiError::validation("User already exists with this email"));
        }

        let user = self
            .users
            .create_user(User {
                id: Uuid::new_v4(),
                email,
                password_hash: hash_password(password).await?,
                name: name.trim().to_owned(),
                created_at: Utc::now(),
            })
            .await?;
        info!("registered user {}", user.id);

        self.issue_session(user).await
    }

    async fn login(&self, email: &str, password: &str) -> ApiResult<AuthSession> {
        let user = self
            .users
            .find_user_by_email(&normalize_email(email))
            .await?
            .ok_or_else(|| ApiError::unauthorized(INVALID_CREDENTIALS))?;

        if !verify_password(password, &user.password_hash).await? {
            return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
        }

        self.issue_session(user).await
    }

    async fn authenticate(&self, token: &str) -> ApiResult<User> {
        self.users
            .find_session_user(&token_hash(token), Utc::now())
            .await?
            .ok_or_else(|| ApiError::unauthorized("Invalid or expired token"))
    }

    async fn me(&self, user_id: Uuid) -> ApiResult<User> {
        self.users
            .find_user(user_id)
            .await?
            .ok_or_else(|| ApiError::not_found("User not found"))
    }

    async fn logout(&self, token: &str) -> ApiResult<()> {
        self.users.delete_session(&token_hash(token)).await?;
        Ok(())
    }
}
