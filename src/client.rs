//! Typed HTTP client for the API.
//!
//! The bearer token lives in a [`Session`] that is handed to the client
//! rather than kept in global state, so several clients (or tests) can share
//! or isolate sessions as they see fit. Any 401 response clears the session.

use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The token was missing, invalid or expired; the session has been cleared.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("API returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("unexpected response: {0}")]
    Malformed(String),
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Holds the bearer token of the signed-in user, if any.
#[derive(Debug, Default)]
pub struct Session {
    token: RwLock<Option<String>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().ok().and_then(|token| token.clone())
    }

    pub fn set_token(&self, token: impl Into<String>) {
        if let Ok(mut guard) = self.token.write() {
            *guard = Some(token.into());
        }
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.token.write() {
            *guard = None;
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub system_prompt: String,
}

#[derive(Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProjectUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub role: String,
    pub content: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReplyMetadata {
    pub backend_label: String,
    pub token_usage: Option<TokenUsage>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Exchange {
    pub user_message: Message,
    pub assistant_message: Message,
    pub metadata: ReplyMetadata,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFile {
    pub id: Uuid,
    pub original_name: String,
    pub mime_type: String,
    pub size: i64,
    pub external_id: Option<String>,
    pub status: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub database: bool,
    pub anthropic: bool,
    pub openai: bool,
    pub file_storage: bool,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Health {
    pub success: bool,
    pub services: ServiceStatus,
    pub version: String,
}

#[derive(Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
    message: Option<String>,
}

#[derive(Deserialize)]
struct AuthData {
    user: User,
    token: String,
}

#[derive(Deserialize)]
struct UserData {
    user: User,
}

#[derive(Deserialize)]
struct ProjectData {
    project: Project,
}

#[derive(Deserialize)]
struct ProjectsData {
    projects: Vec<Project>,
}

#[derive(Deserialize)]
struct ChatData {
    chat: Chat,
}

#[derive(Deserialize)]
struct ChatsData {
    chats: Vec<Chat>,
}

#[derive(Deserialize)]
struct MessagesData {
    messages: Vec<Message>,
}

#[derive(Deserialize)]
struct FilesData {
    files: Vec<ProjectFile>,
}

pub struct ApiClient {
    http: Client,
    base_url: String,
    session: Arc<Session>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, session: Arc<Session>) -> Self {
        Self::with_client(Client::new(), base_url, session)
    }

    pub fn with_client(http: Client, base_url: impl Into<String>, session: Arc<Session>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            session,
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let request = self.http.request(method, format!("{}{}", self.base_url, path));
        match self.session.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn envelope<T: DeserializeOwned>(&self, request: RequestBuilder) -> ClientResult<Envelope<T>> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        let envelope: Option<Envelope<T>> = serde_json::from_str(&body).ok();

        if status == StatusCode::UNAUTHORIZED {
            self.session.clear();
            let message = envelope
                .and_then(|e| e.message)
                .unwrap_or_else(|| "Unauthorized".to_owned());
            return Err(ClientError::Unauthorized(message));
        }

        match envelope {
            Some(envelope) if status.is_success() && envelope.success => Ok(envelope),
            Some(envelope) => Err(ClientError::Api {
                status: status.as_u16(),
                message: envelope.message.unwrap_or_default(),
            }),
            None if status.is_success() => Err(ClientError::Malformed(body)),
            None => Err(ClientError::Api {
                status: status.as_u16(),
                message: body,
            }),
        }
    }

    async fn data<T: DeserializeOwned>(&self, request: RequestBuilder) -> ClientResult<T> {
        self.envelope::<T>(request)
            .await?
            .data
            .ok_or_else(|| ClientError::Malformed("response has no data".to_owned()))
    }

    async fn empty(&self, request: RequestBuilder) -> ClientResult<()> {
        self.envelope::<serde_json::Value>(request).await.map(|_| ())
    }

    pub async fn register(&self, email: &str, password: &str, name: &str) -> ClientResult<User> {
        let request = self
            .request(Method::POST, "/api/auth/register")
            .json(&json!({ "email": email, "password": password, "name": name }));
        let auth: AuthData = self.data(request).await?;
        self.session.set_token(auth.token);
        Ok(auth.user)
    }

    pub async fn login(&self, email: &str, password: &str) -> ClientResult<User> {
        let request = self
            .request(Method::POST, "/api/auth/login")
            .json(&json!({ "email": email, "password": password }));
        let auth: AuthData = self.data(request).await?;
        self.session.set_token(auth.token);
        Ok(auth.user)
    }

    pub async fn me(&self) -> ClientResult<User> {
        let data: UserData = self.data(self.request(Method::GET, "/api/auth/me")).await?;
        Ok(data.user)
    }

    /// Revokes the token server-side; the local session is cleared either way.
    pub async fn logout(&self) -> ClientResult<()> {
        let result = self
            .empty(self.request(Method::POST, "/api/auth/logout"))
            .await;
        self.session.clear();
        result
    }

    pub async fn list_projects(&self) -> ClientResult<Vec<Project>> {
        let data: ProjectsData = self.data(self.request(Method::GET, "/api/projects")).await?;
        Ok(data.projects)
    }

    pub async fn create_project(
        &self,
        name: &str,
        description: Option<&str>,
        system_prompt: &str,
    ) -> ClientResult<Project> {
        let request = self.request(Method::POST, "/api/projects").json(&json!({
            "name": name,
            "description": description,
            "systemPrompt": system_prompt,
        }));
        let data: ProjectData = self.data(request).await?;
        Ok(data.project)
    }

    pub async fn get_project(&self, project_id: Uuid) -> ClientResult<Project> {
        let path = format!("/api/projects/{project_id}");
        let data: ProjectData = self.data(self.request(Method::GET, &path)).await?;
        Ok(data.project)
    }

    pub async fn update_project(
        &self,
        project_id: Uuid,
        update: &ProjectUpdate,
    ) -> ClientResult<Project> {
        let path = format!("/api/projects/{project_id}");
        let data: ProjectData = self
            .data(self.request(Method::PUT, &path).json(update))
            .await?;
        Ok(data.project)
    }

    pub async fn delete_project(&self, project_id: Uuid) -> ClientResult<()> {
        let path = format!("/api/projects/{project_id}");
        self.empty(self.request(Method::DELETE, &path)).await
    }

    pub async fn list_chats(&self, project_id: Uuid) -> ClientResult<Vec<Chat>> {
        let path = format!("/api/chat/projects/{project_id}/chats");
        let data: ChatsData = self.data(self.request(Method::GET, &path)).await?;
        Ok(data.chats)
    }

    pub async fn create_chat(&self, project_id: Uuid, title: Option<&str>) -> ClientResult<Chat> {
        let path = format!("/api/chat/projects/{project_id}/chats");
        let data: ChatData = self
            .data(self.request(Method::POST, &path).json(&json!({ "title": title })))
            .await?;
        Ok(data.chat)
    }

    pub async fn list_messages(&self, chat_id: Uuid) -> ClientResult<Vec<Message>> {
        let path = format!("/api/chat/chats/{chat_id}/messages");
        let data: MessagesData = self.data(self.request(Method::GET, &path)).await?;
        Ok(data.messages)
    }

    pub async fn send_message(
        &self,
        chat_id: Uuid,
        content: &str,
        file_ids: &[String],
    ) -> ClientResult<Exchange> {
        let path = format!("/api/chat/chats/{chat_id}/messages");
        let request = self
            .request(Method::POST, &path)
            .json(&json!({ "content": content, "fileIds": file_ids }));
        self.data(request).await
    }

    pub async fn list_files(&self, project_id: Uuid) -> ClientResult<Vec<ProjectFile>> {
        let path = format!("/api/files/projects/{project_id}/files");
        let data: FilesData = self.data(self.request(Method::GET, &path)).await?;
        Ok(data.files)
    }

    /// `/health` is not enveloped and needs no token.
    pub async fn health(&self) -> ClientResult<Health> {
        let response = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ClientError::Malformed(e.to_string()))
    }
}
