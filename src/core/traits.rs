//! DI "Interfaces"

use crate::core::backends::TokenUsage;
use crate::error::ApiResult;
use crate::infrastructure::entities;
use async_trait::async_trait;
use uuid::Uuid;

/// A freshly authenticated user together with the bearer token issued for it.
#[derive(Debug)]
pub struct AuthSession {
    pub user: entities::User,
    pub token: String,
}

#[async_trait]
pub trait AuthService: Send + Sync {
    /// Creates an account and signs it in.
    ///
    /// Returns `Validation` for malformed input or an email that is already taken.
    async fn register(&self, email: &str, password: &str, name: &str) -> ApiResult<AuthSession>;

    /// Returns `Unauthorized` for an unknown email or a wrong password alike.
    async fn login(&self, email: &str, password: &str) -> ApiResult<AuthSession>;

    /// Resolves a bearer token to its user if the session is still valid.
    async fn authenticate(&self, token: &str) -> ApiResult<entities::User>;

    async fn me(&self, user_id: Uuid) -> ApiResult<entities::User>;

    async fn logout(&self, token: &str) -> ApiResult<()>;
}

/// Fields of a project update; `None` leaves the stored value untouched.
#[derive(Debug, Default)]
pub struct ProjectChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub system_prompt: Option<String>,
}

#[async_trait]
pub trait ProjectService: Send + Sync {
    async fn list_projects(&self, user_id: Uuid) -> ApiResult<Vec<entities::Project>>;

    async fn create_project(
        &self,
        user_id: Uuid,
        name: &str,
        description: Option<&str>,
        system_prompt: &str,
    ) -> ApiResult<entities::Project>;

    /// Returns `NotFound` if the project does not exist or belongs to someone else.
    async fn get_project(&self, user_id: Uuid, project_id: Uuid) -> ApiResult<entities::Project>;

    async fn update_project(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        changes: ProjectChanges,
    ) -> ApiResult<entities::Project>;

    /// Deletes the project together with its chats, messages and file rows.
    async fn delete_project(&self, user_id: Uuid, project_id: Uuid) -> ApiResult<()>;
}

#[derive(Debug, Clone)]
pub struct ReplyMetadata {
    pub backend_label: String,
    pub token_usage: Option<TokenUsage>,
}

#[derive(Debug)]
pub struct SentMessage {
    pub user_message: entities::Message,
    pub assistant_message: entities::Message,
    pub metadata: ReplyMetadata,
}

#[async_trait]
pub trait ChatService: Send + Sync {
    async fn list_chats(&self, user_id: Uuid, project_id: Uuid) -> ApiResult<Vec<entities::Chat>>;

    async fn create_chat(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        title: Option<&str>,
    ) -> ApiResult<entities::Chat>;

    /// All messages in a chat, oldest first.
    ///
    /// Returns `NotFound` if the chat isn't reachable through one of the user's projects.
    async fn list_messages(&self, user_id: Uuid, chat_id: Uuid)
    -> ApiResult<Vec<entities::Message>>;

    /// Stores the user's message, obtains a reply and stores it too.
    ///
    /// Only an empty message (`Validation`) or an unknown chat (`NotFound`) fail;
    /// backend outages are answered with an offline reply instead.
    async fn send_message(
        &self,
        user_id: Uuid,
        chat_id: Uuid,
        content: &str,
        file_ids: &[String],
    ) -> ApiResult<SentMessage>;
}

/// One file received in an upload request.
#[derive(Debug)]
pub struct IncomingFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug)]
pub struct UploadFailure {
    pub filename: String,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct UploadOutcome {
    pub files: Vec<entities::ProjectFile>,
    pub errors: Vec<UploadFailure>,
}

#[derive(Debug)]
pub struct FileContent {
    pub content: String,
    pub filename: String,
    pub mime_type: String,
}

#[async_trait]
pub trait FileService: Send + Sync {
    /// Validates the whole batch before anything is stored, then uploads each
    /// file. A remote failure marks that file as `error` and is reported in
    /// [`UploadOutcome::errors`]; it does not fail the request.
    async fn upload_files(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        files: Vec<IncomingFile>,
    ) -> ApiResult<UploadOutcome>;

    async fn list_files(
        &self,
        user_id: Uuid,
        project_id: Uuid,
    ) -> ApiResult<Vec<entities::ProjectFile>>;

    /// Removes the row; the remote copy is deleted on a best-effort basis.
    async fn delete_file(&self, user_id: Uuid, file_id: Uuid) -> ApiResult<()>;

    async fn file_content(&self, user_id: Uuid, file_id: Uuid) -> ApiResult<FileContent>;
}
