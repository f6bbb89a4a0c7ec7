//! Infrastructure traits, used for DI on higher levels
//!
//! Every lookup that takes an `owner_id` only matches rows reachable from a
//! project owned by that user, so "missing" and "not yours" look the same.

use crate::infrastructure::entities;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub type RepoResult<T> = Result<T, sqlx::Error>;

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create_user(&self, user: entities::User) -> RepoResult<entities::User>;

    async fn find_user(&self, user_id: Uuid) -> RepoResult<Option<entities::User>>;

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<entities::User>>;

    async fn create_session(&self, session: entities::Session) -> RepoResult<entities::Session>;

    /// Resolves a token hash to its user if the session has not expired at `now`.
    async fn find_session_user(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> RepoResult<Option<entities::User>>;

    async fn delete_session(&self, token_hash: &str) -> RepoResult<bool>;
}

#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn list_projects(&self, owner_id: Uuid) -> RepoResult<Vec<entities::Project>>;

    async fn find_project(
        &self,
        owner_id: Uuid,
        project_id: Uuid,
    ) -> RepoResult<Option<entities::Project>>;

    async fn create_project(&self, project: entities::Project) -> RepoResult<entities::Project>;

    /// Overwrites the mutable columns. Returns `None` when the project is not the owner's.
    async fn update_project(
        &self,
        project: entities::Project,
    ) -> RepoResult<Option<entities::Project>>;

    async fn delete_project(&self, owner_id: Uuid, project_id: Uuid) -> RepoResult<bool>;
}

#[async_trait]
pub trait ChatRepository: Send + Sync {
    async fn list_chats(&self, owner_id: Uuid, project_id: Uuid)
    -> RepoResult<Vec<entities::Chat>>;

    async fn create_chat(&self, chat: entities::Chat) -> RepoResult<entities::Chat>;

    async fn find_chat(&self, owner_id: Uuid, chat_id: Uuid) -> RepoResult<Option<entities::Chat>>;

    /// All messages of a chat, oldest first.
    async fn list_messages(&self, chat_id: Uuid) -> RepoResult<Vec<entities::Message>>;

    /// The `limit` newest messages of a chat other than `exclude`, oldest first.
    async fn recent_messages(
        &self,
        chat_id: Uuid,
        exclude: Uuid,
        limit: usize,
    ) -> RepoResult<Vec<entities::Message>>;

    async fn create_message(&self, message: entities::Message) -> RepoResult<entities::Message>;
}

#[async_trait]
pub trait FileRepository: Send + Sync {
    async fn create_file(&self, file: entities::ProjectFile) -> RepoResult<entities::ProjectFile>;

    async fn mark_processed(
        &self,
        file_id: Uuid,
        external_id: &str,
    ) -> RepoResult<entities::ProjectFile>;

    async fn mark_failed(&self, file_id: Uuid, error: &str) -> RepoResult<entities::ProjectFile>;

    async fn list_files(
        &self,
        owner_id: Uuid,
        project_id: Uuid,
    ) -> RepoResult<Vec<entities::ProjectFile>>;

    async fn find_file(
        &self,
        owner_id: Uuid,
        file_id: Uuid,
    ) -> RepoResult<Option<entities::ProjectFile>>;

    async fn find_by_external_ids(
        &self,
        owner_id: Uuid,
        external_ids: &[String],
    ) -> RepoResult<Vec<entities::ProjectFile>>;

    async fn delete_file(&self, file_id: Uuid) -> RepoResult<bool>;
}
