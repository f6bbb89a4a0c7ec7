//! DB Repository abstractions

use crate::infrastructure::database::DatabaseConnection;
use crate::infrastructure::entities::{
    Chat, FileStatus, Message, Project, ProjectFile, Session, User,
};
use crate::infrastructure::traits::{
    ChatRepository, FileRepository, ProjectRepository, RepoResult, UserRepository,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use di::{Ref, injectable};
use log::error;
use sqlx::{QueryBuilder, Sqlite};
use uuid::Uuid;

#[injectable(UserRepository)]
pub struct DbUserRepository {
    connection: Ref<DatabaseConnection>,
}

#[async_trait]
impl UserRepository for DbUserRepository {
    async fn create_user(&self, user: User) -> RepoResult<User> {
        sqlx::query_as(
            "INSERT INTO users (id, email, password_hash, name, created_at) VALUES (?, ?, ?, ?, ?) RETURNING *",
        )
        .bind(user.id)
        .bind(user.email)
        .bind(user.password_hash)
        .bind(user.name)
        .bind(user.created_at)
        .fetch_one(&**self.connection)
        .await
        .inspect_err(|e| error!("{e}"))
    }

    async fn find_user(&self, user_id: Uuid) -> RepoResult<Option<User>> {
        sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&**self.connection)
            .await
            .inspect_err(|e| error!("{e}"))
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        sqlx::query_as("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&**self.connection)
            .await
            .inspect_err(|e| error!("{e}"))
    }

    async fn create_session(&self, session: Session) -> RepoResult<Session> {
        sqlx::query_as(
            "INSERT INTO sessions (id, user_id, token_hash, created_at, expires_at) VALUES (?, ?, ?, ?, ?) RETURNING *",
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(session.token_hash)
        .bind(session.created_at)
        .bind(session.expires_at)
        .fetch_one(&**self.connection)
        .await
        .inspect_err(|e| error!("{e}"))
    }

    async fn find_session_user(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> RepoResult<Option<User>> {
        sqlx::query_as(
            "SELECT users.* FROM users INNER JOIN sessions ON sessions.user_id = users.id WHERE sessions.token_hash = ? AND sessions.expires_at > ?",
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&**self.connection)
        .await
        .inspect_err(|e| error!("{e}"))
    }

    async fn delete_session(&self, token_hash: &str) -> RepoResult<bool> {
        sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
            .bind(token_hash)
            .execute(&**self.connection)
            .await
            .map(|result| result.rows_affected() > 0)
            .inspect_err(|e| error!("{e}"))
    }
}

#[injectable(ProjectRepository)]
pub struct DbProjectRepository {
    connection: Ref<DatabaseConnection>,
}

#[async_trait]
impl ProjectRepository for DbProjectRepository {
    async fn list_projects(&self, owner_id: Uuid) -> RepoResult<Vec<Project>> {
        sqlx::query_as(
            "SELECT * FROM projects WHERE owner_id = ? ORDER BY updated_at DESC, rowid DESC",
        )
        .bind(owner_id)
        .fetch_all(&**self.connection)
        .await
        .inspect_err(|e| error!("{e}"))
    }

    async fn find_project(&self, owner_id: Uuid, project_id: Uuid) -> RepoResult<Option<Project>> {
        sqlx::query_as("SELECT * FROM projects WHERE id = ? AND owner_id = ?")
            .bind(project_id)
            .bind(owner_id)
            .fetch_optional(&**self.connection)
            .await
            .inspect_err(|e| error!("{e}"))
    }

    async fn create_project(&self, project: Project) -> RepoResult<Project> {
        sqlx::query_as(
            "INSERT INTO projects (id, owner_id, name, description, system_prompt, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING *",
        )
        .bind(project.id)
        .bind(project.owner_id)
        .bind(project.name)
        .bind(project.description)
        .bind(project.system_prompt)
        .bind(project.created_at)
        .bind(project.updated_at)
        .fetch_one(&**self.connection)
        .await
        .inspect_err(|e| error!("{e}"))
    }

    async fn update_project(&self, project: Project) -> RepoResult<Option<Project>> {
        sqlx::query_as(
            "UPDATE projects SET name = ?, description = ?, system_prompt = ?, updated_at = ? WHERE id = ? AND owner_id = ? RETURNING *",
        )
        .bind(project.name)
        .bind(project.description)
        .bind(project.system_prompt)
        .bind(project.updated_at)
        .bind(project.id)
        .bind(project.owner_id)
        .fetch_optional(&**self.connection)
        .await
        .inspect_err(|e| error!("{e}"))
    }

    async fn delete_project(&self, owner_id: Uuid, project_id: Uuid) -> RepoResult<bool> {
        // Chats, their messages and file rows go with it (ON DELETE CASCADE).
        sqlx::query("DELETE FROM projects WHERE id = ? AND owner_id = ?")
            .bind(project_id)
            .bind(owner_id)
            .execute(&**self.connection)
            .await
            .map(|result| result.rows_affected() > 0)
            .inspect_err(|e| error!("{e}"))
    }
}

#[injectable(ChatRepository)]
pub struct DbChatRepository {
    connection: Ref<DatabaseConnection>,
}

#[async_trait]
impl ChatRepository for DbChatRepository {
    async fn list_chats(&self, owner_id: Uuid, project_id: Uuid) -> RepoResult<Vec<Chat>> {
        sqlx::query_as(
            "SELECT chats.id, chats.project_id, chats.title, chats.created_at FROM chats INNER JOIN projects ON projects.id = chats.project_id WHERE chats.project_id = ? AND projects.owner_id = ? ORDER BY chats.created_at DESC, chats.rowid DESC",
        )
        .bind(project_id)
        .bind(owner_id)
        .fetch_all(&**self.connection)
        .await
        .inspect_err(|e| error!("{e}"))
    }

    async fn create_chat(&self, chat: Chat) -> RepoResult<Chat> {
        sqlx::query_as(
            "INSERT INTO chats (id, project_id, title, created_at) VALUES (?, ?, ?, ?) RETURNING *",
        )
        .bind(chat.id)
        .bind(chat.project_id)
        .bind(chat.title)
        .bind(chat.created_at)
        .fetch_one(&**self.connection)
        .await
        .inspect_err(|e| error!("{e}"))
    }

    async fn find_chat(&self, owner_id: Uuid, chat_id: Uuid) -> RepoResult<Option<Chat>> {
        sqlx::query_as(
            "SELECT chats.id, chats.project_id, chats.title, chats.created_at FROM chats INNER JOIN projects ON projects.id = chats.project_id WHERE chats.id = ? AND projects.owner_id = ?",
        )
        .bind(chat_id)
        .bind(owner_id)
        .fetch_optional(&**self.connection)
        .await
        .inspect_err(|e| error!("{e}"))
    }

    async fn list_messages(&self, chat_id: Uuid) -> RepoResult<Vec<Message>> {
        sqlx::query_as(
            "SELECT id, chat_id, role, content, created_at FROM messages WHERE chat_id = ? ORDER BY created_at ASC, rowid ASC",
        )
        .bind(chat_id)
        .fetch_all(&**self.connection)
        .await
        .inspect_err(|e| error!("{e}"))
    }

    async fn recent_messages(
        &self,
        chat_id: Uuid,
        exclude: Uuid,
        limit: usize,
    ) -> RepoResult<Vec<Message>> {
        sqlx::query_as(
            "SELECT id, chat_id, role, content, created_at FROM (SELECT id, chat_id, role, content, created_at, rowid AS seq FROM messages WHERE chat_id = ? AND id != ? ORDER BY created_at DESC, rowid DESC LIMIT ?) ORDER BY created_at ASC, seq ASC",
        )
        .bind(chat_id)
        .bind(exclude)
        .bind(limit as i64)
        .fetch_all(&**self.connection)
        .await
        .inspect_err(|e| error!("{e}"))
    }

    async fn create_message(&self, message: Message) -> RepoResult<Message> {
        sqlx::query_as(
            "INSERT INTO messages (id, chat_id, role, content, created_at) VALUES (?, ?, ?, ?, ?) RETURNING *",
        )
        .bind(message.id)
        .bind(message.chat_id)
        .bind(message.role)
        .bind(message.content)
        .bind(message.created_at)
        .fetch_one(&**self.connection)
        .await
        .inspect_err(|e| error!("{e}"))
    }
}

#[injectable(FileRepository)]
pub struct DbFileRepository {
    connection: Ref<DatabaseConnection>,
}

const FILE_COLUMNS: &str = "files.id, files.project_id, files.stored_name, files.original_name, files.mime_type, files.size_bytes, files.external_id, files.status, files.error_message, files.created_at";

#[async_trait]
impl FileRepository for DbFileRepository {
    async fn create_file(&self, file: ProjectFile) -> RepoResult<ProjectFile> {
        sqlx::query_as(
            "INSERT INTO files (id, project_id, stored_name, original_name, mime_type, size_bytes, external_id, status, error_message, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING *",
        )
        .bind(file.id)
        .bind(file.project_id)
        .bind(file.stored_name)
        .bind(file.original_name)
        .bind(file.mime_type)
        .bind(file.size_bytes)
        .bind(file.external_id)
        .bind(file.status)
        .bind(file.error_message)
        .bind(file.created_at)
        .fetch_one(&**self.connection)
        .await
        .inspect_err(|e| error!("{e}"))
    }

    async fn mark_processed(&self, file_id: Uuid, external_id: &str) -> RepoResult<ProjectFile> {
        sqlx::query_as(
            "UPDATE files SET status = ?, external_id = ?, error_message = NULL WHERE id = ? RETURNING *",
        )
        .bind(FileStatus::Processed)
        .bind(external_id)
        .bind(file_id)
        .fetch_one(&**self.connection)
        .await
        .inspect_err(|e| error!("{e}"))
    }

    async fn mark_failed(&self, file_id: Uuid, error: &str) -> RepoResult<ProjectFile> {
        sqlx::query_as("UPDATE files SET status = ?, error_message = ? WHERE id = ? RETURNING *")
            .bind(FileStatus::Error)
            .bind(error)
            .bind(file_id)
            .fetch_one(&**self.connection)
            .await
            .inspect_err(|e| error!("{e}"))
    }

    async fn list_files(&self, owner_id: Uuid, project_id: Uuid) -> RepoResult<Vec<ProjectFile>> {
        let sql = format!(
            "SELECT {FILE_COLUMNS} FROM files INNER JOIN projects ON projects.id = files.project_id WHERE files.project_id = ? AND projects.owner_id = ? ORDER BY files.created_at DESC, files.rowid DESC"
        );
        sqlx::query_as(&sql)
        .bind(project_id)
        .bind(owner_id)
        .fetch_all(&**self.connection)
        .await
        .inspect_err(|e| error!("{e}"))
    }

    async fn find_file(&self, owner_id: Uuid, file_id: Uuid) -> RepoResult<Option<ProjectFile>> {
        let sql = format!(
            "SELECT {FILE_COLUMNS} FROM files INNER JOIN projects ON projects.id = files.project_id WHERE files.id = ? AND projects.owner_id = ?"
        );
        sqlx::query_as(&sql)
        .bind(file_id)
        .bind(owner_id)
        .fetch_optional(&**self.connection)
        .await
        .inspect_err(|e| error!("{e}"))
    }

    async fn find_by_external_ids(
        &self,
        owner_id: Uuid,
        external_ids: &[String],
    ) -> RepoResult<Vec<ProjectFile>> {
        if external_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {FILE_COLUMNS} FROM files INNER JOIN projects ON projects.id = files.project_id WHERE projects.owner_id = "
        ));
        query.push_bind(owner_id);
        query.push(" AND files.external_id IN (");
        let mut ids = query.separated(", ");
        for external_id in external_ids {
            ids.push_bind(external_id.clone());
        }
        ids.push_unseparated(") ORDER BY files.created_at ASC");

        query
            .build_query_as::<ProjectFile>()
            .fetch_all(&**self.connection)
            .await
            .inspect_err(|e| error!("{e}"))
    }

    async fn delete_file(&self, file_id: Uuid) -> RepoResult<bool> {
        sqlx::query("DELETE FROM files WHERE id = ?")
            .bind(file_id)
            .execute(&**self.connection)
            .await
            .map(|result| result.rows_affected() > 0)
            .inspect_err(|e| error!("{e}"))
    }
}
