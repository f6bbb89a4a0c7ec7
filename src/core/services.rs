//! Implementations for the service the app needs.
//!

use crate::core::assistant::{self, Assistant, Conversation, HISTORY_WINDOW};
use crate::core::traits::{
    ChatService, ProjectChanges, ProjectService, ReplyMetadata, SentMessage,
};
use crate::error::{ApiError, ApiResult};
use crate::infrastructure::entities::{Chat, Message, MessageRole, Project};
use crate::infrastructure::traits::{ChatRepository, FileRepository, ProjectRepository};
use async_trait::async_trait;
use chrono::Utc;
use di::{Ref, injectable};
use log::{debug, info};
use uuid::Uuid;

pub const DEFAULT_CHAT_TITLE: &str = "New Chat";

const PROJECT_NOT_FOUND: &str = "Project not found";
const CHAT_NOT_FOUND: &str = "Chat not found";

fn required(value: &str, field: &str) -> ApiResult<String> {
    let value = value.trim();
    if value.is_empty() {
        Err(ApiError::validation(format!("{field} is required")))
    } else {
        Ok(value.to_owned())
    }
}

fn optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

#[injectable(ProjectService)]
pub struct MyProjectService {
    repo: Ref<dyn ProjectRepository>,
}

#[async_trait]
impl ProjectService for MyProjectService {
    async fn list_projects(&self, user_id: Uuid) -> ApiResult<Vec<Project>> {
        Ok(self.repo.list_projects(user_id).await?)
    }

    async fn create_project(
        &self,
        user_id: Uuid,
        name: &str,
        description: Option<&str>,
        system_prompt: &str,
    ) -> ApiResult<Project> {
        let now = Utc::now();
        let project = Project {
            id: Uuid::new_v4(),
            owner_id: user_id,
            name: required(name, "Project name")?,
            description: optional(description),
            system_prompt: required(system_prompt, "System prompt")?,
            created_at: now,
            updated_at: now,
        };

        let project = self.repo.create_project(project).await?;
        info!("user {user_id} created project {}", project.id);
        Ok(project)
    }

    async fn get_project(&self, user_id: Uuid, project_id: Uuid) -> ApiResult<Project> {
        self.repo
            .find_project(user_id, project_id)
            .await?
            .ok_or_else(|| ApiError::not_found(PROJECT_NOT_FOUND))
    }

    async fn update_project(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        changes: ProjectChanges,
    ) -> ApiResult<Project> {
        let mut project = self.get_project(user_id, project_id).await?;

        if let Some(name) = changes.name {
            project.name = required(&name, "Project name")?;
        }
        if let Some(description) = changes.description {
            project.description = optional(Some(&description));
        }
        if let Some(system_prompt) = changes.system_prompt {
            project.system_prompt = required(&system_prompt, "System prompt")?;
        }
        project.updated_at = Utc::now();

        self.repo
            .update_project(project)
            .await?
            .ok_or_else(|| ApiError::not_found(PROJECT_NOT_FOUND))
    }

    async fn delete_project(&self, user_id: Uuid, project_id: Uuid) -> ApiResult<()> {
        if self.repo.delete_project(user_id, project_id).await? {
            info!("user {user_id} deleted project {project_id}");
            Ok(())
        } else {
            Err(ApiError::not_found(PROJECT_NOT_FOUND))
        }
    }
}

#[injectable(ChatService)]
pub struct MyChatService {
    chats: Ref<dyn ChatRepository>,
    projects: Ref<dyn ProjectRepository>,
    files: Ref<dyn FileRepository>,
    assistant: Ref<Assistant>,
}

impl MyChatService {
    async fn owned_chat(&self, user_id: Uuid, chat_id: Uuid) -> ApiResult<Chat> {
        self.chats
            .find_chat(user_id, chat_id)
            .await?
            .ok_or_else(|| ApiError::not_found(CHAT_NOT_FOUND))
    }

    async fn store_message(&self, chat_id: Uuid, role: MessageRole, content: String) -> ApiResult<Message> {
        Ok(self
            .chats
            .create_message(Message {
                id: Uuid::new_v4(),
                chat_id,
                role,
                content,
                created_at: Utc::now(),
            })
            .await?)
    }
}

#[async_trait]
impl ChatService for MyChatService {
    async fn list_chats(&self, user_id: Uuid, project_id: Uuid) -> ApiResult<Vec<Chat>> {
        if self.projects.find_project(user_id, project_id).await?.is_none() {
            return Err(ApiError::not_found(PROJECT_NOT_FOUND));
        }
        Ok(self.chats.list_chats(user_id, project_id).await?)
    }

    async fn create_chat(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        title: Option<&str>,
    ) -> ApiResult<Chat> {
        if self.projects.find_project(user_id, project_id).await?.is_none() {
            return Err(ApiError::not_found(PROJECT_NOT_FOUND));
        }

        Ok(self
            .chats
            .create_chat(Chat {
                id: Uuid::new_v4(),
                project_id,
                title: optional(title).unwrap_or_else(|| DEFAULT_CHAT_TITLE.to_owned()),
                created_at: Utc::now(),
            })
            .await?)
    }

    async fn list_messages(&self, user_id: Uuid, chat_id: Uuid) -> ApiResult<Vec<Message>> {
        let chat = self.owned_chat(user_id, chat_id).await?;
        Ok(self.chats.list_messages(chat.id).await?)
    }

    async fn send_message(
        &self,
        user_id: Uuid,
        chat_id: Uuid,
        content: &str,
        file_ids: &[String],
    ) -> ApiResult<SentMessage> {
        let content = required(content, "Message content")?;
        let chat = self.owned_chat(user_id, chat_id).await?;
        let project = self
            .projects
            .find_project(user_id, chat.project_id)
            .await?
            .ok_or_else(|| ApiError::not_found(CHAT_NOT_FOUND))?;

        // Stored before any backend call so the user's input survives an outage.
        let user_message = self
            .store_message(chat.id, MessageRole::User, content.clone())
            .await?;

        let mut system = project.system_prompt;
        if !file_ids.is_empty() {
            let files = self.files.find_by_external_ids(user_id, file_ids).await?;
            debug!("{} of {} referenced files found", files.len(), file_ids.len());
            if let Some(blurb) = assistant::file_context(&files) {
                system.push_str(&blurb);
            }
        }

        let history = self
            .chats
            .recent_messages(chat.id, user_message.id, HISTORY_WINDOW)
            .await?;
        let conversation = Conversation::build(system, history, content);

        let reply = self.assistant.reply(&conversation).await;

        let assistant_message = self
            .store_message(chat.id, MessageRole::Assistant, reply.content)
            .await?;

        Ok(SentMessage {
            user_message,
            assistant_message,
            metadata: ReplyMetadata {
                backend_label: reply.backend_label,
                token_usage: reply.usage,
            },
        })
    }
}
