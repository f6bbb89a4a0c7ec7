//! Chat and message endpoints

use crate::api::chats::schemas::{
    ChatList, ChatPayload, CreateChat, MessageList, SendMessage, SentMessagePayload,
};
use crate::api::{ApiResponse, ExtractUser, JsonBody, PathId};
use crate::core::traits::ChatService;
use crate::error::ApiResult;
use axum::Router;
use axum::response::IntoResponse;
use axum::routing::get;
use di_axum::Inject;

pub fn router() -> Router {
    Router::new()
        .route("/projects/:id/chats", get(list_chats).post(create_chat))
        .route("/chats/:id/messages", get(list_messages).post(send_message))
}

async fn list_chats(
    Inject(chat_service): Inject<dyn ChatService>,
    ExtractUser(user): ExtractUser,
    PathId(project_id): PathId,
) -> ApiResult<impl IntoResponse> {
    let chats = chat_service.list_chats(user.id, project_id).await?;

    Ok(ApiResponse::ok(ChatList {
        chats: chats.into_iter().map(schemas::Chat::from).collect(),
    }))
}

async fn create_chat(
    Inject(chat_service): Inject<dyn ChatService>,
    ExtractUser(user): ExtractUser,
    PathId(project_id): PathId,
    create: Option<JsonBody<CreateChat>>,
) -> ApiResult<impl IntoResponse> {
    let create = create.map(|JsonBody(create)| create).unwrap_or_default();
    let chat = chat_service
        .create_chat(user.id, project_id, create.title.as_deref())
        .await?;

    Ok(ApiResponse::created(ChatPayload { chat: chat.into() }))
}

async fn list_messages(
    Inject(chat_service): Inject<dyn ChatService>,
    ExtractUser(user): ExtractUser,
    PathId(chat_id): PathId,
) -> ApiResult<impl IntoResponse> {
    let messages = chat_service.list_messages(user.id, chat_id).await?;

    Ok(ApiResponse::ok(MessageList {
        messages: messages.into_iter().map(schemas::Message::from).collect(),
    }))
}

async fn send_message(
    Inject(chat_service): Inject<dyn ChatService>,
    ExtractUser(user): ExtractUser,
    PathId(chat_id): PathId,
    JsonBody(message): JsonBody<SendMessage>,
) -> ApiResult<impl IntoResponse> {
    let sent = chat_service
        .send_message(user.id, chat_id, &message.content, &message.file_ids)
        .await?;

    Ok(ApiResponse::ok(SentMessagePayload::from(sent)))
}

pub mod schemas {
    use crate::core::backends::TokenUsage;
    use crate::core::traits::SentMessage;
    use crate::infrastructure::entities;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    /// Body of a chat creation; a missing body means "no title".
    #[derive(Deserialize, Debug, Default)]
    pub struct CreateChat {
        pub title: Option<String>,
    }

    #[derive(Deserialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub struct SendMessage {
        #[serde(default)]
        pub content: String,
        #[serde(default)]
        pub file_ids: Vec<String>,
    }

    #[derive(Serialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub struct Chat {
        pub id: Uuid,
        pub project_id: Uuid,
        pub title: String,
        pub created_at: DateTime<Utc>,
    }

    impl From<entities::Chat> for Chat {
        fn from(chat: entities::Chat) -> Self {
            Chat {
                id: chat.id,
                project_id: chat.project_id,
                title: chat.title,
                created_at: chat.created_at,
            }
        }
    }

    #[derive(Serialize, Debug)]
    #[serde(rename_all = "lowercase")]
    pub enum Role {
        User,
        Assistant,
    }

    impl From<entities::MessageRole> for Role {
        fn from(role: entities::MessageRole) -> Self {
            match role {
                entities::MessageRole::User => Role::User,
                entities::MessageRole::Assistant => Role::Assistant,
            }
        }
    }

    #[derive(Serialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub struct Message {
        pub id: Uuid,
        pub chat_id: Uuid,
        pub role: Role,
        pub content: String,
        pub created_at: DateTime<Utc>,
    }

    impl From<entities::Message> for Message {
        fn from(message: entities::Message) -> Self {
            Message {
                id: message.id,
                chat_id: message.chat_id,
                role: message.role.into(),
                content: message.content,
                created_at: message.created_at,
            }
        }
    }

    #[derive(Serialize, Debug)]
    pub struct ChatList {
        pub chats: Vec<Chat>,
    }

    #[derive(Serialize, Debug)]
    pub struct ChatPayload {
        pub chat: Chat,
    }

    #[derive(Serialize, Debug)]
    pub struct MessageList {
        pub messages: Vec<Message>,
    }

    #[derive(Serialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub struct Metadata {
        pub backend_label: String,
        pub token_usage: Option<TokenUsage>,
    }

    #[derive(Serialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub struct SentMessagePayload {
        pub user_message: Message,
        pub assistant_message: Message,
        pub metadata: Metadata,
    }

    impl From<SentMessage> for SentMessagePayload {
        fn from(sent: SentMessage) -> Self {
            SentMessagePayload {
                user_message: sent.user_message.into(),
                assistant_message: sent.assistant_message.into(),
                metadata: Metadata {
                    backend_label: sent.metadata.backend_label,
                    token_usage: sent.metadata.token_usage,
                },
            }
        }
    }
}
