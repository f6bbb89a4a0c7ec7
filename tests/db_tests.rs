//! Database and schema tests
//!
//! Tests SQLite migrations, entity storage, schema constraints and the
//! repository queries that the services rely on.

mod common;

use chatbot_projects_api::infrastructure::entities::{
    Chat, FileStatus, Message, MessageRole, Project, ProjectFile, User,
};
use chatbot_projects_api::infrastructure::traits::{
    ChatRepository, FileRepository, ProjectRepository, UserRepository,
};
use chatbot_projects_api::service_provider;
use chrono::{Duration, Utc};
use common::{setup_test_db, test_settings};
use di::ServiceProvider;
use sqlx::SqlitePool;
use uuid::Uuid;

fn provider(pool: &SqlitePool) -> ServiceProvider {
    service_provider(test_settings(&[]), pool.clone()).unwrap()
}

fn user() -> User {
    User {
        id: Uuid::new_v4(),
        email: format!("{}@example.com", Uuid::new_v4()),
        password_hash: "not-a-real-hash".to_owned(),
        name: "Test".to_owned(),
        created_at: Utc::now(),
    }
}

fn project(owner_id: Uuid) -> Project {
    Project {
        id: Uuid::new_v4(),
        owner_id,
        name: "Docs".to_owned(),
        description: None,
        system_prompt: "You are helpful.".to_owned(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn chat(project_id: Uuid) -> Chat {
    Chat {
        id: Uuid::new_v4(),
        project_id,
        title: "New Chat".to_owned(),
        created_at: Utc::now(),
    }
}

fn file(project_id: Uuid) -> ProjectFile {
    let id = Uuid::new_v4();
    ProjectFile {
        id,
        project_id,
        stored_name: format!("{id}-notes.txt"),
        original_name: "notes.txt".to_owned(),
        mime_type: "text/plain".to_owned(),
        size_bytes: 5,
        external_id: None,
        status: FileStatus::Uploading,
        error_message: None,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_database_migrations_work() {
    let pool = setup_test_db().await;

    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type='table'",
    )
    .fetch_all(&pool)
    .await
    .unwrap();

    for table in ["chats", "files", "messages", "projects", "sessions", "users"] {
        assert!(tables.iter().any(|t| t == table), "missing table {table}");
    }
}

#[tokio::test]
async fn test_message_role_storage() {
    let pool = setup_test_db().await;
    let services = provider(&pool);
    let users = services.get_required::<dyn UserRepository>();
    let projects = services.get_required::<dyn ProjectRepository>();
    let chats = services.get_required::<dyn ChatRepository>();

    let owner = users.create_user(user()).await.unwrap();
    let project = projects.create_project(project(owner.id)).await.unwrap();
    let chat = chats.create_chat(chat(project.id)).await.unwrap();

    for (role, stored) in [(MessageRole::User, "user"), (MessageRole::Assistant, "assistant")] {
        let message = chats
            .create_message(Message {
                id: Uuid::new_v4(),
                chat_id: chat.id,
                role,
                content: "hi".to_owned(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        assert_eq!(message.role, role);

        let raw: String = sqlx::query_scalar("SELECT role FROM messages WHERE id = ?")
            .bind(message.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(raw, stored);
    }

    let rejected = sqlx::query(
        "INSERT INTO messages (id, chat_id, role, content, created_at) VALUES (?, ?, 'system', 'x', ?)",
    )
    .bind(Uuid::new_v4())
    .bind(chat.id)
    .bind(Utc::now())
    .execute(&pool)
    .await;
    assert!(rejected.is_err());
}

#[tokio::test]
async fn test_email_is_unique() {
    let pool = setup_test_db().await;
    let services = provider(&pool);
    let users = services.get_required::<dyn UserRepository>();

    let first = users.create_user(user()).await.unwrap();
    let duplicate = User {
        id: Uuid::new_v4(),
        ..first.clone()
    };
    assert!(users.create_user(duplicate).await.is_err());

    let found = users.find_user_by_email(&first.email).await.unwrap().unwrap();
    assert_eq!(found.id, first.id);
    assert_eq!(users.find_user(first.id).await.unwrap().unwrap().email, first.email);
}

#[tokio::test]
async fn test_recent_messages_window() {
    let pool = setup_test_db().await;
    let services = provider(&pool);
    let users = services.get_required::<dyn UserRepository>();
    let projects = services.get_required::<dyn ProjectRepository>();
    let chats = services.get_required::<dyn ChatRepository>();

    let owner = users.create_user(user()).await.unwrap();
    let project = projects.create_project(project(owner.id)).await.unwrap();
    let chat = chats.create_chat(chat(project.id)).await.unwrap();

    let base = Utc::now() - Duration::minutes(10);
    let mut ids = Vec::new();
    for i in 0..6 {
        let message = chats
            .create_message(Message {
                id: Uuid::new_v4(),
                chat_id: chat.id,
                role: MessageRole::User,
                content: format!("m{i}"),
                created_at: base + Duration::seconds(i),
            })
            .await
            .unwrap();
        ids.push(message.id);
    }

    let recent = chats.recent_messages(chat.id, ids[5], 3).await.unwrap();
    let contents: Vec<&str> = recent.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, ["m2", "m3", "m4"]);

    let all = chats.list_messages(chat.id).await.unwrap();
    assert_eq!(all.len(), 6);
    assert_eq!(all[0].content, "m0");
}

#[tokio::test]
async fn test_ownership_scopes_lookups() {
    let pool = setup_test_db().await;
    let services = provider(&pool);
    let users = services.get_required::<dyn UserRepository>();
    let projects = services.get_required::<dyn ProjectRepository>();
    let chats = services.get_required::<dyn ChatRepository>();
    let files = services.get_required::<dyn FileRepository>();

    let owner = users.create_user(user()).await.unwrap();
    let other = users.create_user(user()).await.unwrap();
    let project = projects.create_project(project(owner.id)).await.unwrap();
    let chat = chats.create_chat(chat(project.id)).await.unwrap();
    let stored = files.create_file(file(project.id)).await.unwrap();
    files.mark_processed(stored.id, "file_1").await.unwrap();

    assert!(projects.find_project(other.id, project.id).await.unwrap().is_none());
    assert!(chats.find_chat(other.id, chat.id).await.unwrap().is_none());
    assert!(files.find_file(other.id, stored.id).await.unwrap().is_none());
    assert!(!projects.delete_project(other.id, project.id).await.unwrap());

    let ids = ["file_1".to_owned(), "file_2".to_owned()];
    assert_eq!(files.find_by_external_ids(owner.id, &ids).await.unwrap().len(), 1);
    assert!(files.find_by_external_ids(other.id, &ids).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_file_status_transitions() {
    let pool = setup_test_db().await;
    let services = provider(&pool);
    let users = services.get_required::<dyn UserRepository>();
    let projects = services.get_required::<dyn ProjectRepository>();
    let files = services.get_required::<dyn FileRepository>();

    let owner = users.create_user(user()).await.unwrap();
    let project = projects.create_project(project(owner.id)).await.unwrap();

    let processed = files.create_file(file(project.id)).await.unwrap();
    assert_eq!(processed.status, FileStatus::Uploading);
    let processed = files.mark_processed(processed.id, "file_9").await.unwrap();
    assert_eq!(processed.status, FileStatus::Processed);
    assert_eq!(processed.external_id.as_deref(), Some("file_9"));

    let failed = files.create_file(file(project.id)).await.unwrap();
    let failed = files.mark_failed(failed.id, "boom").await.unwrap();
    assert_eq!(failed.status, FileStatus::Error);
    assert_eq!(failed.error_message.as_deref(), Some("boom"));
    assert!(failed.external_id.is_none());
}

#[tokio::test]
async fn test_deleting_user_cascades() {
    let pool = setup_test_db().await;
    let services = provider(&pool);
    let users = services.get_required::<dyn UserRepository>();
    let projects = services.get_required::<dyn ProjectRepository>();
    let chats = services.get_required::<dyn ChatRepository>();
    let files = services.get_required::<dyn FileRepository>();

    let owner = users.create_user(user()).await.unwrap();
    let project = projects.create_project(project(owner.id)).await.unwrap();
    let chat = chats.create_chat(chat(project.id)).await.unwrap();
    files.create_file(file(project.id)).await.unwrap();
    chats
        .create_message(Message {
            id: Uuid::new_v4(),
            chat_id: chat.id,
            role: MessageRole::User,
            content: "hello".to_owned(),
            created_at: Utc::now(),
        })
        .await
        .unwrap();

    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(owner.id)
        .execute(&pool)
        .await
        .unwrap();

    for table in ["projects", "chats", "messages", "files"] {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0, "{table} not cascaded");
    }
}
