//! Multi-user chatbot projects API - Library exports for testing
//!
//! (c) Softlandia 2025

pub mod api;
pub mod client;
pub mod config;
pub mod core;
pub mod error;
pub mod infrastructure;

use crate::config::Settings;
use crate::core::assistant::{Assistant, BackendRegistry};
use crate::core::auth::MyAuthService;
use crate::core::files::MyFileService;
use crate::core::services::{MyChatService, MyProjectService};
use crate::infrastructure::database::DatabaseConnection;
use crate::infrastructure::file_storage::{FileStorage, RemoteFileStorage};
use crate::infrastructure::repositories::{
    DbChatRepository, DbFileRepository, DbProjectRepository, DbUserRepository,
};
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use axum::routing::get;
use di::{Injectable, Ref, ServiceCollection, ServiceProvider, ValidationError, singleton_factory};
use di_axum::RouterServiceProviderExtensions;
use log::warn;
use sqlx::SqlitePool;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Multipart overhead allowed on top of the file bytes themselves.
const UPLOAD_SLACK_BYTES: usize = 1024 * 1024;

/// Registers everything the handlers resolve per request.
pub fn service_provider(
    settings: Settings,
    pool: SqlitePool,
) -> Result<ServiceProvider, ValidationError> {
    let registry = Ref::new(BackendRegistry::from_settings(&settings));
    let storage: Ref<dyn FileStorage> = Ref::new(RemoteFileStorage::new(&settings.files));
    let database = Ref::new(DatabaseConnection::new(pool));
    let settings = Ref::new(settings);

    ServiceCollection::new()
        .add(singleton_factory(move |_| settings.clone()))
        .add(singleton_factory(move |_| database.clone()))
        .add(singleton_factory(move |_| registry.clone()))
        .add(singleton_factory::<dyn FileStorage, _>(move |_| {
            storage.clone()
        }))
        .add(Assistant::singleton())
        .add(DbUserRepository::scoped())
        .add(DbProjectRepository::scoped())
        .add(DbChatRepository::scoped())
        .add(DbFileRepository::scoped())
        .add(MyAuthService::scoped())
        .add(MyProjectService::scoped())
        .add(MyChatService::scoped())
        .add(MyFileService::scoped())
        .build_provider()
}

fn cors(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE]);

    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin
                .parse::<HeaderValue>()
                .inspect_err(|_| warn!("ignoring invalid CORS origin {origin:?}"))
                .ok()
        })
        .collect();
    layer.allow_origin(origins)
}

/// The full HTTP surface, bound to `provider`.
pub fn app(provider: ServiceProvider, settings: &Settings) -> Router {
    let body_limit = settings
        .upload
        .max_files
        .saturating_mul(settings.upload.max_file_bytes)
        .saturating_add(UPLOAD_SLACK_BYTES);

    Router::new()
        .route("/health", get(api::health::health))
        .nest("/api/auth", api::auth::router())
        .nest("/api/projects", api::projects::router())
        .nest("/api/chat", api::chats::router())
        .nest("/api/files", api::files::router())
        .fallback(api::not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CatchPanicLayer::custom(api::panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(cors(&settings.cors_origins))
        .with_provider(provider)
}
