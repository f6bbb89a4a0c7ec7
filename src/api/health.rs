use crate::core::assistant::BackendRegistry;
use crate::core::backends::{ANTHROPIC, OPENAI};
use crate::infrastructure::database::DatabaseConnection;
use crate::infrastructure::file_storage::FileStorage;
use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use di_axum::Inject;
use serde::Serialize;

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Services {
    pub database: bool,
    pub anthropic: bool,
    pub openai: bool,
    pub file_storage: bool,
}

#[derive(Serialize, Debug)]
pub struct Health {
    pub success: bool,
    pub services: Services,
    pub version: &'static str,
}

/// Reports 503 only when the database is unreachable; missing LLM keys are
/// not an outage since replies fall back to the offline templates.
pub async fn health(
    Inject(database): Inject<DatabaseConnection>,
    Inject(registry): Inject<BackendRegistry>,
    Inject(storage): Inject<dyn FileStorage>,
) -> impl IntoResponse {
    let database = database.is_healthy().await;
    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(Health {
            success: database,
            services: Services {
                database,
                anthropic: registry.is_registered(ANTHROPIC),
                openai: registry.is_registered(OPENAI),
                file_storage: storage.is_configured(),
            },
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}
