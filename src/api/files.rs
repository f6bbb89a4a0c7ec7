//! Project file endpoints

use crate::api::files::schemas::{FileContentPayload, FileList, UploadPayload};
use crate::api::{ApiResponse, ExtractUser, PathId};
use crate::core::traits::{FileService, IncomingFile};
use crate::error::{ApiError, ApiResult};
use axum::Router;
use axum::extract::Multipart;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use di_axum::Inject;
use log::debug;

pub fn router() -> Router {
    Router::new()
        .route("/projects/:id/upload", post(upload_files))
        .route("/projects/:id/files", get(list_files))
        .route("/:id", delete(delete_file))
        .route("/:id/content", get(file_content))
}

/// Reads every part that carries a filename; other form fields are ignored.
async fn read_files(mut multipart: Multipart) -> ApiResult<Vec<IncomingFile>> {
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation(e.body_text()))?
    {
        let Some(filename) = field.file_name().map(str::to_owned) else {
            debug!("skipping multipart field {:?}", field.name());
            continue;
        };
        let content_type = field.content_type().map(str::to_owned);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::validation(e.body_text()))?;

        files.push(IncomingFile {
            filename,
            content_type,
            bytes: bytes.to_vec(),
        });
    }

    Ok(files)
}

async fn upload_files(
    Inject(file_service): Inject<dyn FileService>,
    ExtractUser(user): ExtractUser,
    PathId(project_id): PathId,
    multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let files = read_files(multipart).await?;
    let outcome = file_service
        .upload_files(user.id, project_id, files)
        .await?;

    Ok(ApiResponse::created(UploadPayload::from(outcome)))
}

async fn list_files(
    Inject(file_service): Inject<dyn FileService>,
    ExtractUser(user): ExtractUser,
    PathId(project_id): PathId,
) -> ApiResult<impl IntoResponse> {
    let files = file_service.list_files(user.id, project_id).await?;

    Ok(ApiResponse::ok(FileList {
        files: files.into_iter().map(schemas::File::from).collect(),
    }))
}

async fn delete_file(
    Inject(file_service): Inject<dyn FileService>,
    ExtractUser(user): ExtractUser,
    PathId(file_id): PathId,
) -> ApiResult<impl IntoResponse> {
    file_service.delete_file(user.id, file_id).await?;
    Ok(ApiResponse::message("File deleted"))
}

async fn file_content(
    Inject(file_service): Inject<dyn FileService>,
    ExtractUser(user): ExtractUser,
    PathId(file_id): PathId,
) -> ApiResult<impl IntoResponse> {
    let content = file_service.file_content(user.id, file_id).await?;

    Ok(ApiResponse::ok(FileContentPayload {
        content: content.content,
        filename: content.filename,
        mime_type: content.mime_type,
    }))
}

pub mod schemas {
    use crate::core::traits::{UploadFailure, UploadOutcome};
    use crate::infrastructure::entities::{self, FileStatus};
    use chrono::{DateTime, Utc};
    use serde::Serialize;
    use uuid::Uuid;

    #[derive(Serialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub struct File {
        pub id: Uuid,
        pub project_id: Uuid,
        pub filename: String,
        pub original_name: String,
        pub mime_type: String,
        pub size: i64,
        pub external_id: Option<String>,
        pub status: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub error_message: Option<String>,
        pub created_at: DateTime<Utc>,
    }

    impl From<entities::ProjectFile> for File {
        fn from(file: entities::ProjectFile) -> Self {
            File {
                id: file.id,
                project_id: file.project_id,
                filename: file.stored_name,
                original_name: file.original_name,
                mime_type: file.mime_type,
                size: file.size_bytes,
                external_id: file.external_id,
                status: match file.status {
                    FileStatus::Uploading => "uploading",
                    FileStatus::Processed => "processed",
                    FileStatus::Error => "error",
                },
                error_message: file.error_message,
                created_at: file.created_at,
            }
        }
    }

    #[derive(Serialize, Debug)]
    pub struct FileList {
        pub files: Vec<File>,
    }

    #[derive(Serialize, Debug)]
    pub struct UploadError {
        pub filename: String,
        pub error: String,
    }

    impl From<UploadFailure> for UploadError {
        fn from(failure: UploadFailure) -> Self {
            UploadError {
                filename: failure.filename,
                error: failure.error,
            }
        }
    }

    #[derive(Serialize, Debug)]
    pub struct UploadPayload {
        pub files: Vec<File>,
        pub errors: Vec<UploadError>,
    }

    impl From<UploadOutcome> for UploadPayload {
        fn from(outcome: UploadOutcome) -> Self {
            UploadPayload {
                files: outcome.files.into_iter().map(File::from).collect(),
                errors: outcome.errors.into_iter().map(UploadError::from).collect(),
            }
        }
    }

    #[derive(Serialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub struct FileContentPayload {
        pub content: String,
        pub filename: String,
        pub mime_type: String,
    }
}
