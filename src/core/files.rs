//! Project file uploads, backed by the remote file storage.

use crate::config::Settings;
use crate::core::traits::{FileContent, FileService, IncomingFile, UploadFailure, UploadOutcome};
use crate::error::{ApiError, ApiResult};
use crate::infrastructure::entities::{FileStatus, ProjectFile};
use crate::infrastructure::file_storage::FileStorage;
use crate::infrastructure::traits::{FileRepository, ProjectRepository};
use async_trait::async_trait;
use chrono::Utc;
use di::{Ref, injectable};
use log::{error, info, warn};
use uuid::Uuid;

const FILE_NOT_FOUND: &str = "File not found";
const RECORD_FAILED: &str = "Failed to save file record";

/// Strips any client-supplied directories from an upload name.
fn base_name(filename: &str) -> &str {
    filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .trim()
}

fn stored_name(id: Uuid, original: &str) -> String {
    let safe: String = original
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{id}-{safe}")
}

fn mime_type(file: &IncomingFile) -> String {
    file.content_type
        .as_deref()
        .map(str::trim)
        .filter(|ct| !ct.is_empty() && *ct != "application/octet-stream")
        .map(str::to_owned)
        .unwrap_or_else(|| {
            mime_guess::from_path(&file.filename)
                .first_or_octet_stream()
                .essence_str()
                .to_owned()
        })
}

#[injectable(FileService)]
pub struct MyFileService {
    files: Ref<dyn FileRepository>,
    projects: Ref<dyn ProjectRepository>,
    storage: Ref<dyn FileStorage>,
    settings: Ref<Settings>,
}

impl MyFileService {
    fn validate_batch(&self, files: &[IncomingFile]) -> ApiResult<()> {
        let limits = &self.settings.upload;

        if files.is_empty() {
            return Err(ApiError::validation("No files uploaded"));
        }
        if files.len() > limits.max_files {
            return Err(ApiError::validation(format!(
                "Too many files: at most {} per upload",
                limits.max_files
            )));
        }
        for file in files {
            let name = base_name(&file.filename);
            if name.is_empty() {
                return Err(ApiError::validation("Every file needs a name"));
            }
            if !limits.is_allowed(name) {
                return Err(ApiError::validation(format!(
                    "File type not allowed: {name}. Allowed: {}",
                    limits.allowed_extensions.join(", ")
                )));
            }
            if file.bytes.len() > limits.max_file_bytes {
                return Err(ApiError::validation(format!(
                    "File too large: {name} exceeds {} bytes",
                    limits.max_file_bytes
                )));
            }
        }
        Ok(())
    }

    async fn store_one(&self, project_id: Uuid, file: IncomingFile) -> ApiResult<(ProjectFile, Option<String>)> {
        let id = Uuid::new_v4();
        let original_name = base_name(&file.filename).to_owned();
        let mime_type = mime_type(&file);

        let row = self
            .files
            .create_file(ProjectFile {
                id,
                project_id,
                stored_name: stored_name(id, &original_name),
                original_name,
                mime_type,
                size_bytes: file.bytes.len() as i64,
                external_id: None,
                status: FileStatus::Uploading,
                error_message: None,
                created_at: Utc::now(),
            })
            .await?;

        match self
            .storage
            .upload(&row.original_name, &row.mime_type, file.bytes)
            .await
        {
            Ok(external_id) => {
                info!("file {} stored remotely as {external_id}", row.id);
                let row = self
                    .files
                    .mark_processed(row.id, &external_id)
                    .await
                    .inspect_err(|e| {
                        error!(
                            "file {} stored remotely as {external_id} but not recorded: {e}",
                            row.id
                        )
                    })?;
                Ok((row, None))
            }
            Err(e) => {
                let message = e.to_string();
                warn!("upload of file {} failed: {message}", row.id);
                Ok((self.files.mark_failed(row.id, &message).await?, Some(message)))
            }
        }
    }

    async fn owned_file(&self, user_id: Uuid, file_id: Uuid) -> ApiResult<ProjectFile> {
        self.files
            .find_file(user_id, file_id)
            .await?
            .ok_or_else(|| ApiError::not_found(FILE_NOT_FOUND))
    }
}

#[async_trait]
impl FileService for MyFileService {
    async fn upload_files(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        files: Vec<IncomingFile>,
    ) -> ApiResult<UploadOutcome> {
        if self.projects.find_project(user_id, project_id).await?.is_none() {
            return Err(ApiError::not_found("Project not found"));
        }
        self.validate_batch(&files)?;

        let mut outcome = UploadOutcome::default();
        for file in files {
            let filename = base_name(&file.filename).to_owned();
            match self.store_one(project_id, file).await {
                Ok((row, failure)) => {
                    if let Some(error) = failure {
                        outcome.errors.push(UploadFailure { filename, error });
                    }
                    outcome.files.push(row);
                }
                Err(e) => {
                    error!("recording upload of {filename} failed: {e}");
                    outcome.errors.push(UploadFailure {
                        filename,
                        error: RECORD_FAILED.to_owned(),
                    });
                }
            }
        }
        Ok(outcome)
    }

    async fn list_files(&self, user_id: Uuid, project_id: Uuid) -> ApiResult<Vec<ProjectFile>> {
        if self.projects.find_project(user_id, project_id).await?.is_none() {
            return Err(ApiError::not_found("Project not found"));
        }
        Ok(self.files.list_files(user_id, project_id).await?)
    }

    async fn delete_file(&self, user_id: Uuid, file_id: Uuid) -> ApiResult<()> {
        let file = self.owned_file(user_id, file_id).await?;

        if let Some(external_id) = file.external_id.as_deref() {
            if let Err(e) = self.storage.delete(external_id).await {
                warn!("remote delete of {external_id} failed: {e}");
            }
        }

        if self.files.delete_file(file.id).await? {
            Ok(())
        } else {
            Err(ApiError::not_found(FILE_NOT_FOUND))
        }
    }

    async fn file_content(&self, user_id: Uuid, file_id: Uuid) -> ApiResult<FileContent> {
        let file = self.owned_file(user_id, file_id).await?;

        let external_id = match (&file.status, file.external_id.as_deref()) {
            (FileStatus::Processed, Some(id)) => id,
            _ => return Err(ApiError::validation("File is not processed")),
        };

        let content = self.storage.content(external_id).await.map_err(|e| {
            ApiError::Upstream(format!("fetching content of {external_id} failed: {e}"))
        })?;

        Ok(FileContent {
            content,
            filename: file.original_name,
            mime_type: file.mime_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn incoming(filename: &str, content_type: Option<&str>) -> IncomingFile {
        IncomingFile {
            filename: filename.to_owned(),
            content_type: content_type.map(str::to_owned),
            bytes: b"hello".to_vec(),
        }
    }

    #[test]
    fn test_base_name_drops_directories() {
        assert_eq!(base_name("notes.md"), "notes.md");
        assert_eq!(base_name("../../etc/passwd.txt"), "passwd.txt");
        assert_eq!(base_name("C:\\docs\\report.pdf"), "report.pdf");
    }

    #[test]
    fn test_stored_name_is_sanitized() {
        let id = Uuid::nil();
        assert_eq!(
            stored_name(id, "my report (v2).pdf"),
            format!("{id}-my_report__v2_.pdf")
        );
    }

    #[test]
    fn test_mime_type_prefers_part_header() {
        assert_eq!(mime_type(&incoming("a.md", Some("text/x-markdown"))), "text/x-markdown");
        assert_eq!(mime_type(&incoming("a.json", None)), "application/json");
        assert_eq!(
            mime_type(&incoming("a.pdf", Some("application/octet-stream"))),
            "application/pdf"
        );
    }
}
