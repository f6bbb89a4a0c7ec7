//! Client for the remote Files API that holds uploaded project files.

use crate::config::FileStorageSettings;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const FILES_API_BETA: &str = "files-api-2025-04-14";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("file storage service is not configured")]
    NotConfigured,

    #[error("file storage request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("file storage returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected file storage response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait FileStorage: Send + Sync {
    fn is_configured(&self) -> bool;

    /// Stores the bytes remotely and returns the external reference id.
    async fn upload(
        &self,
        filename: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, StorageError>;

    /// Fetches a stored file and decodes it as (lossy) UTF-8 text.
    async fn content(&self, external_id: &str) -> Result<String, StorageError>;

    async fn delete(&self, external_id: &str) -> Result<(), StorageError>;
}

pub struct RemoteFileStorage {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    timeout: Duration,
}

#[derive(Deserialize)]
struct UploadedFile {
    id: String,
}

impl RemoteFileStorage {
    pub fn new(settings: &FileStorageSettings) -> Self {
        Self {
            client: Client::new(),
            api_key: settings.api_key.clone(),
            base_url: settings.base_url.trim_end_matches('/').to_owned(),
            timeout: settings.timeout,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> Result<RequestBuilder, StorageError> {
        let api_key = self.api_key.as_deref().ok_or(StorageError::NotConfigured)?;

        Ok(self
            .client
            .request(method, format!("{}/v1/files{}", self.base_url, path))
            .timeout(self.timeout)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("anthropic-beta", FILES_API_BETA))
    }

    async fn check(response: Response) -> Result<Response, StorageError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(StorageError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[async_trait]
impl FileStorage for RemoteFileStorage {
    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn upload(
        &self,
        filename: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, StorageError> {
        let part = Part::bytes(bytes)
            .file_name(filename.to_owned())
            .mime_str(mime_type)?;
        let form = Form::new().part("file", part);

        let response = self
            .request(reqwest::Method::POST, "")?
            .multipart(form)
            .send()
            .await?;
        let uploaded: UploadedFile = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| StorageError::Malformed(e.to_string()))?;

        if uploaded.id.is_empty() {
            return Err(StorageError::Malformed("empty file id".to_owned()));
        }
        Ok(uploaded.id)
    }

    async fn content(&self, external_id: &str) -> Result<String, StorageError> {
        let response = self
            .request(reqwest::Method::GET, &format!("/{external_id}/content"))?
            .send()
            .await?;
        let bytes = Self::check(response).await?.bytes().await?;

        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn delete(&self, external_id: &str) -> Result<(), StorageError> {
        let response = self
            .request(reqwest::Method::DELETE, &format!("/{external_id}"))?
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}
