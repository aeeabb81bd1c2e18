//! Image uploads to the media host.
//!
//! Uploads are unsigned: the form carries the upload preset and target
//! folder, and the host answers with the public URL and image dimensions.

use std::path::Path;

use futures::future::try_join_all;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::{ConfigError, MediaConfig};
use crate::error::{FramezError, FramezResult};

const UPLOAD_FAILED: &str = "Failed to upload image";
const DEFAULT_FILE_NAME: &str = "photo.jpg";

/// A stored image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub url: String,
    pub public_id: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
    width: u32,
    height: u32,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

#[derive(Clone)]
pub struct MediaClient {
    http: reqwest::Client,
    endpoint: Url,
    upload_preset: String,
    folder: String,
}

impl MediaClient {
    /// Fails with a config error when the cloud name or preset is missing.
    pub fn new(config: &MediaConfig) -> Result<Self, ConfigError> {
        let (cloud_name, upload_preset) = config.credentials()?;
        let raw = format!(
            "{}/{}/image/upload",
            config.api_base.trim_end_matches('/'),
            cloud_name
        );
        let endpoint = Url::parse(&raw).map_err(|e| ConfigError::Invalid {
            key: "media.api_base",
            message: e.to_string(),
        })?;

        Ok(Self {
            http: reqwest::Client::new(),
            endpoint,
            upload_preset: upload_preset.to_string(),
            folder: config.folder.clone(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Upload one image. `source` is a local file path or an http(s) URL
    /// the host fetches itself.
    pub async fn upload_image(&self, source: &str) -> FramezResult<UploadResult> {
        let file = file_part(source).await?;
        let form = Form::new()
            .part("file", file)
            .text("upload_preset", self.upload_preset.clone())
            .text("folder", self.folder.clone());

        tracing::debug!("Uploading {} to {}", source, self.endpoint);

        let response = self
            .http
            .post(self.endpoint.clone())
            .multipart(form)
            .send()
            .await
            .map_err(|e| upload_error(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| upload_error(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or_else(|_| {
                    format!("Request failed with status code {}", status.as_u16())
                });
            return Err(upload_error(message));
        }

        let parsed: UploadResponse =
            serde_json::from_str(&body).map_err(|e| upload_error(e.to_string()))?;

        tracing::info!("Uploaded image {}", parsed.public_id);
        Ok(UploadResult {
            url: parsed.secure_url,
            public_id: parsed.public_id,
            width: parsed.width,
            height: parsed.height,
        })
    }

    /// Upload several images concurrently. Results keep the input order;
    /// the first failure fails the whole batch.
    pub async fn upload_images(&self, sources: &[String]) -> FramezResult<Vec<UploadResult>> {
        try_join_all(sources.iter().map(|s| self.upload_image(s))).await
    }
}

fn upload_error(message: String) -> FramezError {
    tracing::error!("Image upload failed: {}", message);
    if message.trim().is_empty() {
        FramezError::Media(UPLOAD_FAILED.to_string())
    } else {
        FramezError::Media(message)
    }
}

async fn file_part(source: &str) -> FramezResult<Part> {
    if let Ok(url) = Url::parse(source) {
        if matches!(url.scheme(), "http" | "https") {
            return Ok(Part::text(url.to_string()));
        }
    }

    let path = Path::new(source);
    let data = tokio::fs::read(path)
        .await
        .map_err(|e| upload_error(format!("{}: {}", source, e)))?;

    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_FILE_NAME)
        .to_string();
    let mime = mime_guess::from_path(path)
        .first()
        .filter(|m| m.type_() == mime_guess::mime::IMAGE)
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| "image/jpeg".to_string());

    Part::bytes(data)
        .file_name(name)
        .mime_str(&mime)
        .map_err(|e| upload_error(e.to_string()))
}
