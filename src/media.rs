// src/media.rs

use std::{
    io::ErrorKind,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use base64::prelude::*;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use crate::{
    config::{CloudinaryConfig, Config},
    error::AppError,
    utils::id::new_id,
};

/// Public prefix under which the local store serves its files.
pub const LOCAL_URL_PREFIX: &str = "/uploads";

/// A stored image: where to show it and how to delete it later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoredImage {
    pub url: String,
    pub public_id: String,
}

/// Raw image bytes checked by `ImageUpload::new`.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    bytes: Vec<u8>,
    format: ImageFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Webp,
}

impl ImageFormat {
    /// Detects the format from the file signature; the declared content type is not trusted.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            Some(ImageFormat::Png)
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(ImageFormat::Jpeg)
        } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            Some(ImageFormat::Gif)
        } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            Some(ImageFormat::Webp)
        } else {
            None
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Gif => "gif",
            ImageFormat::Webp => "webp",
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Webp => "image/webp",
        }
    }
}

impl ImageUpload {
    /// Accepts PNG, JPEG, GIF and WebP images up to `max_bytes`.
    pub fn new(bytes: Vec<u8>, max_bytes: usize) -> Result<Self, AppError> {
        if bytes.is_empty() {
            return Err(AppError::BadRequest("No image provided".to_string()));
        }
        if bytes.len() > max_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "Image exceeds the {} byte limit",
                max_bytes
            )));
        }
        let format = ImageFormat::sniff(&bytes).ok_or_else(|| {
            AppError::BadRequest("Only PNG, JPEG, GIF and WebP images are accepted".to_string())
        })?;
        Ok(Self { bytes, format })
    }

    /// Decodes a `data:image/...;base64,...` URL.
    pub fn from_data_url(raw: &str, max_bytes: usize) -> Result<Self, AppError> {
        let pattern = Regex::new(r"^data:(image/[A-Za-z0-9.+-]+);base64,([A-Za-z0-9+/=\s]+)$")
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;
        let captures = pattern
            .captures(raw.trim())
            .ok_or_else(|| AppError::BadRequest("Expected a base64 image data URL".to_string()))?;

        let payload: String = captures[2].chars().filter(|c| !c.is_whitespace()).collect();
        // base64 inflates by 4/3; reject early before decoding huge strings.
        if payload.len() / 4 * 3 > max_bytes + 3 {
            return Err(AppError::PayloadTooLarge(format!(
                "Image exceeds the {} byte limit",
                max_bytes
            )));
        }
        let bytes = BASE64_STANDARD
            .decode(payload.as_bytes())
            .map_err(|e| AppError::BadRequest(format!("Invalid base64 image: {}", e)))?;
        Self::new(bytes, max_bytes)
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn to_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.format.mime(),
            BASE64_STANDARD.encode(&self.bytes)
        )
    }
}

/// Image hosting backend.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn upload(&self, image: ImageUpload) -> Result<StoredImage, AppError>;

    /// Deletes by public id. Unknown ids are `NotFound`.
    async fn delete(&self, public_id: &str) -> Result<(), AppError>;

    /// Recovers the public id from a URL this store handed out.
    fn public_id_from_url(&self, url: &str) -> Option<String>;
}

/// Cloudinary when it is configured, otherwise files under `upload_dir`.
pub fn store_from_config(config: &Config) -> Result<Arc<dyn MediaStore>, AppError> {
    match &config.cloudinary {
        Some(cloudinary) => Ok(Arc::new(CloudinaryStore::new(cloudinary.clone())?)),
        None => {
            tracing::info!("Local media store enabled (dir: {})", config.upload_dir);
            Ok(Arc::new(LocalStore::new(&config.upload_dir)))
        }
    }
}

/// Deletes the images behind `urls`, logging failures instead of returning them.
/// Used after a transaction has committed, when the records are already gone.
pub async fn delete_images_best_effort<I>(store: &dyn MediaStore, urls: I)
where
    I: IntoIterator<Item = String>,
{
    for url in urls {
        let Some(public_id) = store.public_id_from_url(&url) else {
            tracing::debug!("Skipping image not owned by the media store: {}", url);
            continue;
        };
        if let Err(e) = store.delete(&public_id).await {
            tracing::warn!("Failed to delete image {}: {:?}", public_id, e);
        }
    }
}

/// Stores images as files in a directory served at `/uploads`.
#[derive(Debug, Clone)]
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn is_safe_name(name: &str) -> bool {
        !name.is_empty()
            && !name.contains("..")
            && !name.contains('/')
            && !name.contains('\\')
    }
}

#[async_trait]
impl MediaStore for LocalStore {
    async fn upload(&self, image: ImageUpload) -> Result<StoredImage, AppError> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            tracing::error!("Failed to create upload dir {:?}: {:?}", self.dir, e);
            AppError::InternalServerError(e.to_string())
        })?;

        let file_name = format!("{}.{}", new_id(), image.format.extension());
        tokio::fs::write(self.dir.join(&file_name), &image.bytes)
            .await
            .map_err(|e| {
                tracing::error!("Failed to write upload {}: {:?}", file_name, e);
                AppError::InternalServerError(e.to_string())
            })?;

        Ok(StoredImage {
            url: format!("{}/{}", LOCAL_URL_PREFIX, file_name),
            public_id: file_name,
        })
    }

    async fn delete(&self, public_id: &str) -> Result<(), AppError> {
        if !Self::is_safe_name(public_id) {
            return Err(AppError::BadRequest("Invalid image id".to_string()));
        }
        match tokio::fs::remove_file(self.dir.join(public_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(AppError::NotFound("Image not found".to_string()))
            }
            Err(e) => Err(AppError::InternalServerError(e.to_string())),
        }
    }

    fn public_id_from_url(&self, url: &str) -> Option<String> {
        url.strip_prefix(LOCAL_URL_PREFIX)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|name| Self::is_safe_name(name))
            .map(str::to_string)
    }
}

#[derive(Debug, Deserialize)]
struct CloudinaryUploadResponse {
    secure_url: String,
    public_id: String,
}

#[derive(Debug, Deserialize)]
struct CloudinaryDestroyResponse {
    result: String,
}

/// Cloudinary backend using signed REST calls.
#[derive(Debug, Clone)]
pub struct CloudinaryStore {
    client: Client,
    config: CloudinaryConfig,
    api_base: String,
}

impl CloudinaryStore {
    pub fn new(config: CloudinaryConfig) -> Result<Self, AppError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        let api_base = format!("https://api.cloudinary.com/v1_1/{}/image", config.cloud_name);
        tracing::info!(
            "Cloudinary media store enabled (cloud: {}, folder: {})",
            config.cloud_name,
            config.folder
        );
        Ok(Self {
            client,
            config,
            api_base,
        })
    }

    /// Adds timestamp, api key and signature to `params` and posts them as a form.
    async fn signed_post(
        &self,
        action: &str,
        mut params: Vec<(&'static str, String)>,
        file: Option<String>,
    ) -> Result<reqwest::Response, AppError> {
        params.push(("timestamp", chrono::Utc::now().timestamp().to_string()));
        let signature = sign_params(&params, &self.config.api_secret);

        params.push(("api_key", self.config.api_key.clone()));
        params.push(("signature", signature));
        params.push(("signature_algorithm", "sha256".to_string()));
        if let Some(file) = file {
            params.push(("file", file));
        }

        let response = self
            .client
            .post(format!("{}/{}", self.api_base, action))
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Cloudinary {} failed ({}): {}", action, status, body);
            return Err(AppError::InternalServerError(format!(
                "Cloudinary {} failed with status {}",
                action, status
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl MediaStore for CloudinaryStore {
    async fn upload(&self, image: ImageUpload) -> Result<StoredImage, AppError> {
        let params = vec![
            ("folder", self.config.folder.clone()),
            ("transformation", "c_limit,w_1200".to_string()),
        ];
        let response = self
            .signed_post("upload", params, Some(image.to_data_url()))
            .await?;
        let body: CloudinaryUploadResponse = response.json().await?;

        Ok(StoredImage {
            url: body.secure_url,
            public_id: body.public_id,
        })
    }

    async fn delete(&self, public_id: &str) -> Result<(), AppError> {
        if public_id.trim().is_empty() || public_id.contains("..") {
            return Err(AppError::BadRequest("Invalid image id".to_string()));
        }
        let params = vec![("public_id", public_id.to_string())];
        let response = self.signed_post("destroy", params, None).await?;
        let body: CloudinaryDestroyResponse = response.json().await?;

        match body.result.as_str() {
            "ok" => Ok(()),
            "not found" => Err(AppError::NotFound("Image not found".to_string())),
            other => Err(AppError::InternalServerError(format!(
                "Unexpected Cloudinary destroy result: {}",
                other
            ))),
        }
    }

    fn public_id_from_url(&self, url: &str) -> Option<String> {
        cloudinary_public_id(url, &self.config.cloud_name)
    }
}

/// Cloudinary request signature: parameters sorted by name, joined as
/// `k=v&k=v`, the API secret appended, SHA-256, hex encoded.
pub fn sign_params(params: &[(&str, String)], api_secret: &str) -> String {
    let mut sorted: Vec<&(&str, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let to_sign = sorted
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// `https://res.cloudinary.com/<cloud>/image/upload/[v<version>/]<public id>.<ext>`
fn cloudinary_public_id(url: &str, cloud_name: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    if parsed.host_str() != Some("res.cloudinary.com") {
        return None;
    }
    let path = parsed.path().strip_prefix('/')?;
    let rest = path.strip_prefix(cloud_name)?.strip_prefix("/image/upload/")?;

    let pattern = Regex::new(r"^(?:v\d+/)?(.+?)(?:\.[A-Za-z0-9]+)?$").ok()?;
    pattern
        .captures(rest)
        .map(|captures| captures[1].to_string())
        .filter(|id| !id.is_empty())
}
