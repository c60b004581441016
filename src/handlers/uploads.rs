// src/handlers/uploads.rs

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{FromRequest, Multipart, Request, State},
    http::{StatusCode, header::CONTENT_TYPE},
    response::IntoResponse,
};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::{
    config::Config,
    error::AppError,
    media::{ImageUpload, MediaStore, StoredImage},
    utils::jwt::AuthUser,
};

/// JSON upload body: a base64 `data:` URL under `image` or `file`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct DataUrlUpload {
    #[serde(alias = "file")]
    pub image: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteImageRequest {
    pub public_id: String,
}

fn rejection_error(status: StatusCode, message: String) -> AppError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(message)
    } else {
        AppError::BadRequest(message)
    }
}

async fn read_multipart(request: Request, max_bytes: usize) -> Result<ImageUpload, AppError> {
    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|e| rejection_error(e.status(), e.body_text()))?;

    while let Some(field) = multipart.next_field().await? {
        if matches!(field.name(), Some("file") | Some("image")) {
            let bytes = field.bytes().await?;
            return ImageUpload::new(bytes.to_vec(), max_bytes);
        }
    }
    Err(AppError::BadRequest("Missing 'file' field".to_string()))
}

async fn read_data_url(request: Request, max_bytes: usize) -> Result<ImageUpload, AppError> {
    let body = Bytes::from_request(request, &())
        .await
        .map_err(|e| rejection_error(e.status(), e.body_text()))?;
    let payload: DataUrlUpload = serde_json::from_slice(&body)?;
    ImageUpload::from_data_url(&payload.image, max_bytes)
}

/// Stores an image and returns its public URL.
///
/// Accepts `multipart/form-data` with a `file` field, or JSON
/// `{"image": "data:image/png;base64,..."}`.
#[utoipa::path(
    post,
    path = "/api/uploads",
    request_body(content = DataUrlUpload, description = "Multipart `file` field or base64 data URL"),
    responses(
        (status = 201, description = "Stored", body = StoredImage),
        (status = 400, description = "Not an image"),
        (status = 413, description = "Image too large")
    ),
    security(("bearer" = [])),
    tag = "uploads"
)]
pub async fn upload_image(
    State(media): State<Arc<dyn MediaStore>>,
    State(config): State<Config>,
    AuthUser(claims): AuthUser,
    request: Request,
) -> Result<impl IntoResponse, AppError> {
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"));

    let image = if is_multipart {
        read_multipart(request, config.upload_max_bytes).await?
    } else {
        read_data_url(request, config.upload_max_bytes).await?
    };

    let stored = media.upload(image).await?;
    tracing::info!("User {} uploaded image {}", claims.sub, stored.public_id);

    Ok((StatusCode::CREATED, Json(stored)))
}

/// Removes an image from the media store.
/// Teachers and admins only.
#[utoipa::path(
    post,
    path = "/api/delete-image",
    request_body = DeleteImageRequest,
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Image not found")
    ),
    security(("bearer" = [])),
    tag = "uploads"
)]
pub async fn delete_image(
    State(media): State<Arc<dyn MediaStore>>,
    AuthUser(claims): AuthUser,
    Json(payload): Json<DeleteImageRequest>,
) -> Result<impl IntoResponse, AppError> {
    claims.require_staff()?;
    let public_id = payload.public_id.trim();
    if public_id.is_empty() {
        return Err(AppError::BadRequest("publicId is required".to_string()));
    }

    media.delete(public_id).await?;
    tracing::info!("User {} deleted image {}", claims.sub, public_id);

    Ok(StatusCode::NO_CONTENT)
}
