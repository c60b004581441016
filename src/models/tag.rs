// src/models/tag.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::error::AppError;

pub const MAX_TAG_NAME_LENGTH: usize = 30;

/// Represents the 'tags' table in the database.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize, ToSchema)]
pub struct Tag {
    pub id: String,
    pub name: String,
}

/// DTO for creating a tag.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateTagRequest {
    #[validate(length(min = 1, max = 30, message = "Tag name must be between 1 and 30 characters"))]
    pub name: String,
}

/// Query parameters for listing tags.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TagListParams {
    /// Prefix of the tag name (case-insensitive).
    pub search: Option<String>,
}

/// Tags are stored trimmed, with inner whitespace collapsed and lowercased,
/// so that "Math", " math " and "MATH" all name the same tag.
pub fn normalize_tag_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Normalizes a tag name and enforces the length rule, however the tag is named.
pub fn check_tag_name(raw: &str) -> Result<String, AppError> {
    let name = normalize_tag_name(raw);
    if name.is_empty() {
        return Err(AppError::BadRequest("Tag name is empty".to_string()));
    }
    if name.chars().count() > MAX_TAG_NAME_LENGTH {
        return Err(AppError::BadRequest(format!(
            "Tag name must be at most {} characters",
            MAX_TAG_NAME_LENGTH
        )));
    }
    Ok(name)
}
