// src/utils/validation.rs

use std::borrow::Cow;

use url::Url;
use validator::ValidationError;

/// Image references are either absolute http(s) URLs (Cloudinary)
/// or paths served by the local media store.
pub fn validate_image_url(value: &str) -> Result<(), ValidationError> {
    if value.starts_with("/uploads/") && !value.contains("..") {
        return Ok(());
    }
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
        _ => Err(ValidationError::new("image_url")
            .with_message(Cow::Borrowed("Image URL must be an http(s) URL or an uploaded file"))),
    }
}
