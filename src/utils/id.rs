// src/utils/id.rs

use uuid::Uuid;

use crate::error::AppError;

/// Generates a new record id.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Validates a client supplied id and returns it in canonical (lowercase, hyphenated) form.
/// `what` names the entity in the error message.
pub fn parse_id(raw: &str, what: &str) -> Result<String, AppError> {
    Uuid::parse_str(raw.trim())
        .map(|id| id.to_string())
        .map_err(|_| AppError::BadRequest(format!("Invalid {} id", what)))
}
