// src/handlers/mod.rs

pub mod answers;
pub mod auth;
pub mod health;
pub mod profile;
pub mod questions;
pub mod results;
pub mod tags;
pub mod tests;
pub mod uploads;
pub mod users;

/// Builds a LIKE pattern matching `raw` literally; use with `ESCAPE '\'`.
pub(crate) fn like_pattern(raw: &str, prefix_only: bool) -> String {
    let escaped = raw
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    if prefix_only {
        format!("{}%", escaped)
    } else {
        format!("%{}%", escaped)
    }
}
