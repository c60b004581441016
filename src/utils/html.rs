// src/utils/html.rs

/// Sanitizes user supplied display text (titles, descriptions, question text)
/// with ammonia's whitelist: safe formatting tags survive, scripts and
/// event handler attributes are stripped.
///
/// Never apply this to options or answers: they are compared verbatim during grading.
pub fn clean_text(input: &str) -> String {
    ammonia::clean(input.trim())
}
