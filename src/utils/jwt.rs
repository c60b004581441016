// src/utils/jwt.rs

use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{config::Config, error::AppError, models::user::Role};

/// JWT Claims structure.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Claims {
    /// Subject - Stores the User ID.
    pub sub: String,
    pub role: Role,
    /// Expiration time as Unix timestamp.
    pub exp: usize,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Teachers and admins.
    pub fn is_staff(&self) -> bool {
        matches!(self.role, Role::Teacher | Role::Admin)
    }

    /// Authors manage their own tests; admins manage everyone's.
    pub fn can_manage(&self, author_id: &str) -> bool {
        self.is_admin() || self.sub == author_id
    }

    /// Own data, or any data for teachers and admins.
    pub fn can_view_user(&self, user_id: &str) -> bool {
        self.is_staff() || self.sub == user_id
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if !self.is_admin() {
            return Err(AppError::Forbidden("Admin access required".to_string()));
        }
        Ok(())
    }

    pub fn require_staff(&self) -> Result<(), AppError> {
        if !self.is_staff() {
            return Err(AppError::Forbidden(
                "Teacher or admin access required".to_string(),
            ));
        }
        Ok(())
    }

    pub fn require_manage(&self, author_id: &str) -> Result<(), AppError> {
        if !self.can_manage(author_id) {
            return Err(AppError::Forbidden(
                "Only the author or an admin can do this".to_string(),
            ));
        }
        Ok(())
    }
}

/// Signs a new JWT for the user.
pub fn sign_jwt(
    id: &str,
    role: Role,
    secret: &str,
    expiration_seconds: u64,
) -> Result<String, AppError> {
    // Calculate expiration: current time + expiration_seconds
    let expiration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .as_secs() as usize
        + expiration_seconds as usize;

    let claims = Claims {
        sub: id.to_owned(),
        role,
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalServerError(e.to_string()))
}

/// Verifies and decodes a JWT string.
///
/// Returns the `Claims` if valid, otherwise returns an `AppError`.
pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    let token_data = decode(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::AuthError("Invalid token".to_string()))?;

    Ok(token_data.claims)
}

/// Reads the bearer token, if any.
/// A present but malformed or invalid header is an error, never "anonymous".
fn claims_from_parts(parts: &Parts, config: &Config) -> Result<Option<Claims>, AppError> {
    let Some(value) = parts.headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    let token = value
        .to_str()
        .ok()
        .and_then(|header| header.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::AuthError("Invalid authorization header".to_string()))?;

    verify_jwt(token.trim(), &config.jwt_secret).map(Some)
}

/// Extractor: authenticated caller.
///
/// Rejects with 401 when the 'Authorization: Bearer <token>' header is
/// missing or the token does not verify.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Claims);

impl<S> FromRequestParts<S> for AuthUser
where
    Config: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = Config::from_ref(state);
        claims_from_parts(parts, &config)?
            .map(AuthUser)
            .ok_or_else(|| AppError::AuthError("Missing bearer token".to_string()))
    }
}

/// Extractor: caller that may be anonymous.
#[derive(Debug, Clone)]
pub struct OptionalClaims(pub Option<Claims>);

impl<S> FromRequestParts<S> for OptionalClaims
where
    Config: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = Config::from_ref(state);
        claims_from_parts(parts, &config).map(OptionalClaims)
    }
}
