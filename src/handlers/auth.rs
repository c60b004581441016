// src/handlers/auth.rs

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    config::Config,
    error::{AppError, is_unique_violation},
    models::user::{
        LoginRequest, LoginResponse, RegisterRequest, Role, User, UserResponse, normalize_email,
    },
    utils::{
        hash::{hash_password, verify_password},
        html::clean_text,
        id::new_id,
        jwt::sign_jwt,
    },
};

/// Inserts a user with a freshly hashed password.
/// A taken email is reported as 409 Conflict.
pub(crate) async fn create_account(
    pool: &SqlitePool,
    name: &str,
    email: &str,
    password: &str,
    role: Role,
) -> Result<User, AppError> {
    let now = Utc::now();
    let user = User {
        id: new_id(),
        name: clean_text(name),
        email: normalize_email(email),
        password_hash: hash_password(password)?,
        role,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO users (id, name, email, password_hash, role, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.id)
    .bind(&user.name)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.role)
    .bind(user.created_at)
    .bind(user.updated_at)
    .execute(pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(format!("Email '{}' is already registered", user.email))
        } else {
            tracing::error!("Failed to create user: {:?}", e);
            AppError::from(e)
        }
    })?;

    Ok(user)
}

/// Registers a new student or teacher.
///
/// Hashes the password using Argon2 before storing it.
/// Returns 201 Created and the user object (excluding password).
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Admin accounts cannot self-register"),
        (status = 409, description = "Email already registered")
    ),
    tag = "auth"
)]
pub async fn register(
    State(pool): State<SqlitePool>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let role = payload.role.unwrap_or(Role::Student);
    if role == Role::Admin {
        return Err(AppError::Forbidden(
            "Admin accounts cannot self-register".to_string(),
        ));
    }

    let user = create_account(&pool, &payload.name, &payload.email, &payload.password, role).await?;
    tracing::info!("Registered {} {}", user.role.as_str(), user.id);

    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// Authenticates a user and returns a JWT token.
///
/// Unknown email and wrong password produce the same 401.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 401, description = "Invalid credentials")
    ),
    tag = "auth"
)]
pub async fn login(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
        .bind(normalize_email(&payload.email))
        .fetch_optional(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to look up user: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?
        .ok_or_else(|| AppError::AuthError("Invalid email or password".to_string()))?;

    if !verify_password(&payload.password, &user.password_hash)? {
        return Err(AppError::AuthError("Invalid email or password".to_string()));
    }

    let token = sign_jwt(&user.id, user.role, &config.jwt_secret, config.jwt_expiration)?;

    Ok(Json(LoginResponse {
        token,
        token_type: "Bearer".to_string(),
        user: UserResponse::from(user),
    }))
}
