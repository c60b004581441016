// src/handlers/users.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use validator::Validate;

use crate::{
    error::{AppError, is_unique_violation},
    handlers::auth::create_account,
    models::{
        pagination::{DEFAULT_PER_PAGE, PageParams, Paginated},
        user::{
            AdminCreateUserRequest, UpdateUserRequest, User, UserListParams, UserResponse,
            normalize_email,
        },
    },
    utils::{hash::hash_password, html::clean_text, id::parse_id, jwt::AuthUser},
};

pub(crate) async fn fetch_user(pool: &SqlitePool, id: &str) -> Result<User, AppError> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

/// Lists users, optionally filtered by role.
/// Teachers and admins only.
#[utoipa::path(
    get,
    path = "/api/users",
    params(UserListParams),
    responses((status = 200, description = "Page of users", body = Paginated<UserResponse>)),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn list_users(
    State(pool): State<SqlitePool>,
    AuthUser(claims): AuthUser,
    Query(params): Query<UserListParams>,
) -> Result<impl IntoResponse, AppError> {
    claims.require_staff()?;
    let page = PageParams {
        page: params.page,
        per_page: params.per_page,
    }
    .resolve(DEFAULT_PER_PAGE);

    let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE (?1 IS NULL OR role = ?1)")
        .bind(params.role)
        .fetch_one(&pool)
        .await?;

    let users = sqlx::query_as::<_, User>(
        r#"
        SELECT * FROM users
        WHERE (?1 IS NULL OR role = ?1)
        ORDER BY created_at DESC, rowid DESC
        LIMIT ?2 OFFSET ?3
        "#,
    )
    .bind(params.role)
    .bind(page.per_page)
    .bind(page.offset())
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list users: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let items = users.into_iter().map(UserResponse::from).collect();
    Ok(Json(Paginated::new(items, page, total)))
}

/// Fetches one user. Students may only fetch themselves.
#[utoipa::path(
    get,
    path = "/api/users/{id}",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "User", body = UserResponse),
        (status = 404, description = "User not found")
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn get_user(
    State(pool): State<SqlitePool>,
    AuthUser(claims): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id, "user")?;
    if !claims.can_view_user(&id) {
        return Err(AppError::Forbidden("You can only view your own account".to_string()));
    }
    let user = fetch_user(&pool, &id).await?;
    Ok(Json(UserResponse::from(user)))
}

/// Returns the caller's account.
#[utoipa::path(
    get,
    path = "/api/me",
    responses((status = 200, description = "Current user", body = UserResponse)),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn me(
    State(pool): State<SqlitePool>,
    AuthUser(claims): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let user = fetch_user(&pool, &claims.sub).await?;
    Ok(Json(UserResponse::from(user)))
}

/// Creates a user with any role.
/// Admin only.
#[utoipa::path(
    post,
    path = "/api/users",
    request_body = AdminCreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 409, description = "Email already registered")
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn create_user(
    State(pool): State<SqlitePool>,
    AuthUser(claims): AuthUser,
    Json(payload): Json<AdminCreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    claims.require_admin()?;
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let user = create_account(
        &pool,
        &payload.name,
        &payload.email,
        &payload.password,
        payload.role,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// Updates a user. Users edit themselves; only admins edit others or change roles.
#[utoipa::path(
    put,
    path = "/api/users/{id}",
    params(("id" = String, Path, description = "User id")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated user", body = UserResponse),
        (status = 403, description = "Not allowed"),
        (status = 409, description = "Email already registered")
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn update_user(
    State(pool): State<SqlitePool>,
    AuthUser(claims): AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id, "user")?;
    if !claims.is_admin() && claims.sub != id {
        return Err(AppError::Forbidden("You can only edit your own account".to_string()));
    }
    if payload.role.is_some() && !claims.is_admin() {
        return Err(AppError::Forbidden("Only admins can change roles".to_string()));
    }
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE users SET ");
    let mut separated = builder.separated(", ");

    separated.push("updated_at = ");
    separated.push_bind_unseparated(Utc::now());

    if let Some(name) = &payload.name {
        separated.push("name = ");
        separated.push_bind_unseparated(clean_text(name));
    }
    if let Some(email) = &payload.email {
        separated.push("email = ");
        separated.push_bind_unseparated(normalize_email(email));
    }
    if let Some(password) = &payload.password {
        separated.push("password_hash = ");
        separated.push_bind_unseparated(hash_password(password)?);
    }
    if let Some(role) = payload.role {
        separated.push("role = ");
        separated.push_bind_unseparated(role);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(&id);

    let result = builder.build().execute(&pool).await.map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("Email is already registered".to_string())
        } else {
            tracing::error!("Failed to update user: {:?}", e);
            AppError::InternalServerError(e.to_string())
        }
    })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    let user = fetch_user(&pool, &id).await?;
    Ok(Json(UserResponse::from(user)))
}

/// Deletes a user together with their tests and results.
/// Admin only. Prevents deleting self.
#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "User not found")
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn delete_user(
    State(pool): State<SqlitePool>,
    AuthUser(claims): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    claims.require_admin()?;
    let id = parse_id(&id, "user")?;

    // Prevent self-deletion
    if claims.sub == id {
        return Err(AppError::BadRequest("Cannot delete yourself".to_string()));
    }

    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(&id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete user: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}
