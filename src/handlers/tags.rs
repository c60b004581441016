// src/handlers/tags.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{Executor, Sqlite, SqlitePool};
use validator::Validate;

use crate::{
    error::AppError,
    handlers::like_pattern,
    models::tag::{CreateTagRequest, Tag, TagListParams, check_tag_name, normalize_tag_name},
    utils::{
        id::{new_id, parse_id},
        jwt::AuthUser,
    },
};

/// Finds or creates a tag by name in a single statement.
/// Returns the tag and whether it was created by this call.
pub(crate) async fn upsert_tag<'e, E>(executor: E, raw_name: &str) -> Result<(Tag, bool), AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let name = check_tag_name(raw_name)?;
    let id = new_id();

    let tag = sqlx::query_as::<_, Tag>(
        r#"
        INSERT INTO tags (id, name) VALUES (?, ?)
        ON CONFLICT(name) DO UPDATE SET name = excluded.name
        RETURNING id, name
        "#,
    )
    .bind(&id)
    .bind(&name)
    .fetch_one(executor)
    .await
    .map_err(|e| {
        tracing::error!("Failed to upsert tag '{}': {:?}", name, e);
        AppError::InternalServerError(e.to_string())
    })?;

    let created = tag.id == id;
    Ok((tag, created))
}

/// Lists tags by name, optionally filtered by a name prefix.
#[utoipa::path(
    get,
    path = "/api/tags",
    params(TagListParams),
    responses((status = 200, description = "Tags", body = [Tag])),
    tag = "tags"
)]
pub async fn list_tags(
    State(pool): State<SqlitePool>,
    Query(params): Query<TagListParams>,
) -> Result<impl IntoResponse, AppError> {
    let prefix = params
        .search
        .as_deref()
        .map(normalize_tag_name)
        .filter(|s| !s.is_empty());

    let tags = match prefix {
        Some(prefix) => {
            sqlx::query_as::<_, Tag>(
                "SELECT id, name FROM tags WHERE name LIKE ? ESCAPE '\\' ORDER BY name",
            )
            .bind(like_pattern(&prefix, true))
            .fetch_all(&pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, Tag>("SELECT id, name FROM tags ORDER BY name")
                .fetch_all(&pool)
                .await?
        }
    };

    Ok(Json(tags))
}

#[utoipa::path(
    get,
    path = "/api/tags/{id}",
    params(("id" = String, Path, description = "Tag id")),
    responses(
        (status = 200, description = "Tag", body = Tag),
        (status = 404, description = "Tag not found")
    ),
    tag = "tags"
)]
pub async fn get_tag(
    State(pool): State<SqlitePool>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id, "tag")?;
    let tag = sqlx::query_as::<_, Tag>("SELECT id, name FROM tags WHERE id = ?")
        .bind(&id)
        .fetch_optional(&pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Tag not found".to_string()))?;

    Ok(Json(tag))
}

/// Creates a tag, or returns the existing one with the same normalized name.
#[utoipa::path(
    post,
    path = "/api/tags",
    request_body = CreateTagRequest,
    responses(
        (status = 201, description = "Tag created", body = Tag),
        (status = 200, description = "Tag already existed", body = Tag)
    ),
    security(("bearer" = [])),
    tag = "tags"
)]
pub async fn create_tag(
    State(pool): State<SqlitePool>,
    AuthUser(_claims): AuthUser,
    Json(payload): Json<CreateTagRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let (tag, created) = upsert_tag(&pool, &payload.name).await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((status, Json(tag)))
}

/// Deletes a tag; tests lose it through the cascade on `test_tags`.
/// Admin only.
#[utoipa::path(
    delete,
    path = "/api/tags/{id}",
    params(("id" = String, Path, description = "Tag id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Tag not found")
    ),
    security(("bearer" = [])),
    tag = "tags"
)]
pub async fn delete_tag(
    State(pool): State<SqlitePool>,
    AuthUser(claims): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    claims.require_admin()?;
    let id = parse_id(&id, "tag")?;

    let result = sqlx::query("DELETE FROM tags WHERE id = ?")
        .bind(&id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Tag not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}
