// src/handlers/profile.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use sqlx::SqlitePool;

use crate::{
    error::AppError,
    models::{
        pagination::{PageParams, Paginated},
        result::{HistoryEntry, HistoryParams, HistoryRow, UserStats},
    },
    utils::{
        id::parse_id,
        jwt::{AuthUser, Claims},
    },
};

/// Profile history shows fewer entries per page than other lists.
const HISTORY_PER_PAGE: i64 = 5;

fn authorize(claims: &Claims, raw_id: &str) -> Result<String, AppError> {
    let id = parse_id(raw_id, "user")?;
    if !claims.can_view_user(&id) {
        return Err(AppError::Forbidden(
            "You can only view your own results".to_string(),
        ));
    }
    Ok(id)
}

/// Test history of a user, newest first.
///
/// Results whose test was deleted are left out: there is nothing left to show.
#[utoipa::path(
    get,
    path = "/api/users/{id}/results",
    params(("id" = String, Path, description = "User id"), HistoryParams),
    responses((status = 200, description = "Page of results", body = Paginated<HistoryEntry>)),
    security(("bearer" = [])),
    tag = "profile"
)]
pub async fn list_history(
    State(pool): State<SqlitePool>,
    AuthUser(claims): AuthUser,
    Path(id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = authorize(&claims, &id)?;
    let page = PageParams {
        page: params.page,
        per_page: params.per_page,
    }
    .resolve(HISTORY_PER_PAGE);

    let (total,): (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*)
        FROM user_results r
        JOIN tests t ON t.id = r.test_id
        WHERE r.user_id = ?
        "#,
    )
    .bind(&user_id)
    .fetch_one(&pool)
    .await?;

    let rows = sqlx::query_as::<_, HistoryRow>(
        r#"
        SELECT
            r.id, r.score, r.max_score, r.time_spent, r.submitted_at,
            t.id AS test_id, t.title AS test_title, t.image_url AS test_image_url,
            u.name AS author_name
        FROM user_results r
        JOIN tests t ON t.id = r.test_id
        JOIN users u ON u.id = t.author_id
        WHERE r.user_id = ?
        ORDER BY r.submitted_at DESC, r.rowid DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(&user_id)
    .bind(page.per_page)
    .bind(page.offset())
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch result history: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let items = rows.into_iter().map(HistoryEntry::from).collect();
    Ok(Json(Paginated::new(items, page, total)))
}

/// Aggregated statistics over every result of a user.
#[utoipa::path(
    get,
    path = "/api/users/{id}/stats",
    params(("id" = String, Path, description = "User id")),
    responses((status = 200, description = "Statistics", body = UserStats)),
    security(("bearer" = [])),
    tag = "profile"
)]
pub async fn get_stats(
    State(pool): State<SqlitePool>,
    AuthUser(claims): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = authorize(&claims, &id)?;

    let scores: Vec<(i64, i64)> =
        sqlx::query_as("SELECT score, max_score FROM user_results WHERE user_id = ?")
            .bind(&user_id)
            .fetch_all(&pool)
            .await?;

    Ok(Json(UserStats::from_scores(&scores)))
}
