// src/handlers/answers.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use sqlx::SqlitePool;

use crate::{
    error::AppError,
    handlers::results::fetch_result,
    models::answer::{AnswerListParams, UserAnswer},
    utils::{id::parse_id, jwt::AuthUser},
};

/// Per-question answers of a stored result, in submission order.
/// Visible to the result's owner, teachers and admins.
#[utoipa::path(
    get,
    path = "/api/answers",
    params(AnswerListParams),
    responses(
        (status = 200, description = "Answers", body = [UserAnswer]),
        (status = 403, description = "Another user's result"),
        (status = 404, description = "Result not found")
    ),
    security(("bearer" = [])),
    tag = "results"
)]
pub async fn list_answers(
    State(pool): State<SqlitePool>,
    AuthUser(claims): AuthUser,
    Query(params): Query<AnswerListParams>,
) -> Result<impl IntoResponse, AppError> {
    let result_id = parse_id(&params.result, "result")?;
    let result = fetch_result(&pool, &result_id).await?;
    if !claims.can_view_user(&result.user_id) {
        return Err(AppError::Forbidden(
            "You can only view your own answers".to_string(),
        ));
    }

    let answers = sqlx::query_as::<_, UserAnswer>(
        r#"
        SELECT id, result_id, question_id, user_answer, is_correct, earned_points
        FROM user_answers
        WHERE result_id = ?
        ORDER BY rowid
        "#,
    )
    .bind(&result_id)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch answers of result {}: {:?}", result_id, e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(answers))
}

#[utoipa::path(
    get,
    path = "/api/answers/{id}",
    params(("id" = String, Path, description = "Answer id")),
    responses(
        (status = 200, description = "Answer", body = UserAnswer),
        (status = 404, description = "Answer not found")
    ),
    security(("bearer" = [])),
    tag = "results"
)]
pub async fn get_answer(
    State(pool): State<SqlitePool>,
    AuthUser(claims): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id, "answer")?;
    let answer = sqlx::query_as::<_, UserAnswer>(
        "SELECT id, result_id, question_id, user_answer, is_correct, earned_points FROM user_answers WHERE id = ?",
    )
    .bind(&id)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Answer not found".to_string()))?;

    let result = fetch_result(&pool, &answer.result_id).await?;
    if !claims.can_view_user(&result.user_id) {
        return Err(AppError::Forbidden(
            "You can only view your own answers".to_string(),
        ));
    }

    Ok(Json(answer))
}
