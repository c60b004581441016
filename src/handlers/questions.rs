// src/handlers/questions.rs

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use sqlx::{Executor, FromRow, Sqlite, SqliteConnection, SqlitePool, types::Json as SqlJson};
use validator::Validate;

use crate::{
    error::AppError,
    handlers::tests::fetch_test_row,
    media::{MediaStore, delete_images_best_effort},
    models::question::{
        CreateQuestionRequest, NewQuestion, Question, QuestionListParams, QuestionRow,
        QuestionView,
    },
    utils::{
        html::clean_text,
        id::{new_id, parse_id},
        jwt::{AuthUser, Claims, OptionalClaims},
    },
};

/// Loads the questions of a test in display order.
pub(crate) async fn fetch_questions<'e, E>(executor: E, test_id: &str) -> Result<Vec<Question>, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, QuestionRow>(
        r#"
        SELECT id, test_id, position, question, points, image_url, body
        FROM questions
        WHERE test_id = ?
        ORDER BY position
        "#,
    )
    .bind(test_id)
    .fetch_all(executor)
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch questions of test {}: {:?}", test_id, e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(rows.into_iter().map(Question::from).collect())
}

/// Sanitizes the display text of a validated question.
pub(crate) fn prepare_question(mut question: NewQuestion) -> Result<NewQuestion, AppError> {
    question.question = clean_text(&question.question);
    if question.question.is_empty() {
        return Err(AppError::BadRequest("Question text is required".to_string()));
    }
    Ok(question)
}

pub(crate) async fn insert_question(
    conn: &mut SqliteConnection,
    test_id: &str,
    position: i64,
    question: &NewQuestion,
) -> Result<String, AppError> {
    let id = new_id();
    sqlx::query(
        r#"
        INSERT INTO questions (id, test_id, position, question, type, points, image_url, body)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(test_id)
    .bind(position)
    .bind(&question.question)
    .bind(question.kind.type_name())
    .bind(question.points)
    .bind(&question.image_url)
    .bind(SqlJson(&question.kind))
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        tracing::error!("Failed to insert question: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(id)
}

pub(crate) async fn touch_test(conn: &mut SqliteConnection, test_id: &str) -> Result<(), AppError> {
    sqlx::query("UPDATE tests SET updated_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(test_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// A question together with the author of its test.
#[derive(Debug, FromRow)]
struct OwnedQuestionRow {
    #[sqlx(flatten)]
    question: QuestionRow,
    author_id: String,
}

async fn fetch_owned_question(pool: &SqlitePool, id: &str) -> Result<(Question, String), AppError> {
    let row = sqlx::query_as::<_, OwnedQuestionRow>(
        r#"
        SELECT q.id, q.test_id, q.position, q.question, q.points, q.image_url, q.body, t.author_id
        FROM questions q
        JOIN tests t ON t.id = q.test_id
        WHERE q.id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Question not found".to_string()))?;

    Ok((Question::from(row.question), row.author_id))
}

fn sees_answers(claims: &Option<Claims>, author_id: &str) -> bool {
    claims
        .as_ref()
        .is_some_and(|claims| claims.can_manage(author_id))
}

/// Lists the questions of a test.
/// Answer keys are included only for the author and admins.
#[utoipa::path(
    get,
    path = "/api/questions",
    params(QuestionListParams),
    responses(
        (status = 200, description = "Questions in display order", body = [QuestionView]),
        (status = 404, description = "Test not found")
    ),
    tag = "questions"
)]
pub async fn list_questions(
    State(pool): State<SqlitePool>,
    OptionalClaims(claims): OptionalClaims,
    Query(params): Query<QuestionListParams>,
) -> Result<impl IntoResponse, AppError> {
    let test_id = parse_id(&params.test_id, "test")?;
    let test = fetch_test_row(&pool, &test_id).await?;
    let with_answers = sees_answers(&claims, &test.author_id);

    let questions: Vec<QuestionView> = fetch_questions(&pool, &test_id)
        .await?
        .into_iter()
        .map(|q| QuestionView::new(q, with_answers))
        .collect();

    Ok(Json(questions))
}

#[utoipa::path(
    get,
    path = "/api/questions/{id}",
    params(("id" = String, Path, description = "Question id")),
    responses(
        (status = 200, description = "Question", body = QuestionView),
        (status = 404, description = "Question not found")
    ),
    tag = "questions"
)]
pub async fn get_question(
    State(pool): State<SqlitePool>,
    OptionalClaims(claims): OptionalClaims,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id, "question")?;
    let (question, author_id) = fetch_owned_question(&pool, &id).await?;
    let with_answers = sees_answers(&claims, &author_id);

    Ok(Json(QuestionView::new(question, with_answers)))
}

/// Appends a question to an existing test.
/// Author or admin only.
#[utoipa::path(
    post,
    path = "/api/questions",
    request_body = CreateQuestionRequest,
    responses(
        (status = 201, description = "Question created", body = Question),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Test not found")
    ),
    security(("bearer" = [])),
    tag = "questions"
)]
pub async fn create_question(
    State(pool): State<SqlitePool>,
    AuthUser(claims): AuthUser,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    let test_id = parse_id(&payload.test_id, "test")?;
    let test = fetch_test_row(&pool, &test_id).await?;
    claims.require_manage(&test.author_id)?;
    let question = prepare_question(payload.question)?;

    let mut tx = pool.begin().await?;

    let (next_position,): (i64,) =
        sqlx::query_as("SELECT COALESCE(MAX(position) + 1, 0) FROM questions WHERE test_id = ?")
            .bind(&test_id)
            .fetch_one(&mut *tx)
            .await?;
    let id = insert_question(&mut tx, &test_id, next_position, &question).await?;
    touch_test(&mut tx, &test_id).await?;

    tx.commit().await?;

    let (created, _) = fetch_owned_question(&pool, &id).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Replaces the text, points, image and body of a question.
/// A replaced image is deleted from the media store afterwards.
#[utoipa::path(
    put,
    path = "/api/questions/{id}",
    params(("id" = String, Path, description = "Question id")),
    request_body = NewQuestion,
    responses(
        (status = 200, description = "Updated question", body = Question),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Question not found")
    ),
    security(("bearer" = [])),
    tag = "questions"
)]
pub async fn update_question(
    State(pool): State<SqlitePool>,
    State(media): State<Arc<dyn MediaStore>>,
    AuthUser(claims): AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<NewQuestion>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id, "question")?;
    let (current, author_id) = fetch_owned_question(&pool, &id).await?;
    claims.require_manage(&author_id)?;
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    let question = prepare_question(payload)?;

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        UPDATE questions
        SET question = ?, type = ?, points = ?, image_url = ?, body = ?
        WHERE id = ?
        "#,
    )
    .bind(&question.question)
    .bind(question.kind.type_name())
    .bind(question.points)
    .bind(&question.image_url)
    .bind(SqlJson(&question.kind))
    .bind(&id)
    .execute(&mut *tx)
    .await
    .map_err(|e| {
        tracing::error!("Failed to update question {}: {:?}", id, e);
        AppError::InternalServerError(e.to_string())
    })?;
    touch_test(&mut tx, &current.test_id).await?;

    tx.commit().await?;

    if current.image_url.is_some() && current.image_url != question.image_url {
        delete_images_best_effort(media.as_ref(), current.image_url).await;
    }

    let (updated, _) = fetch_owned_question(&pool, &id).await?;
    Ok(Json(updated))
}

/// Deletes a question and closes the gap in the positions of the rest.
#[utoipa::path(
    delete,
    path = "/api/questions/{id}",
    params(("id" = String, Path, description = "Question id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Question not found")
    ),
    security(("bearer" = [])),
    tag = "questions"
)]
pub async fn delete_question(
    State(pool): State<SqlitePool>,
    State(media): State<Arc<dyn MediaStore>>,
    AuthUser(claims): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id, "question")?;
    let (question, author_id) = fetch_owned_question(&pool, &id).await?;
    claims.require_manage(&author_id)?;

    let mut tx = pool.begin().await?;

    let result = sqlx::query("DELETE FROM questions WHERE id = ?")
        .bind(&id)
        .execute(&mut *tx)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    sqlx::query("UPDATE questions SET position = position - 1 WHERE test_id = ? AND position > ?")
        .bind(&question.test_id)
        .bind(question.position)
        .execute(&mut *tx)
        .await?;
    touch_test(&mut tx, &question.test_id).await?;

    tx.commit().await?;

    delete_images_best_effort(media.as_ref(), question.image_url).await;

    Ok(StatusCode::NO_CONTENT)
}
