// src/handlers/results.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool, types::Json as SqlJson};

use crate::{
    error::AppError,
    grading::grade,
    handlers::{questions::fetch_questions, tests::fetch_test_row},
    models::{
        pagination::{DEFAULT_PER_PAGE, PageParams, Paginated},
        result::{ResultListParams, SubmissionResponse, SubmitTestRequest, UserResult},
        test::{UpperBound, parse_date_bound},
    },
    session::{SessionMode, TakingSession},
    utils::{
        id::{new_id, parse_id},
        jwt::{AuthUser, OptionalClaims},
    },
};

/// Grades a submission against the stored answer keys.
///
/// Signed-in users get the result stored (201). Anonymous callers only
/// receive the score (200). Tests of type `test` must be answered in order:
/// a gap followed by a later answer is rejected.
#[utoipa::path(
    post,
    path = "/api/results",
    request_body = SubmitTestRequest,
    responses(
        (status = 201, description = "Graded and stored", body = SubmissionResponse),
        (status = 200, description = "Graded, not stored (anonymous)", body = SubmissionResponse),
        (status = 400, description = "Invalid submission"),
        (status = 404, description = "Test not found")
    ),
    tag = "results"
)]
pub async fn submit_result(
    State(pool): State<SqlitePool>,
    OptionalClaims(claims): OptionalClaims,
    Json(payload): Json<SubmitTestRequest>,
) -> Result<impl IntoResponse, AppError> {
    let test_id = parse_id(&payload.test_id, "test")?;
    if payload.time_spent.is_some_and(|secs| secs < 0) {
        return Err(AppError::BadRequest("timeSpent cannot be negative".to_string()));
    }

    let test = fetch_test_row(&pool, &test_id).await?;
    let questions = fetch_questions(&pool, &test_id).await?;
    if questions.is_empty() {
        return Err(AppError::BadRequest("This test has no questions".to_string()));
    }

    let ids = questions.iter().map(|q| q.id.clone()).collect();
    let answers = TakingSession::replay(SessionMode::from(test.test_type), ids, payload.answers)?;
    let report = grade(&questions, &answers);

    let Some(claims) = claims else {
        return Ok((
            StatusCode::OK,
            Json(SubmissionResponse {
                id: None,
                test_id,
                score: report.score,
                max_score: report.max_score,
                outcomes: report.outcomes,
                saved: false,
            }),
        ));
    };

    let result_id = new_id();
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO user_results (id, user_id, test_id, score, max_score, time_spent, submitted_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&result_id)
    .bind(&claims.sub)
    .bind(&test_id)
    .bind(report.score)
    .bind(report.max_score)
    .bind(payload.time_spent)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await
    .map_err(|e| {
        tracing::error!("Failed to store result: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    for outcome in &report.outcomes {
        let Some(answer) = answers.get(&outcome.question_id) else {
            continue;
        };
        sqlx::query(
            r#"
            INSERT INTO user_answers (id, result_id, question_id, user_answer, is_correct, earned_points)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(new_id())
        .bind(&result_id)
        .bind(&outcome.question_id)
        .bind(SqlJson(answer))
        .bind(outcome.is_correct)
        .bind(outcome.earned_points)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    tracing::info!(
        "User {} scored {}/{} on test {}",
        claims.sub,
        report.score,
        report.max_score,
        test_id
    );

    Ok((
        StatusCode::CREATED,
        Json(SubmissionResponse {
            id: Some(result_id),
            test_id,
            score: report.score,
            max_score: report.max_score,
            outcomes: report.outcomes,
            saved: true,
        }),
    ))
}

fn push_result_filters(
    builder: &mut QueryBuilder<'_, Sqlite>,
    user: &Option<String>,
    test: &Option<String>,
    date_from: Option<DateTime<Utc>>,
    date_to: Option<UpperBound>,
) {
    builder.push(" WHERE 1 = 1");
    if let Some(user) = user {
        builder.push(" AND user_id = ").push_bind(user.clone());
    }
    if let Some(test) = test {
        builder.push(" AND test_id = ").push_bind(test.clone());
    }
    if let Some(from) = date_from {
        builder.push(" AND submitted_at >= ").push_bind(from);
    }
    if let Some(to) = date_to {
        to.push_condition(builder, "submitted_at");
    }
}

/// Lists stored results, newest first.
/// Students only see their own; teachers and admins may filter by any user.
#[utoipa::path(
    get,
    path = "/api/results",
    params(ResultListParams),
    responses(
        (status = 200, description = "Page of results", body = Paginated<UserResult>),
        (status = 403, description = "Another user's results")
    ),
    security(("bearer" = [])),
    tag = "results"
)]
pub async fn list_results(
    State(pool): State<SqlitePool>,
    AuthUser(claims): AuthUser,
    Query(params): Query<ResultListParams>,
) -> Result<impl IntoResponse, AppError> {
    let user = match params.user.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(raw) => Some(parse_id(raw, "user")?),
        None => None,
    };
    let user = if claims.is_staff() {
        user
    } else {
        match user {
            Some(id) if id != claims.sub => {
                return Err(AppError::Forbidden(
                    "You can only view your own results".to_string(),
                ));
            }
            _ => Some(claims.sub.clone()),
        }
    };
    let test = match params.test.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(raw) => Some(parse_id(raw, "test")?),
        None => None,
    };
    let date_from = match params.date_from.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(raw) => Some(parse_date_bound(raw.trim())?),
        None => None,
    };
    let date_to = match params.date_to.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(raw) => Some(UpperBound::parse(raw.trim())?),
        None => None,
    };
    let page = PageParams {
        page: params.page,
        per_page: params.per_page,
    }
    .resolve(DEFAULT_PER_PAGE);

    let mut count_builder: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT COUNT(*) FROM user_results");
    push_result_filters(&mut count_builder, &user, &test, date_from, date_to);
    let (total,): (i64,) = count_builder.build_query_as().fetch_one(&pool).await?;

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT id, user_id, test_id, score, max_score, time_spent, submitted_at FROM user_results",
    );
    push_result_filters(&mut builder, &user, &test, date_from, date_to);
    builder
        .push(" ORDER BY submitted_at DESC, rowid DESC LIMIT ")
        .push_bind(page.per_page)
        .push(" OFFSET ")
        .push_bind(page.offset());

    let results: Vec<UserResult> = builder
        .build_query_as()
        .fetch_all(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list results: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    Ok(Json(Paginated::new(results, page, total)))
}

pub(crate) async fn fetch_result(pool: &SqlitePool, id: &str) -> Result<UserResult, AppError> {
    sqlx::query_as::<_, UserResult>(
        "SELECT id, user_id, test_id, score, max_score, time_spent, submitted_at FROM user_results WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Result not found".to_string()))
}

#[utoipa::path(
    get,
    path = "/api/results/{id}",
    params(("id" = String, Path, description = "Result id")),
    responses(
        (status = 200, description = "Result", body = UserResult),
        (status = 403, description = "Another user's result"),
        (status = 404, description = "Result not found")
    ),
    security(("bearer" = [])),
    tag = "results"
)]
pub async fn get_result(
    State(pool): State<SqlitePool>,
    AuthUser(claims): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id, "result")?;
    let result = fetch_result(&pool, &id).await?;
    if !claims.can_view_user(&result.user_id) {
        return Err(AppError::Forbidden(
            "You can only view your own results".to_string(),
        ));
    }
    Ok(Json(result))
}

/// Deletes a result and its answers.
/// Admin only.
#[utoipa::path(
    delete,
    path = "/api/results/{id}",
    params(("id" = String, Path, description = "Result id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Result not found")
    ),
    security(("bearer" = [])),
    tag = "results"
)]
pub async fn delete_result(
    State(pool): State<SqlitePool>,
    AuthUser(claims): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    claims.require_admin()?;
    let id = parse_id(&id, "result")?;

    let result = sqlx::query("DELETE FROM user_results WHERE id = ?")
        .bind(&id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Result not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}
