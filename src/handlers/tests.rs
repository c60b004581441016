// src/handlers/tests.rs

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use sqlx::{Executor, FromRow, QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use validator::Validate;

use crate::{
    error::AppError,
    handlers::{
        like_pattern,
        questions::{fetch_questions, insert_question, prepare_question},
        tags::upsert_tag,
    },
    media::{MediaStore, delete_images_best_effort},
    models::{
        pagination::{DEFAULT_PER_PAGE, Paginated},
        question::{NewQuestion, QuestionView},
        tag::Tag,
        test::{
            CreateTestRequest, ReorderQuestionsRequest, TestDetail, TestFilter, TestListQuery,
            TestRow, TestSummary, UpdateTestRequest, check_has_questions, check_tag_count,
            check_tag_names,
        },
    },
    utils::{
        html::clean_text,
        id::{new_id, parse_id},
        jwt::{AuthUser, OptionalClaims},
    },
};

const TEST_SELECT: &str = r#"
    SELECT
        t.id, t.title, t.description, t.type, t.author_id, u.name AS author_name, t.image_url,
        (SELECT COUNT(*) FROM questions q WHERE q.test_id = t.id) AS question_count,
        t.created_at, t.updated_at
    FROM tests t
    JOIN users u ON u.id = t.author_id
"#;

pub(crate) async fn fetch_test_row<'e, E>(executor: E, id: &str) -> Result<TestRow, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, TestRow>(&format!("{} WHERE t.id = ?", TEST_SELECT))
        .bind(id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::NotFound("Test not found".to_string()))
}

#[derive(Debug, FromRow)]
struct TagLink {
    test_id: String,
    id: String,
    name: String,
}

/// Tags of several tests at once, keyed by test id.
async fn fetch_tags_for(
    pool: &SqlitePool,
    test_ids: &[String],
) -> Result<HashMap<String, Vec<Tag>>, AppError> {
    let mut tags: HashMap<String, Vec<Tag>> = HashMap::new();
    if test_ids.is_empty() {
        return Ok(tags);
    }

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT tt.test_id, g.id, g.name FROM test_tags tt JOIN tags g ON g.id = tt.tag_id WHERE tt.test_id IN (",
    );
    let mut separated = builder.separated(",");
    for id in test_ids {
        separated.push_bind(id);
    }
    separated.push_unseparated(") ORDER BY g.name");

    let links: Vec<TagLink> = builder.build_query_as().fetch_all(pool).await?;
    for link in links {
        tags.entry(link.test_id).or_default().push(Tag {
            id: link.id,
            name: link.name,
        });
    }
    Ok(tags)
}

async fn load_detail(
    pool: &SqlitePool,
    row: TestRow,
    with_answers: bool,
) -> Result<TestDetail, AppError> {
    let mut tags = fetch_tags_for(pool, std::slice::from_ref(&row.id)).await?;
    let questions = fetch_questions(pool, &row.id)
        .await?
        .into_iter()
        .map(|q| QuestionView::new(q, with_answers))
        .collect();
    let tags = tags.remove(&row.id).unwrap_or_default();

    Ok(TestDetail {
        summary: TestSummary::from_row(row, tags),
        questions,
    })
}

/// Turns tag ids and new tag names into a de-duplicated list of tag ids.
/// Unknown ids are rejected; names are created on demand.
async fn resolve_tags(
    conn: &mut SqliteConnection,
    ids: &[String],
    names: &[String],
) -> Result<Vec<String>, AppError> {
    let mut resolved: Vec<String> = Vec::new();
    for raw in ids {
        let id = parse_id(raw, "tag")?;
        if !resolved.contains(&id) {
            resolved.push(id);
        }
    }

    if !resolved.is_empty() {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) FROM tags WHERE id IN (");
        let mut separated = builder.separated(",");
        for id in &resolved {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");
        let (found,): (i64,) = builder.build_query_as().fetch_one(&mut *conn).await?;
        if found as usize != resolved.len() {
            return Err(AppError::BadRequest("Unknown tag id".to_string()));
        }
    }

    for name in names {
        let (tag, _) = upsert_tag(&mut *conn, name).await?;
        if !resolved.contains(&tag.id) {
            resolved.push(tag.id);
        }
    }

    check_tag_count(resolved.len())?;
    Ok(resolved)
}

async fn replace_test_tags(
    conn: &mut SqliteConnection,
    test_id: &str,
    tag_ids: &[String],
) -> Result<(), AppError> {
    sqlx::query("DELETE FROM test_tags WHERE test_id = ?")
        .bind(test_id)
        .execute(&mut *conn)
        .await?;
    for tag_id in tag_ids {
        sqlx::query("INSERT INTO test_tags (test_id, tag_id) VALUES (?, ?)")
            .bind(test_id)
            .bind(tag_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

async fn insert_questions(
    conn: &mut SqliteConnection,
    test_id: &str,
    questions: &[NewQuestion],
) -> Result<(), AppError> {
    for (position, question) in questions.iter().enumerate() {
        insert_question(conn, test_id, position as i64, question).await?;
    }
    Ok(())
}

/// Image URLs of a test and all of its questions.
async fn collect_image_urls(pool: &SqlitePool, test: &TestRow) -> Result<Vec<String>, AppError> {
    let question_images: Vec<(String,)> = sqlx::query_as(
        "SELECT image_url FROM questions WHERE test_id = ? AND image_url IS NOT NULL",
    )
    .bind(&test.id)
    .fetch_all(pool)
    .await?;

    Ok(test
        .image_url
        .iter()
        .cloned()
        .chain(question_images.into_iter().map(|(url,)| url))
        .collect())
}

fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, filter: &TestFilter) {
    builder.push(" WHERE 1 = 1");
    if let Some(test_type) = filter.test_type {
        builder.push(" AND t.type = ").push_bind(test_type);
    }
    if let Some(author) = &filter.author {
        builder.push(" AND t.author_id = ").push_bind(author.clone());
    }
    if let Some(search) = &filter.search {
        let pattern = like_pattern(search, false);
        builder
            .push(" AND (t.title LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR t.description LIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '\\')");
    }
    if let Some(from) = filter.date_from {
        builder.push(" AND t.created_at >= ").push_bind(from);
    }
    if let Some(to) = filter.date_to {
        to.push_condition(builder, "t.created_at");
    }
    if !filter.tags.is_empty() {
        builder.push(
            " AND EXISTS (SELECT 1 FROM test_tags tt WHERE tt.test_id = t.id AND tt.tag_id IN (",
        );
        let mut separated = builder.separated(",");
        for tag in &filter.tags {
            separated.push_bind(tag.clone());
        }
        separated.push_unseparated("))");
    }
}

/// Searches tests, newest first.
///
/// * `type`, `author`, `dateFrom`, `dateTo` narrow the result.
/// * `search` matches title or description, case-insensitive.
/// * `tags` may repeat; a test matches if it carries any of them.
#[utoipa::path(
    get,
    path = "/api/tests",
    params(TestListQuery),
    responses(
        (status = 200, description = "Page of tests", body = Paginated<TestSummary>),
        (status = 400, description = "Malformed filter")
    ),
    tag = "tests"
)]
pub async fn list_tests(
    State(pool): State<SqlitePool>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<impl IntoResponse, AppError> {
    let filter = TestFilter::from_pairs(&pairs)?;
    let page = filter.page.resolve(DEFAULT_PER_PAGE);

    let mut count_builder: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM tests t");
    push_filters(&mut count_builder, &filter);
    let (total,): (i64,) = count_builder.build_query_as().fetch_one(&pool).await?;

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(TEST_SELECT);
    push_filters(&mut builder, &filter);
    builder
        .push(" ORDER BY t.created_at DESC, t.rowid DESC LIMIT ")
        .push_bind(page.per_page)
        .push(" OFFSET ")
        .push_bind(page.offset());

    let rows: Vec<TestRow> = builder
        .build_query_as()
        .fetch_all(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list tests: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    let ids: Vec<String> = rows.iter().map(|row| row.id.clone()).collect();
    let mut tags = fetch_tags_for(&pool, &ids).await?;
    let items = rows
        .into_iter()
        .map(|row| {
            let row_tags = tags.remove(&row.id).unwrap_or_default();
            TestSummary::from_row(row, row_tags)
        })
        .collect();

    Ok(Json(Paginated::new(items, page, total)))
}

/// Fetches a test with its questions.
/// Answer keys are included only for the author and admins.
#[utoipa::path(
    get,
    path = "/api/tests/{id}",
    params(("id" = String, Path, description = "Test id")),
    responses(
        (status = 200, description = "Test", body = TestDetail),
        (status = 404, description = "Test not found")
    ),
    tag = "tests"
)]
pub async fn get_test(
    State(pool): State<SqlitePool>,
    OptionalClaims(claims): OptionalClaims,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id, "test")?;
    let row = fetch_test_row(&pool, &id).await?;
    let with_answers = claims
        .as_ref()
        .is_some_and(|claims| claims.can_manage(&row.author_id));

    Ok(Json(load_detail(&pool, row, with_answers).await?))
}

/// Creates a test with its tags and questions in one transaction.
/// Teachers and admins only; the caller becomes the author.
#[utoipa::path(
    post,
    path = "/api/tests",
    request_body = CreateTestRequest,
    responses(
        (status = 201, description = "Test created", body = TestDetail),
        (status = 400, description = "Invalid test"),
        (status = 403, description = "Students cannot author tests")
    ),
    security(("bearer" = [])),
    tag = "tests"
)]
pub async fn create_test(
    State(pool): State<SqlitePool>,
    AuthUser(claims): AuthUser,
    Json(payload): Json<CreateTestRequest>,
) -> Result<impl IntoResponse, AppError> {
    claims.require_staff()?;
    payload.check()?;

    let title = clean_text(&payload.title);
    if title.is_empty() {
        return Err(AppError::BadRequest("Title is required".to_string()));
    }
    let description = clean_text(&payload.description);
    let questions = payload
        .questions
        .into_iter()
        .map(prepare_question)
        .collect::<Result<Vec<_>, _>>()?;

    let id = new_id();
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO tests (id, title, description, type, author_id, image_url, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&title)
    .bind(&description)
    .bind(payload.test_type)
    .bind(&claims.sub)
    .bind(&payload.image_url)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create test: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let tag_ids = resolve_tags(&mut tx, &payload.tags, &payload.new_tags).await?;
    replace_test_tags(&mut tx, &id, &tag_ids).await?;
    insert_questions(&mut tx, &id, &questions).await?;

    tx.commit().await?;
    tracing::info!("Test {} created by {}", id, claims.sub);

    let row = fetch_test_row(&pool, &id).await?;
    Ok((StatusCode::CREATED, Json(load_detail(&pool, row, true).await?)))
}

/// Updates a test. Absent fields are kept; `questions`, when present,
/// replaces the whole question list.
/// Author or admin only.
#[utoipa::path(
    put,
    path = "/api/tests/{id}",
    params(("id" = String, Path, description = "Test id")),
    request_body = UpdateTestRequest,
    responses(
        (status = 200, description = "Updated test", body = TestDetail),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Test not found")
    ),
    security(("bearer" = [])),
    tag = "tests"
)]
pub async fn update_test(
    State(pool): State<SqlitePool>,
    State(media): State<Arc<dyn MediaStore>>,
    AuthUser(claims): AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdateTestRequest>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id, "test")?;
    let current = fetch_test_row(&pool, &id).await?;
    claims.require_manage(&current.author_id)?;
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    check_tag_names(&payload.new_tags)?;

    let questions = match payload.questions {
        Some(questions) => {
            check_has_questions(&questions)?;
            Some(
                questions
                    .into_iter()
                    .map(prepare_question)
                    .collect::<Result<Vec<_>, _>>()?,
            )
        }
        None => None,
    };
    let old_question_images = if questions.is_some() {
        collect_image_urls(&pool, &current)
            .await?
            .into_iter()
            .filter(|url| current.image_url.as_ref() != Some(url))
            .collect()
    } else {
        Vec::new()
    };

    let mut tx = pool.begin().await?;

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE tests SET ");
    let mut separated = builder.separated(", ");
    separated.push("updated_at = ");
    separated.push_bind_unseparated(Utc::now());
    if let Some(title) = &payload.title {
        let title = clean_text(title);
        if title.is_empty() {
            return Err(AppError::BadRequest("Title is required".to_string()));
        }
        separated.push("title = ");
        separated.push_bind_unseparated(title);
    }
    if let Some(description) = &payload.description {
        separated.push("description = ");
        separated.push_bind_unseparated(clean_text(description));
    }
    if let Some(test_type) = payload.test_type {
        separated.push("type = ");
        separated.push_bind_unseparated(test_type);
    }
    if let Some(image_url) = &payload.image_url {
        separated.push("image_url = ");
        separated.push_bind_unseparated(image_url.clone());
    }
    builder.push(" WHERE id = ");
    builder.push_bind(&id);
    builder.build().execute(&mut *tx).await.map_err(|e| {
        tracing::error!("Failed to update test {}: {:?}", id, e);
        AppError::InternalServerError(e.to_string())
    })?;

    if payload.tags.is_some() || !payload.new_tags.is_empty() {
        let base_ids = match &payload.tags {
            Some(ids) => ids.clone(),
            None => {
                let rows: Vec<(String,)> =
                    sqlx::query_as("SELECT tag_id FROM test_tags WHERE test_id = ?")
                        .bind(&id)
                        .fetch_all(&mut *tx)
                        .await?;
                rows.into_iter().map(|(tag_id,)| tag_id).collect()
            }
        };
        let tag_ids = resolve_tags(&mut tx, &base_ids, &payload.new_tags).await?;
        replace_test_tags(&mut tx, &id, &tag_ids).await?;
    }

    if let Some(questions) = &questions {
        sqlx::query("DELETE FROM questions WHERE test_id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        insert_questions(&mut tx, &id, questions).await?;
    }

    tx.commit().await?;

    let mut stale_images: Vec<String> = old_question_images;
    if let Some(kept) = &questions {
        let still_used: HashSet<&String> = kept.iter().filter_map(|q| q.image_url.as_ref()).collect();
        stale_images.retain(|url| !still_used.contains(url));
    }
    if payload.image_url.is_some() && current.image_url != payload.image_url {
        stale_images.extend(current.image_url.clone());
    }
    delete_images_best_effort(media.as_ref(), stale_images).await;

    let row = fetch_test_row(&pool, &id).await?;
    Ok(Json(load_detail(&pool, row, true).await?))
}

/// Sets the display order of a test's questions.
/// `questionIds` must list every question of the test exactly once.
#[utoipa::path(
    patch,
    path = "/api/tests/{id}/questions",
    params(("id" = String, Path, description = "Test id")),
    request_body = ReorderQuestionsRequest,
    responses(
        (status = 200, description = "Questions in the new order", body = [QuestionView]),
        (status = 400, description = "Not a permutation of the test's questions"),
        (status = 403, description = "Not the author")
    ),
    security(("bearer" = [])),
    tag = "tests"
)]
pub async fn reorder_questions(
    State(pool): State<SqlitePool>,
    AuthUser(claims): AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<ReorderQuestionsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id, "test")?;
    let test = fetch_test_row(&pool, &id).await?;
    claims.require_manage(&test.author_id)?;

    let requested = payload
        .question_ids
        .iter()
        .map(|raw| parse_id(raw, "question"))
        .collect::<Result<Vec<_>, _>>()?;
    let existing: HashSet<String> = fetch_questions(&pool, &id)
        .await?
        .into_iter()
        .map(|q| q.id)
        .collect();
    let unique: HashSet<&String> = requested.iter().collect();
    if requested.len() != existing.len()
        || unique.len() != requested.len()
        || !requested.iter().all(|q| existing.contains(q))
    {
        return Err(AppError::BadRequest(
            "questionIds must list every question of the test exactly once".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;
    for (position, question_id) in requested.iter().enumerate() {
        sqlx::query("UPDATE questions SET position = ? WHERE id = ? AND test_id = ?")
            .bind(position as i64)
            .bind(question_id)
            .bind(&id)
            .execute(&mut *tx)
            .await?;
    }
    sqlx::query("UPDATE tests SET updated_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(&id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    let questions: Vec<QuestionView> = fetch_questions(&pool, &id)
        .await?
        .into_iter()
        .map(|q| QuestionView::new(q, true))
        .collect();
    Ok(Json(questions))
}

/// Deletes a test and its questions in one transaction, then removes
/// their images from the media store. Results keep their scores.
/// Author or admin only.
#[utoipa::path(
    delete,
    path = "/api/tests/{id}",
    params(("id" = String, Path, description = "Test id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Test not found")
    ),
    security(("bearer" = [])),
    tag = "tests"
)]
pub async fn delete_test(
    State(pool): State<SqlitePool>,
    State(media): State<Arc<dyn MediaStore>>,
    AuthUser(claims): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id, "test")?;
    let test = fetch_test_row(&pool, &id).await?;
    claims.require_manage(&test.author_id)?;
    let images = collect_image_urls(&pool, &test).await?;

    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM questions WHERE test_id = ?")
        .bind(&id)
        .execute(&mut *tx)
        .await?;
    let result = sqlx::query("DELETE FROM tests WHERE id = ?")
        .bind(&id)
        .execute(&mut *tx)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Test not found".to_string()));
    }

    tx.commit().await.map_err(|e| {
        tracing::error!("Failed to delete test {}: {:?}", id, e);
        AppError::InternalServerError(e.to_string())
    })?;
    tracing::info!("Test {} deleted by {}", id, claims.sub);

    delete_images_best_effort(media.as_ref(), images).await;

    Ok(StatusCode::NO_CONTENT)
}
