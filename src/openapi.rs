// src/openapi.rs

use axum::Json;
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::{
    grading::QuestionOutcome,
    handlers::{answers, auth, health, profile, questions, results, tags, tests, uploads, users},
    media::StoredImage,
    models::{
        answer::{AnswerValue, UserAnswer},
        pagination::PageInfo,
        question::{MatchPair, PublicQuestion, PublicQuestionKind, Question, QuestionKind},
        result::{HistoryEntry, HistoryTestRef, UserStats},
        tag::Tag,
        test::{AuthorRef, TestType},
        user::Role,
    },
};

#[derive(OpenApi)]
#[openapi(
    info(title = "Quiz API", description = "Quiz authoring and test taking"),
    paths(
        health::health,
        auth::register,
        auth::login,
        users::list_users,
        users::get_user,
        users::me,
        users::create_user,
        users::update_user,
        users::delete_user,
        profile::list_history,
        profile::get_stats,
        tests::list_tests,
        tests::get_test,
        tests::create_test,
        tests::update_test,
        tests::reorder_questions,
        tests::delete_test,
        questions::list_questions,
        questions::get_question,
        questions::create_question,
        questions::update_question,
        questions::delete_question,
        tags::list_tags,
        tags::get_tag,
        tags::create_tag,
        tags::delete_tag,
        results::submit_result,
        results::list_results,
        results::get_result,
        results::delete_result,
        answers::list_answers,
        answers::get_answer,
        uploads::upload_image,
        uploads::delete_image,
    ),
    components(schemas(
        AnswerValue,
        UserAnswer,
        PageInfo,
        MatchPair,
        Question,
        QuestionKind,
        PublicQuestion,
        PublicQuestionKind,
        QuestionOutcome,
        HistoryEntry,
        HistoryTestRef,
        UserStats,
        Tag,
        AuthorRef,
        TestType,
        Role,
        StoredImage,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Liveness"),
        (name = "auth", description = "Registration and login"),
        (name = "users", description = "Account management"),
        (name = "profile", description = "Result history and statistics"),
        (name = "tests", description = "Tests and their questions"),
        (name = "questions", description = "Single questions"),
        (name = "tags", description = "Tags"),
        (name = "results", description = "Submissions, results and answers"),
        (name = "uploads", description = "Images")
    )
)]
pub struct ApiDoc;

/// Registers the `bearer` scheme referenced by protected paths.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

/// Serves the generated OpenAPI document.
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
