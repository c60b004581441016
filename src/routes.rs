// src/routes.rs

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    routing::{get, patch, post},
};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::{
    handlers::{answers, auth, health, profile, questions, results, tags, tests, uploads, users},
    media::LOCAL_URL_PREFIX,
    openapi::openapi_json,
    state::AppState,
};

/// Assembles the main application router.
///
/// * Mounts every resource under `/api`.
/// * Serves locally stored images under `/uploads`.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    // Base64 inflates JSON uploads, so the raw body limit is looser than the image limit.
    let upload_body_limit = state.config.upload_max_bytes.saturating_mul(2);
    let uploaded_files = ServeDir::new(&state.config.upload_dir);

    Router::new()
        .nest("/api/auth", auth_routes)
        .route("/api/health", get(health::health))
        .route("/api/me", get(users::me))
        .route("/api/users", get(users::list_users).post(users::create_user))
        .route(
            "/api/users/{id}",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .route("/api/users/{id}/results", get(profile::list_history))
        .route("/api/users/{id}/stats", get(profile::get_stats))
        .route("/api/tests", get(tests::list_tests).post(tests::create_test))
        .route(
            "/api/tests/{id}",
            get(tests::get_test)
                .put(tests::update_test)
                .delete(tests::delete_test),
        )
        .route("/api/tests/{id}/questions", patch(tests::reorder_questions))
        .route(
            "/api/questions",
            get(questions::list_questions).post(questions::create_question),
        )
        .route(
            "/api/questions/{id}",
            get(questions::get_question)
                .put(questions::update_question)
                .delete(questions::delete_question),
        )
        .route("/api/tags", get(tags::list_tags).post(tags::create_tag))
        .route("/api/tags/{id}", get(tags::get_tag).delete(tags::delete_tag))
        .route(
            "/api/results",
            get(results::list_results).post(results::submit_result),
        )
        .route(
            "/api/results/{id}",
            get(results::get_result).delete(results::delete_result),
        )
        .route("/api/answers", get(answers::list_answers))
        .route("/api/answers/{id}", get(answers::get_answer))
        .route(
            "/api/uploads",
            post(uploads::upload_image).layer(DefaultBodyLimit::max(upload_body_limit)),
        )
        .route("/api/delete-image", post(uploads::delete_image))
        .route("/api-docs/openapi.json", get(openapi_json))
        .nest_service(LOCAL_URL_PREFIX, uploaded_files)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
