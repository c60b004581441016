// tests/common/mod.rs

#![allow(dead_code)]

use std::{path::PathBuf, str::FromStr, sync::Arc};

use quiz_backend::{
    config::Config,
    db,
    media::{LocalStore, MediaStore},
    routes,
    state::AppState,
};
use serde_json::{Value, json};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const ADMIN_PASSWORD: &str = "admin-password";
pub const PASSWORD: &str = "password123";

/// 1x1 transparent PNG.
pub const PNG_BASE64: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNkYAAAAAYAAjCB0C8AAAAASUVORK5CYII=";

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub pool: SqlitePool,
    pub upload_dir: PathBuf,
}

/// Spawns the app on a random port over a fresh in-memory database.
pub async fn spawn_app() -> TestApp {
    // 1. One connection that never expires keeps the in-memory database alive
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .expect("Invalid SQLite URL")
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .expect("Failed to open in-memory database");

    // 2. Run migrations
    db::migrate(&pool).await.expect("Failed to migrate database");

    // 3. Create test configuration and state
    let upload_dir = std::env::temp_dir().join(format!("quiz-uploads-{}", uuid::Uuid::new_v4()));
    let config = Config {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600,
        rust_log: "error".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        log_dir: "logs".to_string(),
        cors_origins: vec!["http://localhost:3000".to_string()],
        db_max_connections: 1,
        db_acquire_timeout_secs: 3,
        db_connect_retries: 0,
        upload_dir: upload_dir.to_string_lossy().into_owned(),
        upload_max_bytes: 1024 * 1024,
        cloudinary: None,
        admin_name: Some("Root".to_string()),
        admin_email: Some(ADMIN_EMAIL.to_string()),
        admin_password: Some(ADMIN_PASSWORD.to_string()),
    };
    db::seed_admin_user(&pool, &config)
        .await
        .expect("Failed to seed admin");

    let media: Arc<dyn MediaStore> = Arc::new(LocalStore::new(upload_dir.clone()));
    let state = AppState {
        pool: pool.clone(),
        config,
        media,
    };

    // 4. Create the router with the app state
    let app = routes::create_router(state);

    // 5. Bind to port 0 to get a random available port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    // 6. Spawn the server in the background
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        client: reqwest::Client::new(),
        pool,
        upload_dir,
    }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn register(&self, name: &str, email: &str, role: &str) -> reqwest::Response {
        self.client
            .post(self.url("/api/auth/register"))
            .json(&json!({
                "name": name,
                "email": email,
                "password": PASSWORD,
                "role": role
            }))
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn login(&self, email: &str, password: &str) -> String {
        let response = self
            .client
            .post(self.url("/api/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status().as_u16(), 200);
        let body: Value = response.json().await.unwrap();
        body["token"].as_str().unwrap().to_string()
    }

    /// Registers a user and returns `(id, token)`.
    pub async fn user_with_token(&self, name: &str, role: &str) -> (String, String) {
        let email = format!("{}-{}@example.com", name, &uuid::Uuid::new_v4().to_string()[..8]);
        let response = self.register(name, &email, role).await;
        assert_eq!(response.status().as_u16(), 201);
        let body: Value = response.json().await.unwrap();
        let token = self.login(&email, PASSWORD).await;
        (body["id"].as_str().unwrap().to_string(), token)
    }

    pub async fn admin_token(&self) -> String {
        self.login(ADMIN_EMAIL, ADMIN_PASSWORD).await
    }

    /// Creates a test and returns its JSON detail.
    pub async fn create_test(&self, token: &str, payload: &Value) -> Value {
        let response = self
            .client
            .post(self.url("/api/tests"))
            .bearer_auth(token)
            .json(payload)
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status().as_u16(), 201);
        response.json().await.unwrap()
    }
}

/// A two-question test: one `single`, one `multiple`.
pub fn sample_test(title: &str, test_type: &str) -> Value {
    json!({
        "title": title,
        "description": "Basic arithmetic",
        "type": test_type,
        "newTags": ["Math"],
        "questions": [
            {
                "question": "2 + 2 = ?",
                "type": "single",
                "options": ["3", "4"],
                "correctAnswer": "4",
                "points": 1
            },
            {
                "question": "Pick the even numbers",
                "type": "multiple",
                "options": ["1", "2", "4"],
                "correctAnswer": ["2", "4"],
                "points": 1
            }
        ]
    })
}

/// Question ids of a test detail, in display order.
pub fn question_ids(detail: &Value) -> Vec<String> {
    detail["questions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|q| q["id"].as_str().unwrap().to_string())
        .collect()
}
