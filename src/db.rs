// src/db.rs

use std::{str::FromStr, time::Duration};

use chrono::Utc;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

use crate::{
    config::Config,
    error::AppError,
    models::user::{Role, normalize_email},
    utils::{hash::hash_password, id::new_id},
};

/// Opens the pool, retrying while the database is not reachable yet.
pub async fn connect(config: &Config) -> Result<SqlitePool, AppError> {
    let options = SqliteConnectOptions::from_str(&config.database_url)
        .map_err(|e| AppError::InternalServerError(format!("Invalid DATABASE_URL: {}", e)))?
        .create_if_missing(true)
        .foreign_keys(true);

    let mut retry_count = 0;
    loop {
        match SqlitePoolOptions::new()
            .max_connections(config.db_max_connections)
            .acquire_timeout(Duration::from_secs(config.db_acquire_timeout_secs))
            .connect_with(options.clone())
            .await
        {
            Ok(pool) => {
                tracing::info!("Database connected...");
                return Ok(pool);
            }
            Err(e) => {
                retry_count += 1;
                if retry_count > config.db_connect_retries {
                    tracing::error!(
                        "Failed to connect to database after {} retries: {:?}",
                        config.db_connect_retries,
                        e
                    );
                    return Err(AppError::InternalServerError(e.to_string()));
                }
                tracing::warn!(
                    "Database not ready, retrying in 2s... (Attempt {})",
                    retry_count
                );
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    }
}

/// Applies the embedded migrations.
pub async fn migrate(pool: &SqlitePool) -> Result<(), AppError> {
    tracing::info!("Running migrations...");
    sqlx::migrate!("./migrations").run(pool).await.map_err(|e| {
        tracing::error!("Failed to run database migrations: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;
    tracing::info!("Migrations applied successfully.");
    Ok(())
}

/// Creates the configured admin account unless a user with that email exists.
pub async fn seed_admin_user(pool: &SqlitePool, config: &Config) -> Result<(), AppError> {
    let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) else {
        return Ok(());
    };
    let email = normalize_email(email);

    let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE email = ?")
        .bind(&email)
        .fetch_optional(pool)
        .await?;
    if exists.is_some() {
        return Ok(());
    }

    tracing::info!("Seeding admin user: {}", email);
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO users (id, name, email, password_hash, role, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(new_id())
    .bind(config.admin_name.as_deref().unwrap_or("Admin"))
    .bind(&email)
    .bind(hash_password(password)?)
    .bind(Role::Admin)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    tracing::info!("Admin user created successfully.");
    Ok(())
}
