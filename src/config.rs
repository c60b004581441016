// src/config.rs

use std::{env, str::FromStr};

use dotenvy::dotenv;

use crate::error::AppError;

/// Credentials for the Cloudinary media backend.
#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub folder: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    /// Token lifetime in seconds.
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub bind_addr: String,
    pub log_dir: String,
    pub cors_origins: Vec<String>,

    pub db_max_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub db_connect_retries: u32,

    /// Directory used by the local media store when Cloudinary is not configured.
    pub upload_dir: String,
    pub upload_max_bytes: usize,
    pub cloudinary: Option<CloudinaryConfig>,

    pub admin_name: Option<String>,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();

        let cloudinary = match (
            env::var("CLOUDINARY_CLOUD_NAME").ok(),
            env::var("CLOUDINARY_API_KEY").ok(),
            env::var("CLOUDINARY_API_SECRET").ok(),
        ) {
            (Some(cloud_name), Some(api_key), Some(api_secret)) => Some(CloudinaryConfig {
                cloud_name,
                api_key,
                api_secret,
                folder: env::var("CLOUDINARY_FOLDER").unwrap_or_else(|_| "ezquiz".to_string()),
            }),
            (None, None, None) => None,
            _ => {
                return Err(AppError::InternalServerError(
                    "CLOUDINARY_CLOUD_NAME, CLOUDINARY_API_KEY and CLOUDINARY_API_SECRET must be set together"
                        .to_string(),
                ));
            }
        };

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000,http://127.0.0.1:3000".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            jwt_expiration: parsed_or("JWT_EXPIRATION", 86_400)?,
            rust_log: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            log_dir: env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string()),
            cors_origins,
            db_max_connections: parsed_or("DB_MAX_CONNECTIONS", 5)?,
            db_acquire_timeout_secs: parsed_or("DB_ACQUIRE_TIMEOUT_SECS", 3)?,
            db_connect_retries: parsed_or("DB_CONNECT_RETRIES", 5)?,
            upload_dir: env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".to_string()),
            upload_max_bytes: parsed_or("UPLOAD_MAX_BYTES", 10 * 1024 * 1024)?,
            cloudinary,
            admin_name: env::var("ADMIN_NAME").ok(),
            admin_email: env::var("ADMIN_EMAIL").ok(),
            admin_password: env::var("ADMIN_PASSWORD").ok(),
        })
    }
}

fn required(name: &str) -> Result<String, AppError> {
    env::var(name).map_err(|_| AppError::InternalServerError(format!("{} must be set", name)))
}

fn parsed_or<T>(name: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::InternalServerError(format!("Invalid value for {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}
