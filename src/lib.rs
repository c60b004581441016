// src/lib.rs

pub mod authoring;
pub mod config;
pub mod db;
pub mod error;
pub mod grading;
pub mod handlers;
pub mod media;
pub mod models;
pub mod openapi;
pub mod routes;
pub mod session;
pub mod state;
pub mod utils;

// Re-export specific items for convenience if needed
pub use routes::create_router;
