// src/models/mod.rs

pub mod answer;
pub mod pagination;
pub mod question;
pub mod result;
pub mod tag;
pub mod user;
