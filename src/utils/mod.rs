// src/utils/mod.rs

pub mod hash;
pub mod html;
pub mod id;
pub mod jwt;
pub mod validation;
