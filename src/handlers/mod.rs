// src/handlers/mod.rs

pub mod analytics;
pub mod roles;
pub mod upstream;
