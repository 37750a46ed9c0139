pub mod analytics;
pub mod roles;
