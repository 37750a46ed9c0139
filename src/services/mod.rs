// src/services/mod.rs

pub mod analytics;
pub mod authz;
pub mod backfill;
pub mod calendar;
pub mod lease;
pub mod mutation;
pub mod rate_limit;
