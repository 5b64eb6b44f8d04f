//! # NCSR Core
//!
//! Core data models, database schema, configuration and shared utilities for
//! the N-CSR filing ingestion system. This crate provides the foundation
//! layer the pipeline crate depends on.

pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod schema;

// Re-export commonly used types
pub use config::Settings;
pub use database::{create_pool, run_migrations, DatabasePool};
pub use error::{AppError, AppResult};

// Re-export all models for convenience
pub use models::*;
