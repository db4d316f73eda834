//! University Library Server
//!
//! REST JSON API for a university library: catalog, patrons, loans,
//! reservation queues, fines and reviews, backed by PostgreSQL and Redis.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;
pub mod shutdown;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}
