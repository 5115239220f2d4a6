use axum::http::StatusCode;
use chrono::Duration;

use crate::http_error::AppError;

/// Persistence failure underneath a `StoryStore`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store error: {0}")]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum StoryError {
    #[error("{0}")]
    Validation(String),
    #[error("authentication required")]
    Unauthorized,
    #[error("you can only modify your own stories")]
    Forbidden,
    #[error("story not found")]
    NotFound,
    #[error("you can only create {limit} stories per {} minutes", .window.num_minutes())]
    RateLimited { limit: u32, window: Duration },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<StoryError> for AppError {
    fn from(e: StoryError) -> Self {
        match e {
            StoryError::Validation(msg) => AppError::bad_request(msg),
            StoryError::Unauthorized => AppError::unauthorized("authenticationRequired"),
            StoryError::Forbidden => AppError::new(StatusCode::FORBIDDEN, "forbidden").with_code("forbidden"),
            StoryError::NotFound => AppError::new(StatusCode::NOT_FOUND, "storyNotFound").with_code("not_found"),
            e @ StoryError::RateLimited { .. } => {
                AppError::new(StatusCode::TOO_MANY_REQUESTS, e.to_string()).with_code("rate_limited")
            }
            StoryError::Store(inner) => AppError::internal(inner),
        }
    }
}
