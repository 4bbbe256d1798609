use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct PublishResponse {
    /// Number of events accepted into the queue. Acceptance is not
    /// persistence: duplicates are only discovered downstream.
    pub accepted: usize,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct StatsResponse {
    pub received: u64,
    pub unique_processed: u64,
    pub duplicate_dropped: u64,
    pub topics: Vec<String>,
    pub uptime_seconds: u64,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("failed to decode request: {0}")]
    RequestDecodingError(String),
    #[error("invalid event: {0}")]
    InvalidEvent(String),
    #[error("event submitted with an empty {0}")]
    EmptyField(&'static str),

    #[error("intake is shut down")]
    IntakeClosed,

    #[error("store query failed: {0}")]
    Store(#[from] StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::RequestDecodingError(_) => (StatusCode::BAD_REQUEST, self.to_string()),

            ApiError::InvalidEvent(_) | ApiError::EmptyField(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, self.to_string())
            }

            ApiError::IntakeClosed => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),

            ApiError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        }
        .into_response()
    }
}
