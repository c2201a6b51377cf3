use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors surfaced by the admin HTTP API.
///
/// Causes are logged where they happen; the response body only carries the
/// short message.
#[derive(Debug, Error)]
pub enum MasterError {
    #[error("{0}")]
    BadRequest(&'static str),

    #[error("worker not found")]
    NotFound,

    #[error("address allocation failed")]
    PoolExhausted,

    #[error("{0}")]
    Store(&'static str),

    #[error("request failed: {0}")]
    Upstream(String),
}

impl MasterError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            MasterError::BadRequest(_) => StatusCode::BAD_REQUEST,
            MasterError::NotFound => StatusCode::NOT_FOUND,
            MasterError::PoolExhausted | MasterError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            MasterError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for MasterError {
    fn into_response(self) -> Response {
        (self.status_code(), format!("{}\n", self)).into_response()
    }
}
