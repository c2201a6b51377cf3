use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(&'static str),

    /// The tunnel driver exited nonzero; carries the body to return
    #[error("{0}")]
    Driver(String),

    #[error("{0}")]
    Config(&'static str),
}

impl WorkerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            WorkerError::Unauthorized => StatusCode::UNAUTHORIZED,
            WorkerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            WorkerError::Driver(_) | WorkerError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for WorkerError {
    fn into_response(self) -> Response {
        (self.status_code(), format!("{}\n", self)).into_response()
    }
}
