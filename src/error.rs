use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::warn;

use crate::models::relay::ErrorBody;

pub const UPSTREAM_FAILURE_MESSAGE: &str = "Failed to get a response from the AI model.";
pub const EMPTY_RESPONSE_MESSAGE: &str = "Received an invalid or empty response from the AI model.";

pub type RelayResult<T> = Result<T, RelayError>;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    Configuration(String),
    #[error("{0}")]
    AuthExchange(String),
    #[error("{0}")]
    Network(String),
    #[error("{UPSTREAM_FAILURE_MESSAGE}")]
    Upstream { status: u16 },
    #[error("{EMPTY_RESPONSE_MESSAGE}")]
    EmptyOrInvalidResponse,
}

impl RelayError {
    /// Only upstream failures carry their own status; everything else collapses to 500.
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::Upstream { status } => match StatusCode::from_u16(*status) {
                Ok(code) => code,
                Err(e) => {
                    warn!("Upstream returned unusable status {}: {}", status, e);
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
