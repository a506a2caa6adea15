//! Mapping of core errors onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{error, warn};

use transcargo_core::Error;

/// Handler error. Server-side failures are logged in full and answered
/// with a generic message.
#[derive(Debug)]
pub struct ApiError(pub Error);

pub type ApiResult<T> = Result<T, ApiError>;

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::Validation(_) | Error::ConsentRequired => StatusCode::BAD_REQUEST,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Error::StoreUnavailable(_) | Error::AuditUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match status {
            StatusCode::SERVICE_UNAVAILABLE => {
                error!("Service unavailable: {}", self.0);
                "Service temporarily unavailable".to_string()
            }
            StatusCode::INTERNAL_SERVER_ERROR => {
                error!("Request failed: {}", self.0);
                "Internal server error".to_string()
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                warn!("Access denied: {}", self.0);
                self.0.to_string()
            }
            _ => self.0.to_string(),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
