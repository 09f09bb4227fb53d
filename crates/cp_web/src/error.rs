use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use cp_core::Error;

/// Wraps [`Error`] so handlers can return it directly.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Session(_) => StatusCode::CONFLICT,
            Error::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::InvalidUrl(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("❌ {}", self.0);
        }
        // Configuration errors carry a user-facing message as-is.
        let message = match self.0 {
            Error::Configuration(message) => message,
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError(Error::NotFound("x".into())).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError(Error::Session("x".into())).status(), StatusCode::CONFLICT);
        assert_eq!(ApiError(Error::Configuration("x".into())).status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(ApiError(Error::Export("x".into())).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
