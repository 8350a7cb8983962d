//! Mapping of core errors onto HTTP responses.

use api_shared::ErrorRes;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use medsim_core::{CoreError, TextError, Username};

pub type ApiResult<T> = Result<Json<T>, ApiError>;

/// An error response: a status code and a `{status: "error", message}` body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let status = match &err {
            e if e.is_not_found() => StatusCode::NOT_FOUND,
            CoreError::AtFirstCase
            | CoreError::AtLastCase
            | CoreError::InvalidInput(_)
            | CoreError::Text(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<TextError> for ApiError {
    fn from(err: TextError) -> Self {
        Self::bad_request(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("request failed ({}): {}", self.status, self.message);
        } else {
            tracing::warn!("request rejected ({}): {}", self.status, self.message);
        }
        (self.status, Json(ErrorRes::new(self.message))).into_response()
    }
}

/// Parse the `username` field of a request; it is required everywhere.
pub fn require_username(raw: &str) -> Result<Username, ApiError> {
    if raw.trim().is_empty() {
        return Err(ApiError::bad_request("username is required"));
    }
    Ok(Username::parse(raw.trim())?)
}

/// Render a core value as JSON for a free-form response field.
pub fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, ApiError> {
    serde_json::to_value(value).map_err(|e| ApiError::internal(format!("cannot render response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_family_maps_to_404() {
        for err in [
            CoreError::CaseNotFound("x".into()),
            CoreError::ConversationNotFound("x".into()),
            CoreError::EvaluatorNotFound("x".into()),
            CoreError::NoCases,
        ] {
            assert_eq!(ApiError::from(err).status(), StatusCode::NOT_FOUND);
        }
    }

    #[test]
    fn boundary_errors_map_to_400() {
        assert_eq!(
            ApiError::from(CoreError::AtFirstCase).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(CoreError::InvalidInput("bad".into())).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn require_username_rejects_blank_and_unsafe() {
        assert!(require_username("  ").is_err());
        assert!(require_username("../etc").is_err());
        assert_eq!(require_username(" alice ").unwrap().as_str(), "alice");
    }
}
