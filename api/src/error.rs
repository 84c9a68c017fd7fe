use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use taskdeck_core::error::{self, ApiError};

use crate::agent::AgentError;

/// Internal error type that converts to structured API responses.
/// Each layer returns this explicitly; status mapping happens here, at the
/// transport boundary, and nowhere else.
#[derive(Debug)]
pub enum AppError {
    /// Validation error (422)
    Validation {
        message: String,
        field: Option<String>,
        received: Option<serde_json::Value>,
    },
    /// Missing/invalid/expired credential (401)
    Unauthorized {
        code: &'static str,
        message: String,
        docs_hint: Option<String>,
    },
    /// Missing or foreign resource — never distinguished (404)
    NotFound { message: String },
    /// Uniqueness conflict, e.g. duplicate email (409)
    Conflict {
        message: String,
        field: Option<String>,
    },
    /// Hosted-model quota exhausted (429)
    QuotaExceeded { message: String },
    /// Agent requested but GEMINI_API_KEY is not configured (500)
    AgentNotConfigured,
    /// Unclassified hosted-model fault (500)
    AgentFailure(String),
    /// Database error (500)
    Database(sqlx::Error),
    /// Internal error (500)
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = uuid::Uuid::now_v7().to_string();

        let (status, api_error) = match self {
            AppError::Validation {
                message,
                field,
                received,
            } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ApiError {
                    error: error::codes::VALIDATION_FAILED.to_string(),
                    message,
                    field,
                    received,
                    request_id,
                    docs_hint: None,
                },
            ),
            AppError::Unauthorized {
                code,
                message,
                docs_hint,
            } => (
                StatusCode::UNAUTHORIZED,
                ApiError {
                    error: code.to_string(),
                    message,
                    field: None,
                    received: None,
                    request_id,
                    docs_hint,
                },
            ),
            AppError::NotFound { message } => (
                StatusCode::NOT_FOUND,
                ApiError {
                    error: error::codes::NOT_FOUND.to_string(),
                    message,
                    field: None,
                    received: None,
                    request_id,
                    docs_hint: None,
                },
            ),
            AppError::Conflict { message, field } => (
                StatusCode::CONFLICT,
                ApiError {
                    error: error::codes::CONFLICT.to_string(),
                    message,
                    field,
                    received: None,
                    request_id,
                    docs_hint: None,
                },
            ),
            AppError::QuotaExceeded { message } => {
                tracing::warn!(detail = %message, "hosted model quota exceeded");
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    ApiError {
                        error: error::codes::API_QUOTA_EXCEEDED.to_string(),
                        message: "AI service quota has been exceeded. Please try again later."
                            .to_string(),
                        field: None,
                        received: None,
                        request_id,
                        docs_hint: Some(
                            "The hosted model quota has been reached. Wait for the quota to \
                             reset or upgrade the plan."
                                .to_string(),
                        ),
                    },
                )
            }
            AppError::AgentNotConfigured => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError {
                    error: error::codes::AGENT_NOT_CONFIGURED.to_string(),
                    message: "AI service is not properly configured".to_string(),
                    field: None,
                    received: None,
                    request_id,
                    docs_hint: Some("Set GEMINI_API_KEY to enable the chat assistant.".to_string()),
                },
            ),
            AppError::AgentFailure(detail) => {
                tracing::error!(detail = %detail, "agent failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError {
                        error: error::codes::AGENT_ERROR.to_string(),
                        message: "Failed to process your request".to_string(),
                        field: None,
                        received: None,
                        request_id,
                        docs_hint: None,
                    },
                )
            }
            AppError::Database(err) => {
                tracing::error!("Database error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError {
                        error: error::codes::INTERNAL_ERROR.to_string(),
                        message: "An internal error occurred".to_string(),
                        field: None,
                        received: None,
                        request_id,
                        docs_hint: None,
                    },
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError {
                        error: error::codes::INTERNAL_ERROR.to_string(),
                        message: "An internal error occurred".to_string(),
                        field: None,
                        received: None,
                        request_id,
                        docs_hint: None,
                    },
                )
            }
        };

        (status, Json(api_error)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err)
    }
}

impl From<AgentError> for AppError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::NotConfigured(_) => AppError::AgentNotConfigured,
            AgentError::QuotaExceeded(detail) => AppError::QuotaExceeded { message: detail },
            AgentError::Provider(detail) => AppError::AgentFailure(detail),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn quota_exhaustion_maps_to_429() {
        let err: AppError = AgentError::QuotaExceeded("RESOURCE_EXHAUSTED".to_string()).into();
        assert_eq!(status_of(err), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn generic_provider_fault_maps_to_500() {
        let err: AppError = AgentError::Provider("connection reset".to_string()).into();
        assert_eq!(status_of(err), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn missing_configuration_maps_to_500() {
        let err: AppError = AgentError::NotConfigured("GEMINI_API_KEY".to_string()).into();
        assert_eq!(status_of(err), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn validation_maps_to_422() {
        let err = AppError::Validation {
            message: "title must not be empty".to_string(),
            field: Some("title".to_string()),
            received: None,
        };
        assert_eq!(status_of(err), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
