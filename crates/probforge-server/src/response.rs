//! Error responses for the HTTP API.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use probforge_core::error::{Error, GenerationError};
use probforge_core::orchestrator::VariantFailure;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: String,
}

/// An error rendered as `{"success": false, "error", "code"}`.
///
/// Non-operational errors hide their message from the client.
#[derive(Debug, Clone)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
    is_operational: bool,
}

impl AppError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::operational(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::operational(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL_ERROR",
            message: message.into(),
            is_operational: false,
        }
    }

    fn operational(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            is_operational: true,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = if self.is_operational {
            self.message
        } else {
            error!(code = self.code, error = %self.message, "request failed");
            "internal server error".to_string()
        };

        let body = ErrorResponse {
            success: false,
            error: message,
            code: self.code.to_string(),
        };

        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for AppError {
    fn from(e: Error) -> Self {
        match e {
            Error::ProblemNotFound(_)
            | Error::ParentNotFound(_)
            | Error::ExamNotFound(_)
            | Error::LinkNotFound { .. } => AppError::not_found(e.to_string()),
            Error::Validation(message) => AppError::validation(message),
            Error::DuplicateLink { .. } => {
                AppError::operational(StatusCode::CONFLICT, "DUPLICATE_LINK", e.to_string())
            }
            Error::ProblemInUse { .. } => {
                AppError::operational(StatusCode::CONFLICT, "PROBLEM_IN_USE", e.to_string())
            }
            Error::LineageCycle(_) | Error::Storage(_) => AppError::internal(e.to_string()),
        }
    }
}

impl From<VariantFailure> for AppError {
    fn from(failure: VariantFailure) -> Self {
        match failure {
            VariantFailure::OriginalMissing(id) => {
                AppError::not_found(format!("problem not found: {id}"))
            }
            VariantFailure::InvalidRequest(e) | VariantFailure::FetchFailed(e) => e.into(),
            VariantFailure::GenerationFailed(GenerationError::Format(message)) => {
                AppError::operational(
                    StatusCode::BAD_GATEWAY,
                    "GENERATION_FORMAT_ERROR",
                    format!("generated output did not match the expected schema: {message}"),
                )
            }
            VariantFailure::GenerationFailed(GenerationError::Unavailable(e)) => {
                AppError::operational(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "GENERATION_UNAVAILABLE",
                    format!("generation service unavailable: {e}"),
                )
            }
            VariantFailure::PersistFailed(_) => AppError::operational(
                StatusCode::INTERNAL_SERVER_ERROR,
                "PERSIST_FAILED",
                "the variant was generated but could not be saved",
            ),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::validation(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use probforge_core::error::ProviderError;
    use uuid::Uuid;

    #[test]
    fn core_errors_map_to_codes() {
        let cases = [
            (Error::ProblemNotFound(Uuid::nil()), StatusCode::NOT_FOUND, "NOT_FOUND"),
            (Error::Validation("x".into()), StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            (
                Error::DuplicateLink {
                    exam_id: Uuid::nil(),
                    problem_id: Uuid::nil(),
                },
                StatusCode::CONFLICT,
                "DUPLICATE_LINK",
            ),
            (
                Error::ProblemInUse {
                    id: Uuid::nil(),
                    reason: "linked".into(),
                },
                StatusCode::CONFLICT,
                "PROBLEM_IN_USE",
            ),
            (Error::Storage("disk".into()), StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        ];
        for (error, status, code) in cases {
            let app: AppError = error.into();
            assert_eq!(app.status(), status);
            assert_eq!(app.code(), code);
        }
    }

    #[test]
    fn generation_failures_are_distinguished() {
        let format: AppError =
            VariantFailure::GenerationFailed(GenerationError::Format("no solution".into())).into();
        assert_eq!(format.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(format.code(), "GENERATION_FORMAT_ERROR");

        let unavailable: AppError = VariantFailure::GenerationFailed(GenerationError::Unavailable(
            ProviderError::Timeout(30),
        ))
        .into();
        assert_eq!(unavailable.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(unavailable.code(), "GENERATION_UNAVAILABLE");

        let persist: AppError =
            VariantFailure::PersistFailed(Error::Storage("locked".into())).into();
        assert_eq!(persist.code(), "PERSIST_FAILED");
    }
}
