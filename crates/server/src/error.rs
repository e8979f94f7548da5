use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use hiredrill_agent::evaluation::EvaluationError;
use hiredrill_core::errors::{ApplicationError, DomainError, InterfaceError};

#[derive(Debug, Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: ErrorDetail,
}

/// JSON error envelope returned by every API route.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self { status, code, message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn too_many_requests(message: impl Into<String>) -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, "rate_limited", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            error: ErrorDetail { code: self.code, message: self.message },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<InterfaceError> for ApiError {
    fn from(error: InterfaceError) -> Self {
        let (status, code) = match &error {
            InterfaceError::BadRequest { .. } => (StatusCode::BAD_REQUEST, "bad_request"),
            InterfaceError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            InterfaceError::ServiceUnavailable { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable")
            }
            InterfaceError::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        tracing::warn!(
            event_name = "api.request.failed",
            correlation_id = %error.correlation_id(),
            error = %error,
            "request failed"
        );
        Self::new(status, code, error.user_message())
    }
}

impl ApiError {
    /// Maps an application failure through the interface error vocabulary.
    pub fn from_application(error: ApplicationError, correlation_id: &str) -> Self {
        Self::from(error.into_interface(correlation_id))
    }
}

impl From<DomainError> for ApiError {
    fn from(error: DomainError) -> Self {
        match error {
            DomainError::InvalidSelection { message, .. } => {
                Self::bad_request("validation_error", message)
            }
            DomainError::SessionNotFound => Self::not_found("Session not found or expired"),
            other => Self::from_application(ApplicationError::Domain(other), "unassigned"),
        }
    }
}

impl From<EvaluationError> for ApiError {
    fn from(error: EvaluationError) -> Self {
        if let EvaluationError::Failed(detail) = &error {
            tracing::error!(event_name = "api.evaluation.failed", error = %detail, "evaluation failed");
        }
        let status =
            StatusCode::from_u16(error.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::new(status, error.code(), error.user_message())
    }
}

#[cfg(test)]
mod tests {
    use axum::{body::to_bytes, http::StatusCode, response::IntoResponse};

    use hiredrill_agent::evaluation::EvaluationError;
    use hiredrill_core::errors::{ApplicationError, DomainError};

    use super::ApiError;

    #[tokio::test]
    async fn error_envelope_carries_code_and_message() {
        let response = ApiError::from(EvaluationError::NoDrill).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json body");
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "no_drill");
        assert_eq!(
            json["error"]["message"],
            "No drill found for this session. Generate a drill first."
        );
    }

    #[test]
    fn persistence_failures_hide_internal_detail() {
        let error = ApiError::from_application(
            ApplicationError::Persistence("sqlite busy".to_string()),
            "req-1",
        );
        assert_eq!(error.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(!error.message().contains("sqlite"));
    }

    #[test]
    fn validation_messages_reach_the_client() {
        let error = ApiError::from(DomainError::InvalidSelection {
            field: "company_name",
            message: "Company name must be at least 2 characters".to_string(),
        });
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error.code(), "validation_error");
        assert_eq!(error.message(), "Company name must be at least 2 characters");
    }
}
