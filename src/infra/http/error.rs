use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::error::ErrorReport;
use crate::application::repos::RepoError;
use crate::application::settings::SettingsError;
use crate::application::visitors::VisitorError;
use crate::domain::error::DomainError;

use super::rate_limit::RateLimitDecision;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

pub mod codes {
    pub const NOT_FOUND: &str = "not_found";
    pub const INVALID_INPUT: &str = "invalid_input";
    pub const BACKEND_TIMEOUT: &str = "backend_timeout";
    pub const BACKEND_UNCONFIGURED: &str = "backend_unconfigured";
    pub const BACKEND: &str = "backend_error";
}

#[derive(Debug, Serialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
    source: &'static str,
}

/// Body of a `429` from a rate-limited route.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RateLimitedBody {
    error: &'static str,
    retry_after: u64,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: &'static str,
        hint: Option<String>,
    ) -> Self {
        Self {
            status,
            code,
            message,
            hint,
            source: "infra::http",
        }
    }

    pub fn with_source(mut self, source: &'static str) -> Self {
        self.source = source;
        self
    }

    pub fn not_found(message: &'static str) -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, message, None)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    /// Build the `429` response for a denied [`RateLimitDecision`].
    pub fn rate_limited(decision: &RateLimitDecision) -> Response {
        let retry_after = decision.retry_after.unwrap_or(1);
        let body = RateLimitedBody {
            error: "Too many requests. Please try again later.",
            retry_after,
        };
        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            decision.headers(),
            Json(body),
        )
            .into_response();
        ErrorReport::from_message(
            "infra::http::rate_limit",
            StatusCode::TOO_MANY_REQUESTS,
            format!("rate_limited: retry_after={retry_after}"),
        )
        .attach(&mut response);
        response
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let hint = self.hint.clone();
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message.to_string(),
                hint: self.hint,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        ErrorReport::from_message(
            self.source,
            self.status,
            format!("{}: {}", self.code, hint.as_deref().unwrap_or(self.message)),
        )
        .attach(&mut response);
        response
    }
}

impl From<RepoError> for ApiError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => ApiError::not_found("Resource not found"),
            RepoError::InvalidInput { message } => ApiError::new(
                StatusCode::BAD_REQUEST,
                codes::INVALID_INPUT,
                "Backend rejected the request",
                Some(message),
            ),
            RepoError::Timeout => ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                codes::BACKEND_TIMEOUT,
                "Backend timeout",
                None,
            ),
            RepoError::Unconfigured => ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                codes::BACKEND_UNCONFIGURED,
                "Backend is not configured",
                None,
            ),
            RepoError::Persistence(message) => ApiError::new(
                StatusCode::BAD_GATEWAY,
                codes::BACKEND,
                "Backend request failed",
                Some(message),
            ),
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation { message } => ApiError::new(
                StatusCode::BAD_REQUEST,
                codes::INVALID_INPUT,
                "Request could not be processed",
                Some(message),
            ),
        }
    }
}

impl From<SettingsError> for ApiError {
    fn from(err: SettingsError) -> Self {
        let source = "infra::http::settings";
        match err {
            SettingsError::Domain(err) => ApiError::from(err).with_source(source),
            SettingsError::Repo(err) => ApiError::from(err).with_source(source),
        }
    }
}

impl From<VisitorError> for ApiError {
    fn from(err: VisitorError) -> Self {
        let source = "infra::http::visitors";
        match err {
            VisitorError::Domain(err) => ApiError::from(err).with_source(source),
            VisitorError::Repo(err) => ApiError::from(err).with_source(source),
        }
    }
}
