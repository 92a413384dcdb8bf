use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::rewrite::RewriteError;
use crate::store::StoreError;
use crate::upstream::UpstreamError;

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    upstream_code: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            upstream_code: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn not_configured(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "not_configured", message)
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, "upstream_error", message)
    }

    pub fn internal(err: impl std::fmt::Display) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            err.to_string(),
        )
    }
}

impl From<UpstreamError> for ApiError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::Rejected { message, code, .. } => Self {
                upstream_code: code,
                ..Self::upstream(message)
            },
            UpstreamError::Endpoint { .. } => {
                tracing::error!(error = %err, "upstream endpoint misconfigured");
                Self::internal(err)
            }
            other => {
                tracing::warn!(error = %other, "upstream call failed");
                Self::upstream(other.to_string())
            }
        }
    }
}

impl From<RewriteError> for ApiError {
    fn from(err: RewriteError) -> Self {
        match err {
            RewriteError::EmptyHtml => Self::bad_request(err.to_string()),
            RewriteError::NotConfigured => Self::not_configured(err.to_string()),
            RewriteError::Upstream(inner) => inner.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::EmptyContent => Self::bad_request(err.to_string()),
            StoreError::NotFound(_) => Self::not_found(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut error = json!({
            "code": self.code,
            "message": self.message,
        });
        if let Some(upstream_code) = self.upstream_code {
            error["upstreamCode"] = json!(upstream_code);
        }
        (
            self.status,
            Json(json!({
                "ok": false,
                "error": error,
            })),
        )
            .into_response()
    }
}
