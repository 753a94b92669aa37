use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use crate::authz::AuthDenial;
use crate::middleware::denial_headers;
use crate::models::ApiErrorBody;
use crate::rate_limit::RateLimitDenial;

// Deployment defects: raised at start-up or route construction, never per request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("rate limit must allow at least one request per window")]
    ZeroRateLimit,

    #[error("rate limit window must be at least one second")]
    ZeroRateWindow,

    #[error("role requirement must name at least one role")]
    EmptyRoleRequirement,
}

// Failures reported by the hosted collaborators (identity, records, storage, mail)
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("request to {service} failed: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} responded with {status}: {message}")]
    Rejected {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("unexpected response from {service}: {message}")]
    Decode {
        service: &'static str,
        message: String,
    },

    #[error("{0} is not configured")]
    NotConfigured(&'static str),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Auth(#[from] AuthDenial),

    #[error(transparent)]
    RateLimited(#[from] RateLimitDenial),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found() -> Self {
        AppError::NotFound("Not Found".to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Auth(denial) => denial.status(),
            AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Backend(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }

        let headers = match &self {
            AppError::RateLimited(denial) => denial_headers(denial),
            _ => HeaderMap::new(),
        };

        let body = ApiErrorBody::single(status.as_u16(), self.to_string());
        (status, headers, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::{Role, RoleRequirement};
    use axum::extract::rejection::MissingJsonContentType;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_status_mapping() {
        let unauthenticated = AppError::from(AuthDenial::unauthenticated("missing token"));
        assert_eq!(unauthenticated.status(), StatusCode::UNAUTHORIZED);

        let forbidden = AppError::from(AuthDenial::Forbidden {
            required: RoleRequirement::single(Role::Admin),
            actual: "editor".to_string(),
            failures: vec![],
        });
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

        assert_eq!(AppError::not_found().status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::BadRequest("bad".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(BackendError::NotConfigured("SENDGRID_API_KEY")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_malformed_json_becomes_bad_request_envelope() {
        let rejection = JsonRejection::from(MissingJsonContentType::default());
        let response = AppError::from(rejection).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: ApiErrorBody = serde_json::from_slice(&bytes).unwrap();
        assert!(!body.success);
        assert_eq!(body.errors[0].code, 400);
        assert!(body.errors[0].message.contains("Content-Type"));
    }

    #[test]
    fn test_rate_limited_response_carries_retry_hint() {
        let denial = RateLimitDenial {
            limit: 5,
            window_secs: 60,
            retry_after_secs: 42,
            reset_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 1, 0).unwrap(),
        };

        let response = AppError::from(denial).into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["retry-after"], "42");
        assert_eq!(response.headers()["x-ratelimit-limit"], "5");
        assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
    }
}
