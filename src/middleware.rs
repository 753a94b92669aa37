use std::time::Instant;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, header::RETRY_AFTER},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::warn;

use crate::auth::client_key;
use crate::error::AppError;
use crate::metrics::{RATE_LIMITED_TOTAL, REQUEST_LATENCY, REQUEST_TOTAL};
use crate::rate_limit::{RateLimitDenial, RateLimitPolicy, RateLimitStatus};
use crate::state::{AppState, SharedState};

const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
const X_RATELIMIT_RESET: &str = "x-ratelimit-reset";

fn reset_value(reset_at: DateTime<Utc>) -> HeaderValue {
    HeaderValue::from_str(&reset_at.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|_| HeaderValue::from_static("0"))
}

pub fn apply_status_headers(headers: &mut HeaderMap, status: &RateLimitStatus) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(status.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(status.remaining));
    headers.insert(X_RATELIMIT_RESET, reset_value(status.reset_at));
}

pub fn denial_headers(denial: &RateLimitDenial) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(RETRY_AFTER, HeaderValue::from(denial.retry_after_secs));
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(denial.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(0u32));
    headers.insert(X_RATELIMIT_RESET, reset_value(denial.reset_at));
    headers
}

fn reject(key: &str, denial: RateLimitDenial) -> AppError {
    RATE_LIMITED_TOTAL.inc();
    warn!(
        key = %key,
        limit = denial.limit,
        retry_after = denial.retry_after_secs,
        "Rate limit exceeded"
    );
    AppError::RateLimited(denial)
}

/// Count the request against a per-endpoint bucket with its own policy.
///
/// `scope` keeps the bucket apart from the caller's global one.
pub fn check_scoped(
    state: &AppState,
    headers: &HeaderMap,
    scope: &str,
    policy: &RateLimitPolicy,
) -> Result<RateLimitStatus, AppError> {
    let key = format!("{scope}:{}", client_key(headers));
    state
        .rate_limiter
        .check(&key, Some(policy), Utc::now())
        .map_err(|denial| reject(&key, denial))
}

// Global limiter, request counter and latency timer for every route
pub async fn rate_limit_middleware(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Response {
    REQUEST_TOTAL.inc();
    let start_time = Instant::now();

    let key = client_key(request.headers());
    let response = match state.rate_limiter.check(&key, None, Utc::now()) {
        Ok(status) => {
            let mut response = next.run(request).await;
            // a stricter scoped check inside the handler already set its own headers
            if !response.headers().contains_key(X_RATELIMIT_LIMIT) {
                apply_status_headers(response.headers_mut(), &status);
            }
            response
        }
        Err(denial) => reject(&key, denial).into_response(),
    };

    REQUEST_LATENCY.observe(start_time.elapsed().as_secs_f64());
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_status_headers() {
        let mut headers = HeaderMap::new();
        apply_status_headers(
            &mut headers,
            &RateLimitStatus {
                limit: 100,
                remaining: 99,
                reset_at: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
            },
        );

        assert_eq!(headers["x-ratelimit-limit"], "100");
        assert_eq!(headers["x-ratelimit-remaining"], "99");
        assert_eq!(headers["x-ratelimit-reset"], "2025-03-01T12:00:00Z");
    }

    #[test]
    fn test_denial_headers() {
        let headers = denial_headers(&RateLimitDenial {
            limit: 5,
            window_secs: 60,
            retry_after_secs: 17,
            reset_at: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
        });

        assert_eq!(headers["retry-after"], "17");
        assert_eq!(headers["x-ratelimit-remaining"], "0");
        assert_eq!(headers["x-ratelimit-reset"], "2025-03-01T12:00:00Z");
    }
}
