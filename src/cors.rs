//! Cross-origin policy.
//!
//! Allowed origins are exact strings or `scheme://*.domain` patterns. A
//! pattern matches any origin with the same scheme whose host is a subdomain
//! of `domain`; the bare domain itself does not match.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{
    HeaderName, HeaderValue, Method,
    header::{ACCEPT, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, ORIGIN},
    request::Parts,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

pub const DEFAULT_ORIGINS: [&str; 5] = [
    "http://localhost:3000",
    "http://localhost:3001",
    "http://127.0.0.1:3000",
    "http://127.0.0.1:3001",
    "https://*.vercel.app",
];

pub const DEFAULT_MAX_AGE_SECS: u64 = 600;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsSettings {
    pub origins: Vec<String>,
    pub credentials: bool,
    pub max_age: Duration,
}

impl CorsSettings {
    /// Build from a comma separated origin list, falling back to local defaults.
    pub fn from_list(list: Option<&str>, credentials: bool, max_age_secs: u64) -> Self {
        let origins: Vec<String> = list
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect();

        let origins = if origins.is_empty() {
            warn!("CORS_ORIGINS not set, allowing local development origins only");
            DEFAULT_ORIGINS.iter().map(|o| o.to_string()).collect()
        } else {
            info!(count = origins.len(), origins = %origins.join(" | "), "CORS origins loaded");
            origins
        };

        Self {
            origins,
            credentials,
            max_age: Duration::from_secs(max_age_secs),
        }
    }
}

impl Default for CorsSettings {
    fn default() -> Self {
        Self::from_list(None, true, DEFAULT_MAX_AGE_SECS)
    }
}

pub fn origin_allowed(origin: &str, patterns: &[String]) -> bool {
    patterns
        .iter()
        .any(|pattern| pattern == origin || subdomain_match(origin, pattern))
}

fn subdomain_match(origin: &str, pattern: &str) -> bool {
    let Some((scheme, domain)) = pattern.split_once("://*.") else {
        return false;
    };
    let Some(host) = origin
        .strip_prefix(scheme)
        .and_then(|rest| rest.strip_prefix("://"))
    else {
        return false;
    };

    match host.strip_suffix(domain) {
        Some(label) => label.len() > 1 && label.ends_with('.'),
        None => false,
    }
}

pub fn cors_layer(settings: &CorsSettings) -> CorsLayer {
    let patterns = Arc::new(settings.origins.clone());

    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _request: &Parts| {
                origin
                    .to_str()
                    .map(|origin| origin_allowed(origin, &patterns))
                    .unwrap_or(false)
            },
        ))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([
            CONTENT_TYPE,
            AUTHORIZATION,
            ACCEPT,
            ORIGIN,
            HeaderName::from_static("x-requested-with"),
        ])
        .expose_headers([CONTENT_LENGTH, CONTENT_TYPE])
        .allow_credentials(settings.credentials)
        .max_age(settings.max_age)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns(list: &[&str]) -> Vec<String> {
        list.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_exact_origin() {
        let allowed = patterns(&["http://localhost:3000"]);
        assert!(origin_allowed("http://localhost:3000", &allowed));
        assert!(!origin_allowed("http://localhost:3001", &allowed));
        assert!(!origin_allowed("https://localhost:3000", &allowed));
    }

    #[test]
    fn test_wildcard_subdomain() {
        let allowed = patterns(&["https://*.vercel.app"]);
        assert!(origin_allowed("https://preview-123.vercel.app", &allowed));
        assert!(origin_allowed("https://a.b.vercel.app", &allowed));

        assert!(!origin_allowed("https://vercel.app", &allowed));
        assert!(!origin_allowed("https://.vercel.app", &allowed));
        assert!(!origin_allowed("https://evilvercel.app", &allowed));
        assert!(!origin_allowed("http://preview.vercel.app", &allowed));
        assert!(!origin_allowed("https://vercel.app.evil.com", &allowed));
    }

    #[test]
    fn test_settings_from_list() {
        let settings = CorsSettings::from_list(
            Some(" https://example.com , ,https://*.example.org"),
            false,
            120,
        );
        assert_eq!(
            settings.origins,
            patterns(&["https://example.com", "https://*.example.org"])
        );
        assert!(!settings.credentials);
        assert_eq!(settings.max_age, Duration::from_secs(120));
    }

    #[test]
    fn test_settings_default_origins() {
        let settings = CorsSettings::from_list(Some(""), true, DEFAULT_MAX_AGE_SECS);
        assert_eq!(settings.origins.len(), DEFAULT_ORIGINS.len());
        assert!(origin_allowed("https://app.vercel.app", &settings.origins));
    }
}
