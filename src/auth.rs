//! Request authentication: bearer tokens in, `Principal`s out.

use axum::http::{HeaderMap, header::AUTHORIZATION};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::authz::{AuthDenial, Principal, Role, RoleRequirement, authorize};
use crate::backend::{IdentityProvider, ProfileStore};
use crate::error::AppError;
use crate::metrics::AUTH_DENIED_TOTAL;
use crate::state::AppState;

const CF_CONNECTING_IP: &str = "cf-connecting-ip";
const X_FORWARDED_FOR: &str = "x-forwarded-for";

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|h| h.to_str().ok())
}

/// Token from `Authorization`, with or without the `Bearer ` prefix.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let raw = header_str(headers, AUTHORIZATION.as_str())?;
    let token = raw.strip_prefix("Bearer ").unwrap_or(raw).trim();
    (!token.is_empty()).then_some(token)
}

/// Rate-limit identity of the caller. Tokens are hashed so they never sit in
/// the limiter's key space or in logs.
pub fn client_key(headers: &HeaderMap) -> String {
    if let Some(token) = bearer_token(headers) {
        let digest = Sha256::digest(token.as_bytes());
        return format!("api_key:{digest:x}");
    }

    let ip = header_str(headers, CF_CONNECTING_IP)
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .or_else(|| {
            header_str(headers, X_FORWARDED_FOR)
                .and_then(|list| list.split(',').next())
                .map(str::trim)
                .filter(|ip| !ip.is_empty())
        })
        .unwrap_or("unknown");
    format!("ip:{ip}")
}

/// Resolve the caller: verify the token, then load their admin profile.
pub async fn authenticate(
    identity: &dyn IdentityProvider,
    profiles: &dyn ProfileStore,
    headers: &HeaderMap,
) -> Result<Principal, AuthDenial> {
    let token = bearer_token(headers)
        .ok_or_else(|| AuthDenial::unauthenticated("missing bearer token"))?;

    let user = identity
        .verify(token)
        .await
        .map_err(|_| AuthDenial::unauthenticated("invalid or expired token"))?;

    let profile = match profiles.profile(&user.id).await {
        Ok(Some(profile)) if profile.is_active => profile,
        Ok(_) | Err(_) => {
            return Err(AuthDenial::ProfileUnavailable { user_id: user.id });
        }
    };

    Ok(Principal {
        id: user.id,
        role: Role::parse(&profile.role),
        display_name: profile.username,
        email: user.email,
    })
}

fn record_denial(denial: &AuthDenial) {
    AUTH_DENIED_TOTAL.with_label_values(&[denial.kind()]).inc();
    match denial {
        AuthDenial::Forbidden {
            required, actual, ..
        } => warn!(kind = denial.kind(), %required, actual = %actual, "Access denied"),
        AuthDenial::ProfileUnavailable { user_id } => {
            warn!(kind = denial.kind(), user_id = %user_id, "Access denied")
        }
        AuthDenial::Unauthenticated { reason } => {
            warn!(kind = denial.kind(), reason = %reason, "Access denied")
        }
    }
}

/// Authenticate the request and check it against `required`.
pub async fn require_role(
    state: &AppState,
    headers: &HeaderMap,
    required: &RoleRequirement,
) -> Result<Principal, AppError> {
    let outcome = match authenticate(state.identity.as_ref(), state.profiles.as_ref(), headers).await
    {
        Ok(principal) => authorize(Some(&principal), required).map(|()| principal),
        Err(denial) => Err(denial),
    };

    outcome.map_err(|denial| {
        record_denial(&denial);
        AppError::Auth(denial)
    })
}

/// Any authenticated principal with an active profile.
pub async fn require_principal(state: &AppState, headers: &HeaderMap) -> Result<Principal, AppError> {
    authenticate(state.identity.as_ref(), state.profiles.as_ref(), headers)
        .await
        .map_err(|denial| {
            record_denial(&denial);
            AppError::Auth(denial)
        })
}
