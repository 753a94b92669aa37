use axum::{Json, extract::State, http::HeaderMap};
use tracing::{info, warn};

use crate::auth::require_principal;
use crate::authz::AuthDenial;
use crate::error::AppError;
use crate::extract::JsonBody;
use crate::models::{
    ApiResponse, LoginRequest, LoginResponse, MeResponse, RefreshResponse, UserSummary,
};
use crate::state::SharedState;

pub async fn login_handler(
    State(state): State<SharedState>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>, AppError> {
    let session = state
        .identity
        .sign_in(&payload.email, &payload.password)
        .await
        .map_err(|e| {
            warn!(error = %e, "Sign-in rejected");
            AuthDenial::unauthenticated("Invalid credentials")
        })?;

    let user_id = session.user.id.clone();
    let profile = match state.profiles.profile(&user_id).await {
        Ok(Some(profile)) if profile.is_active => profile,
        Ok(_) => return Err(AuthDenial::ProfileUnavailable { user_id }.into()),
        Err(e) => {
            warn!(user_id = %user_id, error = %e, "Profile lookup failed");
            return Err(AuthDenial::ProfileUnavailable { user_id }.into());
        }
    };

    info!(user_id = %user_id, role = %profile.role, "User signed in");
    Ok(Json(ApiResponse::ok(LoginResponse {
        token: session.access_token,
        refresh_token: session.refresh_token,
        expires_at: session.expires_at,
        user: UserSummary {
            id: session.user.id,
            email: session.user.email,
            username: profile.username,
        },
        role: profile.role,
    })))
}

// The refresh token travels in Authorization and must carry the Bearer prefix
pub async fn refresh_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<RefreshResponse>>, AppError> {
    let refresh_token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthDenial::unauthenticated("Missing or invalid Authorization header"))?;

    let session = state.identity.refresh(refresh_token).await.map_err(|e| {
        warn!(error = %e, "Error refreshing token");
        AuthDenial::unauthenticated("Invalid or expired refresh token")
    })?;

    Ok(Json(ApiResponse::ok(RefreshResponse::from(session))))
}

pub async fn me_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<MeResponse>>, AppError> {
    let principal = require_principal(&state, &headers).await?;

    Ok(Json(ApiResponse::ok(MeResponse {
        user: UserSummary {
            id: principal.id,
            email: principal.email,
            username: principal.display_name,
        },
        role: principal.role.to_string(),
        // inactive profiles never authenticate
        is_active: true,
    })))
}
