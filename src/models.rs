use serde::{Deserialize, Serialize};

use crate::backend::Session;

// Success envelope: {"success": true, "result": ...}
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub result: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(result: T) -> Self {
        Self {
            success: true,
            result,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorItem {
    pub code: u16,
    pub message: String,
}

// Error envelope: {"success": false, "errors": [{"code", "message"}]}
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub success: bool,
    pub errors: Vec<ApiErrorItem>,
}

impl ApiErrorBody {
    pub fn single(code: u16, message: String) -> Self {
        Self {
            success: false,
            errors: vec![ApiErrorItem { code, message }],
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub id: String,
    pub email: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub refresh_token: String,
    pub expires_at: Option<i64>,
    pub user: UserSummary,
    pub role: String,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub token: String,
    pub refresh_token: String,
    pub expires_at: Option<i64>,
}

impl From<Session> for RefreshResponse {
    fn from(session: Session) -> Self {
        Self {
            token: session.access_token,
            refresh_token: session.refresh_token,
            expires_at: session.expires_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub user: UserSummary,
    pub role: String,
    pub is_active: bool,
}

// Contact form submission
#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub dni_or_id: Option<String>,
    #[serde(default)]
    pub nationality: String,
    #[serde(default)]
    pub consultation_request: String,
}

#[derive(Debug, Serialize)]
pub struct EmailResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub url: String,
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct ImageInfo {
    pub name: String,
    pub url: String,
    pub created_at: Option<String>,
    pub size: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct DeletedImage {
    pub path: String,
    pub message: String,
}
