use std::collections::HashMap;

use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::HeaderMap,
};
use chrono::Utc;
use tracing::{info, warn};

use crate::auth::require_role;
use crate::authz::{Role, RoleRequirement};
use crate::error::AppError;
use crate::models::{ApiResponse, DeletedImage, ImageInfo, UploadResponse};
use crate::state::SharedState;

pub const FOLDER: &str = "posts";
const IMAGE_EXTENSIONS: [&str; 6] = [".jpg", ".jpeg", ".png", ".gif", ".webp", ".svg"];
const DEFAULT_LIST_LIMIT: u32 = 100;
const PUBLIC_OBJECT_PREFIX: &str = "/storage/v1/object/public/";

/// Replace anything outside `[A-Za-z0-9.-]` with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn is_image(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Storage path for a delete request given a bare name, a `posts/` path or
/// a full public URL.
pub fn normalize_image_path(raw: &str) -> Result<String, AppError> {
    let mut path = raw.trim().to_string();

    if path.starts_with("http://") || path.starts_with("https://") {
        let url = reqwest::Url::parse(&path)
            .map_err(|_| AppError::BadRequest("Invalid URL format".to_string()))?;
        // /storage/v1/object/public/<bucket>/<path>
        path = url
            .path()
            .strip_prefix(PUBLIC_OBJECT_PREFIX)
            .and_then(|rest| rest.split_once('/'))
            .map(|(_bucket, object)| object.to_string())
            .filter(|object| !object.is_empty())
            .ok_or_else(|| {
                AppError::BadRequest("Invalid URL format. Could not extract path.".to_string())
            })?;
    }

    if path.is_empty() {
        return Err(AppError::BadRequest("Path is required".to_string()));
    }
    if path.starts_with(&format!("{FOLDER}/")) {
        return Ok(path);
    }
    if !path.contains('/') {
        return Ok(format!("{FOLDER}/{path}"));
    }
    Err(AppError::BadRequest(format!(
        "Invalid path format. Path must be in '{FOLDER}/' folder"
    )))
}

fn editor() -> RoleRequirement {
    RoleRequirement::single(Role::Editor)
}

pub async fn upload_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<UploadResponse>>, AppError> {
    let principal = require_role(&state, &headers, &editor()).await?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let original = field.file_name().unwrap_or("upload").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("Could not read file: {e}")))?;

        let path = format!(
            "{FOLDER}/{}-{}",
            Utc::now().timestamp_millis(),
            sanitize_file_name(&original)
        );
        let url = state
            .objects
            .put(&path, bytes.to_vec(), &content_type)
            .await?;

        info!(user_id = %principal.id, path = %path, size = bytes.len(), "Image uploaded");
        return Ok(Json(ApiResponse::ok(UploadResponse { url, path })));
    }

    Err(AppError::BadRequest("No file uploaded".to_string()))
}

pub async fn list_images_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<ApiResponse<Vec<ImageInfo>>>, AppError> {
    require_role(&state, &headers, &editor()).await?;

    let number = |name: &str, default: u32| -> Result<u32, AppError> {
        match params.get(name).filter(|v| !v.is_empty()) {
            Some(v) => v
                .parse()
                .map_err(|_| AppError::BadRequest(format!("{name} must be a non-negative integer"))),
            None => Ok(default),
        }
    };
    let limit = number("limit", DEFAULT_LIST_LIMIT)?;
    let offset = number("offset", 0)?;

    let images = state
        .objects
        .list(FOLDER, limit, offset)
        .await?
        .into_iter()
        .filter(|object| is_image(&object.name))
        .map(|object| ImageInfo {
            url: state.objects.public_url(&format!("{FOLDER}/{}", object.name)),
            name: object.name,
            created_at: object.created_at,
            size: object.size,
        })
        .collect();

    Ok(Json(ApiResponse::ok(images)))
}

pub async fn delete_image_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(raw): Path<String>,
) -> Result<Json<ApiResponse<DeletedImage>>, AppError> {
    let principal = require_role(&state, &headers, &RoleRequirement::single(Role::Admin)).await?;
    let path = normalize_image_path(&raw)?;

    if !state.objects.remove(&path).await? {
        warn!(path = %path, bucket = state.objects.bucket(), "Image not found");
        return Err(AppError::NotFound("Image not found".to_string()));
    }

    info!(user_id = %principal.id, path = %path, "Image deleted");
    Ok(Json(ApiResponse::ok(DeletedImage {
        path,
        message: "Image deleted successfully".to_string(),
    })))
}
