use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use crate::auth::middleware::AuthenticatedUser;
use crate::config::UploadConfig;
use crate::error::{ApiError, ApiResult};

/// Metadata of a file the client is about to store. The bytes go to the
/// blob store directly; this service only validates and names them.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileUpload {
    pub name: String,
    pub size: u64,
    #[serde(alias = "mime")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileUploadResponse {
    pub file_id: Uuid,
    pub url: String,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
}

fn accept_upload(policy: &UploadConfig, upload: FileUpload) -> ApiResult<FileUploadResponse> {
    let name = upload.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Filename required".into()));
    }

    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .filter(|e| policy.allowed_extensions.contains(e))
        .ok_or_else(|| {
            let mut allowed: Vec<&str> =
                policy.allowed_extensions.iter().map(String::as_str).collect();
            allowed.sort_unstable();
            ApiError::BadRequest(format!(
                "File type not allowed. Allowed: {}",
                allowed.join(", ")
            ))
        })?;

    if upload.size > policy.max_bytes {
        return Err(ApiError::PayloadTooLarge(format!(
            "File too large (max {} bytes)",
            policy.max_bytes
        )));
    }

    let file_id = Uuid::new_v4();
    Ok(FileUploadResponse {
        file_id,
        url: format!("{}/{file_id}.{ext}", policy.public_base_url),
        name: name.to_string(),
        size: upload.size,
        mime_type: upload
            .mime_type
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "application/octet-stream".to_string()),
    })
}

/// POST /api/files: register attachment metadata and get its public URL.
pub async fn upload_file(
    user: AuthenticatedUser,
    policy: web::Data<UploadConfig>,
    body: web::Json<FileUpload>,
) -> ApiResult<HttpResponse> {
    let accepted = accept_upload(&policy, body.into_inner())?;
    tracing::info!(user_id = %user.id(), file_id = %accepted.file_id, size = accepted.size, "Attachment registered");
    Ok(HttpResponse::Ok().json(accepted))
}
