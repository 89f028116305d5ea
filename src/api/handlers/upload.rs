use crate::AppState;
use crate::api::error::AppError;
use crate::services::authorization::Authorization;
use crate::services::upload::UploadResult;
use axum::{
    Extension, Json,
    extract::{Request, State},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Multipart form accepted by `/v1/upload`
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct UploadForm {
    /// Destination folder relative to the user's root, e.g. `reports/2024`
    pub path: String,
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    pub message: String,
    pub result: Vec<UploadResult>,
}

#[utoipa::path(
    post,
    path = "/v1/upload",
    request_body(content = UploadForm, description = "Single file plus its destination path", content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "File uploaded", body = UploadResponse),
        (status = 400, description = "Malformed request"),
        (status = 401, description = "Unauthorized"),
        (status = 408, description = "Upload did not complete in time"),
        (status = 413, description = "Payload too large"),
        (status = 502, description = "Object store failure")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "upload"
)]
pub async fn upload_file(
    State(state): State<AppState>,
    Extension(authorization): Extension<Authorization>,
    request: Request,
) -> Result<Json<UploadResponse>, AppError> {
    let result = state.upload_service.handle(&authorization, request).await?;

    Ok(Json(UploadResponse {
        message: "File uploaded".to_string(),
        result,
    }))
}
