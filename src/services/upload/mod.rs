pub mod error;
pub mod ingest;
pub mod path_resolver;
pub mod staging;
pub mod types;

pub use error::UploadError;
pub use ingest::{IngestOptions, PATH_FIELD, ingest};
pub use path_resolver::{ResolvedDestination, resolve};
pub use staging::{PartState, StagedSource, StagedUpload, StagingFile};
pub use types::{IngestedUpload, UploadProgress, UploadRequest, UploadResult};

use crate::config::{GatewayConfig, StagingMode};
use crate::services::authorization::{AuthenticatedUser, Authorization};
use crate::services::object_store::ObjectStore;
use crate::utils::validation::is_valid_upload_path;
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::{HeaderMap, header};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Runs one upload end to end: ingest, validate, resolve, forward, clean up.
pub struct UploadService {
    store: Arc<dyn ObjectStore>,
    staging_dir: PathBuf,
    staging_mode: StagingMode,
    ingest_timeout: Option<Duration>,
}

impl UploadService {
    pub fn new(store: Arc<dyn ObjectStore>, config: &GatewayConfig) -> Self {
        Self {
            store,
            staging_dir: config.staging_dir.clone(),
            staging_mode: config.staging_mode,
            ingest_timeout: config.ingest_timeout,
        }
    }

    pub async fn handle(
        &self,
        authorization: &Authorization,
        request: Request,
    ) -> Result<Vec<UploadResult>, UploadError> {
        let user = authorization.user().map_err(UploadError::Unauthorized)?;
        let request_id = request_id(request.headers());

        let span = info_span!("upload", request_id = %request_id, username = %user.username);
        self.handle_authenticated(user, &request_id, request)
            .instrument(span)
            .await
    }

    async fn handle_authenticated(
        &self,
        user: &AuthenticatedUser,
        request_id: &str,
        request: Request,
    ) -> Result<Vec<UploadResult>, UploadError> {
        if !is_multipart(request.headers()) {
            return Err(UploadError::NotMultipart);
        }

        let declared_length = request
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        let mut multipart = Multipart::from_request(request, &())
            .await
            .map_err(|_| UploadError::NotMultipart)?;

        // Clients may reuse a request id, so the temp name also carries a
        // server generated part
        let staging_token = format!("{}-{}", request_id, Uuid::new_v4().simple());
        let options = IngestOptions {
            staging_dir: &self.staging_dir,
            mode: self.staging_mode,
            staging_token: &staging_token,
            declared_length,
        };

        // Dropping the ingest future on timeout drops the staging guard,
        // which deletes any partial temp file
        let ingested = match self.ingest_timeout {
            Some(limit) => match tokio::time::timeout(limit, ingest(&mut multipart, &options)).await
            {
                Ok(result) => result?,
                Err(_) => {
                    warn!("Ingestion exceeded {:?}, aborting", limit);
                    return Err(UploadError::Timeout);
                }
            },
            None => ingest(&mut multipart, &options).await?,
        };

        let IngestedUpload { staged, request } = ingested;
        let outcome = self.forward(user, &staged, &request).await;

        // Cleanup is unconditional and never masks the outcome
        staged.discard().await;

        if let Err(e) = &outcome {
            warn!("Upload of '{}' failed: {}", request.filename, e);
        }
        outcome
    }

    async fn forward(
        &self,
        user: &AuthenticatedUser,
        staged: &StagedUpload,
        request: &UploadRequest,
    ) -> Result<Vec<UploadResult>, UploadError> {
        let fragment = request.destination_path_fragment.as_str();
        if !is_valid_upload_path(fragment) {
            return Err(UploadError::InvalidPath);
        }

        let destination = resolve(user.root_path.as_deref(), fragment);
        let reader = staged.open().await?;

        let stored = self
            .store
            .put(
                reader,
                staged.size_bytes(),
                staged.filename(),
                &destination.absolute_path,
            )
            .await
            .map_err(UploadError::ObjectStore)?;

        info!(
            "File uploaded: '{}' ({} bytes) to {} on {}, id {}",
            staged.filename(),
            staged.size_bytes(),
            destination.absolute_path,
            self.store.backend_id(),
            stored.id
        );

        Ok(vec![UploadResult {
            id: stored.id,
            path: stored_path(fragment, staged.filename()),
        }])
    }
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<mime::Mime>().ok())
        .is_some_and(|m| m.type_() == mime::MULTIPART && m.subtype() == mime::FORM_DATA)
}

/// Request id from the header when it is safe to embed in a file name,
/// otherwise a fresh one
fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|id| {
            !id.is_empty()
                && id.len() <= 64
                && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// User-relative path reported back to the client
pub fn stored_path(fragment: &str, filename: &str) -> String {
    let folder = fragment.trim_matches('/');
    if folder.is_empty() {
        filename.to_string()
    } else {
        format!("{}/{}", folder, filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_stored_path() {
        assert_eq!(stored_path("reports", "report.pdf"), "reports/report.pdf");
        assert_eq!(stored_path("/docs/2024/", "a.txt"), "docs/2024/a.txt");
        assert_eq!(stored_path("/", "a.txt"), "a.txt");
    }

    #[test]
    fn test_is_multipart() {
        let mut headers = HeaderMap::new();
        assert!(!is_multipart(&headers));

        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("multipart/form-data; boundary=X"),
        );
        assert!(is_multipart(&headers));

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        assert!(!is_multipart(&headers));
    }

    #[test]
    fn test_request_id_rejects_path_characters() {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("abc-123"));
        assert_eq!(request_id(&headers), "abc-123");

        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("../../etc"));
        let generated = request_id(&headers);
        assert!(Uuid::parse_str(&generated).is_ok());
    }
}
