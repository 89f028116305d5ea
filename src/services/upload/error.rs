use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use thiserror::Error;

use crate::services::authorization::RejectReason;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Expected multipart/form-data")]
    NotMultipart,

    #[error("Expected single file, but multiple files uploaded")]
    MultipleFiles,

    #[error("No file uploaded")]
    NoFileUploaded,

    #[error("Missing path field")]
    MissingPathField,

    #[error("Invalid path format")]
    InvalidPath,

    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    #[error("Malformed multipart body: {0}")]
    MalformedMultipart(String),

    #[error("Request body exceeds the maximum allowed limit")]
    PayloadTooLarge,

    #[error("{0}")]
    Unauthorized(RejectReason),

    #[error("Upload did not complete in time")]
    Timeout,

    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("Object store error: {0}")]
    ObjectStore(#[source] anyhow::Error),
}

impl UploadError {
    /// Classifies a parser error by the status axum assigns to it: body limit
    /// hits become `PayloadTooLarge`, client framing problems become
    /// `MalformedMultipart`, and failures reading the body are transport errors.
    pub fn from_multipart(err: MultipartError) -> Self {
        match err.status() {
            StatusCode::PAYLOAD_TOO_LARGE => UploadError::PayloadTooLarge,
            status if status.is_client_error() => {
                UploadError::MalformedMultipart(err.body_text())
            }
            _ => UploadError::Transport(std::io::Error::other(err.body_text())),
        }
    }
}
