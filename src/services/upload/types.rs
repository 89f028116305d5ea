use super::staging::StagedUpload;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;

/// Parsed shape of one upload request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub filename: String,
    pub declared_content_length: Option<u64>,
    pub destination_path_fragment: String,
    /// Text fields other than `path`
    pub extra_fields: HashMap<String, String>,
}

/// Output of a successful ingestion: the staged bytes and the parsed request
#[derive(Debug)]
pub struct IngestedUpload {
    pub staged: StagedUpload,
    pub request: UploadRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UploadResult {
    /// Identifier assigned by the object store
    pub id: String,
    /// User-relative path of the stored file
    pub path: String,
}

/// Bytes received so far for the current file part
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadProgress {
    pub received: u64,
    /// Declared request length. It includes multipart framing, so it slightly
    /// exceeds the file size.
    pub total: Option<u64>,
}

impl UploadProgress {
    pub fn new(total: Option<u64>) -> Self {
        Self { received: 0, total }
    }

    pub fn advance(&mut self, chunk_len: usize) {
        self.received += chunk_len as u64;
    }

    pub fn percent(&self) -> Option<f64> {
        match self.total {
            Some(total) if total > 0 => {
                Some((self.received as f64 * 100.0 / total as f64).min(100.0))
            }
            _ => None,
        }
    }
}
