use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

pub mod google_drive;
pub mod local;
pub mod s3;

pub use google_drive::GoogleDriveObjectStore;
pub use local::LocalObjectStore;
pub use s3::S3ObjectStore;

/// Byte source handed to a backend. Owned so backends may move it into
/// request bodies.
pub type ObjectReader = Box<dyn AsyncRead + Unpin + Send + Sync>;

/// What a backend reports back after a successful `put`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub id: String,
    pub name: String,
}

/// Durable storage for finished uploads.
///
/// `logical_path` is a `/`-separated hierarchy of containers. Implementations
/// create missing containers with upsert semantics and must tolerate
/// concurrent callers creating the same prefix.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Backend identifier (e.g., "local", "s3", "google_drive")
    fn backend_id(&self) -> &'static str;

    /// Stores `size` bytes read from `reader` as `filename` under `logical_path`
    async fn put(
        &self,
        reader: ObjectReader,
        size: u64,
        filename: &str,
        logical_path: &str,
    ) -> Result<StoredObject>;
}

/// Non-empty segments of a logical path, in order.
pub fn path_segments(logical_path: &str) -> impl Iterator<Item = &str> {
    logical_path.split('/').filter(|segment| !segment.is_empty())
}
