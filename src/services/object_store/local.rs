use super::{ObjectReader, ObjectStore, StoredObject, path_segments};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

/// Stores objects as plain files below a root directory. Containers map to
/// directories and the object id is the `/`-joined relative key.
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn segments<'a>(logical_path: &'a str, filename: &'a str) -> Result<Vec<&'a str>> {
        let mut segments: Vec<&str> = path_segments(logical_path).collect();
        segments.push(filename);
        for segment in &segments {
            if *segment == "." || *segment == ".." || segment.contains('\\') {
                return Err(anyhow!("Invalid path segment '{}'", segment));
            }
        }
        if filename.is_empty() || filename.contains('/') {
            return Err(anyhow!("Invalid object name '{}'", filename));
        }
        Ok(segments)
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    fn backend_id(&self) -> &'static str {
        "local"
    }

    async fn put(
        &self,
        mut reader: ObjectReader,
        size: u64,
        filename: &str,
        logical_path: &str,
    ) -> Result<StoredObject> {
        let segments = Self::segments(logical_path, filename)?;
        let key = segments.join("/");

        let (folders, _) = segments.split_at(segments.len() - 1);
        let dir = folders
            .iter()
            .fold(self.root.clone(), |path, segment| path.join(segment));

        // create_dir_all treats an existing directory as success, so concurrent
        // requests racing on the same prefix are fine
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let target = dir.join(filename);
        let partial = dir.join(format!(".{}.{}.partial", filename, Uuid::new_v4()));

        let written = async {
            let mut file = tokio::fs::File::create(&partial).await?;
            let written = tokio::io::copy(&mut reader, &mut file).await?;
            file.flush().await?;
            file.sync_all().await?;
            Ok::<u64, std::io::Error>(written)
        }
        .await;

        let written = match written {
            Ok(written) => written,
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(anyhow!("Failed to write {}: {}", key, e));
            }
        };

        if written != size {
            warn!(
                "Size mismatch for '{}': expected {} bytes, wrote {}",
                key, size, written
            );
        }

        tokio::fs::rename(&partial, &target)
            .await
            .with_context(|| format!("Failed to move object into place at {}", target.display()))?;

        debug!("Stored '{}' ({} bytes) at {}", key, written, target.display());

        Ok(StoredObject {
            id: key,
            name: filename.to_string(),
        })
    }
}
