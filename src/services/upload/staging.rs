use crate::services::object_store::ObjectReader;
use bytes::{Bytes, BytesMut};
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Lifecycle of one file part. `Completed` and `Aborted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartState {
    Collecting,
    Completed,
    Aborted,
}

/// Name of the temporary file backing a part. The staging token keeps
/// concurrent uploads of the same filename apart, and the `.tmp` suffix marks
/// the file as incomplete.
pub fn staging_file_name(staging_token: &str, filename: &str) -> String {
    // Keep the whole name under the usual 255 byte limit
    let mut end = filename.len().min(MAX_STAGED_NAME_BYTES);
    while !filename.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}-{}.tmp", staging_token, &filename[..end])
}

// Leaves room for a 64 char request id plus a 32 char uuid
const MAX_STAGED_NAME_BYTES: usize = 128;

/// Guard over a temporary file. The file is removed at most once, either by
/// an explicit `cleanup` or when the guard is dropped (e.g. the request
/// future was cancelled mid-stream).
#[derive(Debug)]
pub struct StagingFile {
    path: PathBuf,
    cleaned: bool,
}

impl StagingFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            cleaned: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_cleaned(&self) -> bool {
        self.cleaned
    }

    /// Deletes the file. Later calls are no-ops; a failed removal is logged
    /// and not retried.
    pub async fn cleanup(&mut self) {
        if self.cleaned {
            return;
        }
        self.cleaned = true;

        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => debug!("Temporary file removed: {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to remove temporary file: {} - {}",
                self.path.display(),
                e
            ),
        }
    }
}

impl Drop for StagingFile {
    fn drop(&mut self) {
        if self.cleaned {
            return;
        }
        self.cleaned = true;

        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(
                "Temporary file removed on abandoned upload: {}",
                self.path.display()
            ),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to remove temporary file: {} - {}",
                self.path.display(),
                e
            ),
        }
    }
}

enum SinkTarget {
    Memory(BytesMut),
    Disk {
        file: Option<File>,
        staging: StagingFile,
    },
}

/// Destination for the bytes of the single accepted file part
pub struct PartSink {
    filename: String,
    state: PartState,
    written: u64,
    target: SinkTarget,
}

impl PartSink {
    pub fn memory(filename: String) -> Self {
        Self {
            filename,
            state: PartState::Collecting,
            written: 0,
            target: SinkTarget::Memory(BytesMut::new()),
        }
    }

    /// Opens `<dir>/<staging_token>-<filename>.tmp` with create-new semantics.
    /// The staging guard is only armed once the open succeeded, so a name
    /// clash never deletes a file this sink does not own.
    pub fn disk(dir: &Path, staging_token: &str, filename: String) -> io::Result<Self> {
        let path = dir.join(staging_file_name(staging_token, &filename));

        // Opened synchronously: a background open could create the file after
        // a cancelled request already dropped its guard
        let file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;

        Ok(Self {
            filename,
            state: PartState::Collecting,
            written: 0,
            target: SinkTarget::Disk {
                file: Some(File::from_std(file)),
                staging: StagingFile::new(path),
            },
        })
    }

    pub fn state(&self) -> PartState {
        self.state
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.target {
            SinkTarget::Memory(_) => None,
            SinkTarget::Disk { staging, .. } => Some(staging.path()),
        }
    }

    pub async fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        if self.state != PartState::Collecting {
            return Err(io::Error::other(format!(
                "write to part in state {:?}",
                self.state
            )));
        }

        match &mut self.target {
            SinkTarget::Memory(buffer) => buffer.extend_from_slice(chunk),
            SinkTarget::Disk { file, .. } => {
                let file = file
                    .as_mut()
                    .ok_or_else(|| io::Error::other("staging file already closed"))?;
                file.write_all(chunk).await?;
            }
        }
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Collecting → Completed. Flushes and syncs the temp file; if that
    /// fails the part is aborted before the error is returned.
    pub async fn complete(mut self) -> io::Result<StagedUpload> {
        if self.state != PartState::Collecting {
            return Err(io::Error::other(format!(
                "complete part in state {:?}",
                self.state
            )));
        }

        if let SinkTarget::Disk { file: Some(file), .. } = &mut self.target {
            let flushed = async {
                file.flush().await?;
                file.sync_all().await
            }
            .await;
            if let Err(e) = flushed {
                self.abort().await;
                return Err(e);
            }
        }
        self.state = PartState::Completed;

        let PartSink {
            filename,
            written,
            target,
            ..
        } = self;

        let source = match target {
            SinkTarget::Memory(buffer) => StagedSource::Memory(buffer.freeze()),
            SinkTarget::Disk { file, staging } => {
                drop(file);
                StagedSource::Disk(staging)
            }
        };

        Ok(StagedUpload {
            filename,
            size_bytes: written,
            source,
        })
    }

    /// Collecting → Aborted, releasing the buffer or deleting the temp file.
    /// Calling it again, or after completion, does nothing.
    pub async fn abort(&mut self) {
        if self.state != PartState::Collecting {
            return;
        }
        self.state = PartState::Aborted;

        match &mut self.target {
            SinkTarget::Memory(buffer) => *buffer = BytesMut::new(),
            SinkTarget::Disk { file, staging } => {
                drop(file.take());
                staging.cleanup().await;
            }
        }
        debug!(
            "Aborted part '{}' after {} bytes",
            self.filename, self.written
        );
    }
}

#[derive(Debug)]
pub enum StagedSource {
    Memory(Bytes),
    Disk(StagingFile),
}

/// A fully received file part, ready to be forwarded
#[derive(Debug)]
pub struct StagedUpload {
    filename: String,
    size_bytes: u64,
    source: StagedSource,
}

impl StagedUpload {
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn source(&self) -> &StagedSource {
        &self.source
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            StagedSource::Memory(_) => None,
            StagedSource::Disk(staging) => Some(staging.path()),
        }
    }

    pub async fn open(&self) -> io::Result<ObjectReader> {
        match &self.source {
            StagedSource::Memory(bytes) => Ok(Box::new(Cursor::new(bytes.clone()))),
            StagedSource::Disk(staging) => {
                let file = File::open(staging.path()).await?;
                Ok(Box::new(file))
            }
        }
    }

    /// Releases the buffer or deletes the temp file
    pub async fn discard(self) {
        match self.source {
            StagedSource::Memory(_) => {}
            StagedSource::Disk(mut staging) => staging.cleanup().await,
        }
    }
}
