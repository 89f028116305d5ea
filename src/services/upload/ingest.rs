use super::error::UploadError;
use super::staging::{PartSink, StagedUpload};
use super::types::{IngestedUpload, UploadProgress, UploadRequest};
use crate::config::StagingMode;
use crate::utils::validation::sanitize_filename;
use axum::extract::Multipart;
use axum::extract::multipart::Field;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, trace, warn};

/// Name of the text field carrying the destination fragment
pub const PATH_FIELD: &str = "path";

#[derive(Debug, Clone, Copy)]
pub struct IngestOptions<'a> {
    pub staging_dir: &'a Path,
    pub mode: StagingMode,
    /// Unique per ingestion; prefixes the temp file name
    pub staging_token: &'a str,
    /// Content-Length of the whole request, if declared
    pub declared_length: Option<u64>,
}

/// Consumes the multipart stream and stages its single file part.
///
/// On every failure the staged part is removed and the rest of the stream is
/// drained before the error is returned. If this future is dropped instead,
/// the staging guard removes the temp file on drop.
pub async fn ingest(
    multipart: &mut Multipart,
    options: &IngestOptions<'_>,
) -> Result<IngestedUpload, UploadError> {
    let mut fields = HashMap::new();
    let mut staged: Option<StagedUpload> = None;

    if let Err(e) = consume_parts(multipart, options, &mut fields, &mut staged).await {
        if let Some(staged) = staged.take() {
            staged.discard().await;
        }
        warn!("Upload failed early: {}. Consuming remaining stream...", e);
        drain(multipart).await;
        return Err(e);
    }

    let Some(staged) = staged else {
        return Err(UploadError::NoFileUploaded);
    };

    let Some(destination_path_fragment) = fields.remove(PATH_FIELD) else {
        staged.discard().await;
        return Err(UploadError::MissingPathField);
    };

    let request = UploadRequest {
        filename: staged.filename().to_string(),
        declared_content_length: options.declared_length,
        destination_path_fragment,
        extra_fields: fields,
    };

    Ok(IngestedUpload { staged, request })
}

async fn consume_parts(
    multipart: &mut Multipart,
    options: &IngestOptions<'_>,
    fields: &mut HashMap<String, String>,
    staged: &mut Option<StagedUpload>,
) -> Result<(), UploadError> {
    let mut file_parts = 0usize;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(UploadError::from_multipart)?
    {
        let name = field.name().map(str::to_owned);

        let Some(original_filename) = field.file_name().map(str::to_owned) else {
            let value = field.text().await.map_err(UploadError::from_multipart)?;
            match name {
                Some(name) => {
                    // Last write wins
                    fields.insert(name, value);
                }
                None => debug!("Ignoring unnamed field"),
            }
            continue;
        };

        file_parts += 1;
        if file_parts > 1 {
            // Read the extra part to its end so the stream stays consistent
            loop {
                match field.chunk().await {
                    Ok(Some(_)) => {}
                    Ok(None) => break,
                    Err(e) => {
                        debug!("Stopped draining extra file part: {}", e);
                        break;
                    }
                }
            }
            return Err(UploadError::MultipleFiles);
        }

        let filename = sanitize_filename(&original_filename)
            .map_err(|e| UploadError::InvalidFilename(e.to_string()))?;

        let sink = match options.mode {
            StagingMode::Memory => PartSink::memory(filename),
            StagingMode::Disk => {
                tokio::fs::create_dir_all(options.staging_dir).await?;
                PartSink::disk(options.staging_dir, options.staging_token, filename)?
            }
        };

        *staged = Some(receive_part(&mut field, sink, options.declared_length).await?);
    }

    Ok(())
}

/// Streams one file part into `sink`. Any error aborts the sink, which
/// deletes what was written so far.
async fn receive_part(
    field: &mut Field<'_>,
    mut sink: PartSink,
    declared_length: Option<u64>,
) -> Result<StagedUpload, UploadError> {
    let mut progress = UploadProgress::new(declared_length);

    loop {
        let chunk = match field.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                sink.abort().await;
                return Err(UploadError::from_multipart(e));
            }
        };

        if let Err(e) = sink.write(&chunk).await {
            sink.abort().await;
            return Err(UploadError::Transport(e));
        }

        progress.advance(chunk.len());
        match progress.percent() {
            Some(percent) => trace!(received = progress.received, "Upload progress: {:.1}%", percent),
            None => trace!(received = progress.received, "Upload progress"),
        }
    }

    let staged = sink.complete().await?;
    debug!(
        "Staged '{}' ({} bytes{})",
        staged.filename(),
        staged.size_bytes(),
        staged
            .path()
            .map(|p| format!(" at {}", p.display()))
            .unwrap_or_default()
    );
    Ok(staged)
}

/// Reads and discards whatever is left of the multipart stream
async fn drain(multipart: &mut Multipart) {
    while let Ok(Some(mut field)) = multipart.next_field().await {
        while let Ok(Some(_)) = field.chunk().await {}
    }
}
