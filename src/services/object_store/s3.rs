use super::{ObjectReader, ObjectStore, StoredObject, path_segments};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

/// Part size for multipart uploads; bodies up to this size go in a single PutObject
pub const PART_SIZE: usize = 8 * 1024 * 1024;

/// S3-compatible backend. Containers are key prefixes, so creating the
/// hierarchy is implicit and naturally idempotent.
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    pub fn object_key(logical_path: &str, filename: &str) -> String {
        path_segments(logical_path)
            .chain(std::iter::once(filename))
            .collect::<Vec<_>>()
            .join("/")
    }

    async fn put_single(&self, key: &str, mut reader: ObjectReader, size: u64) -> Result<()> {
        let mut data = Vec::with_capacity(size as usize);
        reader.read_to_end(&mut data).await?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await?;
        Ok(())
    }

    async fn put_multipart(&self, key: &str, reader: ObjectReader) -> Result<()> {
        let multipart_upload_res = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await?;

        let upload_id = multipart_upload_res
            .upload_id()
            .ok_or_else(|| anyhow!("No upload ID"))?
            .to_string();

        match self.upload_parts(key, &upload_id, reader).await {
            Ok(parts) => {
                let completed_multipart_upload = CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build();

                self.client
                    .complete_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .multipart_upload(completed_multipart_upload)
                    .send()
                    .await?;
                Ok(())
            }
            Err(e) => {
                if let Err(abort_err) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    warn!("Failed to abort multipart upload {}: {}", upload_id, abort_err);
                }
                Err(e)
            }
        }
    }

    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        mut reader: ObjectReader,
    ) -> Result<Vec<CompletedPart>> {
        let mut part_number = 1;
        let mut completed_parts = Vec::new();
        let mut buffer = vec![0u8; PART_SIZE];

        loop {
            let mut n = 0;
            while n < PART_SIZE {
                let read = reader.read(&mut buffer[n..]).await?;
                if read == 0 {
                    break;
                }
                n += read;
            }

            if n == 0 {
                break;
            }

            let upload_part_res = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .body(ByteStream::from(buffer[..n].to_vec()))
                .part_number(part_number)
                .send()
                .await?;

            completed_parts.push(
                CompletedPart::builder()
                    .e_tag(upload_part_res.e_tag().unwrap_or_default())
                    .part_number(part_number)
                    .build(),
            );

            part_number += 1;
        }

        Ok(completed_parts)
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn backend_id(&self) -> &'static str {
        "s3"
    }

    async fn put(
        &self,
        reader: ObjectReader,
        size: u64,
        filename: &str,
        logical_path: &str,
    ) -> Result<StoredObject> {
        let key = Self::object_key(logical_path, filename);

        if size as usize <= PART_SIZE {
            self.put_single(&key, reader, size).await?;
        } else {
            self.put_multipart(&key, reader).await?;
        }

        debug!("Stored s3://{}/{} ({} bytes)", self.bucket, key, size);

        Ok(StoredObject {
            id: key,
            name: filename.to_string(),
        })
    }
}
