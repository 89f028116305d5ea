use crate::config::ObjectStoreConfig;
use crate::services::object_store::google_drive::DriveCredentials;
use crate::services::object_store::{
    GoogleDriveObjectStore, LocalObjectStore, ObjectStore, S3ObjectStore,
};
use aws_sdk_s3::config::Region;
use std::sync::Arc;
use tracing::info;

pub async fn setup_object_store(config: &ObjectStoreConfig) -> anyhow::Result<Arc<dyn ObjectStore>> {
    match config {
        ObjectStoreConfig::Local { root } => {
            tokio::fs::create_dir_all(root).await?;
            info!("🗄️  Local object store: {}", root.display());
            Ok(Arc::new(LocalObjectStore::new(root.clone())))
        }
        ObjectStoreConfig::S3 {
            endpoint,
            access_key,
            secret_key,
            bucket,
            region,
        } => {
            info!("☁️  S3 object store: {} (Bucket: {})", endpoint, bucket);

            let aws_config = aws_config::from_env()
                .endpoint_url(endpoint)
                .region(Region::new(region.clone()))
                .credentials_provider(aws_sdk_s3::config::Credentials::new(
                    access_key.clone(),
                    secret_key.clone(),
                    None,
                    None,
                    "static",
                ))
                .load()
                .await;

            let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
                .force_path_style(true)
                .build();

            let s3_client = aws_sdk_s3::Client::from_conf(s3_config);

            // Ensure bucket exists
            match s3_client.head_bucket().bucket(bucket).send().await {
                Ok(_) => info!("✅ Bucket '{}' is ready", bucket),
                Err(_) => {
                    info!("🪣 Bucket '{}' not found, creating...", bucket);
                    if let Err(e) = s3_client.create_bucket().bucket(bucket).send().await {
                        tracing::error!("❌ Failed to create bucket '{}': {}", bucket, e);
                    } else {
                        info!("✅ Bucket '{}' created successfully", bucket);
                    }
                }
            }

            Ok(Arc::new(S3ObjectStore::new(s3_client, bucket.clone())))
        }
        ObjectStoreConfig::GoogleDrive {
            client_id,
            client_secret,
            refresh_token,
            root_folder_id,
        } => {
            info!("☁️  Google Drive object store (root folder: {})", root_folder_id);
            let credentials = DriveCredentials {
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
                refresh_token: refresh_token.clone(),
            };
            Ok(Arc::new(GoogleDriveObjectStore::new(
                credentials,
                root_folder_id.clone(),
            )))
        }
    }
}
