use super::{ObjectReader, ObjectStore, StoredObject, path_segments};
use crate::utils::keyed_mutex::KeyedMutex;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::header;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Drive REST endpoints; overridable so the store can target a proxy or a
/// local stand-in
#[derive(Debug, Clone)]
pub struct DriveEndpoints {
    pub token_url: String,
    pub api_base: String,
    pub upload_base: String,
}

impl Default for DriveEndpoints {
    fn default() -> Self {
        Self {
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            api_base: "https://www.googleapis.com/drive/v3".to_string(),
            upload_base: "https://www.googleapis.com/upload/drive/v3".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DriveCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

/// Google Drive backend. Each logical path segment becomes a folder, looked up
/// by name under its parent and created when missing.
pub struct GoogleDriveObjectStore {
    http: reqwest::Client,
    credentials: DriveCredentials,
    root_folder_id: String,
    endpoints: DriveEndpoints,
    token: Mutex<Option<AccessToken>>,
    folder_locks: KeyedMutex,
}

impl GoogleDriveObjectStore {
    pub fn new(credentials: DriveCredentials, root_folder_id: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            credentials,
            root_folder_id,
            endpoints: DriveEndpoints::default(),
            token: Mutex::new(None),
            folder_locks: KeyedMutex::new(),
        }
    }

    pub fn with_endpoints(mut self, endpoints: DriveEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Returns a cached access token, refreshing it when it is within a minute of expiry
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Utc::now() + Duration::seconds(60) {
                return Ok(token.value.clone());
            }
        }

        let response: TokenResponse = self
            .http
            .post(&self.endpoints.token_url)
            .form(&[
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("refresh_token", self.credentials.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?
            .error_for_status()
            .context("Drive token refresh rejected")?
            .json()
            .await?;

        debug!("Refreshed Drive access token ({}s)", response.expires_in);
        let value = response.access_token.clone();
        *cached = Some(AccessToken {
            value: response.access_token,
            expires_at: Utc::now() + Duration::seconds(response.expires_in),
        });
        Ok(value)
    }

    async fn get_or_create_folder(
        &self,
        token: &str,
        folder_name: &str,
        parent_id: &str,
    ) -> Result<String> {
        // Serialize lookup+create per (parent, name) so two uploads into a new
        // folder do not both create it
        let _guard = self
            .folder_locks
            .lock(&format!("{}/{}", parent_id, folder_name))
            .await;

        let existing: FileList = self
            .http
            .get(format!("{}/files", self.endpoints.api_base))
            .bearer_auth(token)
            .query(&[
                ("q", folder_query(folder_name, parent_id).as_str()),
                ("fields", "files(id, name)"),
                ("spaces", "drive"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(folder) = existing.files.into_iter().next() {
            return Ok(folder.id);
        }

        let created: DriveFile = self
            .http
            .post(format!("{}/files", self.endpoints.api_base))
            .bearer_auth(token)
            .query(&[("fields", "id, name")])
            .json(&json!({
                "name": folder_name,
                "mimeType": FOLDER_MIME_TYPE,
                "parents": [parent_id],
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        info!("📁 Created Drive folder '{}' ({})", created.name, created.id);
        Ok(created.id)
    }

    async fn resolve_folder(&self, token: &str, logical_path: &str) -> Result<String> {
        let mut parent_id = self.root_folder_id.clone();
        for folder_name in path_segments(logical_path) {
            parent_id = self
                .get_or_create_folder(token, folder_name, &parent_id)
                .await?;
        }
        Ok(parent_id)
    }

    async fn upload(
        &self,
        token: &str,
        reader: ObjectReader,
        size: u64,
        filename: &str,
        parent_id: &str,
    ) -> Result<DriveFile> {
        let session = self
            .http
            .post(format!("{}/files", self.endpoints.upload_base))
            .bearer_auth(token)
            .query(&[("uploadType", "resumable"), ("fields", "id, name")])
            .header("X-Upload-Content-Type", "application/octet-stream")
            .header("X-Upload-Content-Length", size.to_string())
            .json(&json!({
                "name": filename,
                "parents": [parent_id],
            }))
            .send()
            .await?
            .error_for_status()
            .context("Drive rejected upload session")?;

        let location = session
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| anyhow!("Drive upload session without Location header"))?
            .to_string();

        let body = reqwest::Body::wrap_stream(ReaderStream::new(reader));
        let file: DriveFile = self
            .http
            .put(location)
            .bearer_auth(token)
            .header(header::CONTENT_LENGTH, size)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await?
            .error_for_status()
            .context("Drive rejected upload body")?
            .json()
            .await?;

        Ok(file)
    }
}

#[async_trait]
impl ObjectStore for GoogleDriveObjectStore {
    fn backend_id(&self) -> &'static str {
        "google_drive"
    }

    async fn put(
        &self,
        reader: ObjectReader,
        size: u64,
        filename: &str,
        logical_path: &str,
    ) -> Result<StoredObject> {
        let token = self.access_token().await?;
        let parent_id = self.resolve_folder(&token, logical_path).await?;
        let file = self
            .upload(&token, reader, size, filename, &parent_id)
            .await?;
        self.folder_locks.cleanup();

        debug!("Uploaded '{}', id '{}'", file.name, file.id);
        Ok(StoredObject {
            id: file.id,
            name: file.name,
        })
    }
}

fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Drive search expression matching a non-trashed folder `name` directly under `parent_id`
pub fn folder_query(name: &str, parent_id: &str) -> String {
    format!(
        "'{}' in parents and name='{}' and mimeType='{}' and trashed=false",
        escape_query_value(parent_id),
        escape_query_value(name),
        FOLDER_MIME_TYPE
    )
}
