#![allow(dead_code)]

use async_trait::async_trait;
use axum::{Router, body::Body, http::Response};
use chrono::Utc;
use http_body_util::BodyExt;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use upload_gateway::config::{GatewayConfig, StagingMode};
use upload_gateway::entities::users::{self, Role};
use upload_gateway::infrastructure::database;
use upload_gateway::services::object_store::{ObjectReader, ObjectStore, StoredObject};
use upload_gateway::utils::auth::{create_jwt, hash_password};
use upload_gateway::{AppState, create_app};
use uuid::Uuid;

pub const JWT_SECRET: &str = "test_secret";
pub const BOUNDARY: &str = "X-GATEWAY-TEST-BOUNDARY";

pub async fn setup_test_db() -> DatabaseConnection {
    // A single connection so every query sees the same in-memory database
    let mut opt = ConnectOptions::new("sqlite::memory:");
    opt.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opt).await.unwrap();
    database::run_migrations(&db).await.unwrap();
    db
}

#[derive(Debug, Clone)]
pub struct RecordedPut {
    pub filename: String,
    pub logical_path: String,
    pub size: u64,
    pub data: Vec<u8>,
}

/// Object store double that keeps every put in memory
#[derive(Default)]
pub struct RecordingStore {
    pub puts: Mutex<Vec<RecordedPut>>,
    pub fail: bool,
}

impl RecordingStore {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn puts(&self) -> Vec<RecordedPut> {
        self.puts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for RecordingStore {
    fn backend_id(&self) -> &'static str {
        "recording"
    }

    async fn put(
        &self,
        mut reader: ObjectReader,
        size: u64,
        filename: &str,
        logical_path: &str,
    ) -> anyhow::Result<StoredObject> {
        if self.fail {
            anyhow::bail!("remote store unavailable");
        }

        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;

        let mut puts = self.puts.lock().unwrap();
        puts.push(RecordedPut {
            filename: filename.to_string(),
            logical_path: logical_path.to_string(),
            size,
            data,
        });

        Ok(StoredObject {
            id: format!("obj-{}", puts.len()),
            name: filename.to_string(),
        })
    }
}

pub struct TestApp {
    pub app: Router,
    pub db: DatabaseConnection,
    pub store: Arc<RecordingStore>,
    pub staging: TempDir,
    pub config: GatewayConfig,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::build(RecordingStore::default(), StagingMode::Disk).await
    }

    pub async fn build(store: RecordingStore, mode: StagingMode) -> Self {
        Self::build_with(store, |config| config.staging_mode = mode).await
    }

    /// Test app whose config is adjusted by `configure` before the router is built
    pub async fn build_with(
        store: RecordingStore,
        configure: impl FnOnce(&mut GatewayConfig),
    ) -> Self {
        let db = setup_test_db().await;
        let staging = tempfile::tempdir().unwrap();
        let store = Arc::new(store);

        let mut config = GatewayConfig::development();
        config.staging_dir = staging.path().join("uploads");
        config.jwt_secret = JWT_SECRET.to_string();
        configure(&mut config);

        let state = AppState::new(db.clone(), store.clone(), config.clone());
        let app = create_app(state);

        Self {
            app,
            db,
            store,
            staging,
            config,
        }
    }

    pub fn staging_dir(&self) -> &Path {
        &self.config.staging_dir
    }

    /// True when no temp file is left in the staging directory
    pub fn staging_is_empty(&self) -> bool {
        staging_is_empty(self.staging_dir())
    }
}

pub fn staging_is_empty(dir: &Path) -> bool {
    match std::fs::read_dir(dir) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => true,
    }
}

pub async fn seed_user(
    db: &DatabaseConnection,
    username: &str,
    password: &str,
    role: Role,
    root_path: Option<&str>,
) -> users::Model {
    users::ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        username: Set(username.to_string()),
        email: Set(None),
        password_hash: Set(hash_password(password).unwrap()),
        role: Set(role),
        root_path: Set(root_path.map(str::to_string)),
        token: Set(None),
        created_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .unwrap()
}

/// Issues a token for `user` and stores it as the current one, as a login would
pub async fn issue_token(db: &DatabaseConnection, user: users::Model) -> String {
    let token = create_jwt(&user.username, user.role, JWT_SECRET, None).unwrap();
    let mut active: users::ActiveModel = user.into();
    active.token = Set(Some(token.clone()));
    active.update(db).await.unwrap();
    token
}

pub async fn user_with_token(
    db: &DatabaseConnection,
    username: &str,
    role: Role,
    root_path: Option<&str>,
) -> String {
    let user = seed_user(db, username, "password123", role, root_path).await;
    issue_token(db, user).await
}

pub async fn read_json(response: Response<Body>) -> Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

/// Hand-rolled multipart/form-data body
#[derive(Default)]
pub struct MultipartBody {
    body: Vec<u8>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, filename: &str, data: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                BOUNDARY, name, filename
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    /// Body bytes without the closing boundary
    pub fn unterminated(self) -> Vec<u8> {
        self.body
    }

    pub fn build(mut self) -> Vec<u8> {
        self.body
            .extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        self.body
    }
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={}", BOUNDARY)
}
