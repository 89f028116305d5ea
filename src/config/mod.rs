use anyhow::{Context, Result, anyhow};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Where the ingestor keeps a file part while it is being received
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagingMode {
    /// Stream the part into a temporary file under the staging directory
    Disk,
    /// Accumulate the part in an in-memory buffer
    Memory,
}

impl StagingMode {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "disk" => Some(Self::Disk),
            "memory" => Some(Self::Memory),
            _ => None,
        }
    }
}

/// Gateway configuration, loaded once at startup
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Maximum accepted request body in bytes (default: 500 MB)
    pub body_limit: usize,

    /// Directory holding temporary upload files (default: ./uploads)
    pub staging_dir: PathBuf,

    /// Staging strategy for file parts (default: disk)
    pub staging_mode: StagingMode,

    /// Maximum time spent ingesting one request; `None` disables the bound
    pub ingest_timeout: Option<Duration>,

    /// JWT Secret Key
    pub jwt_secret: String,

    /// Lifetime of issued tokens; `None` issues tokens without expiry
    pub token_ttl_hours: Option<i64>,

    /// Log method, uri and headers of every incoming request
    pub log_every_request: bool,

    /// Password for the seeded `root` account
    pub root_password: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            body_limit: 500 * 1024 * 1024, // 500 MB
            staging_dir: PathBuf::from("uploads"),
            staging_mode: StagingMode::Disk,
            ingest_timeout: Some(Duration::from_secs(3600)),
            jwt_secret: "secret".to_string(),
            token_ttl_hours: None,
            log_every_request: false,
            root_password: "root".to_string(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            body_limit: env::var("BODY_LIMIT_MB")
                .ok()
                .and_then(|v| parse_body_limit_mb(&v))
                .unwrap_or(default.body_limit),

            staging_dir: env::var("TMP_UPLOAD_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| {
                    env::current_dir()
                        .map(|cwd| cwd.join("uploads"))
                        .unwrap_or(default.staging_dir)
                }),

            staging_mode: env::var("STAGING_MODE")
                .ok()
                .and_then(|v| StagingMode::parse(&v))
                .unwrap_or(default.staging_mode),

            ingest_timeout: match env::var("INGEST_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
            {
                Some(0) => None,
                Some(secs) => Some(Duration::from_secs(secs)),
                None => default.ingest_timeout,
            },

            jwt_secret: env::var("JWT_SECRET").unwrap_or(default.jwt_secret),

            token_ttl_hours: env::var("TOKEN_TTL_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|hours: &i64| *hours > 0),

            log_every_request: env::var("LOG_EVERY_REQUEST_DATA")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(default.log_every_request),

            root_password: env::var("DATABASE_ROOT_PASSWORD").unwrap_or(default.root_password),
        }
    }

    /// Create config for development and tests (memory-friendly limits, short timeout)
    pub fn development() -> Self {
        Self {
            body_limit: 64 * 1024 * 1024,
            staging_dir: env::temp_dir().join("upload-gateway"),
            staging_mode: StagingMode::Disk,
            ingest_timeout: Some(Duration::from_secs(30)),
            jwt_secret: "secret".to_string(),
            token_ttl_hours: None,
            log_every_request: false,
            root_password: "root".to_string(),
        }
    }
}

/// Megabytes to bytes; `None` for garbage or a value that overflows `usize`
fn parse_body_limit_mb(value: &str) -> Option<usize> {
    value
        .trim()
        .parse::<usize>()
        .ok()
        .and_then(|mb| mb.checked_mul(1024 * 1024))
}

/// Which object store backend receives finished uploads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectStoreConfig {
    Local {
        root: PathBuf,
    },
    S3 {
        endpoint: String,
        access_key: String,
        secret_key: String,
        bucket: String,
        region: String,
    },
    GoogleDrive {
        client_id: String,
        client_secret: String,
        refresh_token: String,
        root_folder_id: String,
    },
}

impl ObjectStoreConfig {
    /// Load the backend selection from `OBJECT_STORE_BACKEND` (default: local)
    pub fn from_env() -> Result<Self> {
        let backend = env::var("OBJECT_STORE_BACKEND").unwrap_or_else(|_| "local".to_string());

        match BackendKind::parse(&backend)? {
            BackendKind::Local => Ok(Self::Local {
                root: env::var("LOCAL_STORE_ROOT")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("storage")),
            }),
            BackendKind::S3 => Ok(Self::S3 {
                endpoint: required("S3_ENDPOINT")?,
                access_key: required("S3_ACCESS_KEY")?,
                secret_key: required("S3_SECRET_KEY")?,
                bucket: required("S3_BUCKET")?,
                region: env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            }),
            BackendKind::GoogleDrive => Ok(Self::GoogleDrive {
                client_id: required("GOOGLE_CLIENT_ID")?,
                client_secret: required("GOOGLE_CLIENT_SECRET")?,
                refresh_token: required("GOOGLE_REFRESH_TOKEN")?,
                root_folder_id: env::var("GOOGLE_DRIVE_ROOT_FOLDER_ID")
                    .unwrap_or_else(|_| "root".to_string()),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BackendKind {
    Local,
    S3,
    GoogleDrive,
}

impl BackendKind {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "s3" => Ok(Self::S3),
            "google_drive" | "gdrive" => Ok(Self::GoogleDrive),
            other => Err(anyhow!("Unknown OBJECT_STORE_BACKEND '{}'", other)),
        }
    }
}

fn required(name: &str) -> Result<String> {
    env::var(name).with_context(|| format!("{} must be set", name))
}

/// Console output format for tracing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Logging setup, built once in `main` and handed to the subscriber
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub filter: String,
    pub format: LogFormat,
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        Self {
            filter: env::var("RUST_LOG")
                .unwrap_or_else(|_| "upload_gateway=info,tower_http=info".to_string()),
            format: match env::var("LOG_FORMAT").map(|v| v.to_lowercase()) {
                Ok(v) if v == "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
            file: env::var("LOG_FILE")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
        }
    }
}
