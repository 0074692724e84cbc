//! MediaVault Configuration
//!
//! Configuration is read from an optional TOML file and then overridden by
//! environment variables, so a deployment can be driven entirely by the
//! environment (`USERNAME`, `PASSWORD`, `SECRET_KEY`, backend credentials).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Minimum accepted length of the session signing secret
pub const MIN_SECRET_LEN: usize = 16;

/// Largest configurable upload request size in megabytes
pub const MAX_UPLOAD_MB_LIMIT: usize = 16 * 1024;

/// Main MediaVault configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GalleryConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Login and session configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Storage backend selection and credentials
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Largest accepted upload request in megabytes
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
}

/// Login and session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// The single account's user name
    #[serde(default)]
    pub username: String,

    /// The single account's password (hashed at startup, never stored)
    #[serde(default)]
    pub password: String,

    /// Secret used to sign session and flash cookies
    #[serde(default)]
    pub secret_key: String,

    /// Session lifetime in seconds
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,

    /// Mark cookies `Secure` (enable behind HTTPS)
    #[serde(default)]
    pub secure_cookies: bool,

    /// PBKDF2 rounds for the password hash
    #[serde(default = "default_password_rounds")]
    pub password_rounds: u32,
}

/// Which storage backend is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Files in a local upload directory
    #[default]
    Local,
    /// S3-compatible object store bucket
    Object,
    /// CDN asset host (Cloudinary API)
    Cdn,
}

impl std::str::FromStr for BackendKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "disk" => Ok(BackendKind::Local),
            "object" | "s3" => Ok(BackendKind::Object),
            "cdn" | "cloudinary" => Ok(BackendKind::Cdn),
            other => Err(crate::Error::Config(format!(
                "unknown storage backend '{}' (expected local, object or cdn)",
                other
            ))),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BackendKind::Local => "local",
            BackendKind::Object => "object",
            BackendKind::Cdn => "cdn",
        };
        f.write_str(name)
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// Active backend
    #[serde(default)]
    pub backend: BackendKind,

    /// Local-disk backend settings
    #[serde(default)]
    pub local: LocalStorageConfig,

    /// Object-store backend settings
    #[serde(default)]
    pub object: ObjectStorageConfig,

    /// CDN backend settings
    #[serde(default)]
    pub cdn: CdnStorageConfig,
}

/// Local-disk backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalStorageConfig {
    /// Directory holding uploaded files
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
}

/// Object-store backend settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ObjectStorageConfig {
    /// Bucket name
    #[serde(default)]
    pub bucket: String,

    /// Bucket region
    #[serde(default)]
    pub region: String,

    /// Custom endpoint for S3-compatible services (MinIO, R2, ...)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Access key id
    #[serde(default)]
    pub access_key: String,

    /// Secret access key
    #[serde(default)]
    pub secret_key: String,
}

/// CDN backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdnStorageConfig {
    /// Cloud (account) name
    #[serde(default)]
    pub cloud_name: String,

    /// API key
    #[serde(default)]
    pub api_key: String,

    /// API secret
    #[serde(default)]
    pub api_secret: String,

    /// API base URL
    #[serde(default = "default_cdn_api_base")]
    pub api_base: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_max_upload_mb() -> usize {
    256
}

fn default_session_ttl_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_password_rounds() -> u32 {
    100_000
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("static/uploads")
}

fn default_cdn_api_base() -> String {
    "https://api.cloudinary.com/v1_1".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            max_upload_mb: default_max_upload_mb(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            secret_key: String::new(),
            session_ttl_secs: default_session_ttl_secs(),
            secure_cookies: false,
            password_rounds: default_password_rounds(),
        }
    }
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
        }
    }
}

impl Default for CdnStorageConfig {
    fn default() -> Self {
        Self {
            cloud_name: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            api_base: default_cdn_api_base(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl GalleryConfig {
    /// Load configuration from the TOML file (if present) and the process
    /// environment, then validate it
    pub fn load(path: &Path) -> crate::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            tracing::info!("No config file at {:?}, using defaults and environment", path);
            GalleryConfig::default()
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: GalleryConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from environment variables looked up through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> crate::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(v) = get("BIND_ADDRESS") {
            self.server.bind_address = v;
        }
        if let Some(v) = get("USERNAME") {
            self.auth.username = v;
        }
        if let Some(v) = get("PASSWORD") {
            self.auth.password = v;
        }
        if let Some(v) = get("SECRET_KEY") {
            self.auth.secret_key = v;
        }
        if let Some(v) = get("STORAGE_BACKEND") {
            self.storage.backend = v.parse()?;
        }
        if let Some(v) = get("UPLOAD_DIR") {
            self.storage.local.upload_dir = PathBuf::from(v);
        }

        let object = &mut self.storage.object;
        if let Some(v) = get("S3_BUCKET_NAME") {
            object.bucket = v;
        }
        if let Some(v) = get("S3_REGION") {
            object.region = v;
        }
        if let Some(v) = get("S3_ENDPOINT") {
            object.endpoint = Some(v);
        }
        if let Some(v) = get("AWS_ACCESS_KEY_ID") {
            object.access_key = v;
        }
        if let Some(v) = get("AWS_SECRET_ACCESS_KEY") {
            object.secret_key = v;
        }

        let cdn = &mut self.storage.cdn;
        if let Some(v) = get("CLOUDINARY_CLOUD_NAME") {
            cdn.cloud_name = v;
        }
        if let Some(v) = get("CLOUDINARY_API_KEY") {
            cdn.api_key = v;
        }
        if let Some(v) = get("CLOUDINARY_API_SECRET") {
            cdn.api_secret = v;
        }

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.auth.username.is_empty() || self.auth.password.is_empty() {
            return Err(crate::Error::Config(
                "USERNAME and PASSWORD must be set".into(),
            ));
        }

        if self.auth.secret_key.len() < MIN_SECRET_LEN {
            return Err(crate::Error::Config(format!(
                "SECRET_KEY must be set and at least {} bytes long",
                MIN_SECRET_LEN
            )));
        }

        if self.auth.password_rounds == 0 {
            return Err(crate::Error::Config("auth.password_rounds cannot be 0".into()));
        }

        if self.server.max_upload_mb == 0 || self.server.max_upload_mb > MAX_UPLOAD_MB_LIMIT {
            return Err(crate::Error::Config(format!(
                "server.max_upload_mb must be between 1 and {}",
                MAX_UPLOAD_MB_LIMIT
            )));
        }

        if self.server.bind_address.is_empty() {
            return Err(crate::Error::Config("server.bind_address cannot be empty".into()));
        }

        match self.storage.backend {
            BackendKind::Local => {
                if self.storage.local.upload_dir.as_os_str().is_empty() {
                    return Err(crate::Error::Config(
                        "storage.local.upload_dir cannot be empty".into(),
                    ));
                }
            }
            BackendKind::Object => {
                let o = &self.storage.object;
                require("S3_BUCKET_NAME", &o.bucket)?;
                require("S3_REGION", &o.region)?;
                require("AWS_ACCESS_KEY_ID", &o.access_key)?;
                require("AWS_SECRET_ACCESS_KEY", &o.secret_key)?;
            }
            BackendKind::Cdn => {
                let c = &self.storage.cdn;
                require("CLOUDINARY_CLOUD_NAME", &c.cloud_name)?;
                require("CLOUDINARY_API_KEY", &c.api_key)?;
                require("CLOUDINARY_API_SECRET", &c.api_secret)?;
            }
        }

        Ok(())
    }

    /// Get the session lifetime as Duration
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.auth.session_ttl_secs)
    }

    /// Largest accepted request body in bytes
    pub fn max_upload_bytes(&self) -> usize {
        self.server.max_upload_mb.saturating_mul(1024 * 1024)
    }
}

fn require(name: &str, value: &str) -> crate::Result<()> {
    if value.is_empty() {
        return Err(crate::Error::Config(format!(
            "{} is required by the selected storage backend",
            name
        )));
    }
    Ok(())
}
