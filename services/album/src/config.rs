use serde::Deserialize;
use std::time::Duration;

const SERVICE_NAME: &str = "album-service";
const DEFAULT_REGION: &str = "ap-northeast-2";
const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// Album service settings, one section per collaborator
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    /// Photo bucket
    pub s3: S3Config,
    /// Travel, photo and adventure tables
    pub database: DatabaseConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

/// Process identity, logging and metrics exporter
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub log_level: String,
    /// Port of the Prometheus scrape endpoint
    pub metrics_port: u16,
}

/// Where photo bytes live
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// Single bucket shared by every travel; keys are `{travel_id}/{name}.{ext}`
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// S3-compatible endpoint such as MinIO. AWS is used when unset.
    pub endpoint_url: Option<String>,
    /// Address objects as `endpoint/bucket/key` instead of `bucket.endpoint/key`
    #[serde(default)]
    pub force_path_style: bool,
    /// Base for public photo URLs, e.g. a CDN in front of the bucket.
    /// Derived from bucket/region/endpoint when unset.
    pub public_url_base: Option<String>,
}

/// PostgreSQL pool settings
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Seconds to wait for a pooled connection
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Seconds before an unused connection is closed
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Apply `migrations/` before serving
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

/// HTTP listener
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub cors_enabled: bool,
    /// Origins allowed by CORS; any origin when empty
    pub cors_origins: Vec<String>,
    /// Body limit for one request, so it bounds a whole upload batch
    pub max_upload_bytes: usize,
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_idle_timeout_secs() -> u64 {
    600
}

fn default_run_migrations() -> bool {
    true
}

impl Config {
    /// Layered load: built-in defaults, then `config/album.*`, then
    /// `/etc/antalbum/album.*`, then `ALBUM__*` environment variables
    pub fn load() -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("config/album").required(false))
            .add_source(config::File::with_name("/etc/antalbum/album").required(false))
            // ALBUM__S3__BUCKET -> s3.bucket
            .add_source(
                config::Environment::with_prefix("ALBUM")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

impl DatabaseConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: SERVICE_NAME.to_string(),
            log_level: "info".to_string(),
            metrics_port: 9090,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_enabled: true,
            cors_origins: Vec::new(),
            max_upload_bytes: MAX_UPLOAD_BYTES,
        }
    }
}
