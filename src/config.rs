//! Configuration types for checkpoint-stream

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};

/// Main configuration for the checkpoint archive service
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// REST API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Object store access settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Archive encoding settings
    #[serde(default)]
    pub archive: ArchiveConfig,

    /// Metadata database settings
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Per-request deadline for streaming a checkpoint (None = no deadline)
    #[serde(default, with = "optional_duration_serde")]
    pub download_timeout: Option<Duration>,
}

impl Config {
    /// Check settings that serde cannot enforce on its own
    pub fn validate(&self) -> Result<()> {
        if self.storage.part_size == 0 {
            return Err(Error::Config {
                message: "part size must be greater than zero".into(),
                key: Some("storage.part_size".into()),
            });
        }
        if self.storage.fallback_region.trim().is_empty() {
            return Err(Error::Config {
                message: "fallback region must not be empty".into(),
                key: Some("storage.fallback_region".into()),
            });
        }
        if self.archive.delay_bytes == 0 {
            return Err(Error::Config {
                message: "delay threshold must be greater than zero".into(),
                key: Some("archive.delay_bytes".into()),
            });
        }
        if self.archive.gzip_level > 9 {
            return Err(Error::Config {
                message: format!(
                    "gzip level must be between 0 and 9, got {}",
                    self.archive.gzip_level
                ),
                key: Some("archive.gzip_level".into()),
            });
        }
        Ok(())
    }
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:8080)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
        }
    }
}

/// Object store configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Region used to look up a bucket's real region (default: "us-west-2")
    #[serde(default = "default_fallback_region")]
    pub fallback_region: String,

    /// Size of each ranged GET issued per object (default: 5 MiB)
    #[serde(default = "default_part_size")]
    pub part_size: u64,

    /// Endpoint override for S3-compatible stores (e.g. MinIO)
    #[serde(default)]
    pub endpoint_url: Option<String>,

    /// Use path-style bucket addressing (default: false)
    #[serde(default)]
    pub force_path_style: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            fallback_region: default_fallback_region(),
            part_size: default_part_size(),
            endpoint_url: None,
            force_path_style: false,
        }
    }
}

/// Archive encoding configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Bytes withheld from the response before the first write (default: 16 KiB)
    ///
    /// Until this many bytes of archive output exist, nothing reaches the client,
    /// so early failures still produce a proper error response.
    #[serde(default = "default_delay_bytes")]
    pub delay_bytes: usize,

    /// gzip compression level, 0-9 (default: 6)
    #[serde(default = "default_gzip_level")]
    pub gzip_level: u32,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            delay_bytes: default_delay_bytes(),
            gzip_level: default_gzip_level(),
        }
    }
}

/// Metadata database configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Database path (default: "checkpoints.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

// Default value functions
fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_true() -> bool {
    true
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".into()]
}

fn default_fallback_region() -> String {
    "us-west-2".into()
}

fn default_part_size() -> u64 {
    5 * 1024 * 1024
}

fn default_delay_bytes() -> usize {
    16 * 1024
}

fn default_gzip_level() -> u32 {
    6
}

fn default_database_path() -> PathBuf {
    PathBuf::from("checkpoints.db")
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
