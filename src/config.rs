use serde::Deserialize;
use std::path::PathBuf;

use crate::services::collection::CachePolicy;

/// Which [`Store`](crate::store::Store) backend holds the collection
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    File,
    Redis,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Base URL of the remote game catalog API
    #[serde(default = "default_catalog_api_url")]
    pub catalog_api_url: String,

    /// Request timeout for catalog calls, in seconds
    #[serde(default = "default_catalog_timeout_secs")]
    pub catalog_timeout_secs: u64,

    /// Persistence backend for the collection
    #[serde(default = "default_store_backend")]
    pub store_backend: StoreBackend,

    /// Directory used by the file backend
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,

    /// Redis connection URL (redis backend only)
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Key prefix for the redis backend
    #[serde(default = "default_store_namespace")]
    pub store_namespace: String,

    /// Maximum number of recommendations requested from the catalog
    #[serde(default = "default_recommendation_limit")]
    pub recommendation_limit: usize,

    /// Whether re-adding a cached game replaces its stored payload
    #[serde(default)]
    pub cache_policy: CachePolicy,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_catalog_api_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_catalog_timeout_secs() -> u64 {
    10
}

fn default_store_backend() -> StoreBackend {
    StoreBackend::File
}

fn default_store_dir() -> PathBuf {
    PathBuf::from(".paxpal")
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_store_namespace() -> String {
    "paxpal".to_string()
}

fn default_recommendation_limit() -> usize {
    12
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    /// Socket address the HTTP surface binds to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
