use serde::Deserialize;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// PostgreSQL connection URL. When unset the in-memory store is used.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Maximum pooled Postgres connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// JSON snapshot loaded into the in-memory store
    #[serde(default)]
    pub snapshot_path: Option<String>,

    /// Redis connection URL for the narration cache
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Narration cache TTL in seconds
    #[serde(default = "default_narration_cache_ttl")]
    pub narration_cache_ttl: u64,

    /// Text-generation API key. Absent means narration always falls back.
    #[serde(default)]
    pub ark_api_key: Option<String>,

    /// Text-generation API base URL (OpenAI-compatible)
    #[serde(default = "default_ark_api_base")]
    pub ark_api_base: String,

    /// Text-generation model identifier
    #[serde(default = "default_ark_model_id")]
    pub ark_model_id: String,

    /// Upper bound for a single atomic narration call
    #[serde(default = "default_narration_timeout_secs")]
    pub narration_timeout_secs: u64,

    /// Maximum silence between two streamed narration chunks
    #[serde(default = "default_narration_idle_timeout_secs")]
    pub narration_idle_timeout_secs: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_db_max_connections() -> u32 {
    5
}

fn default_narration_cache_ttl() -> u64 {
    3600
}

fn default_ark_api_base() -> String {
    "https://ark.cn-beijing.volces.com/api/v3".to_string()
}

fn default_ark_model_id() -> String {
    "doubao-seed-2-0-pro-260215".to_string()
}

fn default_narration_timeout_secs() -> u64 {
    10
}

fn default_narration_idle_timeout_secs() -> u64 {
    30
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn narration_timeout(&self) -> Duration {
        Duration::from_secs(self.narration_timeout_secs)
    }

    pub fn narration_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.narration_idle_timeout_secs)
    }

    /// Treats an empty `ARK_API_KEY` the same as an unset one
    pub fn oracle_api_key(&self) -> Option<String> {
        self.ark_api_key
            .as_ref()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
    }
}
