use std::net::SocketAddr;
use std::path::PathBuf;

use serde::Deserialize;
use snafu::ResultExt;
use url::Url;

use crate::error::{ApplicationError, ConfigLoadSnafu};

pub fn load() -> Result<Config, ApplicationError> {
    envy::from_env().context(ConfigLoadSnafu)
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(rename = "host_address", default = "default_host")]
    pub host: SocketAddr,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Absent when no backend is configured; the service then runs in
    /// local-fallback-only mode and reads report the backend as missing.
    #[serde(flatten)]
    pub redis: Option<RedisConfig>,
    #[serde(flatten)]
    pub stats: StatsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    #[serde(rename = "redis_url")]
    pub url: Url,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StatsConfig {
    /// Namespace prefix isolating this deployment's keys from others
    /// sharing the same database.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

fn default_host() -> SocketAddr {
    ([127, 0, 0, 1], 8080).into()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_key_prefix() -> String {
    "usagi:".to_string()
}
