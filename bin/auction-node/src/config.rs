use auction_core::config::Config as CoreConfig;
use eyre::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::net::Ipv4Addr;
use std::path::Path;

fn default_host() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}

fn default_port() -> u16 {
    8080
}

fn default_max_db_connections() -> u32 {
    10
}

fn default_status_query_timeout_secs() -> u64 {
    5
}

/// The node's on-disk configuration: HTTP bind address, storage wiring,
/// and the bidding core's own `Config`, loaded from a single TOML file.
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: Ipv4Addr,
    #[serde(default = "default_port")]
    pub port: u16,
    pub database_url: Option<String>,
    #[serde(default = "default_max_db_connections")]
    pub max_db_connections: u32,
    #[serde(default = "default_status_query_timeout_secs")]
    pub status_query_timeout_secs: u64,
    #[serde(default)]
    pub core: CoreConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database_url: None,
            max_db_connections: default_max_db_connections(),
            status_query_timeout_secs: default_status_query_timeout_secs(),
            core: CoreConfig::default(),
        }
    }
}

impl Config {
    pub fn from_toml_file<P: AsRef<Path> + fmt::Display + Clone>(path: P) -> Result<Config> {
        tracing::info!("loading config from `{path}`...");

        let config_data = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("could not read config from `{path}`"))?;

        toml::from_str(&config_data).context("could not parse TOML")
    }
}
