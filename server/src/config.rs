//! Configuration for the refill server (spec §6.4): a JSON config file for
//! public settings, layered under `.env`, with secrets read from environment
//! variables only and never persisted to the config file.

use std::collections::HashMap;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Deserialize;
use serde_json::Value as Json;

/// CLI arguments for the refill server.
#[derive(Parser, Debug)]
#[command(name = "refill-server")]
#[command(about = "Hot wallet refill HTTP server")]
struct CliArgs {
    /// Path to the JSON configuration file
    #[arg(long, short, env = "CONFIG", default_value = "config.json")]
    config: PathBuf,
}

/// Public, non-secret settings (spec §6.4).
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "defaults::server_port")]
    pub server_port: u16,
    #[serde(default = "defaults::host")]
    pub host: IpAddr,
    #[serde(default = "defaults::auth_enabled")]
    pub auth_enabled: bool,
    #[serde(default = "defaults::jwt_max_lifetime_in_seconds")]
    pub jwt_max_lifetime_in_seconds: i64,
    #[serde(default)]
    pub cron_enabled: bool,
    #[serde(default = "defaults::cron_interval_in_ms")]
    pub cron_interval_in_ms: u64,
    #[serde(default = "defaults::pending_alert_threshold_in_seconds")]
    pub pending_alert_threshold_in_seconds: u64,
    #[serde(default)]
    pub slack_webhook_url: Option<String>,
    #[serde(default)]
    pub providers: HashMap<String, ProviderPublicConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderPublicConfig {
    pub base_url: String,
}

mod defaults {
    use std::env;
    use std::net::IpAddr;

    pub fn server_port() -> u16 {
        env::var("PORT").ok().and_then(|s| s.parse().ok()).unwrap_or(8080)
    }

    pub fn host() -> IpAddr {
        env::var("HOST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED))
    }

    pub fn auth_enabled() -> bool {
        true
    }

    pub fn jwt_max_lifetime_in_seconds() -> i64 {
        300
    }

    pub fn cron_interval_in_ms() -> u64 {
        30_000
    }

    pub fn pending_alert_threshold_in_seconds() -> u64 {
        1800
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file at {0}: {1}")]
    FileRead(PathBuf, std::io::Error),
    #[error("failed to parse config file: {0}")]
    JsonParse(#[from] serde_json::Error),
    #[error("missing required secret environment variable: {0}")]
    MissingSecret(&'static str),
    #[error("malformed PEM at {0}: {1}")]
    MalformedPem(&'static str, std::io::Error),
}

impl Config {
    /// Loads `--config`/`$CONFIG` (default `config.json`) and deserializes it,
    /// with `#[serde(default = ...)]` falling back to defaults for anything absent.
    pub fn load() -> Result<Self, ConfigError> {
        let cli_args = CliArgs::parse();
        Self::load_from_path(&cli_args.config)
    }

    fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(serde_json::from_str("{}")?);
        }
        let content = fs::read_to_string(path).map_err(|e| ConfigError::FileRead(path.to_path_buf(), e))?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// The secrets bag (spec §6.4: "separate bag", never in the JSON config file).
pub struct Secrets {
    pub database_url: String,
    pub auth_public_key_pem: Option<Vec<u8>>,
    pub callback_private_key_pem: Option<Vec<u8>>,
    /// `<provider-name> -> credentials JSON`, one env var per configured provider.
    pub provider_credentials: HashMap<String, Json>,
}

impl Secrets {
    /// Reads `CHAIN_DB_*` for the persistence DSN, `AUTH_PUBLIC_KEY` /
    /// `CALLBACK_PRIVATE_KEY` for the envelope keys, and `<PROVIDER>_CREDENTIALS`
    /// for each provider named in `config.providers`.
    pub fn load_from_env(config: &Config) -> Result<Self, ConfigError> {
        let host = std::env::var("CHAIN_DB_HOST").map_err(|_| ConfigError::MissingSecret("CHAIN_DB_HOST"))?;
        let port = std::env::var("CHAIN_DB_PORT").unwrap_or_else(|_| "5432".to_string());
        let user = std::env::var("CHAIN_DB_USER").map_err(|_| ConfigError::MissingSecret("CHAIN_DB_USER"))?;
        let password = std::env::var("CHAIN_DB_PASSWORD").unwrap_or_default();
        let name = std::env::var("CHAIN_DB_NAME").map_err(|_| ConfigError::MissingSecret("CHAIN_DB_NAME"))?;
        let database_url = format!("postgres://{user}:{password}@{host}:{port}/{name}");

        let auth_public_key_pem = optional_pem_env("AUTH_PUBLIC_KEY")?;
        let callback_private_key_pem = optional_pem_env("CALLBACK_PRIVATE_KEY")?;

        let mut provider_credentials = HashMap::new();
        for provider_name in config.providers.keys() {
            let env_key = format!("{}_CREDENTIALS", provider_name.to_ascii_uppercase());
            if let Ok(raw) = std::env::var(&env_key) {
                let parsed: Json = serde_json::from_str(&raw)?;
                provider_credentials.insert(provider_name.clone(), parsed);
            }
        }

        Ok(Self {
            database_url,
            auth_public_key_pem,
            callback_private_key_pem,
            provider_credentials,
        })
    }
}

/// A PEM value may be supplied inline via the env var, or as a `@/path/to/file`
/// reference, for secret material too large/sensitive for a bare env var.
fn optional_pem_env(var: &'static str) -> Result<Option<Vec<u8>>, ConfigError> {
    let Ok(raw) = std::env::var(var) else {
        return Ok(None);
    };
    if let Some(path) = raw.strip_prefix('@') {
        let bytes = fs::read(path).map_err(|e| ConfigError::MalformedPem(var, e))?;
        return Ok(Some(bytes));
    }
    Ok(Some(raw.into_bytes()))
}
