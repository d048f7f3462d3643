//! Configuration loading and management.
//!
//! Every setting is resolved from, in decreasing precedence:
//!
//! 1. environment variable (`TEAMSPEAK_HOST`, `METRICS_PORT`, ...)
//! 2. command-line flag (`--ts3host`, `--metricsport`, ...)
//! 3. optional TOML file (`--config` / `TS3_EXPORTER_CONFIG`)
//! 4. built-in default

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;
use zeroize::{Zeroize, ZeroizeOnDrop};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_QUERY_PORT: u16 = 10011;
pub const DEFAULT_USERNAME: &str = "serveradmin";
pub const DEFAULT_METRICS_PORT: u16 = 8000;
pub const DEFAULT_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 10;

pub const ENV_HOST: &str = "TEAMSPEAK_HOST";
pub const ENV_PORT: &str = "TEAMSPEAK_PORT";
pub const ENV_USERNAME: &str = "TEAMSPEAK_USERNAME";
pub const ENV_PASSWORD: &str = "TEAMSPEAK_PASSWORD";
pub const ENV_METRICS_PORT: &str = "METRICS_PORT";
pub const ENV_INTERVAL: &str = "READ_INTERVAL_SECONDS";
pub const ENV_QUERY_TIMEOUT: &str = "QUERY_TIMEOUT_SECONDS";
pub const ENV_CONFIG: &str = "TS3_EXPORTER_CONFIG";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Command-line flags. Unset flags fall through to the file and defaults.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Hostname or IP address of the TeamSpeak 3 server [default: localhost]
    #[arg(long = "ts3host", value_name = "HOST")]
    pub ts3host: Option<String>,

    /// ServerQuery port of the TeamSpeak 3 server [default: 10011]
    #[arg(long = "ts3port", value_name = "PORT")]
    pub ts3port: Option<u16>,

    /// ServerQuery username [default: serveradmin]
    #[arg(long = "ts3username", value_name = "USER")]
    pub ts3username: Option<String>,

    /// ServerQuery password [default: empty]
    #[arg(long = "ts3password", value_name = "PASSWORD")]
    pub ts3password: Option<String>,

    /// Port on which the metrics endpoint is exposed [default: 8000]
    #[arg(long = "metricsport", value_name = "PORT")]
    pub metricsport: Option<u16>,

    /// Seconds between two polling cycles [default: 60]
    #[arg(long = "interval", value_name = "SECONDS")]
    pub interval: Option<u64>,

    /// Seconds to wait for a single ServerQuery answer [default: 10]
    #[arg(long = "query-timeout", value_name = "SECONDS")]
    pub query_timeout: Option<u64>,

    /// Optional TOML configuration file
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log as JSON lines instead of human readable text
    #[arg(long = "log-json")]
    pub log_json: bool,
}

/// Optional TOML file layer.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub teamspeak: FileTeamspeak,
    pub metrics: FileMetrics,
    pub poll: FilePoll,
}

/// `[teamspeak]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileTeamspeak {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// `[metrics]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileMetrics {
    pub port: Option<u16>,
}

/// `[poll]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilePoll {
    pub interval_secs: Option<u64>,
    pub query_timeout_secs: Option<u64>,
}

impl FileConfig {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: FileConfig = toml::from_str(&content)?;
        Ok(config)
    }
}

/// A secure string that is zeroized when dropped.
///
/// Used for the ServerQuery password so it never shows up in logs or
/// `Debug` output and does not linger in memory after use.
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(s: String) -> Self {
        Self(s)
    }

    /// Get the inner string (for passing to the login command).
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print actual content
        f.write_str("SecretString(*censored*)")
    }
}

/// ServerQuery connection settings.
#[derive(Debug, Clone)]
pub struct TeamspeakConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
}

/// Fully resolved exporter configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub teamspeak: TeamspeakConfig,
    pub metrics_port: u16,
    pub interval: Duration,
    pub query_timeout: Duration,
    pub log_json: bool,
}

impl Config {
    /// Resolve the configuration from flags, the process environment and
    /// the optional config file.
    pub fn from_env(args: &Args) -> Result<Self, ConfigError> {
        Self::resolve(args, |var| std::env::var(var).ok())
    }

    /// Resolve the configuration with an explicit environment lookup.
    pub fn resolve<F>(args: &Args, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file_path = env(ENV_CONFIG).map(PathBuf::from).or_else(|| args.config.clone());
        let file = match file_path {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };

        let host = env(ENV_HOST)
            .or_else(|| args.ts3host.clone())
            .or(file.teamspeak.host)
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = parse_env(&env, ENV_PORT)?
            .or(args.ts3port)
            .or(file.teamspeak.port)
            .unwrap_or(DEFAULT_QUERY_PORT);
        let username = env(ENV_USERNAME)
            .or_else(|| args.ts3username.clone())
            .or(file.teamspeak.username)
            .unwrap_or_else(|| DEFAULT_USERNAME.to_string());
        let password = env(ENV_PASSWORD)
            .or_else(|| args.ts3password.clone())
            .or(file.teamspeak.password)
            .unwrap_or_default();
        let metrics_port = parse_env(&env, ENV_METRICS_PORT)?
            .or(args.metricsport)
            .or(file.metrics.port)
            .unwrap_or(DEFAULT_METRICS_PORT);
        let interval = parse_env(&env, ENV_INTERVAL)?
            .or(args.interval)
            .or(file.poll.interval_secs)
            .unwrap_or(DEFAULT_INTERVAL_SECS);
        let query_timeout = parse_env(&env, ENV_QUERY_TIMEOUT)?
            .or(args.query_timeout)
            .or(file.poll.query_timeout_secs)
            .unwrap_or(DEFAULT_QUERY_TIMEOUT_SECS);

        let config = Self {
            teamspeak: TeamspeakConfig {
                host,
                port,
                username,
                password: SecretString::new(password),
            },
            metrics_port,
            interval: Duration::from_secs(interval),
            query_timeout: Duration::from_secs(query_timeout),
            log_json: args.log_json,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.teamspeak.host.trim().is_empty() {
            return Err(ConfigError::Invalid("TeamSpeak host must not be empty"));
        }
        if self.teamspeak.port == 0 {
            return Err(ConfigError::Invalid("TeamSpeak query port must not be 0"));
        }
        if self.metrics_port == 0 {
            return Err(ConfigError::Invalid("metrics port must not be 0"));
        }
        if self.interval.is_zero() {
            return Err(ConfigError::Invalid("polling interval must be at least 1 second"));
        }
        if self.query_timeout.is_zero() {
            return Err(ConfigError::Invalid("query timeout must be at least 1 second"));
        }
        Ok(())
    }

    /// Log every setting except the password.
    pub fn log_summary(&self) {
        info!(
            host = %self.teamspeak.host,
            port = self.teamspeak.port,
            username = %self.teamspeak.username,
            password = "*censored*",
            metrics_port = self.metrics_port,
            interval_secs = self.interval.as_secs(),
            query_timeout_secs = self.query_timeout.as_secs(),
            "TS3 settings"
        );
    }
}

fn parse_env<F, T>(env: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match env(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { var, value }),
    }
}
