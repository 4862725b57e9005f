//! Load receiver config from file and environment.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::server::ServerConfig;
use crate::sink::{DEFAULT_CHANNEL, DEFAULT_REDIS_PORT};

/// Receiver configuration. File: ~/.config/vive-stream/receiver.toml or
/// /etc/vive-stream/receiver.toml.
/// Env overrides: VIVE_RECEIVER_HOST, VIVE_RECEIVER_PORT, VIVE_RECEIVER_PRINT_EVERY,
/// VIVE_RECEIVER_REDIS_HOST, VIVE_RECEIVER_REDIS_PORT, VIVE_RECEIVER_REDIS_CHANNEL.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Bind address (default 0.0.0.0).
    #[serde(default = "default_host")]
    pub host: String,
    /// Bind port (default 50051).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Log every N frames; 0 disables (default 10).
    #[serde(default = "default_print_every")]
    pub print_every: u64,
    /// Redis host to publish JSON to; unset disables publishing.
    #[serde(default)]
    pub redis_host: Option<String>,
    #[serde(default = "default_redis_port")]
    pub redis_port: u16,
    #[serde(default = "default_redis_channel")]
    pub redis_channel: String,
    /// Largest accepted payload in bytes (default 16 MiB).
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: u32,
    /// Drop a producer that sends nothing for this many seconds; unset waits forever.
    #[serde(default)]
    pub read_timeout_secs: Option<f64>,
    /// Pause before accepting the next producer (default 500 ms).
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    50051
}
fn default_print_every() -> u64 {
    10
}
fn default_redis_port() -> u16 {
    DEFAULT_REDIS_PORT
}
fn default_redis_channel() -> String {
    DEFAULT_CHANNEL.to_string()
}
fn default_max_frame_len() -> u32 {
    vive_core::DEFAULT_MAX_FRAME_LEN
}
fn default_cooldown_ms() -> u64 {
    500
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            print_every: default_print_every(),
            redis_host: None,
            redis_port: default_redis_port(),
            redis_channel: default_redis_channel(),
            max_frame_len: default_max_frame_len(),
            read_timeout_secs: None,
            cooldown_ms: default_cooldown_ms(),
        }
    }
}

impl Config {
    pub fn server(&self) -> ServerConfig {
        ServerConfig {
            bind: format!("{}:{}", self.host, self.port),
            max_frame_len: self.max_frame_len,
            read_timeout: self
                .read_timeout_secs
                .and_then(|s| Duration::try_from_secs_f64(s).ok())
                .filter(|d| !d.is_zero()),
            cooldown: Duration::from_millis(self.cooldown_ms),
        }
    }

    /// `host:port` of the Redis server, if publishing is enabled.
    pub fn redis_addr(&self) -> Option<String> {
        self.redis_host
            .as_ref()
            .map(|h| format!("{}:{}", h, self.redis_port))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Load config: default, then config file (explicit path or first existing default path),
/// then env vars.
pub fn load(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    let mut c = match explicit {
        Some(path) => read_file(path)?,
        None => load_file()?.unwrap_or_default(),
    };
    apply_env(&mut c, |key| std::env::var(key).ok());
    Ok(c)
}

/// Apply environment overrides; unparsable values are ignored.
pub fn apply_env(c: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(s) = var("VIVE_RECEIVER_HOST") {
        c.host = s;
    }
    if let Some(p) = var("VIVE_RECEIVER_PORT").and_then(|s| s.parse::<u16>().ok()) {
        c.port = p;
    }
    if let Some(n) = var("VIVE_RECEIVER_PRINT_EVERY").and_then(|s| s.parse::<u64>().ok()) {
        c.print_every = n;
    }
    if let Some(s) = var("VIVE_RECEIVER_REDIS_HOST") {
        c.redis_host = Some(s);
    }
    if let Some(p) = var("VIVE_RECEIVER_REDIS_PORT").and_then(|s| s.parse::<u16>().ok()) {
        c.redis_port = p;
    }
    if let Some(s) = var("VIVE_RECEIVER_REDIS_CHANNEL") {
        c.redis_channel = s;
    }
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/vive-stream/receiver.toml"));
    }
    out.push(PathBuf::from("/etc/vive-stream/receiver.toml"));
    out
}

fn load_file() -> Result<Option<Config>, ConfigError> {
    for p in config_paths() {
        if p.exists() {
            return read_file(&p).map(Some);
        }
    }
    Ok(None)
}

fn read_file(path: &Path) -> Result<Config, ConfigError> {
    let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str::<Config>(&s).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
