//! Load sender config from file and environment.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Sender configuration. File: ~/.config/vive-stream/sender.toml or /etc/vive-stream/sender.toml.
/// Env overrides: VIVE_SENDER_HOST, VIVE_SENDER_PORT, VIVE_SENDER_RECONNECT_DELAY.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Receiver host (default 127.0.0.1).
    #[serde(default = "default_host")]
    pub host: String,
    /// Receiver port (default 50051).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Tracker roles to stream.
    #[serde(default = "default_roles")]
    pub roles: Vec<String>,
    /// Seconds between reconnect attempts (default 2).
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: f64,
    /// Connect timeout in seconds (default 5).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: f64,
    /// Synthetic tick rate; <= 0 sends as fast as possible (default 30).
    #[serde(default = "default_hz")]
    pub hz: f64,
    #[serde(default)]
    pub verbose: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    50051
}
pub fn default_roles() -> Vec<String> {
    ["right_elbow", "left_elbow", "chest"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_reconnect_delay() -> f64 {
    2.0
}
fn default_connect_timeout() -> f64 {
    5.0
}
fn default_hz() -> f64 {
    30.0
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            roles: default_roles(),
            reconnect_delay_secs: default_reconnect_delay(),
            connect_timeout_secs: default_connect_timeout(),
            hz: default_hz(),
            verbose: false,
        }
    }
}

impl Config {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn reconnect_delay(&self) -> Duration {
        secs(self.reconnect_delay_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        secs(self.connect_timeout_secs)
    }
}

/// Negative or non-finite values clamp to zero.
fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
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
    if let Some(s) = var("VIVE_SENDER_HOST") {
        c.host = s;
    }
    if let Some(p) = var("VIVE_SENDER_PORT").and_then(|s| s.parse::<u16>().ok()) {
        c.port = p;
    }
    if let Some(d) = var("VIVE_SENDER_RECONNECT_DELAY").and_then(|s| s.parse::<f64>().ok()) {
        c.reconnect_delay_secs = d;
    }
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/vive-stream/sender.toml"));
    }
    out.push(PathBuf::from("/etc/vive-stream/sender.toml"));
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "host = \"10.0.0.5\"\nroles = [\"chest\"]\nreconnect_delay_secs = 0.5").unwrap();
        let c = read_file(file.path()).unwrap();
        assert_eq!(c.addr(), "10.0.0.5:50051");
        assert_eq!(c.roles, ["chest"]);
        assert_eq!(c.reconnect_delay(), Duration::from_millis(500));
        assert_eq!(c.connect_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn unknown_key_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "hostname = \"x\"").unwrap();
        assert!(matches!(read_file(file.path()), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn env_overrides_and_ignores_garbage() {
        let vars: HashMap<&str, &str> = [
            ("VIVE_SENDER_HOST", "receiver.lan"),
            ("VIVE_SENDER_PORT", "not-a-port"),
            ("VIVE_SENDER_RECONNECT_DELAY", "0.25"),
        ]
        .into_iter()
        .collect();
        let mut c = Config::default();
        apply_env(&mut c, |k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(c.host, "receiver.lan");
        assert_eq!(c.port, 50051);
        assert_eq!(c.reconnect_delay(), Duration::from_millis(250));
    }

    #[test]
    fn negative_delay_clamps_to_zero() {
        let c = Config {
            reconnect_delay_secs: -1.0,
            ..Config::default()
        };
        assert_eq!(c.reconnect_delay(), Duration::ZERO);
    }
}
