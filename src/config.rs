//! Client configuration: TOML file + CLI overrides, resolved once at startup

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::protocol::{timeouts, CHUNK_SIZE, SENTINEL};
use crate::sink::TruncationPolicy;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub control_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    /// None keeps data reads unbounded; a stalled server then hangs the client.
    pub data_read_timeout_ms: Option<u64>,
    pub chunk_size: usize,
    pub sentinel: String,
    pub truncation: TruncationPolicy,
    /// Appended to the host identifier, e.g. ".example.edu"
    pub host_suffix: Option<String>,
    pub log_file: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            control_timeout_ms: timeouts::CONTROL_CLASSIFY_MS,
            connect_timeout_ms: timeouts::CONNECT_MS,
            data_read_timeout_ms: None,
            chunk_size: CHUNK_SIZE,
            sentinel: SENTINEL.to_string(),
            truncation: TruncationPolicy::Discard,
            host_suffix: None,
            log_file: None,
        }
    }
}

impl ClientConfig {
    pub fn control_timeout(&self) -> Duration {
        Duration::from_millis(self.control_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn data_read_timeout(&self) -> Option<Duration> {
        self.data_read_timeout_ms.map(Duration::from_millis)
    }

    /// Full host name for a host identifier given on the command line.
    pub fn host_name(&self, host: &str) -> String {
        match &self.host_suffix {
            Some(sfx) if !host.ends_with(sfx.as_str()) => format!("{}{}", host, sfx),
            _ => host.to_string(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.sentinel.is_empty() {
            bail!("sentinel must not be empty");
        }
        if self.chunk_size == 0 {
            bail!("chunk_size must be greater than zero");
        }
        if self.connect_timeout_ms == 0 {
            bail!("connect_timeout_ms must be greater than zero");
        }
        Ok(())
    }
}

pub fn config_dir() -> PathBuf {
    #[cfg(windows)]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("ftclient");
        }
    }
    // Unix-like default
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".config").join("ftclient");
    }
    PathBuf::from(".ftclient")
}

pub fn default_config_path() -> PathBuf {
    config_dir().join("ftclient.toml")
}

pub fn parse_config(data: &str) -> Result<ClientConfig> {
    let cfg: ClientConfig = toml::from_str(data).context("Failed to parse client config")?;
    cfg.validate()?;
    Ok(cfg)
}

/// Load `path`, or the default location when `None`. A missing default file
/// yields defaults; a missing explicit file is an error.
pub fn load_config(path: Option<&Path>) -> Result<ClientConfig> {
    match path {
        Some(p) => {
            let data = std::fs::read_to_string(p)
                .with_context(|| format!("Failed to read config {}", p.display()))?;
            parse_config(&data)
        }
        None => {
            let p = default_config_path();
            match std::fs::read_to_string(&p) {
                Ok(data) => parse_config(&data)
                    .with_context(|| format!("Invalid config {}", p.display())),
                Err(_) => Ok(ClientConfig::default()),
            }
        }
    }
}
