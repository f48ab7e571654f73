//! Configuration loading.
//!
//! Settings come from, in increasing priority: built-in defaults, a JSON
//! config file, `VARSEND_*` environment variables, then CLI flags (applied
//! by the binary).

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{fs, str::FromStr};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_HOST, DEFAULT_PORT, DEFAULT_READ_TIMEOUT, DEFAULT_STORE_CAPACITY, MAX_BODY_SIZE,
};
use crate::protocol::FrameLimits;
use crate::server::ConnectionMode;

/// Configuration for the viewer.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Address to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Largest accepted body in bytes.
    pub max_body_size: u64,
    /// Per-read timeout in seconds; `None` disables it.
    pub read_timeout_secs: Option<u64>,
    /// Accept several frames per connection instead of exactly one.
    pub multi_frame: bool,
    /// Number of parsed messages kept in memory.
    pub store_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_body_size: u64::from(MAX_BODY_SIZE),
            read_timeout_secs: Some(DEFAULT_READ_TIMEOUT.as_secs()),
            multi_frame: false,
            store_capacity: DEFAULT_STORE_CAPACITY,
        }
    }
}

impl Config {
    /// Default config file location: `<config dir>/varsend/config.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("varsend").join("config.json"))
    }

    /// Load configuration and apply environment overrides.
    ///
    /// An explicit `path` must exist. Without one, the default location is
    /// used if present, otherwise built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load_from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Read a JSON config file. Missing fields take their defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Apply `VARSEND_*` environment variables.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("VARSEND_HOST") {
            self.host = host;
        }
        if let Some(port) = env_parse("VARSEND_PORT") {
            self.port = port;
        }
        if let Some(size) = env_parse("VARSEND_MAX_BODY_SIZE") {
            self.max_body_size = size;
        }
        if let Some(secs) = env_parse::<u64>("VARSEND_READ_TIMEOUT") {
            self.read_timeout_secs = (secs > 0).then_some(secs);
        }
        if let Some(multi) = env_parse("VARSEND_MULTI_FRAME") {
            self.multi_frame = multi;
        }
        if let Some(capacity) = env_parse("VARSEND_STORE_CAPACITY") {
            self.store_capacity = capacity;
        }
    }

    /// Check that the values can be used to start a server.
    pub fn validate(&self) -> Result<()> {
        if self.max_body_size == 0 {
            bail!("max_body_size must be at least 1 byte");
        }
        if self.max_body_size > u64::from(u32::MAX) {
            bail!(
                "max_body_size {} exceeds the 32-bit length prefix",
                self.max_body_size
            );
        }
        if self.store_capacity == 0 {
            bail!("store_capacity must be at least 1");
        }
        Ok(())
    }

    /// Per-read timeout, if enabled. `0` disables it, as for the env var.
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Frame bounds for the connection handler.
    pub fn frame_limits(&self) -> Result<FrameLimits> {
        self.validate()?;
        Ok(FrameLimits {
            max_body_size: u32::try_from(self.max_body_size)?,
            read_timeout: self.read_timeout(),
        })
    }

    /// Connection mode implied by `multi_frame`.
    pub fn connection_mode(&self) -> ConnectionMode {
        if self.multi_frame {
            ConnectionMode::Stream
        } else {
            ConnectionMode::OneShot
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("Ignoring {key}={raw:?}: not a valid value");
            None
        }
    }
}
