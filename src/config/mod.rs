// src/config/mod.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::fetch::DEFAULT_FETCH_TIMEOUT;
use crate::scheduler::DEFAULT_REFRESH_INTERVAL;
use crate::sources::{Relay, SourceOverride, DEFAULT_RELAY_PREFIX};

pub const ENV_CONFIG_PATH: &str = "BOARD_CONFIG_PATH";
pub const ENV_FETCH_TIMEOUT_SECS: &str = "FETCH_TIMEOUT_SECS";
pub const ENV_REFRESH_INTERVAL_SECS: &str = "REFRESH_INTERVAL_SECS";
pub const ENV_CORS_RELAY: &str = "CORS_RELAY";

/// Start-up configuration. Read once; nothing here changes at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    pub fetch_timeout_secs: u64,
    pub refresh_interval_secs: u64,
    /// Prefix the percent-encoded target URL is appended to.
    pub cors_relay: String,
    pub sources: Vec<SourceOverride>,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT.as_secs(),
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL.as_secs(),
            cors_relay: DEFAULT_RELAY_PREFIX.to_string(),
            sources: Vec::new(),
        }
    }
}

impl BoardConfig {
    /// Load from an explicit path. Supports TOML or JSON formats.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading board config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let mut cfg = parse_config(&content, ext.as_str())
            .with_context(|| format!("parsing board config {}", path.display()))?;
        cfg.sanitize();
        Ok(cfg)
    }

    /// Load using env var + fallbacks, then apply env overrides:
    /// 1) $BOARD_CONFIG_PATH
    /// 2) config/board.toml
    /// 3) config/board.json
    /// 4) built-in defaults
    pub fn load_default() -> Result<Self> {
        let mut cfg = match std::env::var(ENV_CONFIG_PATH) {
            Ok(p) => {
                let pb = PathBuf::from(p);
                if !pb.exists() {
                    return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
                }
                Self::load_from(&pb)?
            }
            Err(_) => {
                let toml_p = PathBuf::from("config/board.toml");
                let json_p = PathBuf::from("config/board.json");
                if toml_p.exists() {
                    Self::load_from(&toml_p)?
                } else if json_p.exists() {
                    Self::load_from(&json_p)?
                } else {
                    Self::default()
                }
            }
        };
        cfg.apply_env();
        cfg.sanitize();
        tracing::info!(
            target: "config",
            fetch_timeout_secs = cfg.fetch_timeout_secs,
            refresh_interval_secs = cfg.refresh_interval_secs,
            overrides = cfg.sources.len(),
            "board config loaded"
        );
        Ok(cfg)
    }

    fn apply_env(&mut self) {
        if let Some(v) = env_secs(ENV_FETCH_TIMEOUT_SECS) {
            self.fetch_timeout_secs = v;
        }
        if let Some(v) = env_secs(ENV_REFRESH_INTERVAL_SECS) {
            self.refresh_interval_secs = v;
        }
        if let Ok(v) = std::env::var(ENV_CORS_RELAY) {
            self.cors_relay = v;
        }
    }

    /// Zero durations or an empty relay fall back to defaults.
    fn sanitize(&mut self) {
        if self.fetch_timeout_secs == 0 {
            self.fetch_timeout_secs = DEFAULT_FETCH_TIMEOUT.as_secs();
        }
        if self.refresh_interval_secs == 0 {
            self.refresh_interval_secs = DEFAULT_REFRESH_INTERVAL.as_secs();
        }
        if self.cors_relay.trim().is_empty() {
            self.cors_relay = DEFAULT_RELAY_PREFIX.to_string();
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn relay(&self) -> Relay {
        Relay::new(self.cors_relay.trim())
    }
}

fn env_secs(name: &str) -> Option<u64> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<u64>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(target: "config", var = name, value = %raw, "ignoring non-numeric override");
            None
        }
    }
}

fn parse_config(s: &str, hint_ext: &str) -> Result<BoardConfig> {
    match hint_ext {
        "toml" => toml::from_str(s).context("invalid TOML"),
        "json" => serde_json::from_str(s).context("invalid JSON"),
        _ => toml::from_str(s)
            .or_else(|_| serde_json::from_str(s))
            .map_err(|_| anyhow!("unsupported board config format")),
    }
}
