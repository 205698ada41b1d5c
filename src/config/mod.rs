// src/config/mod.rs
//! Process configuration.
//!
//! Resolution order, later wins:
//! 1) built-in defaults
//! 2) TOML file: $TRACKER_CONFIG_PATH, else config/tracker.toml if present
//! 3) environment variables (a `.env` file is loaded first, if any)

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::format::{parse_timezone, DisplayZone};
use crate::upstream::DEFAULT_BASE_URL;

const ENV_CONFIG_PATH: &str = "TRACKER_CONFIG_PATH";
const DEFAULT_CONFIG_PATH: &str = "config/tracker.toml";

/// Settings file; every key is optional and overridden by the env.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub api_secret: Option<String>,
    pub base_url: Option<String>,
    pub db_path: Option<String>,
    pub timezone: Option<String>,
    pub poll_interval_seconds: Option<u64>,
    pub max_rps: Option<f64>,
    pub max_concurrency: Option<usize>,
    pub log_level: Option<String>,
    pub metrics_addr: Option<String>,
    pub notify_webhook_url: Option<String>,
}

#[derive(Clone)]
pub struct AppConfig {
    pub api_secret: String,
    /// No trailing slash.
    pub base_url: String,
    pub db_path: PathBuf,
    pub timezone: String,
    pub poll_interval: Duration,
    pub max_rps: f64,
    pub max_concurrency: usize,
    pub log_level: String,
    pub metrics_addr: Option<SocketAddr>,
    /// Where notifications are POSTed; `None` means log only.
    pub notify_webhook_url: Option<String>,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_secret", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("db_path", &self.db_path)
            .field("timezone", &self.timezone)
            .field("poll_interval", &self.poll_interval)
            .field("max_rps", &self.max_rps)
            .field("max_concurrency", &self.max_concurrency)
            .field("log_level", &self.log_level)
            .field("metrics_addr", &self.metrics_addr)
            .field("notify_webhook_url", &self.notify_webhook_url)
            .finish()
    }
}

impl AppConfig {
    /// `.env`, then the settings file, then the process environment.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let file = load_file_default()?;
        Self::resolve(file, |k| std::env::var(k).ok())
    }

    /// Same resolution against an arbitrary lookup and no file.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::resolve(FileConfig::default(), lookup)
    }

    pub fn resolve<F>(file: FileConfig, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Blank env values count as unset.
        let env = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_secret = env("TRACK123_API_SECRET")
            .or(file.api_secret.filter(|s| !s.trim().is_empty()))
            .ok_or_else(|| anyhow!("TRACK123_API_SECRET is required"))?;

        let base_url = env("TRACK123_BASE_URL")
            .or(file.base_url)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = base_url.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            bail!("TRACK123_BASE_URL must be an http(s) URL (got {base_url:?})");
        }

        let poll_secs = match env("POLL_INTERVAL_SECONDS") {
            Some(v) => parse_key::<u64>("POLL_INTERVAL_SECONDS", &v)?,
            None => file.poll_interval_seconds.unwrap_or(300),
        };
        if poll_secs == 0 {
            bail!("POLL_INTERVAL_SECONDS must be > 0");
        }

        let max_rps = match env("TRACK123_MAX_RPS") {
            Some(v) => parse_key::<f64>("TRACK123_MAX_RPS", &v)?,
            None => file.max_rps.unwrap_or(2.0),
        };
        if !(max_rps.is_finite() && max_rps > 0.0) {
            bail!("TRACK123_MAX_RPS must be > 0 (got {max_rps})");
        }

        let max_concurrency = match env("TRACK123_MAX_CONCURRENCY") {
            Some(v) => parse_key::<usize>("TRACK123_MAX_CONCURRENCY", &v)?,
            None => file.max_concurrency.unwrap_or(2),
        };
        if max_concurrency == 0 {
            bail!("TRACK123_MAX_CONCURRENCY must be >= 1");
        }

        let metrics_addr = match env("METRICS_ADDR").or(file.metrics_addr) {
            Some(v) => Some(parse_key::<SocketAddr>("METRICS_ADDR", &v)?),
            None => None,
        };

        Ok(Self {
            api_secret,
            base_url,
            db_path: PathBuf::from(
                env("DB_PATH")
                    .or(file.db_path)
                    .unwrap_or_else(|| "./data/bot.db".into()),
            ),
            timezone: env("TIMEZONE")
                .or(file.timezone)
                .unwrap_or_else(|| "UTC".into()),
            poll_interval: Duration::from_secs(poll_secs),
            max_rps,
            max_concurrency,
            log_level: env("LOG_LEVEL")
                .or(file.log_level)
                .unwrap_or_else(|| "info".into()),
            metrics_addr,
            notify_webhook_url: env("NOTIFY_WEBHOOK_URL").or(file.notify_webhook_url),
        })
    }

    pub fn display_zone(&self) -> DisplayZone {
        parse_timezone(&self.timezone)
    }
}

fn parse_key<T>(key: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| anyhow!("{key}: invalid value {raw:?}: {e}"))
}

/// Parse a settings file from an explicit path.
pub fn load_file_from(path: &Path) -> Result<FileConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("parsing config {}", path.display()))
}

/// $TRACKER_CONFIG_PATH (must exist), else config/tracker.toml, else empty.
pub fn load_file_default() -> Result<FileConfig> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if !pb.exists() {
            bail!("{ENV_CONFIG_PATH} points to non-existent path {}", pb.display());
        }
        return load_file_from(&pb);
    }
    let default = PathBuf::from(DEFAULT_CONFIG_PATH);
    if default.exists() {
        return load_file_from(&default);
    }
    Ok(FileConfig::default())
}
