//! gaeship.toml configuration parser.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use gaeship_core::ShardBy;

/// Config file read from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "gaeship.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GaeshipConfig {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub migrate: MigrateConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    pub project: Option<String>,
    pub service: Option<String>,
    pub api_base: Option<String>,
    /// Per-request timeout, e.g. "30s".
    pub timeout: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MigrateConfig {
    pub target: Option<u32>,
    pub step: Option<u32>,
    pub poll_interval: Option<String>,
    pub step_wait: Option<String>,
    pub shard_by: Option<ShardBy>,
}

impl GaeshipConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: GaeshipConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load the explicit config path, or `gaeship.toml` in `dir` if present.
    ///
    /// A missing default file yields an empty config; a missing explicit
    /// file is an error.
    pub fn load(explicit: Option<&Path>, dir: &Path) -> anyhow::Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path)
                .with_context(|| format!("failed to read config {}", path.display())),
            None => {
                let path = dir.join(DEFAULT_CONFIG_FILE);
                if path.is_file() {
                    Self::from_file(&path)
                        .with_context(|| format!("failed to read config {}", path.display()))
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}

/// Parse a duration string like "5s", "500ms", "2m", or bare seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim()
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
