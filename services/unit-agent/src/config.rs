//! Configuration for the unit agent.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use fleet_names::{CharmUrl, UnitTag};

/// Longest leadership claim duration accepted from the environment.
pub const MAX_LEADERSHIP_DURATION_SECS: u64 = 24 * 60 * 60;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Unit agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// The unit this agent runs.
    pub unit: UnitTag,

    /// Data directory for local state.
    pub data_dir: String,

    /// Leadership claim duration in seconds.
    pub leadership_duration_secs: u64,

    /// Charm the development model deploys.
    pub charm_url: CharmUrl,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load configuration from any variable source.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let unit = var("FLEET_UNIT").unwrap_or_else(|| "mysql/0".to_string());
        let unit = UnitTag::parse(&unit).with_context(|| format!("invalid FLEET_UNIT {unit:?}"))?;

        let data_dir = var("FLEET_DATA_DIR").unwrap_or_else(|| "/var/lib/fleet".to_string());

        let leadership_duration_secs = var("FLEET_LEADERSHIP_DURATION_SECS")
            .and_then(|s| s.parse().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(30);
        if leadership_duration_secs > MAX_LEADERSHIP_DURATION_SECS {
            anyhow::bail!(
                "FLEET_LEADERSHIP_DURATION_SECS {leadership_duration_secs} exceeds {MAX_LEADERSHIP_DURATION_SECS}"
            );
        }

        // Defaults to a charm named after the service.
        let charm_url = match var("FLEET_CHARM_URL") {
            Some(url) => {
                CharmUrl::parse(&url).with_context(|| format!("invalid FLEET_CHARM_URL {url:?}"))?
            }
            None => CharmUrl::parse(&format!("cs:{}-1", unit.service()))
                .context("cannot derive default charm URL")?,
        };

        let log_level = var("FLEET_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let log_format = match var("FLEET_LOG_FORMAT").as_deref() {
            Some("pretty") => LogFormat::Pretty,
            _ => LogFormat::Json,
        };

        Ok(Self {
            unit,
            data_dir,
            leadership_duration_secs,
            charm_url,
            log_level,
            log_format,
        })
    }

    pub fn leadership_duration(&self) -> Duration {
        Duration::from_secs(self.leadership_duration_secs)
    }

    /// Directory holding this unit's agent state.
    pub fn agent_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
            .join("agents")
            .join(self.unit.tag_string())
    }

    /// Directory holding the storage state files.
    pub fn storage_state_dir(&self) -> PathBuf {
        self.agent_dir().join("state").join("storage")
    }
}
