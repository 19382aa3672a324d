//! Configuration loading and management.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,
}

/// Server-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Address the HTTP API binds to.
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            bind: default_bind(),
        }
    }
}

/// Planning behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Artificial delay applied by the plan endpoint before answering,
    /// in milliseconds, so the board's planning animation has time to
    /// read. The optimizer itself is synchronous. Zero disables it.
    #[serde(default)]
    pub plan_delay_ms: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self { plan_delay_ms: 0 }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".backlogg/tasks.db")
}

fn default_bind() -> String {
    "127.0.0.1:8088".to_string()
}

impl Config {
    /// Load configuration from file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from default locations or return defaults.
    /// Environment variables override file values.
    pub fn load_or_default() -> Self {
        let mut config = Self::load(".backlogg/config.yaml")
            .or_else(|_| match dirs::config_dir() {
                Some(dir) => Self::load(dir.join("backlogg/config.yaml")),
                None => Ok(Self::default()),
            })
            .unwrap_or_default();

        if let Ok(db_path) = std::env::var("BACKLOGG_DB_PATH") {
            config.server.db_path = PathBuf::from(db_path);
        }

        if let Ok(bind) = std::env::var("BACKLOGG_BIND") {
            config.server.bind = bind;
        }

        if let Ok(delay) = std::env::var("BACKLOGG_PLAN_DELAY_MS")
            && let Ok(delay) = delay.parse()
        {
            config.schedule.plan_delay_ms = delay;
        }

        config
    }

    /// Ensure the database directory exists.
    pub fn ensure_db_dir(&self) -> Result<()> {
        if let Some(parent) = self.server.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}
