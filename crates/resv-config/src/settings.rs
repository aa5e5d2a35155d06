//! Typed view over the merged config tree.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_DATABASE_URL_ENV: &str = "RESV_DATABASE_URL";
pub const DEFAULT_MAX_COMMIT_ATTEMPTS: u32 = 5;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;
pub const DEFAULT_DAEMON_ADDR: &str = "127.0.0.1:8899";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    /// Env var NAME holding the database URL.
    pub database_url_env: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            database_url_env: DEFAULT_DATABASE_URL_ENV.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub max_commit_attempts: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_commit_attempts: DEFAULT_MAX_COMMIT_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveViewSettings {
    /// Change-feed broadcast capacity; a slower subscriber lags and re-queries.
    pub channel_capacity: usize,
}

impl Default for LiveViewSettings {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonSettings {
    pub addr: String,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            addr: DEFAULT_DAEMON_ADDR.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub store: StoreSettings,
    pub engine: EngineSettings,
    pub live_view: LiveViewSettings,
    pub daemon: DaemonSettings,
}

impl Settings {
    /// Extract and validate. Unknown keys are left to the unused-key report.
    pub fn from_config_json(config_json: &Value) -> Result<Self> {
        let settings: Settings = serde_json::from_value(config_json.clone())
            .context("CONFIG_INVALID: settings do not match the expected shape")?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.engine.max_commit_attempts == 0 {
            bail!("CONFIG_INVALID: engine.max_commit_attempts must be at least 1");
        }
        if self.live_view.channel_capacity == 0 {
            bail!("CONFIG_INVALID: live_view.channel_capacity must be at least 1");
        }
        if self.store.database_url_env.trim().is_empty() {
            bail!("CONFIG_INVALID: store.database_url_env must name an env var");
        }
        Ok(())
    }
}
