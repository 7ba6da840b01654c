use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api: ApiSettings,
    pub polling: PollingSettings,
    pub addresses: AddressSettings,
    pub log: LogSettings,
    pub display: DisplaySettings,
    pub debug: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub balance_base_url: String,
    pub api_key: String,
    pub audit_endpoints: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            balance_base_url: "https://api.ethplorer.io".to_string(),
            api_key: "freekey".to_string(),
            audit_endpoints: vec![
                "https://a.chainpoint.org/".to_string(),
                "https://b.chainpoint.org/".to_string(),
                "https://c.chainpoint.org/".to_string(),
            ],
            request_timeout_secs: 10,
        }
    }
}

impl ApiSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingSettings {
    /// Delay after polling an address that had never been fetched.
    pub fresh_interval_ms: u64,
    pub stale_interval_ms: u64,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            fresh_interval_ms: 500,
            stale_interval_ms: 15_000,
        }
    }
}

impl PollingSettings {
    pub fn fresh_interval(&self) -> Duration {
        Duration::from_millis(self.fresh_interval_ms)
    }

    pub fn stale_interval(&self) -> Duration {
        Duration::from_millis(self.stale_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressSettings {
    pub file: PathBuf,
    pub open_when_empty: bool,
}

impl Default for AddressSettings {
    fn default() -> Self {
        Self {
            file: PathBuf::from("address.txt"),
            open_when_empty: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// When false the activity log is kept in memory only.
    pub write_file: bool,
    pub file: PathBuf,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            write_file: true,
            file: PathBuf::from("balance-monitor.log"),
        }
    }
}

impl LogSettings {
    pub fn file_path(&self) -> Option<&Path> {
        self.write_file.then_some(self.file.as_path())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    pub redraw: bool,
    pub token_highlight_threshold: f32,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            redraw: true,
            token_highlight_threshold: 3100.0,
        }
    }
}

impl Settings {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("balance-monitor").join("config.toml"))
    }

    /// Loads from `path`, or from the default config location when `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path().context("Could not determine config directory")?,
        };

        if !path.exists() {
            tracing::info!(?path, "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        tracing::info!(?path, "Loaded config");
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api.audit_endpoints.is_empty() {
            anyhow::bail!("api.audit_endpoints must list at least one endpoint");
        }
        if self.api.request_timeout_secs == 0 {
            anyhow::bail!("api.request_timeout_secs must be greater than 0");
        }
        if self.polling.fresh_interval_ms == 0 || self.polling.stale_interval_ms == 0 {
            anyhow::bail!(
                "polling intervals must be greater than 0, got fresh={} stale={}",
                self.polling.fresh_interval_ms,
                self.polling.stale_interval_ms
            );
        }
        if self.api.balance_base_url.trim().is_empty() {
            anyhow::bail!("api.balance_base_url must not be empty");
        }
        Ok(())
    }
}
