//! Configuration management (TOML)

use crate::filter::default_system_processes;
use crate::recipient::RecipientConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const TOKEN_ENV: &str = "PROCWATCH_TELEGRAM_TOKEN";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub telegram: TelegramConfig,
    /// Settings given to a recipient on first contact.
    pub defaults: RecipientConfig,
    pub filter: FilterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub sample_interval_secs: u64,
    pub flush_interval_secs: u64,
    pub poll_interval_secs: u64,
    pub stats_save_interval_secs: u64,
    /// Blocking window used to measure a new process's CPU usage.
    pub cpu_sample_millis: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub token: String,
    pub api_base: String,
    pub send_timeout_secs: u64,
    pub poll_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub system_processes: Vec<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            sample_interval_secs: 5,
            flush_interval_secs: 5,
            poll_interval_secs: 1,
            stats_save_interval_secs: 60,
            cpu_sample_millis: 100,
            data_dir: None,
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        TelegramConfig {
            token: String::new(),
            api_base: "https://api.telegram.org".to_string(),
            send_timeout_secs: 10,
            poll_timeout_secs: 30,
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            system_processes: default_system_processes(),
        }
    }
}

impl GeneralConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.sample_interval_secs.max(1))
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn stats_save_interval(&self) -> Duration {
        Duration::from_secs(self.stats_save_interval_secs.max(1))
    }

    pub fn cpu_window(&self) -> Duration {
        Duration::from_millis(self.cpu_sample_millis)
    }
}

impl TelegramConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs.max(1))
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    /// Token from the environment, falling back to the config file.
    pub fn resolve_token(&self) -> Option<String> {
        std::env::var(TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| Some(self.token.clone()).filter(|t| !t.trim().is_empty()))
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        directories::ProjectDirs::from("", "", "procwatch")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    pub fn data_dir(&self) -> PathBuf {
        self.general.data_dir.clone().unwrap_or_else(|| {
            directories::ProjectDirs::from("", "", "procwatch")
                .map(|dirs| dirs.data_dir().to_path_buf())
                .unwrap_or_else(|| PathBuf::from("."))
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join("procwatch.db")
    }
}
