//! Configuration loading

pub mod presets;

pub use presets::{Preset, PresetManager};

use crate::manager::ManagerSettings;
use crate::process::monitor::effective_interval;
use crate::process::DEFAULT_INTERVAL;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub monitor: MonitorConfig,
    pub shutdown: ShutdownConfig,
    pub preset: Vec<Preset>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Milliseconds between job status passes
    pub interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Terminate Running jobs when the application exits
    pub terminate_jobs: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_INTERVAL.as_millis() as u64,
        }
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            terminate_jobs: true,
        }
    }
}

impl Config {
    /// Load the first config file found, or defaults if there is none
    ///
    /// Searched in order: `$CONFIG_DIR/lpjobs/config.toml`, `~/.lpjobs.toml`, `./lpjobs.toml`.
    pub fn load() -> Result<Self> {
        let paths = [
            dirs::config_dir().map(|p| p.join("lpjobs/config.toml")),
            dirs::home_dir().map(|p| p.join(".lpjobs.toml")),
            Some(PathBuf::from("lpjobs.toml")),
        ];

        for path in paths.into_iter().flatten() {
            if path.exists() {
                debug!(path = %path.display(), "Loading config");
                return Self::from_file(&path);
            }
        }

        Ok(Config::default())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        for preset in &mut config.preset {
            preset.expand_paths();
        }
        Ok(config)
    }

    pub fn monitor_interval(&self) -> Duration {
        effective_interval(Duration::from_millis(self.monitor.interval_ms))
    }

    pub fn manager_settings(&self) -> ManagerSettings {
        ManagerSettings {
            interval: self.monitor_interval(),
            terminate_on_shutdown: self.shutdown.terminate_jobs,
        }
    }

    pub fn presets(&self) -> PresetManager {
        PresetManager::new(self.preset.clone())
    }
}
