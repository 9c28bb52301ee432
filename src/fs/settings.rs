//! Settings persistence.
//!
//! Settings live as pretty JSON in `.taskbridge/settings.json`. Every field
//! carries a serde default so older files keep loading as fields are added.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::ChannelTimings;
use crate::parse::ListingStrategy;

/// Forces the simulation backend when set to `1`.
pub const ENV_SIMULATION: &str = "TASK_SCHEDULER_SIMULATION";

/// Overrides the scheduler binary path.
pub const ENV_BINARY: &str = "TASKBRIDGE_BIN";

fn default_args() -> Vec<String> {
    vec!["-i".to_string()]
}

/// Persisted bridge settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    /// Scheduler binary; `None` means `bin/taskscheduler` under the base dir.
    pub binary: Option<PathBuf>,
    /// Arguments passed to the scheduler.
    pub args: Vec<String>,
    pub listing: ListingStrategy,
    /// Skip the real process entirely and serve synthetic data.
    pub force_simulation: bool,
    pub timings: ChannelTimings,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            binary: None,
            args: default_args(),
            listing: ListingStrategy::default(),
            force_simulation: false,
            timings: ChannelTimings::default(),
        }
    }
}

impl BridgeSettings {
    /// Applies environment overrides read through `lookup`.
    ///
    /// The binary passes `|key| std::env::var(key).ok()`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if lookup(ENV_SIMULATION).is_some_and(|value| value.trim() == "1") {
            info!("simulation forced by {ENV_SIMULATION}");
            self.force_simulation = true;
        }
        if let Some(binary) = lookup(ENV_BINARY).filter(|value| !value.trim().is_empty()) {
            info!(binary = %binary, "binary overridden by {ENV_BINARY}");
            self.binary = Some(PathBuf::from(binary.trim()));
        }
    }

    /// Resolves the binary path against a default.
    #[must_use]
    pub fn binary_or(&self, default: PathBuf) -> PathBuf {
        self.binary.clone().unwrap_or(default)
    }
}

/// Loads settings from `path`.
///
/// A missing file yields the defaults.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_settings(path: &Path) -> Result<BridgeSettings> {
    if !path.exists() {
        return Ok(BridgeSettings::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file: {}", path.display()))?;

    serde_json::from_str(&content).context("Failed to parse settings file")
}

/// Saves settings to `path` as pretty JSON.
///
/// The parent directory must exist.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn save_settings(path: &Path, settings: &BridgeSettings) -> Result<()> {
    let json = serde_json::to_string_pretty(settings).context("Failed to serialize settings")?;

    std::fs::write(path, json).context("Failed to write settings file")
}
