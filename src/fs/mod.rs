//! File system layout, settings persistence and script staging.

use std::path::{Path, PathBuf};

use anyhow::Context;

pub mod scripts;
pub mod settings;

pub use scripts::{normalize_script, stage_script};
pub use settings::{BridgeSettings, ENV_BINARY, ENV_SIMULATION, load_settings, save_settings};

/// Name of the scheduler binary inside [`BridgePaths::bin_dir`].
pub const BINARY_NAME: &str = "taskscheduler";

/// Holds every bridge-related path derived from a base directory.
///
/// Tests root it at a temporary directory; the binary roots it at the current
/// working directory.
///
/// # Example
///
/// ```
/// use std::path::Path;
/// use taskbridge::fs::BridgePaths;
///
/// let paths = BridgePaths::new(Path::new("/srv/app"));
/// assert_eq!(paths.binary(), Path::new("/srv/app/bin/taskscheduler"));
/// assert_eq!(paths.settings_file(), Path::new("/srv/app/.taskbridge/settings.json"));
/// ```
#[derive(Debug, Clone)]
pub struct BridgePaths {
    base: PathBuf,
}

impl BridgePaths {
    /// Creates paths rooted at the given base directory.
    ///
    /// A relative base is resolved against the current directory; paths
    /// handed to the scheduler must not depend on its working directory.
    #[must_use]
    pub fn new(base: &Path) -> Self {
        let base = std::path::absolute(base).unwrap_or_else(|_| base.to_path_buf());
        Self { base }
    }

    /// Creates paths rooted at the current working directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the current directory cannot be determined.
    pub fn from_cwd() -> anyhow::Result<Self> {
        let base = std::env::current_dir().context("Failed to get current directory")?;
        Ok(Self { base })
    }

    #[must_use]
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Directory holding the scheduler binary; also its working directory.
    #[must_use]
    pub fn bin_dir(&self) -> PathBuf {
        self.base.join("bin")
    }

    /// Default scheduler binary path (`bin/taskscheduler`).
    #[must_use]
    pub fn binary(&self) -> PathBuf {
        self.bin_dir().join(BINARY_NAME)
    }

    /// Scheduler data directory (`bin/data`).
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.bin_dir().join("data")
    }

    /// Staging directory for script files (`bin/scripts`).
    #[must_use]
    pub fn scripts_dir(&self) -> PathBuf {
        self.bin_dir().join("scripts")
    }

    /// Bridge configuration directory (`.taskbridge`).
    #[must_use]
    pub fn config_dir(&self) -> PathBuf {
        self.base.join(".taskbridge")
    }

    /// Settings file path (`.taskbridge/settings.json`).
    #[must_use]
    pub fn settings_file(&self) -> PathBuf {
        self.config_dir().join("settings.json")
    }

    /// Ensures the scripts staging directory exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn ensure_scripts_dir(&self) -> anyhow::Result<PathBuf> {
        let dir = self.scripts_dir();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        Ok(dir)
    }

    /// Loads settings, falling back to defaults when the file is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_settings(&self) -> anyhow::Result<BridgeSettings> {
        load_settings(&self.settings_file())
    }

    /// Saves settings, creating `.taskbridge` if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file cannot be written.
    pub fn save_settings(&self, settings: &BridgeSettings) -> anyhow::Result<()> {
        let dir = self.config_dir();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        save_settings(&self.settings_file(), settings)
    }
}
