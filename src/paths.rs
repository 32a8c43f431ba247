//! Application path resolution
//!
//! ## Lookup order
//!
//! - An explicit `--config` path always wins.
//! - **Local mode**: `pinrun.yaml` (or `pinrun.json`) in the working directory,
//!   with logs under `./logs`. Handy on a bench Pi where the service runs from
//!   its checkout.
//! - **Installed mode** (default): `<config dir>/pinrun/config.yaml` from
//!   `dirs::config_dir()` (`~/.config/pinrun` on Linux), logs under the local
//!   data dir.

use std::path::{Path, PathBuf};

/// Directory name used in installed mode
const APP_NAME: &str = "pinrun";

/// File names looked up in the working directory
const LOCAL_CONFIG_NAMES: [&str; 2] = ["pinrun.yaml", "pinrun.json"];

/// Application paths for config and logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    /// Path to the configuration file
    pub config: PathBuf,
    /// Default directory for rolling log files
    pub logs_dir: PathBuf,
    /// Whether the config was found in the working directory
    pub is_local: bool,
}

impl AppPaths {
    /// Resolve paths for this process.
    ///
    /// Called before logging is initialized.
    pub fn detect(explicit_config: Option<&Path>) -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let config_dir = dirs::config_dir().map(|d| d.join(APP_NAME));
        let data_dir = dirs::data_local_dir().map(|d| d.join(APP_NAME));
        Self::resolve(explicit_config, &cwd, config_dir, data_dir)
    }

    fn resolve(
        explicit_config: Option<&Path>,
        cwd: &Path,
        config_dir: Option<PathBuf>,
        data_dir: Option<PathBuf>,
    ) -> Self {
        if let Some(config) = explicit_config {
            let base = config
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| cwd.to_path_buf());
            return Self {
                config: config.to_path_buf(),
                logs_dir: base.join("logs"),
                is_local: true,
            };
        }

        if let Some(local) = LOCAL_CONFIG_NAMES
            .iter()
            .map(|name| cwd.join(name))
            .find(|p| p.exists())
        {
            return Self {
                config: local,
                logs_dir: cwd.join("logs"),
                is_local: true,
            };
        }

        // No platform dirs (minimal containers): fall back to the working directory
        let config_dir = config_dir.unwrap_or_else(|| cwd.to_path_buf());
        let data_dir = data_dir.unwrap_or_else(|| config_dir.clone());
        Self {
            config: config_dir.join("config.yaml"),
            logs_dir: data_dir.join("logs"),
            is_local: false,
        }
    }

    /// Directory holding the config file (for display)
    pub fn base_dir(&self) -> PathBuf {
        self.config
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }
}
