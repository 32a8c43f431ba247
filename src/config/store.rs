//! Durable storage for [`ConfigModel`]
//!
//! The file store picks its format from the extension: `.json` is JSON,
//! anything else is YAML. Each write goes through its own temporary file and
//! a rename, so a crash or a concurrent save never leaves a half-written
//! config behind.

use super::ConfigModel;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::fs;
use tracing::{debug, info};

/// Load/save capability used by [`ConfigManager`](super::ConfigManager)
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Read and normalize the stored configuration
    async fn load(&self) -> Result<ConfigModel>;

    /// Persist a snapshot
    async fn save(&self, config: &ConfigModel) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Yaml,
    Json,
}

/// Configuration file on the local filesystem
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
    format: Format,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Format::Json,
            _ => Format::Yaml,
        };
        Self { path, format }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the file, seeding it with the factory layout when it does not exist
    pub async fn load_or_init(&self) -> Result<ConfigModel> {
        if fs::try_exists(&self.path).await.unwrap_or(false) {
            let config = self.load().await?;
            // Write back so legacy shapes are migrated on disk too
            self.save(&config).await?;
            return Ok(config);
        }

        info!(
            "No configuration at {}, writing factory defaults",
            self.path.display()
        );
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create config dir: {}", parent.display()))?;
            }
        }
        let config = ConfigModel::default_layout();
        self.save(&config).await?;
        Ok(config)
    }

    fn encode(&self, config: &ConfigModel) -> Result<String> {
        match self.format {
            Format::Yaml => serde_yaml::to_string(config).context("Failed to serialize config to YAML"),
            Format::Json => {
                serde_json::to_string_pretty(config).context("Failed to serialize config to JSON")
            }
        }
    }

    fn decode(&self, contents: &str) -> Result<ConfigModel> {
        match self.format {
            Format::Yaml => serde_yaml::from_str(contents)
                .with_context(|| format!("Failed to parse YAML config: {}", self.path.display())),
            Format::Json => serde_json::from_str(contents)
                .with_context(|| format!("Failed to parse JSON config: {}", self.path.display())),
        }
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn load(&self) -> Result<ConfigModel> {
        let contents = fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read config file: {}", self.path.display()))?;

        let config = self.decode(&contents)?;
        debug!(
            "Loaded config: {} slots, {} aliases, {} groups",
            config.gpio_pins.len(),
            config.aliases.len(),
            config.groups.len()
        );
        Ok(config)
    }

    async fn save(&self, config: &ConfigModel) -> Result<()> {
        let encoded = self.encode(config)?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || write_atomically(&path, encoded.as_bytes()))
            .await
            .context("Config save task panicked")?
    }
}

/// Write to a uniquely named sibling file, then rename it over `path`.
/// The temporary file is removed if anything fails before the rename.
fn write_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in: {}", dir.display()))?;
    tmp.write_all(contents)
        .and_then(|_| tmp.as_file().sync_all())
        .with_context(|| format!("Failed to write config file: {}", tmp.path().display()))?;
    tmp.persist(path)
        .with_context(|| format!("Failed to replace config file: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AliasRecord, PinBinding};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_save_and_load_yaml() -> Result<()> {
        let dir = TempDir::new()?;
        let store = FileConfigStore::new(dir.path().join("pinrun.yaml"));

        let mut config = ConfigModel::empty();
        config.set_binding("S1", Some(4)).unwrap();
        config.set_alias("m1", AliasRecord::new("S1", true)).unwrap();
        store.save(&config).await?;

        let loaded = store.load().await?;
        assert_eq!(loaded, config);
        assert_eq!(std::fs::read_dir(dir.path())?.count(), 1);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_saves_never_corrupt_file() -> Result<()> {
        let dir = TempDir::new()?;
        let store = Arc::new(FileConfigStore::new(dir.path().join("pinrun.yaml")));

        let tasks: Vec<_> = (0..16u8)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    let mut config = ConfigModel::empty();
                    config.set_binding(&format!("S{i}"), Some(2 + i)).unwrap();
                    store.save(&config).await
                })
            })
            .collect();
        for task in tasks {
            task.await??;
        }

        let loaded = store.load().await?;
        assert_eq!(loaded.gpio_pins.len(), 1);
        assert_eq!(std::fs::read_dir(dir.path())?.count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_json_extension_selects_json() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("config.json");
        let store = FileConfigStore::new(&path);

        store.save(&ConfigModel::empty()).await?;
        let raw = std::fs::read_to_string(&path)?;
        assert!(serde_json::from_str::<serde_json::Value>(&raw).is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn test_load_or_init_seeds_defaults() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("nested").join("pinrun.yaml");
        let store = FileConfigStore::new(&path);

        let config = store.load_or_init().await?;
        assert_eq!(config, ConfigModel::default_layout());
        assert!(path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_load_or_init_migrates_legacy_file() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"GPIO_PINS": {"s": 5}, "ALIASES": {"a": "s"}, "GROUPS": {"g": ["a"]}}"#,
        )?;

        let store = FileConfigStore::new(&path);
        let config = store.load_or_init().await?;
        assert_eq!(config.gpio_pins["s"], PinBinding::bound(5));

        let rewritten = std::fs::read_to_string(&path)?;
        assert!(rewritten.contains("\"config_spot\": \"s\""));
        assert!(rewritten.contains("\"action\": \"on\""));
        Ok(())
    }

    #[tokio::test]
    async fn test_load_missing_file_fails() {
        let store = FileConfigStore::new("/nonexistent/pinrun.yaml");
        assert!(store.load().await.is_err());
    }
}
