//! Owned, shared configuration instance with administrative operations
//!
//! Every mutation validates against the current model, applies in memory,
//! then saves a snapshot. A failed save is logged and swallowed: the change
//! stays in effect for the lifetime of the process.
//!
//! Mutations, saves and reloads are serialized by one async lock, so the
//! stored file always ends up matching the last applied change.

use super::{AiSettings, AliasRecord, ConfigModel, ConfigStore, GroupRecord};
use crate::error::ConfigError;
use anyhow::Result;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Read handle used by the resolver and the front-ends
pub type SharedConfig = Arc<RwLock<ConfigModel>>;

pub struct ConfigManager {
    config: SharedConfig,
    store: Arc<dyn ConfigStore>,
    /// Held across apply + save
    writes: Mutex<()>,
}

impl ConfigManager {
    pub fn new(initial: ConfigModel, store: Arc<dyn ConfigStore>) -> Self {
        Self {
            config: Arc::new(RwLock::new(initial)),
            store,
            writes: Mutex::new(()),
        }
    }

    pub fn shared(&self) -> SharedConfig {
        Arc::clone(&self.config)
    }

    pub fn snapshot(&self) -> ConfigModel {
        self.config.read().clone()
    }

    pub fn ai_settings(&self) -> AiSettings {
        self.config.read().ai.clone()
    }

    pub async fn set_binding(&self, slot: &str, pin: Option<u8>) -> Result<(), ConfigError> {
        self.mutate(|c| c.set_binding(slot, pin)).await?;
        info!("Slot '{}' bound to {:?}", slot, pin);
        Ok(())
    }

    pub async fn delete_binding(&self, slot: &str) -> Result<(), ConfigError> {
        self.mutate(|c| c.delete_binding(slot)).await?;
        info!("Slot '{}' deleted", slot);
        Ok(())
    }

    pub async fn set_alias(&self, name: &str, record: AliasRecord) -> Result<(), ConfigError> {
        let slot = record.slot.clone();
        self.mutate(|c| c.set_alias(name, record)).await?;
        info!("Alias '{}' -> slot '{}'", name, slot);
        Ok(())
    }

    /// Create or partially update an alias.
    ///
    /// Omitted fields keep their current value. A new alias needs a slot;
    /// `auto_off` defaults to true.
    pub async fn upsert_alias(
        &self,
        name: &str,
        slot: Option<String>,
        auto_off: Option<bool>,
    ) -> Result<AliasRecord, ConfigError> {
        let record = self
            .mutate(|c| {
                let existing = c.aliases.get(name.trim());
                let slot = slot
                    .or_else(|| existing.map(|a| a.slot.clone()))
                    .ok_or(ConfigError::MissingField("config_spot"))?;
                let auto_off = auto_off
                    .or_else(|| existing.map(|a| a.auto_off))
                    .unwrap_or(true);
                let record = AliasRecord::new(slot, auto_off);
                c.set_alias(name, record.clone())?;
                Ok(record)
            })
            .await?;
        info!("Alias '{}' -> slot '{}'", name, record.slot);
        Ok(record)
    }

    pub async fn delete_alias(&self, name: &str) -> Result<(), ConfigError> {
        self.mutate(|c| c.delete_alias(name)).await?;
        info!("Alias '{}' deleted", name);
        Ok(())
    }

    pub async fn set_group(&self, name: &str, record: GroupRecord) -> Result<(), ConfigError> {
        let count = record.members.len();
        self.mutate(|c| c.set_group(name, record)).await?;
        info!("Group '{}' saved ({} members)", name, count);
        Ok(())
    }

    pub async fn delete_group(&self, name: &str) -> Result<(), ConfigError> {
        self.mutate(|c| c.delete_group(name)).await?;
        info!("Group '{}' deleted", name);
        Ok(())
    }

    pub async fn set_ai(&self, settings: AiSettings) {
        self.update_ai(|ai| *ai = settings).await;
    }

    /// Edit the AI settings in place and return the result
    pub async fn update_ai<F>(&self, edit: F) -> AiSettings
    where
        F: FnOnce(&mut AiSettings),
    {
        let _writing = self.writes.lock().await;
        let snapshot = {
            let mut config = self.config.write();
            edit(&mut config.ai);
            config.clone()
        };
        self.persist(&snapshot).await;

        info!("AI settings updated (enabled: {})", snapshot.ai.enabled);
        snapshot.ai
    }

    /// Replace the in-memory model with the stored one.
    ///
    /// Returns whether anything changed: a stored model equal to the current
    /// one (such as the file this manager just wrote) is left alone. On
    /// failure the current model is kept and the error is returned.
    pub async fn reload(&self) -> Result<bool> {
        let _writing = self.writes.lock().await;
        match self.store.load().await {
            Ok(config) => {
                let mut current = self.config.write();
                if *current == config {
                    debug!("Configuration unchanged, reload skipped");
                    return Ok(false);
                }
                *current = config;
                info!("Configuration reloaded");
                Ok(true)
            }
            Err(e) => {
                warn!("Failed to reload config (keeping current): {:#}", e);
                Err(e)
            }
        }
    }

    async fn mutate<T, F>(&self, apply: F) -> Result<T, ConfigError>
    where
        F: FnOnce(&mut ConfigModel) -> Result<T, ConfigError>,
    {
        let _writing = self.writes.lock().await;
        let (value, snapshot) = {
            let mut config = self.config.write();
            let value = apply(&mut config)?;
            (value, config.clone())
        };
        self.persist(&snapshot).await;
        Ok(value)
    }

    async fn persist(&self, snapshot: &ConfigModel) {
        if let Err(e) = self.store.save(snapshot).await {
            warn!("ConfigPersistenceFailure: change applied but not saved: {:#}", e);
        }
    }
}
