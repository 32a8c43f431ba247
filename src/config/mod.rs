//! Configuration model for pinrun
//!
//! Holds the slot bindings, aliases, groups, AI settings and the usable
//! output range. The on-disk format accepts several legacy record shapes;
//! they are normalized once, at deserialization time, by [`legacy`].

mod legacy;
pub mod manager;
pub mod store;
pub mod watcher;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use manager::{ConfigManager, SharedConfig};
pub use store::{ConfigStore, FileConfigStore};
pub use watcher::ConfigWatcher;

/// Root configuration structure (canonical shape)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "legacy::RawConfig")]
pub struct ConfigModel {
    pub gpio_pins: BTreeMap<String, PinBinding>,
    pub aliases: BTreeMap<String, AliasRecord>,
    pub groups: BTreeMap<String, GroupRecord>,
    pub ai: AiSettings,
    pub output_range: OutputRange,
}

/// Binding of a slot to a physical output index (or unbound)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinBinding {
    pub pin: Option<u8>,
}

impl PinBinding {
    pub fn bound(pin: u8) -> Self {
        Self { pin: Some(pin) }
    }

    pub fn unbound() -> Self {
        Self { pin: None }
    }
}

/// Alias record: which slot it drives and whether it switches off on its own
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasRecord {
    #[serde(rename = "config_spot")]
    pub slot: String,
    pub auto_off: bool,
}

impl AliasRecord {
    pub fn new(slot: impl Into<String>, auto_off: bool) -> Self {
        Self {
            slot: slot.into(),
            auto_off,
        }
    }
}

/// What activating a group does to its members
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum GroupAction {
    #[serde(alias = "ON", alias = "On")]
    On,
    #[serde(alias = "OFF", alias = "Off")]
    Off,
}

impl std::fmt::Display for GroupAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupAction::On => write!(f, "on"),
            GroupAction::Off => write!(f, "off"),
        }
    }
}

/// Group record: ordered alias names plus a uniform action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    #[serde(rename = "aliases")]
    pub members: Vec<String>,
    pub action: GroupAction,
}

impl GroupRecord {
    pub fn new<I, S>(members: I, action: GroupAction) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            members: members.into_iter().map(Into::into).collect(),
            action,
        }
    }
}

/// Access settings for the AI front-end
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub enabled: bool,
}

/// Inclusive range of physical output indices the platform allows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRange {
    pub min: u8,
    pub max: u8,
}

impl Default for OutputRange {
    fn default() -> Self {
        // BCM 0 and 1 carry the HAT ID EEPROM bus
        Self { min: 2, max: 27 }
    }
}

impl OutputRange {
    pub fn contains(&self, index: u8) -> bool {
        (self.min..=self.max).contains(&index)
    }

    pub fn indices(&self) -> impl Iterator<Item = u8> {
        self.min..=self.max
    }
}

impl Default for ConfigModel {
    fn default() -> Self {
        Self::default_layout()
    }
}

impl ConfigModel {
    /// Configuration with empty tables
    pub fn empty() -> Self {
        Self {
            gpio_pins: BTreeMap::new(),
            aliases: BTreeMap::new(),
            groups: BTreeMap::new(),
            ai: AiSettings::default(),
            output_range: OutputRange::default(),
        }
    }

    /// Factory layout written when no configuration file exists yet
    pub fn default_layout() -> Self {
        let mut config = Self::empty();

        for n in 1..=27u8 {
            // Slot N sits on BCM N+1; the 27th slot has no free line left
            let binding = if n < 27 {
                PinBinding::bound(n + 1)
            } else {
                PinBinding::unbound()
            };
            config.gpio_pins.insert(format!("config_spot{n}"), binding);
        }

        let named: [(&str, u8); 27] = [
            ("motor_1", 1),
            ("motor_2", 2),
            ("motor_3", 3),
            ("motor_4", 4),
            ("motor_5", 5),
            ("motor_6", 6),
            ("motor_7", 7),
            ("motor_8", 8),
            ("led_1", 9),
            ("led_2", 10),
            ("relay_1", 11),
            ("relay_2", 12),
            ("buzzer", 13),
            ("aux_1", 14),
            ("aux_2", 15),
            ("aux_3", 16),
            ("servo_1", 17),
            ("servo_2", 18),
            ("spare_1", 19),
            ("spare_2", 20),
            ("spare_3", 21),
            ("spare_4", 22),
            ("spare_5", 23),
            ("spare_6", 24),
            ("spare_7", 25),
            ("spare_8", 26),
            ("spare_9", 27),
        ];
        for (alias, spot) in named {
            config.aliases.insert(
                alias.to_string(),
                AliasRecord::new(format!("config_spot{spot}"), true),
            );
        }

        let motors = ["motor_1", "motor_2", "motor_3", "motor_4"];
        let all: Vec<String> = named.iter().map(|(a, _)| a.to_string()).collect();
        let groups = [
            ("forward", GroupRecord::new(["motor_1", "motor_2"], GroupAction::On)),
            ("backward", GroupRecord::new(["motor_3", "motor_4"], GroupAction::On)),
            ("left", GroupRecord::new(["motor_1", "motor_4"], GroupAction::On)),
            ("right", GroupRecord::new(["motor_2", "motor_3"], GroupAction::On)),
            ("stop", GroupRecord::new(motors, GroupAction::Off)),
            ("lights_on", GroupRecord::new(["led_1", "led_2"], GroupAction::On)),
            ("lights_off", GroupRecord::new(["led_1", "led_2"], GroupAction::Off)),
            (
                "alarm",
                GroupRecord::new(["buzzer", "led_1", "led_2"], GroupAction::On),
            ),
            (
                "all_motors",
                GroupRecord::new(
                    named[..8].iter().map(|(a, _)| *a),
                    GroupAction::On,
                ),
            ),
            ("all_on", GroupRecord::new(all.clone(), GroupAction::On)),
            ("all_off", GroupRecord::new(all, GroupAction::Off)),
        ];
        for (name, group) in groups {
            config.groups.insert(name.to_string(), group);
        }

        config
    }

    /// Copy safe to expose over the network (credential masked)
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.ai.api_key.is_some() {
            copy.ai.api_key = Some("***".to_string());
        }
        copy
    }

    /// Physical index bound to a slot, if any
    pub fn pin_for_slot(&self, slot: &str) -> Option<u8> {
        self.gpio_pins.get(slot).and_then(|b| b.pin)
    }

    pub fn set_binding(&mut self, slot: &str, pin: Option<u8>) -> Result<(), ConfigError> {
        let slot = checked_name(slot)?;
        if let Some(index) = pin {
            if !self.output_range.contains(index) {
                return Err(ConfigError::IndexOutOfRange {
                    index,
                    min: self.output_range.min,
                    max: self.output_range.max,
                });
            }
        }
        self.gpio_pins.insert(slot, PinBinding { pin });
        Ok(())
    }

    /// Remove a slot. Aliases pointing at it are left alone and become unmapped.
    pub fn delete_binding(&mut self, slot: &str) -> Result<PinBinding, ConfigError> {
        self.gpio_pins
            .remove(slot)
            .ok_or_else(|| ConfigError::UnknownSlot(slot.to_string()))
    }

    pub fn set_alias(&mut self, name: &str, record: AliasRecord) -> Result<(), ConfigError> {
        let name = checked_name(name)?;
        if !self.gpio_pins.contains_key(&record.slot) {
            return Err(ConfigError::UnknownSlot(record.slot));
        }
        self.aliases.insert(name, record);
        Ok(())
    }

    /// Remove an alias. Groups keep the dangling member name.
    pub fn delete_alias(&mut self, name: &str) -> Result<AliasRecord, ConfigError> {
        self.aliases
            .remove(name)
            .ok_or_else(|| ConfigError::UnknownAlias(name.to_string()))
    }

    pub fn set_group(&mut self, name: &str, record: GroupRecord) -> Result<(), ConfigError> {
        let name = checked_name(name)?;
        if let Some(missing) = record
            .members
            .iter()
            .find(|m| !self.aliases.contains_key(m.as_str()))
        {
            return Err(ConfigError::UnknownMember {
                group: name,
                member: missing.clone(),
            });
        }
        self.groups.insert(name, record);
        Ok(())
    }

    pub fn delete_group(&mut self, name: &str) -> Result<GroupRecord, ConfigError> {
        self.groups
            .remove(name)
            .ok_or_else(|| ConfigError::UnknownGroup(name.to_string()))
    }

    pub fn set_ai(&mut self, settings: AiSettings) {
        self.ai = settings;
    }
}

fn checked_name(name: &str) -> Result<String, ConfigError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::EmptyName);
    }
    Ok(trimmed.to_string())
}
