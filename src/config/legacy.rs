//! Accepted on-disk record shapes
//!
//! Older config files store a bare pin number per slot, a bare slot string
//! per alias, and a bare alias list per group. Uppercase table names from the
//! first JSON format are accepted too. Everything is folded into the
//! canonical [`ConfigModel`] here so the rest of the crate sees one shape.

use super::{AiSettings, AliasRecord, ConfigModel, GroupAction, GroupRecord, OutputRange, PinBinding};
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
pub(super) struct RawConfig {
    #[serde(default, alias = "GPIO_PINS")]
    gpio_pins: BTreeMap<String, RawBinding>,
    #[serde(default, alias = "ALIASES")]
    aliases: BTreeMap<String, RawAlias>,
    #[serde(default, alias = "GROUPS")]
    groups: BTreeMap<String, RawGroup>,
    #[serde(default, alias = "AI")]
    ai: AiSettings,
    #[serde(default)]
    output_range: OutputRange,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawBinding {
    Record {
        #[serde(default, alias = "pin_num")]
        pin: Option<u8>,
    },
    Index(Option<u8>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawAlias {
    Slot(String),
    Record {
        #[serde(alias = "config_spot")]
        slot: String,
        #[serde(default = "default_auto_off")]
        auto_off: bool,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawGroup {
    Members(Vec<String>),
    Record {
        #[serde(default, alias = "members")]
        aliases: Vec<String>,
        #[serde(default = "default_group_action")]
        action: GroupAction,
    },
}

fn default_auto_off() -> bool {
    true
}

fn default_group_action() -> GroupAction {
    GroupAction::On
}

impl From<RawBinding> for PinBinding {
    fn from(raw: RawBinding) -> Self {
        match raw {
            RawBinding::Record { pin } | RawBinding::Index(pin) => PinBinding { pin },
        }
    }
}

impl From<RawAlias> for AliasRecord {
    fn from(raw: RawAlias) -> Self {
        match raw {
            RawAlias::Slot(slot) => AliasRecord::new(slot, true),
            RawAlias::Record { slot, auto_off } => AliasRecord::new(slot, auto_off),
        }
    }
}

impl From<RawGroup> for GroupRecord {
    fn from(raw: RawGroup) -> Self {
        match raw {
            RawGroup::Members(members) => GroupRecord::new(members, GroupAction::On),
            RawGroup::Record { aliases, action } => GroupRecord::new(aliases, action),
        }
    }
}

impl From<RawConfig> for ConfigModel {
    fn from(raw: RawConfig) -> Self {
        ConfigModel {
            gpio_pins: raw
                .gpio_pins
                .into_iter()
                .map(|(k, v)| (k, v.into()))
                .collect(),
            aliases: raw
                .aliases
                .into_iter()
                .map(|(k, v)| (k, v.into()))
                .collect(),
            groups: raw
                .groups
                .into_iter()
                .map(|(k, v)| (k, v.into()))
                .collect(),
            ai: raw.ai,
            output_range: raw.output_range,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_json_shapes_normalize() {
        let json = r#"{
            "GPIO_PINS": {"config_spot1": 2, "config_spot2": null},
            "ALIASES": {
                "motor_1": "config_spot1",
                "motor_2": {"config_spot": "config_spot2", "auto_off": false},
                "motor_3": {"config_spot": "config_spot1"}
            },
            "GROUPS": {
                "forward": ["motor_1", "motor_2"],
                "halt": {"aliases": ["motor_1"], "action": "off"}
            }
        }"#;

        let config: ConfigModel = serde_json::from_str(json).unwrap();

        assert_eq!(config.gpio_pins["config_spot1"], PinBinding::bound(2));
        assert_eq!(config.gpio_pins["config_spot2"], PinBinding::unbound());
        assert_eq!(config.aliases["motor_1"], AliasRecord::new("config_spot1", true));
        assert_eq!(config.aliases["motor_2"], AliasRecord::new("config_spot2", false));
        assert!(config.aliases["motor_3"].auto_off);
        assert_eq!(
            config.groups["forward"],
            GroupRecord::new(["motor_1", "motor_2"], GroupAction::On)
        );
        assert_eq!(config.groups["halt"].action, GroupAction::Off);
        assert_eq!(config.output_range, OutputRange::default());
    }

    #[test]
    fn test_canonical_yaml_roundtrips_through_raw_shape() {
        let mut original = ConfigModel::empty();
        original.set_binding("S1", Some(4)).unwrap();
        original.set_binding("S2", None).unwrap();
        original
            .set_alias("m1", AliasRecord::new("S1", false))
            .unwrap();
        original
            .set_group("g", GroupRecord::new(["m1"], GroupAction::Off))
            .unwrap();
        original.ai.enabled = true;

        let yaml = serde_yaml::to_string(&original).unwrap();
        let reloaded: ConfigModel = serde_yaml::from_str(&yaml).unwrap();

        assert_eq!(reloaded, original);
    }

    #[test]
    fn test_uppercase_group_action() {
        let yaml = "groups:\n  g:\n    aliases: [a]\n    action: OFF\n";
        let config: ConfigModel = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.groups["g"].action, GroupAction::Off);
    }

    #[test]
    fn test_missing_tables_default_to_empty() {
        let config: ConfigModel = serde_yaml::from_str("output_range: {min: 0, max: 40}").unwrap();
        assert!(config.gpio_pins.is_empty());
        assert!(config.aliases.is_empty());
        assert_eq!(config.output_range, OutputRange { min: 0, max: 40 });
    }
}
