//! Alias and group resolution
//!
//! Turns a user-facing name into physical output indices. Resolution is a
//! pure read of the shared config: no side effects, safe to call from any
//! thread at any time.

use crate::config::{ConfigModel, GroupAction, SharedConfig};
use crate::error::CommandError;
use serde::Serialize;

/// An alias resolved to a usable output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedAlias {
    pub alias: String,
    pub index: u8,
    pub auto_off: bool,
}

/// A group member that could not be resolved
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedMember {
    pub alias: String,
    pub reason: String,
}

/// A group resolved against the current config
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedGroup {
    pub group: String,
    pub action: GroupAction,
    /// Resolvable members, in configured order
    pub members: Vec<ResolvedAlias>,
    /// Members left out of `members`
    pub skipped: Vec<SkippedMember>,
}

/// What a bare name refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Alias,
    Group,
}

#[derive(Clone)]
pub struct CommandResolver {
    config: SharedConfig,
}

impl CommandResolver {
    pub fn new(config: SharedConfig) -> Self {
        Self { config }
    }

    pub fn resolve_alias(&self, name: &str) -> Result<ResolvedAlias, CommandError> {
        resolve_in(&self.config.read(), name)
    }

    pub fn resolve_group(&self, name: &str) -> Result<ResolvedGroup, CommandError> {
        let config = self.config.read();
        let group = config
            .groups
            .get(name)
            .ok_or_else(|| CommandError::UnknownGroup(name.to_string()))?;

        let mut members = Vec::with_capacity(group.members.len());
        let mut skipped = Vec::new();
        for member in &group.members {
            match resolve_in(&config, member) {
                Ok(resolved) => members.push(resolved),
                Err(e) => skipped.push(SkippedMember {
                    alias: member.clone(),
                    reason: e.to_string(),
                }),
            }
        }

        Ok(ResolvedGroup {
            group: name.to_string(),
            action: group.action,
            members,
            skipped,
        })
    }

    /// Aliases take precedence when a name is both
    pub fn classify(&self, name: &str) -> Option<TargetKind> {
        let config = self.config.read();
        if config.aliases.contains_key(name) {
            Some(TargetKind::Alias)
        } else if config.groups.contains_key(name) {
            Some(TargetKind::Group)
        } else {
            None
        }
    }

    pub fn alias_names(&self) -> Vec<String> {
        self.config.read().aliases.keys().cloned().collect()
    }

    pub fn group_names(&self) -> Vec<String> {
        self.config.read().groups.keys().cloned().collect()
    }
}

fn resolve_in(config: &ConfigModel, name: &str) -> Result<ResolvedAlias, CommandError> {
    let alias = config
        .aliases
        .get(name)
        .ok_or_else(|| CommandError::UnknownAlias(name.to_string()))?;

    match config.pin_for_slot(&alias.slot) {
        Some(index) if config.output_range.contains(index) => Ok(ResolvedAlias {
            alias: name.to_string(),
            index,
            auto_off: alias.auto_off,
        }),
        _ => Err(CommandError::Unmapped {
            alias: name.to_string(),
            slot: alias.slot.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AliasRecord, GroupRecord, PinBinding};
    use parking_lot::RwLock;
    use std::sync::Arc;

    fn make_resolver() -> CommandResolver {
        let mut config = ConfigModel::empty();
        config.set_binding("S1", Some(4)).unwrap();
        config.set_binding("S2", Some(5)).unwrap();
        config.set_binding("S3", None).unwrap();
        config.set_alias("m1", AliasRecord::new("S1", true)).unwrap();
        config.set_alias("m2", AliasRecord::new("S2", false)).unwrap();
        config.set_alias("dead", AliasRecord::new("S3", true)).unwrap();
        config
            .set_group(
                "mixed",
                GroupRecord::new(["m2", "dead", "m1"], GroupAction::On),
            )
            .unwrap();
        // Referenced alias deleted after the group was written
        config.set_alias("gone", AliasRecord::new("S1", true)).unwrap();
        config
            .set_group("stale", GroupRecord::new(["gone", "m1"], GroupAction::Off))
            .unwrap();
        config.delete_alias("gone").unwrap();

        CommandResolver::new(Arc::new(RwLock::new(config)))
    }

    #[test]
    fn test_resolve_alias() {
        let resolver = make_resolver();
        assert_eq!(
            resolver.resolve_alias("m1").unwrap(),
            ResolvedAlias {
                alias: "m1".into(),
                index: 4,
                auto_off: true
            }
        );
        assert!(!resolver.resolve_alias("m2").unwrap().auto_off);
    }

    #[test]
    fn test_unknown_alias_is_distinct_from_unmapped() {
        let resolver = make_resolver();
        assert_eq!(
            resolver.resolve_alias("nope"),
            Err(CommandError::UnknownAlias("nope".into()))
        );
        assert_eq!(
            resolver.resolve_alias("dead"),
            Err(CommandError::Unmapped {
                alias: "dead".into(),
                slot: "S3".into()
            })
        );
    }

    #[test]
    fn test_out_of_range_index_is_unmapped() {
        let mut config = ConfigModel::empty();
        config
            .gpio_pins
            .insert("S1".into(), PinBinding::bound(1));
        config
            .aliases
            .insert("low".into(), AliasRecord::new("S1", true));
        config
            .aliases
            .insert("orphan".into(), AliasRecord::new("missing", true));
        let resolver = CommandResolver::new(Arc::new(RwLock::new(config)));

        assert!(matches!(
            resolver.resolve_alias("low"),
            Err(CommandError::Unmapped { .. })
        ));
        assert!(matches!(
            resolver.resolve_alias("orphan"),
            Err(CommandError::Unmapped { .. })
        ));
    }

    #[test]
    fn test_group_skips_unresolvable_members_in_order() {
        let resolver = make_resolver();
        let group = resolver.resolve_group("mixed").unwrap();

        assert_eq!(group.action, GroupAction::On);
        let indices: Vec<u8> = group.members.iter().map(|m| m.index).collect();
        assert_eq!(indices, vec![5, 4]);
        assert_eq!(group.skipped.len(), 1);
        assert_eq!(group.skipped[0].alias, "dead");

        let stale = resolver.resolve_group("stale").unwrap();
        assert_eq!(stale.action, GroupAction::Off);
        assert_eq!(stale.members.len(), 1);
        assert_eq!(stale.skipped[0].alias, "gone");
    }

    #[test]
    fn test_unknown_group() {
        let resolver = make_resolver();
        assert_eq!(
            resolver.resolve_group("nope"),
            Err(CommandError::UnknownGroup("nope".into()))
        );
    }

    #[test]
    fn test_classify() {
        let resolver = make_resolver();
        assert_eq!(resolver.classify("m1"), Some(TargetKind::Alias));
        assert_eq!(resolver.classify("mixed"), Some(TargetKind::Group));
        assert_eq!(resolver.classify("nope"), None);
    }
}
