//! Command execution
//!
//! The executor is the single entry point shared by the console, the HTTP
//! API and the AI endpoint. It validates a command, resolves names through
//! [`CommandResolver`] and drives the [`ActivationScheduler`]. Every outcome
//! is a value: a success payload or a tagged [`CommandError`].

pub mod auth;
pub mod command;
pub mod duration;

pub use command::{command_schema, Action, Command, CommandBatch};
pub use duration::{parse_duration, DurationSpec, DEFAULT_DURATION_SECS};

use crate::config::{GroupAction, SharedConfig};
use crate::error::{CommandError, DriverError, ErrorBody};
use crate::resolver::{CommandResolver, ResolvedAlias, SkippedMember, TargetKind};
use crate::scheduler::{ActivationScheduler, Hold, StatusSnapshot};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Member of a group that was switched on
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberActivation {
    pub alias: String,
    pub index: u8,
    pub duration: Hold,
}

/// Output cleared by a stop or a group OFF
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberStop {
    pub alias: String,
    pub index: u8,
    pub was_active: bool,
}

/// Member the driver refused; its siblings still ran
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberFailure {
    pub alias: String,
    pub index: u8,
    pub error: String,
}

/// Success payload of one command
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CommandSuccess {
    ActivateAlias {
        alias: String,
        index: u8,
        auto_off: bool,
        duration: Hold,
    },
    ActivateGroup {
        group: String,
        group_action: GroupAction,
        activated: Vec<MemberActivation>,
        stopped: Vec<MemberStop>,
        skipped: Vec<SkippedMember>,
        failures: Vec<MemberFailure>,
        duration: Hold,
    },
    Stop {
        target: String,
        stopped: Vec<MemberStop>,
        skipped: Vec<SkippedMember>,
        failures: Vec<MemberFailure>,
    },
    Status {
        active: StatusSnapshot,
    },
}

pub type CommandResult = Result<CommandSuccess, CommandError>;

/// Wire shape of one result: `{"ok": true, "action": ..., ...}` or an [`ErrorBody`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CommandReport {
    Success {
        ok: bool,
        #[serde(flatten)]
        result: CommandSuccess,
    },
    Failure(ErrorBody),
}

impl From<&CommandResult> for CommandReport {
    fn from(result: &CommandResult) -> Self {
        match result {
            Ok(success) => CommandReport::Success {
                ok: true,
                result: success.clone(),
            },
            Err(e) => CommandReport::Failure(ErrorBody::from(e)),
        }
    }
}

pub struct CommandExecutor {
    config: SharedConfig,
    resolver: CommandResolver,
    scheduler: Arc<ActivationScheduler>,
}

impl CommandExecutor {
    pub fn new(config: SharedConfig, scheduler: Arc<ActivationScheduler>) -> Self {
        Self {
            resolver: CommandResolver::new(Arc::clone(&config)),
            config,
            scheduler,
        }
    }

    pub fn resolver(&self) -> &CommandResolver {
        &self.resolver
    }

    pub fn scheduler(&self) -> &Arc<ActivationScheduler> {
        &self.scheduler
    }

    pub fn execute(&self, command: &Command) -> CommandResult {
        let action = command.parsed_action()?;
        let target = command.target.as_deref().map(str::trim).unwrap_or_default();
        if target.is_empty() && action.needs_target() {
            return Err(CommandError::MissingTarget(action.to_string()));
        }

        let result = match action {
            Action::ActivateAlias => self.activate_alias(target, command.duration.as_ref()),
            Action::ActivateGroup => self.activate_group(target, command.duration.as_ref()),
            Action::Stop => self.stop(target),
            Action::Status => Ok(CommandSuccess::Status {
                active: self.scheduler.status(),
            }),
        };

        match &result {
            Ok(_) => debug!(%action, name = target, "Command executed"),
            Err(e) => info!("Command {} '{}' rejected: {}", action, target, e),
        }
        result
    }

    /// Run each command independently, in order
    pub fn execute_batch(&self, batch: CommandBatch) -> Vec<CommandResult> {
        batch.into_vec().iter().map(|c| self.execute(c)).collect()
    }

    /// AI entry point: nothing runs unless access is enabled and the
    /// credential matches
    pub fn execute_authorized(
        &self,
        credential: Option<&str>,
        batch: CommandBatch,
    ) -> Result<Vec<CommandResult>, CommandError> {
        self.authorize(credential)?;
        Ok(self.execute_batch(batch))
    }

    pub fn authorize(&self, credential: Option<&str>) -> Result<(), CommandError> {
        let settings = self.config.read().ai.clone();
        auth::authorize(&settings, credential).inspect_err(|e| {
            warn!("AI request refused: {}", e);
        })
    }

    pub fn stop_all(&self) -> Vec<(u8, DriverError)> {
        self.scheduler.stop_all()
    }

    pub fn status(&self) -> StatusSnapshot {
        self.scheduler.status()
    }

    fn activate_alias(&self, name: &str, duration: Option<&DurationSpec>) -> CommandResult {
        let resolved = self.resolver.resolve_alias(name)?;
        // Validated even when auto_off is false
        let parsed = parse_duration(duration)?;
        let hold = hold_for(&resolved, parsed);

        let activation = self.scheduler.activate(resolved.index, hold)?;
        info!(
            "▶️  {} (output {}) on for {:?}",
            name, resolved.index, activation.hold
        );

        Ok(CommandSuccess::ActivateAlias {
            alias: resolved.alias,
            index: resolved.index,
            auto_off: resolved.auto_off,
            duration: activation.hold,
        })
    }

    fn activate_group(&self, name: &str, duration: Option<&DurationSpec>) -> CommandResult {
        let group = self.resolver.resolve_group(name)?;
        let parsed = parse_duration(duration)?;

        let mut activated = Vec::new();
        let mut stopped = Vec::new();
        let mut failures = Vec::new();

        for member in group.members {
            match group.action {
                GroupAction::On => {
                    let hold = hold_for(&member, parsed);
                    match self.scheduler.activate(member.index, hold) {
                        Ok(activation) => activated.push(MemberActivation {
                            alias: member.alias,
                            index: member.index,
                            duration: activation.hold,
                        }),
                        Err(e) => failures.push(member_failure(member, e)),
                    }
                }
                GroupAction::Off => match self.scheduler.stop(member.index) {
                    Ok(was_active) => stopped.push(MemberStop {
                        alias: member.alias,
                        index: member.index,
                        was_active,
                    }),
                    Err(e) => failures.push(member_failure(member, e)),
                },
            }
        }

        if !group.skipped.is_empty() {
            warn!(
                "Group '{}': skipped {} unresolvable member(s)",
                name,
                group.skipped.len()
            );
        }
        info!(
            "▶️  Group '{}' {}: {} on, {} off, {} failed",
            name,
            group.action,
            activated.len(),
            stopped.len(),
            failures.len()
        );

        Ok(CommandSuccess::ActivateGroup {
            group: group.group,
            group_action: group.action,
            activated,
            stopped,
            skipped: group.skipped,
            failures,
            duration: Hold::For(parsed).capped(),
        })
    }

    /// Alias first, then group
    fn stop(&self, name: &str) -> CommandResult {
        match self.resolver.classify(name) {
            Some(TargetKind::Alias) => {
                let resolved = self.resolver.resolve_alias(name)?;
                let was_active = self.scheduler.stop(resolved.index)?;
                info!("⏹️  {} (output {}) stopped", name, resolved.index);
                Ok(CommandSuccess::Stop {
                    target: name.to_string(),
                    stopped: vec![MemberStop {
                        alias: resolved.alias,
                        index: resolved.index,
                        was_active,
                    }],
                    skipped: Vec::new(),
                    failures: Vec::new(),
                })
            }
            Some(TargetKind::Group) => {
                let group = self.resolver.resolve_group(name)?;
                let mut stopped = Vec::new();
                let mut failures = Vec::new();
                for member in group.members {
                    match self.scheduler.stop(member.index) {
                        Ok(was_active) => stopped.push(MemberStop {
                            alias: member.alias,
                            index: member.index,
                            was_active,
                        }),
                        Err(e) => failures.push(member_failure(member, e)),
                    }
                }
                info!("⏹️  Group '{}' stopped ({} outputs)", name, stopped.len());
                Ok(CommandSuccess::Stop {
                    target: name.to_string(),
                    stopped,
                    skipped: group.skipped,
                    failures,
                })
            }
            None => Err(CommandError::UnknownTarget(name.to_string())),
        }
    }
}

fn hold_for(alias: &ResolvedAlias, duration: std::time::Duration) -> Hold {
    if alias.auto_off {
        Hold::For(duration)
    } else {
        Hold::Indefinite
    }
}

fn member_failure(member: ResolvedAlias, error: DriverError) -> MemberFailure {
    warn!("Output {} ({}) failed: {}", member.index, member.alias, error);
    MemberFailure {
        alias: member.alias,
        index: member.index,
        error: error.to_string(),
    }
}
