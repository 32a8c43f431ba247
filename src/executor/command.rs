//! Wire shape of a command and of a command batch

use super::duration::DurationSpec;
use crate::error::CommandError;
use schemars::{schema::RootSchema, schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Operation requested by a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    ActivateAlias,
    ActivateGroup,
    Stop,
    Status,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::ActivateAlias => "activate_alias",
            Action::ActivateGroup => "activate_group",
            Action::Stop => "stop",
            Action::Status => "status",
        }
    }

    pub fn needs_target(&self) -> bool {
        !matches!(self, Action::Status)
    }
}

impl FromStr for Action {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "activate_alias" => Ok(Action::ActivateAlias),
            "activate_group" => Ok(Action::ActivateGroup),
            "stop" => Ok(Action::Stop),
            "status" => Ok(Action::Status),
            other => Err(CommandError::InvalidAction(other.to_string())),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{action, target?, duration?}`
///
/// `action` stays a plain string on the way in so an unknown action becomes a
/// per-command `InvalidAction` result instead of failing the whole batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Command {
    #[schemars(with = "Action")]
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<DurationSpec>,
}

impl Command {
    pub fn new(action: Action, target: Option<&str>, duration: Option<DurationSpec>) -> Self {
        Self {
            action: action.as_str().to_string(),
            target: target.map(str::to_string),
            duration,
        }
    }

    pub fn activate_alias(alias: &str, duration: Option<DurationSpec>) -> Self {
        Self::new(Action::ActivateAlias, Some(alias), duration)
    }

    pub fn activate_group(group: &str, duration: Option<DurationSpec>) -> Self {
        Self::new(Action::ActivateGroup, Some(group), duration)
    }

    pub fn stop(target: &str) -> Self {
        Self::new(Action::Stop, Some(target), None)
    }

    pub fn status() -> Self {
        Self::new(Action::Status, None, None)
    }

    pub fn parsed_action(&self) -> Result<Action, CommandError> {
        self.action.parse()
    }
}

/// One command or an ordered list of commands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum CommandBatch {
    Many(Vec<Command>),
    One(Command),
}

impl CommandBatch {
    pub fn into_vec(self) -> Vec<Command> {
        match self {
            CommandBatch::Many(commands) => commands,
            CommandBatch::One(command) => vec![command],
        }
    }
}

impl From<Command> for CommandBatch {
    fn from(command: Command) -> Self {
        CommandBatch::One(command)
    }
}

/// JSON schema handed to language-model clients
pub fn command_schema() -> RootSchema {
    schema_for!(CommandBatch)
}
