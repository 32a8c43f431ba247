//! Error taxonomy shared by every front-end
//!
//! Command-level failures are values, not faults: the executor turns each one
//! into a tagged result so that a bad member of a batch never aborts its
//! siblings. Application plumbing (file IO, startup) uses `anyhow` instead.

use serde::Serialize;
use thiserror::Error;

/// Failure reported by an output driver for a single physical index
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DriverError {
    #[error("output {index}: {message}")]
    Io { index: u8, message: String },

    #[error("output {index} rejected by driver: {reason}")]
    Rejected { index: u8, reason: String },

    #[error("driver release failed: {0}")]
    Release(String),
}

/// Tagged error returned for one command
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CommandError {
    #[error("unknown alias '{0}'")]
    UnknownAlias(String),

    #[error("unknown group '{0}'")]
    UnknownGroup(String),

    #[error("'{0}' is neither an alias nor a group")]
    UnknownTarget(String),

    #[error("alias '{alias}' is not mapped to a usable output (slot '{slot}')")]
    Unmapped { alias: String, slot: String },

    #[error("invalid duration: {0}")]
    InvalidDuration(String),

    #[error("invalid action '{0}'")]
    InvalidAction(String),

    #[error("action '{0}' requires a target")]
    MissingTarget(String),

    #[error("invalid or missing credential")]
    Unauthorized,

    #[error("AI access is disabled")]
    Disabled,

    #[error(transparent)]
    Driver(#[from] DriverError),
}

impl CommandError {
    /// Stable tag used on the wire and in logs
    pub fn tag(&self) -> &'static str {
        match self {
            Self::UnknownAlias(_) => "UnknownAlias",
            Self::UnknownGroup(_) => "UnknownGroup",
            Self::UnknownTarget(_) => "UnknownTarget",
            Self::Unmapped { .. } => "Unmapped",
            Self::InvalidDuration(_) => "InvalidDuration",
            Self::InvalidAction(_) => "InvalidAction",
            Self::MissingTarget(_) => "MissingTarget",
            Self::Unauthorized => "Unauthorized",
            Self::Disabled => "Disabled",
            Self::Driver(_) => "DriverFailure",
        }
    }
}

/// Validation failure for an administrative config mutation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("unknown slot '{0}'")]
    UnknownSlot(String),

    #[error("unknown alias '{0}'")]
    UnknownAlias(String),

    #[error("unknown group '{0}'")]
    UnknownGroup(String),

    #[error("group '{group}' references unknown alias '{member}'")]
    UnknownMember { group: String, member: String },

    #[error("output index {index} is outside the allowed range {min}..={max}")]
    IndexOutOfRange { index: u8, min: u8, max: u8 },
}

impl ConfigError {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::EmptyName => "EmptyName",
            Self::MissingField(_) => "MissingField",
            Self::UnknownSlot(_) => "UnknownSlot",
            Self::UnknownAlias(_) => "UnknownAlias",
            Self::UnknownGroup(_) => "UnknownGroup",
            Self::UnknownMember { .. } => "UnknownMember",
            Self::IndexOutOfRange { .. } => "IndexOutOfRange",
        }
    }
}

/// Wire shape of an error: `{"ok": false, "error": <tag>, "message": ...}`
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorBody {
    pub ok: bool,
    pub error: String,
    pub message: String,
}

impl From<&CommandError> for ErrorBody {
    fn from(e: &CommandError) -> Self {
        Self {
            ok: false,
            error: e.tag().to_string(),
            message: e.to_string(),
        }
    }
}

impl From<&ConfigError> for ErrorBody {
    fn from(e: &ConfigError) -> Self {
        Self {
            ok: false,
            error: e.tag().to_string(),
            message: e.to_string(),
        }
    }
}
