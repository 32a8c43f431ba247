//! pinrun - drive GPIO output lines by alias or group
//!
//! Aliases and groups name physical outputs; activations hold an output HIGH
//! for a duration (or until stopped). The same executor serves the console,
//! the REST API and an authorized AI endpoint.

pub mod api;
pub mod cli;
pub mod config;
pub mod drivers;
pub mod error;
pub mod executor;
pub mod paths;
pub mod resolver;
pub mod scheduler;
