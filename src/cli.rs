//! Interactive console
//!
//! Line syntax:
//! - `name(duration)` or `name duration`: activate an alias or a group
//! - `name`: same, with the default duration
//! - `stop [name]`: stop one target, or everything
//! - `status`, `reload`, `help`, `quit`/`exit`

use crate::config::ConfigManager;
use crate::executor::{Command, CommandExecutor, CommandResult, CommandSuccess, DurationSpec};
use crate::resolver::TargetKind;
use crate::scheduler::{Hold, Remaining, StatusSnapshot};
use anyhow::Result;
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, warn};

pub const PROMPT: &str = "pinrun> ";

/// One parsed console line
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Activate {
        name: String,
        duration: Option<DurationSpec>,
    },
    Stop(Option<String>),
    Status,
    Reload,
    Help,
    Quit,
    Empty,
}

/// Parse a console line. Errors carry a usage hint.
pub fn parse_line(line: &str) -> Result<ConsoleCommand, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(ConsoleCommand::Empty);
    }

    // Call syntax wins over keywords, so `stop(2)` drives a target named "stop"
    if let Some(open) = line.find('(') {
        let inner = line[open + 1..]
            .strip_suffix(')')
            .ok_or_else(|| format!("missing ')' in '{line}'; try name(duration)"))?;
        let name = line[..open].trim();
        if name.is_empty() {
            return Err("missing name before '('".to_string());
        }
        return Ok(ConsoleCommand::Activate {
            name: name.to_string(),
            duration: duration_arg(inner),
        });
    }

    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };

    let command = match (head.to_ascii_lowercase().as_str(), rest.is_empty()) {
        ("quit" | "exit", true) => ConsoleCommand::Quit,
        ("help" | "?", true) => ConsoleCommand::Help,
        ("status", true) => ConsoleCommand::Status,
        ("reload", true) => ConsoleCommand::Reload,
        ("stop", true) => ConsoleCommand::Stop(None),
        ("stop", false) => ConsoleCommand::Stop(Some(rest.to_string())),
        _ => ConsoleCommand::Activate {
            name: head.to_string(),
            duration: duration_arg(rest),
        },
    };
    Ok(command)
}

fn duration_arg(text: &str) -> Option<DurationSpec> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Some(match text.parse::<f64>() {
        Ok(secs) => DurationSpec::Seconds(secs),
        Err(_) => DurationSpec::Text(text.to_string()),
    })
}

/// Whether the loop should keep reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct Console {
    executor: Arc<CommandExecutor>,
    manager: Arc<ConfigManager>,
    runtime: Handle,
}

impl Console {
    pub fn new(executor: Arc<CommandExecutor>, manager: Arc<ConfigManager>, runtime: Handle) -> Self {
        Self {
            executor,
            manager,
            runtime,
        }
    }

    /// Blocking read loop; run it on a blocking thread
    pub fn run(self) -> Result<()> {
        let mut rl = DefaultEditor::new()?;
        println!(
            "{}",
            "pinrun console ready. Type 'help' for commands.".bold().cyan()
        );

        loop {
            match rl.readline(PROMPT) {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        let _ = rl.add_history_entry(line.as_str());
                    }
                    match parse_line(&line) {
                        Ok(command) => {
                            if self.handle(command) == Flow::Quit {
                                break;
                            }
                        }
                        Err(hint) => println!("{} {}", "?".yellow(), hint),
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(e) => {
                    warn!("Console read failed: {}", e);
                    break;
                }
            }
        }

        debug!("Console closed");
        Ok(())
    }

    pub fn handle(&self, command: ConsoleCommand) -> Flow {
        match command {
            ConsoleCommand::Empty => {}
            ConsoleCommand::Quit => return Flow::Quit,
            ConsoleCommand::Help => print_help(),
            ConsoleCommand::Status => println!("{}", describe_status(&self.executor.status())),
            ConsoleCommand::Reload => match self.runtime.block_on(self.manager.reload()) {
                Ok(true) => println!("{}", "Configuration reloaded".green()),
                Ok(false) => println!("Configuration unchanged"),
                Err(e) => println!("{} {:#}", "Reload failed:".red(), e),
            },
            ConsoleCommand::Stop(None) => {
                let failures = self.executor.stop_all();
                if failures.is_empty() {
                    println!("{}", "All outputs stopped".green());
                } else {
                    for (index, e) in failures {
                        println!("{} output {}: {}", "✗".red(), index, e);
                    }
                }
            }
            ConsoleCommand::Stop(Some(name)) => {
                println!("{}", describe(&self.executor.execute(&Command::stop(&name))));
            }
            ConsoleCommand::Activate { name, duration } => {
                println!("{}", describe(&self.activate(&name, duration)));
            }
        }
        Flow::Continue
    }

    fn activate(&self, name: &str, duration: Option<DurationSpec>) -> CommandResult {
        let command = match self.executor.resolver().classify(name) {
            Some(TargetKind::Group) => Command::activate_group(name, duration),
            // Unknown names go down the alias path and come back as UnknownAlias
            Some(TargetKind::Alias) | None => Command::activate_alias(name, duration),
        };
        self.executor.execute(&command)
    }
}

fn print_help() {
    println!("{}", "Commands:".bold());
    println!("  {}   activate an alias or group", "name(duration)".cyan());
    println!("  {}    same, e.g. 'pump 2 min'", "name duration".cyan());
    println!("  {}             activate with the default duration", "name".cyan());
    println!("  {}      stop one target, or everything", "stop [name]".cyan());
    println!("  {}           list active outputs", "status".cyan());
    println!("  {}           re-read the configuration file", "reload".cyan());
    println!("  {}        leave the console", "quit, exit".cyan());
}

fn describe_hold(hold: &Hold) -> String {
    match hold {
        Hold::For(d) => format!("{:.1}s", d.as_secs_f64()),
        Hold::Indefinite => "until stopped".to_string(),
    }
}

/// Human-readable summary of a command result
pub fn describe(result: &CommandResult) -> String {
    let success = match result {
        Err(e) => return format!("{} {}", format!("✗ {}:", e.tag()).red(), e),
        Ok(success) => success,
    };

    let mut out = match success {
        CommandSuccess::ActivateAlias {
            alias,
            index,
            duration,
            ..
        } => format!(
            "{} {} (output {}) on, {}",
            "✓".green(),
            alias.bold(),
            index,
            describe_hold(duration)
        ),
        CommandSuccess::ActivateGroup {
            group,
            group_action,
            activated,
            stopped,
            ..
        } => format!(
            "{} group {} {}: {} on, {} off",
            "✓".green(),
            group.bold(),
            group_action,
            activated.len(),
            stopped.len()
        ),
        CommandSuccess::Stop {
            target, stopped, ..
        } => format!(
            "{} {} stopped ({} output(s))",
            "✓".green(),
            target.bold(),
            stopped.len()
        ),
        CommandSuccess::Status { active } => describe_status(active),
    };

    let (skipped, failures) = match success {
        CommandSuccess::ActivateGroup {
            skipped, failures, ..
        }
        | CommandSuccess::Stop {
            skipped, failures, ..
        } => (skipped.as_slice(), failures.as_slice()),
        _ => (&[][..], &[][..]),
    };
    for s in skipped {
        out.push_str(&format!("\n  {} {} skipped: {}", "-".yellow(), s.alias, s.reason));
    }
    for f in failures {
        out.push_str(&format!("\n  {} {} (output {}): {}", "✗".red(), f.alias, f.index, f.error));
    }
    out
}

pub fn describe_status(active: &StatusSnapshot) -> String {
    if active.is_empty() {
        return "No active outputs".dimmed().to_string();
    }
    let mut out = format!("{}", "Active outputs:".bold());
    for (index, remaining) in active {
        let left = match remaining {
            Remaining::Seconds(s) => format!("{s:.1}s left"),
            Remaining::Indefinite => "indefinite".to_string(),
        };
        out.push_str(&format!("\n  {:>2}  {}", index, left));
    }
    out
}
