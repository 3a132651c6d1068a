//! Service controller
//!
//! Drives systemd through `systemctl`. Enable and start act on each unit
//! independently: one unit failing never stops the others.

use std::fmt;
use std::path::PathBuf;
use std::process::Output;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::application::{ApplicationError, ApplicationResult};
use crate::domain::render::hard_environment_files;
use crate::infrastructure::traits::{CommandRunner, FileSystem};
use crate::infrastructure::InfraError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Enable,
    Start,
}

impl fmt::Display for ControlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlAction::Enable => write!(f, "enable"),
            ControlAction::Start => write!(f, "start"),
        }
    }
}

/// Result of one action on one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitOutcome {
    pub unit: String,
    pub action: ControlAction,
    pub error: Option<String>,
}

impl UnitOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Installed / enabled / active state of one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitStatus {
    pub unit: String,
    pub installed: bool,
    pub enabled: String,
    pub active: String,
}

pub struct ServiceController {
    cmd: Arc<dyn CommandRunner>,
    fs: Arc<dyn FileSystem>,
    systemctl: String,
    unit_dir: PathBuf,
}

impl ServiceController {
    pub fn new(
        cmd: Arc<dyn CommandRunner>,
        fs: Arc<dyn FileSystem>,
        systemctl: String,
        unit_dir: PathBuf,
    ) -> Self {
        Self {
            cmd,
            fs,
            systemctl,
            unit_dir,
        }
    }

    /// `systemctl daemon-reload`
    #[instrument(level = "debug", skip(self))]
    pub fn reload(&self) -> ApplicationResult<()> {
        let output = self
            .cmd
            .run(&self.systemctl, &["daemon-reload"])
            .map_err(|e| ApplicationError::Reload(e.to_string()))?;
        if output.status.success() {
            Ok(())
        } else {
            Err(ApplicationError::Reload(failure_message(
                &self.systemctl,
                &output,
            )))
        }
    }

    pub fn enable(&self, units: &[String]) -> Vec<UnitOutcome> {
        units
            .iter()
            .map(|unit| self.act(ControlAction::Enable, unit, None))
            .collect()
    }

    /// Start each unit, skipping systemctl for units whose environment
    /// file is missing.
    pub fn start(&self, units: &[String]) -> Vec<UnitOutcome> {
        units
            .iter()
            .map(|unit| {
                let blocked = self.missing_environment_files(unit);
                let precheck = if blocked.is_empty() {
                    None
                } else {
                    let paths: Vec<String> =
                        blocked.iter().map(|p| p.display().to_string()).collect();
                    Some(format!("environment file not found: {}", paths.join(", ")))
                };
                self.act(ControlAction::Start, unit, precheck)
            })
            .collect()
    }

    pub fn status(&self, units: &[String]) -> Vec<UnitStatus> {
        units
            .iter()
            .map(|unit| UnitStatus {
                unit: unit.clone(),
                installed: self.fs.is_file(&self.unit_dir.join(unit)),
                enabled: self.query("is-enabled", unit),
                active: self.query("is-active", unit),
            })
            .collect()
    }

    fn act(&self, action: ControlAction, unit: &str, precheck: Option<String>) -> UnitOutcome {
        let error = match precheck {
            Some(msg) => Some(msg),
            None => {
                let verb = action.to_string();
                match self.cmd.run(&self.systemctl, &[verb.as_str(), unit]) {
                    Ok(output) if output.status.success() => None,
                    Ok(output) => Some(failure_message(&self.systemctl, &output)),
                    Err(e) => Some(format!("{}: {}", self.systemctl, e)),
                }
            }
        };
        debug!("act: {} {} -> {:?}", action, unit, error);
        UnitOutcome {
            unit: unit.to_string(),
            action,
            error,
        }
    }

    fn missing_environment_files(&self, unit: &str) -> Vec<PathBuf> {
        let path = self.unit_dir.join(unit);
        let Ok(text) = self.fs.read_to_string(&path) else {
            return Vec::new();
        };
        hard_environment_files(&text)
            .into_iter()
            .filter(|env| !self.fs.is_file(env))
            .collect()
    }

    fn query(&self, verb: &str, unit: &str) -> String {
        match self.cmd.run(&self.systemctl, &[verb, unit]) {
            Ok(output) => {
                let state = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if state.is_empty() {
                    "unknown".to_string()
                } else {
                    state
                }
            }
            Err(e) => {
                debug!("query: {} {} failed: {}", verb, unit, e);
                "unknown".to_string()
            }
        }
    }
}

fn failure_message(program: &str, output: &Output) -> String {
    match InfraError::command(program, output) {
        InfraError::Command { message, .. } => message,
        other => other.to_string(),
    }
}
