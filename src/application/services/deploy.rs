//! Deployment pipeline
//!
//! Validated config → (build) → render → apply → reload → (enable) → (start).
//!
//! Build, privilege and I/O errors abort the run. A failed reload stops
//! before enable/start but still returns the report of what was written.
//! Enable/start failures are per unit and collected in the report.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::{info, instrument, warn};

use crate::application::services::applier::{ApplyReport, FilesystemApplier, UnitChange};
use crate::application::services::build::{BuildRunner, BuildStepReport};
use crate::application::services::controller::{ServiceController, UnitOutcome};
use crate::application::services::validator::ValidatedConfig;
use crate::application::ApplicationResult;
use crate::domain::{render_all, DeploymentConfig, Diagnostic, UnitState};

/// Optional pipeline steps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeployOptions {
    pub build: bool,
    pub enable: bool,
    pub start: bool,
}

/// Final state of one unit after a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitReport {
    pub name: String,
    pub path: PathBuf,
    pub state: UnitState,
    pub change: Option<UnitChange>,
    pub errors: Vec<String>,
}

impl UnitReport {
    pub fn failed(&self) -> bool {
        !self.errors.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct DeployReport {
    pub config: DeploymentConfig,
    pub warnings: Vec<Diagnostic>,
    pub build: Vec<BuildStepReport>,
    pub apply: ApplyReport,
    pub reload_error: Option<String>,
    pub outcomes: Vec<UnitOutcome>,
    pub units: Vec<UnitReport>,
}

impl DeployReport {
    pub fn failed_units(&self) -> impl Iterator<Item = &UnitReport> {
        self.units.iter().filter(|u| u.failed())
    }

    pub fn is_success(&self) -> bool {
        self.reload_error.is_none() && self.failed_units().next().is_none()
    }
}

pub struct DeployService {
    applier: FilesystemApplier,
    controller: ServiceController,
    builder: BuildRunner,
}

impl DeployService {
    pub fn new(
        applier: FilesystemApplier,
        controller: ServiceController,
        builder: BuildRunner,
    ) -> Self {
        Self {
            applier,
            controller,
            builder,
        }
    }

    #[instrument(level = "debug", skip_all, fields(prefix = %validated.config.unit_prefix))]
    pub fn deploy(
        &self,
        validated: ValidatedConfig,
        options: DeployOptions,
    ) -> ApplicationResult<DeployReport> {
        let ValidatedConfig {
            config,
            mut warnings,
        } = validated;

        self.applier.ensure_privileged()?;

        let build = if options.build {
            self.builder.run(&config)?
        } else {
            Vec::new()
        };

        let rendered = render_all(&config);
        let mut states: BTreeMap<String, UnitState> = BTreeMap::new();
        for unit in &rendered {
            let state = UnitState::default().advance(&unit.unit.name, UnitState::Rendered)?;
            states.insert(unit.unit.name.clone(), state);
        }

        let apply = self.applier.apply(&config, &rendered)?;
        warnings.extend(apply.warnings.iter().cloned());

        let mut errors: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for written in &apply.units {
            match &written.change {
                UnitChange::Failed(msg) => {
                    errors.entry(written.name.clone()).or_default().push(msg.clone());
                }
                _ => advance(&mut states, &written.name, UnitState::Written)?,
            }
        }

        let written: Vec<String> = apply
            .units
            .iter()
            .filter(|u| u.change.is_written())
            .map(|u| u.name.clone())
            .collect();

        let mut outcomes = Vec::new();
        let reload_error = match self.controller.reload() {
            Ok(()) => None,
            Err(e) => {
                warn!("deploy: {}", e);
                Some(e.to_string())
            }
        };

        if reload_error.is_none() {
            if options.enable {
                for outcome in self.controller.enable(&written) {
                    record(&mut states, &mut errors, &outcome, UnitState::Enabled)?;
                    outcomes.push(outcome);
                }
            }
            if options.start {
                for outcome in self.controller.start(&written) {
                    record(&mut states, &mut errors, &outcome, UnitState::Started)?;
                    outcomes.push(outcome);
                }
            }
        }

        let units = rendered
            .iter()
            .map(|r| {
                let name = &r.unit.name;
                UnitReport {
                    name: name.clone(),
                    path: self.applier.unit_path(name),
                    state: states.get(name).copied().unwrap_or_default(),
                    change: apply
                        .units
                        .iter()
                        .find(|w| &w.name == name)
                        .map(|w| w.change.clone()),
                    errors: errors.remove(name).unwrap_or_default(),
                }
            })
            .collect();

        let report = DeployReport {
            config,
            warnings,
            build,
            apply,
            reload_error,
            outcomes,
            units,
        };
        info!(
            "deploy: {} units, success={}",
            report.units.len(),
            report.is_success()
        );
        Ok(report)
    }
}

fn advance(
    states: &mut BTreeMap<String, UnitState>,
    unit: &str,
    next: UnitState,
) -> ApplicationResult<()> {
    let state = states.entry(unit.to_string()).or_default();
    *state = state.advance(unit, next)?;
    Ok(())
}

fn record(
    states: &mut BTreeMap<String, UnitState>,
    errors: &mut BTreeMap<String, Vec<String>>,
    outcome: &UnitOutcome,
    next: UnitState,
) -> ApplicationResult<()> {
    match &outcome.error {
        None => advance(states, &outcome.unit, next),
        Some(msg) => {
            errors
                .entry(outcome.unit.clone())
                .or_default()
                .push(format!("{}: {}", outcome.action, msg));
            Ok(())
        }
    }
}
