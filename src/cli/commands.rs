//! Command handlers

use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};

use clap::CommandFactory;
use clap_complete::generate;
use tracing::{debug, instrument};

use crate::application::services::{
    ControlAction, DeployOptions, DeployReport, RawDeploymentInput, RestoreOutcome, StepStatus,
    UnitChange, UnitOutcome, ValidatedConfig,
};
use crate::application::ApplicationError;
use crate::cli::args::{Cli, Commands, ConfigCommands, DeployInput, RoleArg, UnitTarget};
use crate::cli::output;
use crate::cli::{CliError, CliResult};
use crate::config::{global_config_path, project_config_path, Settings};
use crate::domain::{render_role, unit_name, DomainError, ServiceRole};
use crate::infrastructure::di::ServiceContainer;
use crate::infrastructure::InfraError;

/// Characters of the content digest shown in reports.
const DIGEST_LEN: usize = 12;

pub fn execute_command(cli: &Cli) -> CliResult<()> {
    match &cli.command {
        Commands::Deploy {
            input,
            build,
            enable,
            start,
        } => cmd_deploy(
            cli,
            input,
            DeployOptions {
                build: *build,
                enable: *enable,
                start: *start,
            },
        ),
        Commands::Render { input, role } => cmd_render(cli, input, *role),
        Commands::Enable { target } => cmd_control(cli, target, ControlAction::Enable),
        Commands::Start { target } => cmd_control(cli, target, ControlAction::Start),
        Commands::Status { project_dir } => cmd_status(cli, project_dir.as_deref()),
        Commands::Rollback { project_dir } => cmd_rollback(cli, project_dir.as_deref()),
        Commands::Config { command } => cmd_config(command),
        Commands::Completion { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
    }
}

// ============================================================
// deploy / render
// ============================================================

#[instrument(skip(cli))]
fn cmd_deploy(cli: &Cli, input: &DeployInput, options: DeployOptions) -> CliResult<()> {
    let container = container_for(cli, input.project_dir.as_deref().map(Path::new))?;
    let validated = collect(&container, input)?;

    let prefix = validated.config.unit_prefix.clone();
    output::header(&format!("Deploying {prefix}"));
    let report = container.deploy_service().deploy(validated, options)?;
    print_deploy_report(&report);

    if report.is_success() {
        output::success(&format!("{prefix} deployed"));
        return Ok(());
    }
    let failed: Vec<&str> = report.failed_units().map(|u| u.name.as_str()).collect();
    let reason = match &report.reload_error {
        Some(e) => format!("systemd reload failed: {e}"),
        None => format!("{} unit(s) failed: {}", failed.len(), failed.join(", ")),
    };
    Err(CliError::PartialFailure(reason))
}

#[instrument(skip(cli))]
fn cmd_render(cli: &Cli, input: &DeployInput, role: Option<RoleArg>) -> CliResult<()> {
    let container = container_for(cli, input.project_dir.as_deref().map(Path::new))?;
    let validated = collect(&container, input)?;

    let roles = selected_roles(role);
    for (i, role) in roles.iter().enumerate() {
        let rendered = render_role(&validated.config, *role);
        for w in &rendered.warnings {
            output::warning(w);
        }
        if roles.len() > 1 {
            if i > 0 {
                output::info(&"");
            }
            output::info(&format!("# {}", rendered.unit.name));
        }
        print!("{}", rendered.text);
    }
    Ok(())
}

fn collect(container: &ServiceContainer, input: &DeployInput) -> CliResult<ValidatedConfig> {
    let cwd = std::env::current_dir().map_err(|e| InfraError::io("current directory", e))?;
    let interactive = !input.non_interactive && io::stdin().is_terminal();
    debug!("collect: interactive={}", interactive);

    let validated = container.collector().collect(
        &container.validator(),
        raw_input(input),
        &cwd,
        interactive,
    )?;
    for w in &validated.warnings {
        output::diagnostic(w);
    }
    Ok(validated)
}

fn raw_input(input: &DeployInput) -> RawDeploymentInput {
    RawDeploymentInput {
        project_dir: input.project_dir.clone(),
        service_user: input.service_user.clone(),
        workers: input.workers.clone(),
        concurrency: input.concurrency.clone(),
        venv_path: input.venv.clone(),
        env_file: input.env_file.clone(),
        app_module: input.app_module.clone(),
    }
}

fn print_deploy_report(report: &DeployReport) {
    for step in &report.build {
        match &step.status {
            StepStatus::Ran => output::success_detail(&format!("build: {}", step.step)),
            StepStatus::Skipped(reason) => {
                output::detail(&format!("build: {} skipped ({reason})", step.step))
            }
        }
    }

    for dir in report.apply.runtime_dirs.iter().filter(|d| d.created) {
        output::action("Created", &dir.path.display());
    }

    for unit in &report.units {
        let written = report.apply.units.iter().find(|w| w.name == unit.name);
        if unit.failed() {
            output::failure(&format!(
                "{} ({}): {}",
                unit.name,
                unit.state,
                unit.errors.join("; ")
            ));
            continue;
        }
        let change = unit
            .change
            .as_ref()
            .map(UnitChange::to_string)
            .unwrap_or_default();
        let digest = written
            .map(|w| &w.digest[..DIGEST_LEN.min(w.digest.len())])
            .unwrap_or_default();
        output::success_detail(&format!(
            "{} {} [{}] {}",
            unit.path.display(),
            change,
            digest,
            unit.state
        ));
        if let Some(backup) = written.and_then(|w| w.backup.as_ref()) {
            output::detail(&format!("previous version kept at {}", backup.display()));
        }
    }

    for w in &report.warnings {
        output::diagnostic(w);
    }
    if let Some(e) = &report.reload_error {
        output::error(&format!("systemd reload failed, units not enabled or started: {e}"));
    }
}

// ============================================================
// enable / start / status / rollback
// ============================================================

#[instrument(skip(cli))]
fn cmd_control(cli: &Cli, target: &UnitTarget, action: ControlAction) -> CliResult<()> {
    let root = project_root(target.project_dir.as_deref())?;
    let container = container_for(cli, Some(&root))?;
    let units = installed_units(&container, &root, target.role)?;

    let controller = container.controller();
    let outcomes = match action {
        ControlAction::Enable => controller.enable(&units),
        ControlAction::Start => controller.start(&units),
    };
    report_outcomes(&outcomes)
}

fn report_outcomes(outcomes: &[UnitOutcome]) -> CliResult<()> {
    let mut failed = Vec::new();
    for outcome in outcomes {
        match &outcome.error {
            None => output::success_detail(&format!("{} {}", outcome.action, outcome.unit)),
            Some(e) => {
                output::failure(&format!("{} {}: {}", outcome.action, outcome.unit, e));
                failed.push(outcome.unit.as_str());
            }
        }
    }
    if failed.is_empty() {
        Ok(())
    } else {
        Err(CliError::PartialFailure(format!(
            "{} unit(s) failed: {}",
            failed.len(),
            failed.join(", ")
        )))
    }
}

#[instrument(skip(cli))]
fn cmd_status(cli: &Cli, project_dir: Option<&Path>) -> CliResult<()> {
    let root = project_root(project_dir)?;
    let container = container_for(cli, Some(&root))?;
    let units = project_units(&container.settings, &root, None);

    output::header(&format!("Units in {}", container.settings.unit_dir.display()));
    for status in container.controller().status(&units) {
        let line = format!(
            "{:<32} enabled={:<10} active={}",
            status.unit, status.enabled, status.active
        );
        if status.installed {
            output::success_detail(&line);
        } else {
            output::failure(&format!("{} (not installed)", status.unit));
        }
    }
    Ok(())
}

#[instrument(skip(cli))]
fn cmd_rollback(cli: &Cli, project_dir: Option<&Path>) -> CliResult<()> {
    let root = project_root(project_dir)?;
    let container = container_for(cli, Some(&root))?;
    let units = project_units(&container.settings, &root, None);

    let outcomes = container.applier().restore_previous(&units)?;
    let mut restored = 0;
    for outcome in &outcomes {
        match outcome {
            RestoreOutcome::Restored { path, .. } => {
                restored += 1;
                output::success_detail(&format!("restored {}", path.display()));
            }
            RestoreOutcome::NoBackup { unit } => {
                output::detail(&format!("{unit}: no previous version"));
            }
        }
    }
    if restored == 0 {
        output::warning(&"nothing to roll back");
        return Ok(());
    }
    container.controller().reload()?;
    output::success(&format!("rolled back {restored} unit(s)"));
    Ok(())
}

// ============================================================
// config
// ============================================================

fn cmd_config(command: &ConfigCommands) -> CliResult<()> {
    match command {
        ConfigCommands::Show { project_dir } => {
            let root = match project_dir {
                Some(dir) => Some(project_root(Some(dir.as_path()))?),
                None => std::env::current_dir().ok(),
            };
            let settings = Settings::load(root.as_deref())?;
            print!("{}", settings.to_toml()?);
            Ok(())
        }
        ConfigCommands::Path => {
            match global_config_path() {
                Some(path) => output::info(&format!("global: {}", describe(&path))),
                None => output::info(&"global: (no home directory)"),
            }
            let cwd = std::env::current_dir().map_err(|e| InfraError::io("current directory", e))?;
            output::info(&format!("project: {}", describe(&project_config_path(&cwd))));
            Ok(())
        }
        ConfigCommands::Init { global } => {
            let path = if *global {
                global_config_path()
                    .ok_or_else(|| CliError::Usage("cannot determine config directory".into()))?
            } else {
                let cwd =
                    std::env::current_dir().map_err(|e| InfraError::io("current directory", e))?;
                project_config_path(&cwd)
            };
            if path.exists() {
                return Err(CliError::Usage(format!(
                    "config already exists: {}",
                    path.display()
                )));
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| InfraError::io(format!("create {}", parent.display()), e))?;
            }
            std::fs::write(&path, Settings::template())
                .map_err(|e| InfraError::io(format!("write {}", path.display()), e))?;
            output::action("Created", &path.display());
            Ok(())
        }
    }
}

fn describe(path: &Path) -> String {
    if path.exists() {
        path.display().to_string()
    } else {
        format!("{} (not found)", path.display())
    }
}

// ============================================================
// helpers
// ============================================================

fn container_for(cli: &Cli, project_dir: Option<&Path>) -> CliResult<ServiceContainer> {
    let mut settings = match project_dir {
        Some(dir) => Settings::load(Some(dir))?,
        None => {
            let cwd = std::env::current_dir().ok();
            Settings::load(cwd.as_deref())?
        }
    };
    if let Some(dir) = &cli.unit_dir {
        settings.unit_dir = dir.clone();
    }
    debug!("container_for: unit_dir={}", settings.unit_dir.display());
    Ok(ServiceContainer::new(settings))
}

fn project_root(dir: Option<&Path>) -> CliResult<PathBuf> {
    let dir = match dir {
        Some(d) => d.to_path_buf(),
        None => std::env::current_dir().map_err(|e| InfraError::io("current directory", e))?,
    };
    if !dir.is_dir() {
        return Err(ApplicationError::from(DomainError::DirectoryNotFound(dir)).into());
    }
    dir.canonicalize()
        .map_err(|e| InfraError::io(format!("canonicalize {}", dir.display()), e).into())
}

fn selected_roles(role: Option<RoleArg>) -> Vec<ServiceRole> {
    match role {
        Some(r) => vec![r.into()],
        None => ServiceRole::ALL.to_vec(),
    }
}

fn project_units(settings: &Settings, root: &Path, role: Option<RoleArg>) -> Vec<String> {
    let prefix = settings.unit_prefix(root);
    selected_roles(role)
        .into_iter()
        .map(|r| unit_name(&prefix, r))
        .collect()
}

fn installed_units(
    container: &ServiceContainer,
    root: &Path,
    role: Option<RoleArg>,
) -> CliResult<Vec<String>> {
    let applier = container.applier();
    let units: Vec<String> = project_units(&container.settings, root, role)
        .into_iter()
        .filter(|u| container.fs.is_file(&applier.unit_path(u)))
        .collect();
    if units.is_empty() {
        return Err(ApplicationError::NoUnits(applier.unit_dir().to_path_buf()).into());
    }
    Ok(units)
}
