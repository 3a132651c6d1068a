//! Unit file rendering
//!
//! Pure functions from a [`DeploymentConfig`] to unit text. The same input
//! always produces byte-identical output: no clock, no host lookups, no
//! unordered collections.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::domain::{
    DeploymentConfig, EnvFileRef, RenderedUnit, ServiceRole, ServiceUnit,
};

/// Marker written on the first line of every generated unit.
pub const GENERATED_MARKER: &str = "# Generated by unitsmith";

/// Derive the service definition of `role` from `config`.
pub fn build_unit(config: &DeploymentConfig, role: ServiceRole) -> (ServiceUnit, Vec<String>) {
    let mut warnings = Vec::new();

    let environment_file = if config.role_uses_env_file(role) {
        match &config.env_file {
            Some(env) => Some(env.clone()),
            None => {
                warnings.push(format!(
                    "{} unit expects an environment file but none is configured",
                    role
                ));
                None
            }
        }
    } else {
        None
    };

    let opts = &config.options;
    let requires: Vec<String> = [&opts.database_unit, &opts.queue_unit]
        .into_iter()
        .filter(|u| !u.is_empty())
        .cloned()
        .collect();

    let unit = ServiceUnit {
        name: config.unit_name(role),
        role,
        description: format!("{} {}", config.unit_prefix, role.description()),
        exec_command: exec_command(config, role),
        restart_policy: opts.restart,
        restart_sec: opts.restart_sec,
        working_dir: config.project_dir.clone(),
        environment_file,
        user: config.service_user.name.clone(),
        group: config.service_user.group.clone(),
        requires,
        read_write_paths: vec![
            config.runtime.log.clone(),
            config.runtime.media.clone(),
            config.runtime.static_root.clone(),
        ],
        protect_home: !is_under_home(&config.project_dir),
    };
    (unit, warnings)
}

/// Ordered argv of the role's start command.
pub fn exec_command(config: &DeploymentConfig, role: ServiceRole) -> Vec<String> {
    let opts = &config.options;
    let log = &config.runtime.log;
    let mut argv = Vec::new();
    match role {
        ServiceRole::Web => {
            argv.push(path_str(&config.venv_bin("gunicorn")));
            argv.push(format!(
                "{}.{}:application",
                config.app_module,
                config.entry_point.module_name()
            ));
            argv.push("--workers".to_string());
            argv.push(config.gunicorn_workers.to_string());
            if let Some(class) = &opts.worker_class {
                argv.push("--worker-class".to_string());
                argv.push(class.clone());
            }
            argv.push("--bind".to_string());
            argv.push(opts.bind.clone());
            argv.push("--access-logfile".to_string());
            argv.push(path_str(&log.join("gunicorn-access.log")));
            argv.push("--error-logfile".to_string());
            argv.push(path_str(&log.join("gunicorn-error.log")));
        }
        ServiceRole::Worker => {
            argv.push(path_str(&config.venv_bin("celery")));
            argv.push("-A".to_string());
            argv.push(config.app_module.clone());
            argv.push("worker".to_string());
            argv.push(format!("--loglevel={}", opts.log_level));
            argv.push(format!("--concurrency={}", config.celery_concurrency));
            argv.push(format!(
                "--logfile={}",
                path_str(&log.join("celery-worker.log"))
            ));
        }
        ServiceRole::Scheduler => {
            argv.push(path_str(&config.venv_bin("celery")));
            argv.push("-A".to_string());
            argv.push(config.app_module.clone());
            argv.push("beat".to_string());
            argv.push(format!("--loglevel={}", opts.log_level));
            if let Some(scheduler) = &opts.beat_scheduler {
                argv.push("--scheduler".to_string());
                argv.push(scheduler.clone());
            }
            argv.push(format!(
                "--logfile={}",
                path_str(&log.join("celery-beat.log"))
            ));
        }
    }
    argv
}

/// Render a service definition to unit file text.
pub fn render_unit(unit: &ServiceUnit) -> String {
    let mut out = String::new();
    // writeln! into a String cannot fail
    let _ = writeln!(out, "{}", GENERATED_MARKER);
    let _ = writeln!(out, "[Unit]");
    let _ = writeln!(out, "Description={}", unit.description);
    let mut after = vec!["network.target".to_string()];
    after.extend(unit.requires.iter().cloned());
    let _ = writeln!(out, "After={}", after.join(" "));
    if !unit.requires.is_empty() {
        let _ = writeln!(out, "Requires={}", unit.requires.join(" "));
    }
    out.push('\n');

    let _ = writeln!(out, "[Service]");
    let _ = writeln!(out, "Type=simple");
    let _ = writeln!(out, "User={}", unit.user);
    let _ = writeln!(out, "Group={}", unit.group);
    let _ = writeln!(
        out,
        "WorkingDirectory={}",
        escape_specifiers(&path_str(&unit.working_dir))
    );
    if let Some(env) = &unit.environment_file {
        let _ = writeln!(out, "{}", environment_file_line(env));
    }
    let exec: Vec<String> = unit.exec_command.iter().map(|a| quote_arg(a)).collect();
    let _ = writeln!(out, "ExecStart={}", exec.join(" "));
    let _ = writeln!(out, "Restart={}", unit.restart_policy.as_str());
    let _ = writeln!(out, "RestartSec={}", unit.restart_sec);
    out.push('\n');

    let _ = writeln!(out, "# Process isolation");
    let _ = writeln!(out, "NoNewPrivileges=yes");
    let _ = writeln!(out, "PrivateTmp=yes");
    let _ = writeln!(out, "ProtectSystem=strict");
    if unit.protect_home {
        let _ = writeln!(out, "ProtectHome=yes");
    }
    let paths: Vec<String> = unit
        .read_write_paths
        .iter()
        .map(|p| quote_path(&path_str(p)))
        .collect();
    let _ = writeln!(out, "ReadWritePaths={}", paths.join(" "));
    out.push('\n');

    let _ = writeln!(out, "# Logging");
    let _ = writeln!(out, "StandardOutput=journal");
    let _ = writeln!(out, "StandardError=journal");
    let _ = writeln!(
        out,
        "SyslogIdentifier={}",
        unit.name.trim_end_matches(".service")
    );
    out.push('\n');

    let _ = writeln!(out, "[Install]");
    let _ = writeln!(out, "WantedBy=multi-user.target");
    out
}

/// Build and render the unit of one role.
pub fn render_role(config: &DeploymentConfig, role: ServiceRole) -> RenderedUnit {
    let (unit, warnings) = build_unit(config, role);
    let text = render_unit(&unit);
    RenderedUnit {
        unit,
        text,
        warnings,
    }
}

/// Render the units of all roles, in [`ServiceRole::ALL`] order.
pub fn render_all(config: &DeploymentConfig) -> Vec<RenderedUnit> {
    ServiceRole::ALL
        .iter()
        .map(|role| render_role(config, *role))
        .collect()
}

fn environment_file_line(env: &EnvFileRef) -> String {
    let prefix = if env.is_hard() { "" } else { "-" };
    format!(
        "EnvironmentFile={}{}",
        prefix,
        escape_specifiers(&path_str(&env.path))
    )
}

/// Environment files a unit text depends on without the `-` prefix.
pub fn hard_environment_files(unit_text: &str) -> Vec<PathBuf> {
    unit_text
        .lines()
        .filter_map(|line| line.trim().strip_prefix("EnvironmentFile="))
        .map(str::trim)
        .filter(|value| !value.is_empty() && !value.starts_with('-'))
        .map(|value| PathBuf::from(value.replace("%%", "%")))
        .collect()
}

/// Quote one argument for systemd command lines.
///
/// `%` and `$` are doubled so systemd does not expand them.
pub fn quote_arg(arg: &str) -> String {
    quote_escaped(escape_specifiers(arg).replace('$', "$$"))
}

/// Quote one entry of a path list such as `ReadWritePaths=`.
///
/// Only `%` is escaped; `$` is expanded in `Exec*=` lines alone.
pub fn quote_path(path: &str) -> String {
    quote_escaped(escape_specifiers(path))
}

/// Escape `%` for settings that take a single unquoted value.
pub fn escape_specifiers(value: &str) -> String {
    value.replace('%', "%%")
}

fn quote_escaped(escaped: String) -> String {
    let needs_quotes = escaped.is_empty()
        || escaped
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '\\' | ';'));
    if !needs_quotes {
        return escaped;
    }
    let mut quoted = String::with_capacity(escaped.len() + 2);
    quoted.push('"');
    for c in escaped.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn is_under_home(path: &Path) -> bool {
    path.starts_with("/home") || path.starts_with("/root") || path.starts_with("/run/user")
}
