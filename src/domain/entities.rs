//! Domain entities: core data structures

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Process role of a generated unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceRole {
    /// Gunicorn serving the Django application
    Web,
    /// Celery worker executing background tasks
    Worker,
    /// Celery beat triggering periodic tasks
    Scheduler,
}

impl ServiceRole {
    /// All roles, in render and apply order.
    pub const ALL: [ServiceRole; 3] = [Self::Web, Self::Worker, Self::Scheduler];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Worker => "worker",
            Self::Scheduler => "scheduler",
        }
    }

    /// Suffix used in the unit file name (`<prefix>-<suffix>.service`).
    pub fn unit_suffix(&self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Worker => "worker",
            Self::Scheduler => "beat",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Web => "Gunicorn web server",
            Self::Worker => "Celery worker",
            Self::Scheduler => "Celery beat scheduler",
        }
    }
}

impl fmt::Display for ServiceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "web" => Ok(Self::Web),
            "worker" => Ok(Self::Worker),
            "scheduler" | "beat" => Ok(Self::Scheduler),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// systemd `Restart=` policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    Always,
    OnFailure,
    No,
}

impl RestartPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::OnFailure => "on-failure",
            Self::No => "no",
        }
    }
}

/// How units treat the environment file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvFileMode {
    /// Hard `EnvironmentFile=` reference. A missing file is a warning when
    /// applying and fails the start of every unit that references it.
    #[default]
    Required,
    /// `EnvironmentFile=-` reference, systemd tolerates a missing file.
    Optional,
    /// A missing file aborts validation.
    Strict,
}

/// Environment file referenced by units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvFileRef {
    pub path: PathBuf,
    pub mode: EnvFileMode,
}

impl EnvFileRef {
    /// Whether the rendered reference is a hard dependency.
    pub fn is_hard(&self) -> bool {
        self.mode != EnvFileMode::Optional
    }
}

/// Django entry point used by gunicorn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPoint {
    Asgi,
    Wsgi,
}

impl EntryPoint {
    pub fn module_name(&self) -> &'static str {
        match self {
            Self::Asgi => "asgi",
            Self::Wsgi => "wsgi",
        }
    }
}

/// Host account the services run as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceAccount {
    pub name: String,
    /// Name of the primary group
    pub group: String,
    pub uid: u32,
    pub gid: u32,
}

/// Runtime directories owned by the service account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeDirs {
    pub log: PathBuf,
    pub static_root: PathBuf,
    pub media: PathBuf,
}

impl RuntimeDirs {
    /// Directories in creation order.
    pub fn all(&self) -> [&Path; 3] {
        [&self.log, &self.static_root, &self.media]
    }
}

/// Unit options shared by every role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitOptions {
    pub bind: String,
    /// Gunicorn `--worker-class`; `None` keeps gunicorn's sync default
    pub worker_class: Option<String>,
    pub restart: RestartPolicy,
    pub restart_sec: u32,
    pub database_unit: String,
    pub queue_unit: String,
    /// Celery beat `--scheduler`; `None` keeps the file-based default
    pub beat_scheduler: Option<String>,
    pub log_level: String,
    /// Roles whose units reference the environment file
    pub env_file_roles: Vec<ServiceRole>,
}

/// Validated, immutable input for one deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentConfig {
    pub project_dir: PathBuf,
    /// Python package holding `settings`, `asgi`/`wsgi`
    pub app_module: String,
    pub entry_point: EntryPoint,
    pub service_user: ServiceAccount,
    pub venv_path: PathBuf,
    pub gunicorn_workers: u32,
    pub celery_concurrency: u32,
    pub env_file: Option<EnvFileRef>,
    /// Unit names are `<unit_prefix>-<role suffix>.service`
    pub unit_prefix: String,
    pub runtime: RuntimeDirs,
    pub options: UnitOptions,
}

impl DeploymentConfig {
    /// Unit file name for a role.
    pub fn unit_name(&self, role: ServiceRole) -> String {
        unit_name(&self.unit_prefix, role)
    }

    /// Unit file names of all roles.
    pub fn unit_names(&self) -> Vec<String> {
        ServiceRole::ALL
            .iter()
            .map(|role| self.unit_name(*role))
            .collect()
    }

    pub fn venv_bin(&self, program: &str) -> PathBuf {
        self.venv_path.join("bin").join(program)
    }

    /// Whether the unit of `role` references the environment file.
    pub fn role_uses_env_file(&self, role: ServiceRole) -> bool {
        self.options.env_file_roles.contains(&role)
    }
}

/// Unit file name for a prefix and role.
pub fn unit_name(prefix: &str, role: ServiceRole) -> String {
    format!("{}-{}.service", prefix, role.unit_suffix())
}

/// Derive a unit prefix from a project directory name.
///
/// Lowercases and replaces anything outside `[a-z0-9-]` by `-`.
pub fn unit_prefix_for(project_dir: &Path) -> String {
    let raw = project_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "app".to_string());
    let prefix: String = raw
        .to_ascii_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let prefix = prefix.trim_matches('-').to_string();
    if prefix.is_empty() {
        "app".to_string()
    } else {
        prefix
    }
}

/// One systemd service definition, derived from a DeploymentConfig.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceUnit {
    pub name: String,
    pub role: ServiceRole,
    pub description: String,
    /// Ordered argv; the first element is the executable
    pub exec_command: Vec<String>,
    pub restart_policy: RestartPolicy,
    pub restart_sec: u32,
    pub working_dir: PathBuf,
    pub environment_file: Option<EnvFileRef>,
    pub user: String,
    pub group: String,
    /// Units listed in `After=` and `Requires=`
    pub requires: Vec<String>,
    pub read_write_paths: Vec<PathBuf>,
    pub protect_home: bool,
}

/// Rendered unit text with the warnings produced while rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedUnit {
    pub unit: ServiceUnit,
    pub text: String,
    pub warnings: Vec<String>,
}

/// Severity of a non-fatal finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
}

/// Non-fatal finding reported alongside a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            message: message.into(),
        }
    }
}

/// Parse a positive count, falling back to `default` when absent.
///
/// Accepts `1..=1024`. Blank input counts as absent.
pub fn parse_count(
    field: &'static str,
    raw: Option<&str>,
    default: u32,
) -> Result<u32, DomainError> {
    let raw = match raw.map(str::trim) {
        None | Some("") => return Ok(default),
        Some(r) => r,
    };
    match raw.parse::<u32>() {
        Ok(n) if (1..=MAX_COUNT).contains(&n) => Ok(n),
        _ => Err(DomainError::InvalidCount {
            field,
            value: raw.to_string(),
        }),
    }
}

/// Upper bound for worker and concurrency counts.
pub const MAX_COUNT: u32 = 1024;

/// Expand environment variables and tilde in a path string.
///
/// Handles `~`, `$VAR`, and `${VAR}` syntax.
pub fn expand_env_vars(path: &str) -> String {
    shellexpand::full(path)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| path.to_string())
}
