//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/unitsmith/unitsmith.toml`
//! 3. Local config: `<project_dir>/.unitsmith.toml`
//! 4. Environment variables: `UNITSMITH_*` prefix, `__` between sections
//!
//! Command-line flags override all of these.

use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment, File, FileFormat};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::application::ApplicationError;
use crate::domain::{
    expand_env_vars, unit_prefix_for, EntryPoint, EnvFileMode, RestartPolicy, RuntimeDirs,
    ServiceRole, UnitOptions,
};

/// Keys a project-local config may not set: they name programs run as
/// root or the directory root writes to.
pub const GLOBAL_ONLY_KEYS: [&str; 3] = ["unit_dir", "systemctl", "python"];

/// Gunicorn worker class used for ASGI projects unless configured otherwise.
pub const ASGI_WORKER_CLASS: &str = "uvicorn.workers.UvicornWorker";

/// Values used when the operator omits an input.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DefaultsConfig {
    pub service_user: String,
    pub workers: u32,
    pub concurrency: u32,
    /// Virtualenv directory, relative to the project directory
    pub venv_dir: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            service_user: "www-data".into(),
            workers: 4,
            concurrency: 2,
            venv_dir: "venv".into(),
        }
    }
}

/// Gunicorn settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WebConfig {
    pub bind: String,
    /// Explicit `--worker-class`; unset selects uvicorn for ASGI projects
    pub worker_class: Option<String>,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".into(),
            worker_class: None,
        }
    }
}

/// Celery worker and beat settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CeleryConfig {
    pub log_level: String,
    /// Beat `--scheduler` class; empty string keeps celery's default
    pub beat_scheduler: String,
}

impl Default for CeleryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            beat_scheduler: "django_celery_beat.schedulers:DatabaseScheduler".into(),
        }
    }
}

/// Units every service is ordered after and requires.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DependencyConfig {
    pub database: String,
    pub queue: String,
}

impl Default for DependencyConfig {
    fn default() -> Self {
        Self {
            database: "postgresql.service".into(),
            queue: "redis-server.service".into(),
        }
    }
}

/// Runtime directories, relative to the project directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RuntimeConfig {
    pub log_dir: String,
    pub static_dir: String,
    pub media_dir: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            log_dir: "logs".into(),
            static_dir: "staticfiles".into(),
            media_dir: "media".into(),
        }
    }
}

/// Environment file handling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EnvFileConfig {
    /// File name, relative to the project directory
    pub name: String,
    pub mode: EnvFileMode,
    /// Roles whose units reference the file
    pub roles: Vec<ServiceRole>,
}

impl Default for EnvFileConfig {
    fn default() -> Self {
        Self {
            name: ".env".into(),
            mode: EnvFileMode::Required,
            roles: ServiceRole::ALL.to_vec(),
        }
    }
}

/// Restart behaviour of all units.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RestartConfig {
    pub policy: RestartPolicy,
    pub delay_sec: u32,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            policy: RestartPolicy::Always,
            delay_sec: 10,
        }
    }
}

/// Unified configuration for unitsmith.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Where unit files are written
    pub unit_dir: PathBuf,
    /// Unit name prefix; unset derives it from the project directory name
    pub unit_prefix: Option<String>,
    /// systemctl executable
    pub systemctl: String,
    /// Interpreter used to create the virtualenv
    pub python: String,
    pub defaults: DefaultsConfig,
    pub web: WebConfig,
    pub celery: CeleryConfig,
    pub dependencies: DependencyConfig,
    pub runtime: RuntimeConfig,
    pub env_file: EnvFileConfig,
    pub restart: RestartConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            unit_dir: PathBuf::from("/etc/systemd/system"),
            unit_prefix: None,
            systemctl: "systemctl".into(),
            python: "python3".into(),
            defaults: DefaultsConfig::default(),
            web: WebConfig::default(),
            celery: CeleryConfig::default(),
            dependencies: DependencyConfig::default(),
            runtime: RuntimeConfig::default(),
            env_file: EnvFileConfig::default(),
            restart: RestartConfig::default(),
        }
    }
}

/// Reject a project-local file that sets any of [`GLOBAL_ONLY_KEYS`].
fn check_project_layer(path: &Path) -> Result<(), ApplicationError> {
    let local = Config::builder()
        .add_source(File::from(path.to_path_buf()).format(FileFormat::Toml))
        .build()
        .map_err(config_err)?;
    let forbidden: Vec<&str> = GLOBAL_ONLY_KEYS
        .iter()
        .copied()
        .filter(|key| local.get::<config::Value>(key).is_ok())
        .collect();
    if forbidden.is_empty() {
        return Ok(());
    }
    Err(ApplicationError::Config {
        message: format!(
            "{}: {} may only be set in the global config or environment",
            path.display(),
            forbidden.join(", ")
        ),
    })
}

/// Get the XDG config directory for unitsmith.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "unitsmith").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("unitsmith.toml"))
}

/// Get the path to the local config file in a project directory.
pub fn project_config_path(project_dir: &Path) -> PathBuf {
    project_dir.join(".unitsmith.toml")
}

impl Settings {
    /// Load settings with layered precedence.
    ///
    /// # Arguments
    /// * `project_dir` - Optional project directory for local config
    pub fn load(project_dir: Option<&Path>) -> Result<Self, ApplicationError> {
        let global = global_config_path();
        let local = project_dir.map(project_config_path);
        Self::load_from(global.as_deref(), local.as_deref())
    }

    /// Load settings from explicit config file locations.
    ///
    /// Missing files are skipped. Environment variables are applied last.
    pub fn load_from(global: Option<&Path>, local: Option<&Path>) -> Result<Self, ApplicationError> {
        let defaults = toml::to_string(&Settings::default()).map_err(|e| ApplicationError::Config {
            message: format!("serialize defaults: {e}"),
        })?;

        let mut builder = Config::builder().add_source(File::from_str(&defaults, FileFormat::Toml));

        if let Some(path) = local.filter(|p| p.exists()) {
            check_project_layer(path)?;
        }

        for path in [global, local].into_iter().flatten() {
            if path.exists() {
                builder = builder.add_source(File::from(path.to_path_buf()).format(FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("UNITSMITH")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("env_file.roles")
                .try_parsing(true),
        );

        let config = builder.build().map_err(config_err)?;
        let mut settings: Self = config.try_deserialize().map_err(config_err)?;

        // Expand ~ and $VAR in path-like fields
        settings.expand_paths();

        Ok(settings)
    }

    /// Expand shell variables and tilde in path-like fields.
    fn expand_paths(&mut self) {
        let expanded = expand_env_vars(self.unit_dir.to_string_lossy().as_ref());
        self.unit_dir = PathBuf::from(expanded);
    }

    /// Unit name prefix for a project.
    pub fn unit_prefix(&self, project_dir: &Path) -> String {
        match &self.unit_prefix {
            Some(prefix) if !prefix.trim().is_empty() => prefix.trim().to_string(),
            _ => unit_prefix_for(project_dir),
        }
    }

    /// Runtime directories of a project.
    pub fn runtime_dirs(&self, project_dir: &Path) -> RuntimeDirs {
        RuntimeDirs {
            log: project_dir.join(&self.runtime.log_dir),
            static_root: project_dir.join(&self.runtime.static_dir),
            media: project_dir.join(&self.runtime.media_dir),
        }
    }

    /// Unit options for a project with the given entry point.
    pub fn unit_options(&self, entry_point: EntryPoint) -> UnitOptions {
        let worker_class = match (&self.web.worker_class, entry_point) {
            (Some(class), _) if class.trim().is_empty() => None,
            (Some(class), _) => Some(class.clone()),
            (None, EntryPoint::Asgi) => Some(ASGI_WORKER_CLASS.to_string()),
            (None, EntryPoint::Wsgi) => None,
        };
        let beat_scheduler = Some(self.celery.beat_scheduler.trim().to_string())
            .filter(|s| !s.is_empty());

        UnitOptions {
            bind: self.web.bind.clone(),
            worker_class,
            restart: self.restart.policy,
            restart_sec: self.restart.delay_sec,
            database_unit: self.dependencies.database.clone(),
            queue_unit: self.dependencies.queue.clone(),
            beat_scheduler,
            log_level: self.celery.log_level.clone(),
            env_file_roles: self.env_file.roles.clone(),
        }
    }

    /// Show the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ApplicationError> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::Config {
            message: format!("serialize config: {e}"),
        })
    }

    /// Generate a template config file.
    pub fn template() -> String {
        r#"# unitsmith configuration
#
# Locations (by precedence, lowest to highest):
#   Global:  ~/.config/unitsmith/unitsmith.toml
#   Project: <project_dir>/.unitsmith.toml
#   Env:     UNITSMITH_* environment variables, e.g. UNITSMITH_DEFAULTS__WORKERS=8
#   CLI flags override everything.
#
# unit_dir, systemctl and python are refused in a project config.

# Where unit files are written
# unit_dir = "/etc/systemd/system"

# Unit names are <unit_prefix>-web.service, -worker.service, -beat.service.
# Defaults to the project directory name.
# unit_prefix = "myapp"

# systemctl = "systemctl"
# python = "python3"

[defaults]
# service_user = "www-data"
# workers = 4
# concurrency = 2
# venv_dir = "venv"

[web]
# bind = "127.0.0.1:8000"
# worker_class = "uvicorn.workers.UvicornWorker"  # default for asgi.py projects

[celery]
# log_level = "info"
# beat_scheduler = "django_celery_beat.schedulers:DatabaseScheduler"

[dependencies]
# database = "postgresql.service"
# queue = "redis-server.service"

[runtime]
# log_dir = "logs"
# static_dir = "staticfiles"
# media_dir = "media"

[env_file]
# name = ".env"
# required: hard reference, a missing file fails the unit start
# optional: EnvironmentFile=-..., systemd tolerates a missing file
# strict:   a missing file aborts before anything is written
# mode = "required"
# roles = ["web", "worker", "scheduler"]

[restart]
# policy = "always"
# delay_sec = 10
"#
        .to_string()
    }
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}
