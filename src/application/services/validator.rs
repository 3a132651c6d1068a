//! Input validation
//!
//! Turns raw operator input into a [`DeploymentConfig`]. Reads the
//! filesystem and the host user database, never writes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;
use tracing::debug;

use crate::application::{ApplicationError, ApplicationResult};
use crate::config::Settings;
use crate::domain::{
    parse_count, DeploymentConfig, Diagnostic, DomainError, EntryPoint, EnvFileMode, EnvFileRef,
    ServiceAccount,
};
use crate::infrastructure::traits::{FileSystem, Host};

/// File that marks a Django project root.
pub const PROJECT_MARKER: &str = "manage.py";

/// Raw operator input, as typed on the command line or at a prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawDeploymentInput {
    pub project_dir: Option<String>,
    pub service_user: Option<String>,
    pub workers: Option<String>,
    pub concurrency: Option<String>,
    pub venv_path: Option<String>,
    pub env_file: Option<String>,
    pub app_module: Option<String>,
}

/// Detected project layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    pub root: PathBuf,
    pub app_module: String,
    pub entry_point: EntryPoint,
}

/// Validation result with non-fatal findings.
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    pub config: DeploymentConfig,
    pub warnings: Vec<Diagnostic>,
}

/// Validates deployment input.
pub struct InputValidator {
    fs: Arc<dyn FileSystem>,
    host: Arc<dyn Host>,
    settings: Arc<Settings>,
}

impl InputValidator {
    pub fn new(fs: Arc<dyn FileSystem>, host: Arc<dyn Host>, settings: Arc<Settings>) -> Self {
        Self { fs, host, settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Validate all input at once.
    ///
    /// Fails on the first invalid field; checks run in the order
    /// project directory, app module, user, counts, environment file.
    pub fn validate(&self, raw: &RawDeploymentInput) -> ApplicationResult<ValidatedConfig> {
        let project_raw = raw
            .project_dir
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or(DomainError::MissingInput("project directory"))?;
        let layout = self.check_project_dir(project_raw, raw.app_module.as_deref())?;

        let user_raw = raw
            .service_user
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or(DomainError::MissingInput("service user"))?;
        let account = self.check_user(user_raw)?;

        let workers = parse_count(
            "worker count",
            raw.workers.as_deref(),
            self.settings.defaults.workers,
        )?;
        let concurrency = parse_count(
            "concurrency",
            raw.concurrency.as_deref(),
            self.settings.defaults.concurrency,
        )?;

        let mut warnings = Vec::new();
        let venv_path = self.resolve_venv(&layout.root, raw.venv_path.as_deref());
        self.check_venv(&venv_path, &mut warnings);

        let env_file = self.resolve_env_file(&layout.root, raw.env_file.as_deref())?;

        let config = DeploymentConfig {
            unit_prefix: self.settings.unit_prefix(&layout.root),
            runtime: self.settings.runtime_dirs(&layout.root),
            options: self.settings.unit_options(layout.entry_point),
            project_dir: layout.root,
            app_module: layout.app_module,
            entry_point: layout.entry_point,
            service_user: account,
            venv_path,
            gunicorn_workers: workers,
            celery_concurrency: concurrency,
            env_file,
        };
        debug!("validate: config={:?}", config);

        Ok(ValidatedConfig { config, warnings })
    }

    /// Check that `raw` names a Django project directory and detect its layout.
    pub fn check_project_dir(
        &self,
        raw: &str,
        app_module: Option<&str>,
    ) -> ApplicationResult<ProjectLayout> {
        let path = PathBuf::from(crate::domain::expand_env_vars(raw.trim()));
        if !self.fs.is_dir(&path) {
            return Err(DomainError::DirectoryNotFound(path).into());
        }
        let root = self.fs.canonicalize(&path).map_err(|e| {
            ApplicationError::OperationFailed {
                context: format!("canonicalize {}", path.display()),
                source: Box::new(e),
            }
        })?;

        let manage_py = root.join(PROJECT_MARKER);
        if !self.fs.is_file(&manage_py) {
            return Err(DomainError::NotAProject {
                path: root,
                reason: format!("no {PROJECT_MARKER}"),
            }
            .into());
        }

        let module = match app_module.map(str::trim).filter(|m| !m.is_empty()) {
            Some(m) => {
                if !is_python_identifier(m) {
                    return Err(DomainError::InvalidAppModule(m.to_string()).into());
                }
                m.to_string()
            }
            None => self.detect_app_module(&root, &manage_py)?,
        };

        let entry_point = self.detect_entry_point(&root, &module)?;
        debug!(
            "check_project_dir: root={}, module={}, entry={:?}",
            root.display(),
            module,
            entry_point
        );
        Ok(ProjectLayout {
            root,
            app_module: module,
            entry_point,
        })
    }

    /// Check that `raw` is a valid user name of an existing host account.
    pub fn check_user(&self, raw: &str) -> ApplicationResult<ServiceAccount> {
        let name = raw.trim();
        if !is_valid_user_name(name) {
            return Err(DomainError::InvalidUserName(name.to_string()).into());
        }
        let account = self
            .host
            .lookup_user(name)
            .map_err(|e| ApplicationError::OperationFailed {
                context: format!("look up user {name}"),
                source: Box::new(e),
            })?;
        account.ok_or_else(|| DomainError::UserNotFound(name.to_string()).into())
    }

    /// Virtualenv path; relative input is taken relative to the project.
    pub fn resolve_venv(&self, root: &Path, raw: Option<&str>) -> PathBuf {
        let raw = raw
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| crate::domain::expand_env_vars(s))
            .unwrap_or_else(|| self.settings.defaults.venv_dir.clone());
        let path = PathBuf::from(raw);
        if path.is_absolute() {
            path
        } else {
            root.join(path)
        }
    }

    fn check_venv(&self, venv: &Path, warnings: &mut Vec<Diagnostic>) {
        if !self.fs.is_dir(venv) {
            warnings.push(Diagnostic::warning(format!(
                "virtualenv not found: {} (create it or deploy with --build)",
                venv.display()
            )));
            return;
        }
        for program in ["gunicorn", "celery"] {
            let bin = venv.join("bin").join(program);
            if !self.fs.exists(&bin) {
                warnings.push(Diagnostic::warning(format!(
                    "{} not installed in virtualenv: {}",
                    program,
                    bin.display()
                )));
            }
        }
    }

    /// Environment file reference. `Strict` mode fails when the file is missing.
    fn resolve_env_file(
        &self,
        root: &Path,
        raw: Option<&str>,
    ) -> ApplicationResult<Option<EnvFileRef>> {
        let raw = raw.map(str::trim);
        let name = match raw {
            // explicit empty value disables the reference
            Some("") => return Ok(None),
            Some(r) => crate::domain::expand_env_vars(r),
            None => self.settings.env_file.name.clone(),
        };
        let path = PathBuf::from(name);
        let path = if path.is_absolute() {
            path
        } else {
            root.join(path)
        };
        let mode = self.settings.env_file.mode;
        if mode == EnvFileMode::Strict && !self.fs.is_file(&path) {
            return Err(DomainError::EnvFileMissing(path).into());
        }
        Ok(Some(EnvFileRef { path, mode }))
    }

    /// App module from `manage.py`, else the first package with asgi.py/wsgi.py.
    fn detect_app_module(&self, root: &Path, manage_py: &Path) -> ApplicationResult<String> {
        let content = self
            .fs
            .read_to_string(manage_py)
            .map_err(|e| ApplicationError::OperationFailed {
                context: format!("read {}", manage_py.display()),
                source: Box::new(e),
            })?;

        if let Some(module) = settings_module_from_manage_py(&content) {
            if self.fs.is_dir(&root.join(&module)) {
                return Ok(module);
            }
            debug!("detect_app_module: {} named in manage.py is not a directory", module);
        }

        let entries = self.fs.read_dir(root).map_err(|e| ApplicationError::OperationFailed {
            context: format!("list {}", root.display()),
            source: Box::new(e),
        })?;
        for dir in entries.iter().filter(|p| self.fs.is_dir(p)) {
            let Some(name) = dir.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !is_python_identifier(name) {
                continue;
            }
            if self.fs.is_file(&dir.join("asgi.py")) || self.fs.is_file(&dir.join("wsgi.py")) {
                return Ok(name.to_string());
            }
        }

        Err(DomainError::NotAProject {
            path: root.to_path_buf(),
            reason: "no package with asgi.py or wsgi.py".to_string(),
        }
        .into())
    }

    fn detect_entry_point(&self, root: &Path, module: &str) -> ApplicationResult<EntryPoint> {
        let package = root.join(module);
        if self.fs.is_file(&package.join("asgi.py")) {
            Ok(EntryPoint::Asgi)
        } else if self.fs.is_file(&package.join("wsgi.py")) {
            Ok(EntryPoint::Wsgi)
        } else {
            Err(DomainError::NotAProject {
                path: root.to_path_buf(),
                reason: format!("{module} has neither asgi.py nor wsgi.py"),
            }
            .into())
        }
    }
}

/// Top-level package of the `DJANGO_SETTINGS_MODULE` default in `manage.py`.
pub fn settings_module_from_manage_py(content: &str) -> Option<String> {
    let re = Regex::new(
        r#"DJANGO_SETTINGS_MODULE['"]\s*,\s*['"]([A-Za-z_][A-Za-z0-9_]*)\.settings"#,
    )
    .ok()?;
    re.captures(content)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// POSIX-ish account name: lowercase start, `[a-z0-9_-]`, optional trailing `$`.
pub fn is_valid_user_name(name: &str) -> bool {
    Regex::new(r"^[a-z_][a-z0-9_-]{0,30}\$?$")
        .map(|re| re.is_match(name))
        .unwrap_or(false)
}

fn is_python_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
