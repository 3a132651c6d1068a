//! Interactive input collection
//!
//! Fills omitted deployment inputs from prompts with stated defaults.
//! Values given on the command line are never asked for again.

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::application::services::validator::{InputValidator, RawDeploymentInput, ValidatedConfig};
use crate::application::{ApplicationError, ApplicationResult};
use crate::domain::{parse_count, DomainError};
use crate::infrastructure::traits::Prompter;

/// Answers accepted per question before giving up.
pub const MAX_ATTEMPTS: usize = 3;

pub struct InputCollector {
    prompter: Arc<dyn Prompter>,
}

impl InputCollector {
    pub fn new(prompter: Arc<dyn Prompter>) -> Self {
        Self { prompter }
    }

    /// Complete `raw` and validate it.
    ///
    /// Non-interactive: the project directory defaults to `cwd`, a missing
    /// service user is an error. Interactive: every missing value is asked
    /// for and invalid answers are re-asked up to [`MAX_ATTEMPTS`] times.
    pub fn collect(
        &self,
        validator: &InputValidator,
        mut raw: RawDeploymentInput,
        cwd: &Path,
        interactive: bool,
    ) -> ApplicationResult<ValidatedConfig> {
        let cwd = cwd.to_string_lossy().to_string();
        if !interactive {
            raw.project_dir.get_or_insert(cwd);
            return validator.validate(&raw);
        }

        let defaults = validator.settings().defaults.clone();

        if is_blank(&raw.project_dir) {
            let app_module = raw.app_module.clone();
            let answer = self.ask_valid("Project directory", "project directory", Some(&cwd), |v| {
                validator
                    .check_project_dir(v, app_module.as_deref())
                    .map(|_| ())
            })?;
            raw.project_dir = Some(answer);
        }

        if is_blank(&raw.service_user) {
            let answer = self.ask_valid(
                "Service user",
                "service user",
                Some(&defaults.service_user),
                |v| validator.check_user(v).map(|_| ()),
            )?;
            raw.service_user = Some(answer);
        }

        if is_blank(&raw.workers) {
            let default = defaults.workers.to_string();
            let answer = self.ask_valid("Gunicorn workers", "worker count", Some(&default), |v| {
                parse_count("worker count", Some(v), defaults.workers)
                    .map(|_| ())
                    .map_err(Into::into)
            })?;
            raw.workers = Some(answer);
        }

        if is_blank(&raw.concurrency) {
            let default = defaults.concurrency.to_string();
            let answer = self.ask_valid("Celery concurrency", "concurrency", Some(&default), |v| {
                parse_count("concurrency", Some(v), defaults.concurrency)
                    .map(|_| ())
                    .map_err(Into::into)
            })?;
            raw.concurrency = Some(answer);
        }

        if is_blank(&raw.venv_path) {
            let answer = self.ask_valid(
                "Virtualenv path",
                "virtualenv path",
                Some(&defaults.venv_dir),
                |_| Ok(()),
            )?;
            raw.venv_path = Some(answer);
        }

        debug!("collect: raw={:?}", raw);
        validator.validate(&raw)
    }

    fn ask_valid<F>(
        &self,
        question: &str,
        field: &'static str,
        default: Option<&str>,
        check: F,
    ) -> ApplicationResult<String>
    where
        F: Fn(&str) -> ApplicationResult<()>,
    {
        let mut last: Option<DomainError> = None;
        for attempt in 1..=MAX_ATTEMPTS {
            let answer = self
                .prompter
                .ask(question, default)
                .map_err(|e| ApplicationError::OperationFailed {
                    context: format!("read {field}"),
                    source: Box::new(e),
                })?
                .ok_or(ApplicationError::InputClosed(field))?;

            match check(&answer) {
                Ok(()) => return Ok(answer),
                Err(ApplicationError::Domain(e)) if e.is_validation() => {
                    debug!("ask_valid: {} attempt {} rejected: {}", field, attempt, e);
                    self.prompter.reject(&e.to_string());
                    last = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last.unwrap_or(DomainError::MissingInput(field)).into())
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}
