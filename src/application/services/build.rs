//! Build steps run before units are written
//!
//! Virtualenv creation, requirements install, static files and schema
//! migration are delegated to the project's own tooling. Steps run in
//! order and the first failure stops the build.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::application::{ApplicationError, ApplicationResult};
use crate::domain::DeploymentConfig;
use crate::infrastructure::traits::{CommandRunner, FileSystem};
use crate::infrastructure::InfraError;

pub const REQUIREMENTS_FILE: &str = "requirements.txt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    Ran,
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildStepReport {
    pub step: &'static str,
    pub status: StepStatus,
}

pub struct BuildRunner {
    cmd: Arc<dyn CommandRunner>,
    fs: Arc<dyn FileSystem>,
    python: String,
}

impl BuildRunner {
    pub fn new(cmd: Arc<dyn CommandRunner>, fs: Arc<dyn FileSystem>, python: String) -> Self {
        Self { cmd, fs, python }
    }

    #[instrument(level = "debug", skip_all, fields(project = %config.project_dir.display()))]
    pub fn run(&self, config: &DeploymentConfig) -> ApplicationResult<Vec<BuildStepReport>> {
        let project = &config.project_dir;
        let venv_python = config.venv_bin("python");
        let mut steps = Vec::new();

        if self.fs.exists(&venv_python) {
            steps.push(skipped("venv", "virtualenv exists"));
        } else {
            let venv = config.venv_path.to_string_lossy().to_string();
            self.step(project, "venv", &self.python, &["-m", "venv", venv.as_str()])?;
            steps.push(ran("venv"));
        }

        let python = venv_python.to_string_lossy().to_string();
        if self.fs.is_file(&project.join(REQUIREMENTS_FILE)) {
            self.step(
                project,
                "requirements",
                &python,
                &["-m", "pip", "install", "-r", REQUIREMENTS_FILE],
            )?;
            steps.push(ran("requirements"));
        } else {
            steps.push(skipped(
                "requirements",
                &format!("no {REQUIREMENTS_FILE} in project"),
            ));
        }

        self.step(
            project,
            "collectstatic",
            &python,
            &["manage.py", "collectstatic", "--noinput"],
        )?;
        steps.push(ran("collectstatic"));

        self.step(project, "migrate", &python, &["manage.py", "migrate", "--noinput"])?;
        steps.push(ran("migrate"));

        Ok(steps)
    }

    fn step(
        &self,
        dir: &Path,
        step: &'static str,
        program: &str,
        args: &[&str],
    ) -> ApplicationResult<()> {
        info!("build step {}: {} {}", step, program, args.join(" "));
        let output = self
            .cmd
            .run_in(dir, program, args)
            .map_err(|e| ApplicationError::BuildStep {
                step: step.to_string(),
                message: format!("{program}: {e}"),
            })?;
        if output.status.success() {
            debug!("step: {} ok", step);
            Ok(())
        } else {
            Err(ApplicationError::BuildStep {
                step: step.to_string(),
                message: InfraError::command(program, &output).to_string(),
            })
        }
    }
}

fn ran(step: &'static str) -> BuildStepReport {
    BuildStepReport {
        step,
        status: StepStatus::Ran,
    }
}

fn skipped(step: &'static str, reason: &str) -> BuildStepReport {
    BuildStepReport {
        step,
        status: StepStatus::Skipped(reason.to_string()),
    }
}
