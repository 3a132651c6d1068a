//! Application services
//!
//! Concrete service implementations that orchestrate domain logic.
//! Services depend on I/O boundary traits (FileSystem, CommandRunner, etc.)
//! but are themselves concrete structs, not traits.

mod applier;
mod build;
mod controller;
mod deploy;
mod input;
mod validator;

pub use applier::{
    content_digest, ApplyReport, FilesystemApplier, RestoreOutcome, RuntimeDir, UnitChange,
    WrittenUnit, BACKUP_SUFFIX, RUNTIME_DIR_MODE, UNIT_FILE_MODE,
};
pub use build::{BuildRunner, BuildStepReport, StepStatus, REQUIREMENTS_FILE};
pub use controller::{ControlAction, ServiceController, UnitOutcome, UnitStatus};
pub use deploy::{DeployOptions, DeployReport, DeployService, UnitReport};
pub use input::{InputCollector, MAX_ATTEMPTS};
pub use validator::{
    is_valid_user_name, settings_module_from_manage_py, InputValidator, ProjectLayout,
    RawDeploymentInput, ValidatedConfig, PROJECT_MARKER,
};
