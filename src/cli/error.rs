//! CLI-level errors (wraps infrastructure errors)

use thiserror::Error;

use crate::application::ApplicationError;
use crate::domain::DomainError;
use crate::exitcode;
use crate::infrastructure::InfraError;

/// CLI errors are the top-level error type.
/// These are what get displayed to the user.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    Infra(#[from] InfraError),

    #[error("{0}")]
    Usage(String),

    /// Some units failed to enable or start, or systemd could not reload.
    #[error("{0}")]
    PartialFailure(String),
}

impl From<ApplicationError> for CliError {
    fn from(e: ApplicationError) -> Self {
        CliError::Infra(InfraError::Application(e))
    }
}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

impl CliError {
    /// Get the appropriate exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Usage(_) => exitcode::USAGE,
            CliError::PartialFailure(_) => exitcode::UNAVAILABLE,
            CliError::Infra(e) => match e {
                InfraError::Io { .. } => exitcode::IOERR,
                InfraError::Command { .. } => exitcode::UNAVAILABLE,
                InfraError::Application(app) => application_exit_code(app),
            },
        }
    }
}

fn application_exit_code(e: &ApplicationError) -> i32 {
    match e {
        ApplicationError::Domain(d) => match d {
            DomainError::DirectoryNotFound(_) => exitcode::NOINPUT,
            DomainError::NotAProject { .. } | DomainError::InvalidAppModule(_) => {
                exitcode::DATAERR
            }
            DomainError::UserNotFound(_) => exitcode::NOUSER,
            DomainError::InvalidUserName(_)
            | DomainError::InvalidCount { .. }
            | DomainError::MissingInput(_) => exitcode::USAGE,
            DomainError::EnvFileMissing(_) => exitcode::NOINPUT,
            DomainError::InvalidTransition { .. } => exitcode::SOFTWARE,
        },
        ApplicationError::Privilege(_) => exitcode::NOPERM,
        ApplicationError::Config { .. } => exitcode::CONFIG,
        ApplicationError::BuildStep { .. } => exitcode::SOFTWARE,
        ApplicationError::Reload(_) => exitcode::UNAVAILABLE,
        ApplicationError::NoUnits(_) => exitcode::NOINPUT,
        ApplicationError::InputClosed(_) => exitcode::USAGE,
        ApplicationError::OperationFailed { .. } => exitcode::IOERR,
    }
}
