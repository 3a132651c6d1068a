//! Application-level errors (wraps domain errors)

use std::path::PathBuf;
use thiserror::Error;

use crate::domain::DomainError;

/// Application errors wrap domain errors and add application-level context.
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("{0}")]
    Domain(#[from] DomainError),

    #[error("insufficient privileges: {0} (run as root)")]
    Privilege(String),

    #[error("config error: {message}")]
    Config { message: String },

    #[error("build step '{step}' failed: {message}")]
    BuildStep { step: String, message: String },

    #[error("init system reload failed: {0}")]
    Reload(String),

    #[error("no unit files found in {0}")]
    NoUnits(PathBuf),

    #[error("input closed while asking for {0}")]
    InputClosed(&'static str),

    #[error("operation failed: {context}")]
    OperationFailed {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Result type for application layer operations.
pub type ApplicationResult<T> = Result<T, ApplicationError>;
