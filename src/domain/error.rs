//! Domain-level errors (no external dependencies)

use std::path::PathBuf;
use thiserror::Error;

use crate::domain::UnitState;

/// Domain errors represent invalid input and illegal state changes.
/// These are independent of infrastructure concerns.
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("project directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("not a Django project: {path} ({reason})")]
    NotAProject { path: PathBuf, reason: String },

    #[error("service user does not exist: {0}")]
    UserNotFound(String),

    #[error("invalid service user name: {0:?}")]
    InvalidUserName(String),

    #[error("invalid {field}: {value:?} (expected an integer between 1 and 1024)")]
    InvalidCount { field: &'static str, value: String },

    #[error("invalid app module: {0:?}")]
    InvalidAppModule(String),

    #[error("missing required input: {0}")]
    MissingInput(&'static str),

    #[error("environment file not found: {0}")]
    EnvFileMissing(PathBuf),

    #[error("unit {unit}: cannot move from {from} to {to}")]
    InvalidTransition {
        unit: String,
        from: UnitState,
        to: UnitState,
    },
}

impl DomainError {
    /// Whether the error comes from bad user input (re-askable when interactive).
    pub fn is_validation(&self) -> bool {
        !matches!(self, DomainError::InvalidTransition { .. })
    }
}
