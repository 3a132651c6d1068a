//! Error conversion helpers for common I/O operations
//!
//! Provides extension traits for cleaner error handling with path context.

use std::io;
use std::path::Path;

use crate::application::{ApplicationError, ApplicationResult};

/// Extension trait for converting `io::Result` to `ApplicationResult` with context.
pub trait IoResultExt<T> {
    /// Add path context to an I/O error. `PermissionDenied` becomes
    /// [`ApplicationError::Privilege`].
    ///
    /// # Example
    /// ```ignore
    /// fs.read_to_string(&unit_path)
    ///     .or_privilege("read unit", &unit_path)?;
    /// ```
    fn or_privilege(self, action: &str, path: &Path) -> ApplicationResult<T>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn or_privilege(self, action: &str, path: &Path) -> ApplicationResult<T> {
        self.map_err(|e| {
            if e.kind() == io::ErrorKind::PermissionDenied {
                ApplicationError::Privilege(format!("{}: {}", action, path.display()))
            } else {
                ApplicationError::OperationFailed {
                    context: format!("{}: {}", action, path.display()),
                    source: Box::new(e),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_permission_denied_when_or_privilege_then_privilege_error() {
        let res: io::Result<()> = Err(io::Error::from(io::ErrorKind::PermissionDenied));
        let err = res.or_privilege("write unit", Path::new("/etc/x")).unwrap_err();
        assert!(matches!(err, ApplicationError::Privilege(_)));
    }

    #[test]
    fn given_other_error_when_or_privilege_then_operation_failed() {
        let res: io::Result<()> = Err(io::Error::from(io::ErrorKind::NotFound));
        let err = res.or_privilege("write unit", Path::new("/etc/x")).unwrap_err();
        assert!(matches!(err, ApplicationError::OperationFailed { .. }));
        assert!(err.to_string().contains("/etc/x"));
    }
}
