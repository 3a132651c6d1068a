//! Filesystem applier
//!
//! Writes rendered unit files and prepares runtime directories.
//! Re-applying the same configuration changes nothing on disk.
//!
//! A unit file whose content changes is kept as `<unit>.prev` so the
//! previous version can be restored with [`FilesystemApplier::restore_previous`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::application::{ApplicationError, ApplicationResult, IoResultExt};
use crate::domain::{DeploymentConfig, Diagnostic, RenderedUnit};
use crate::infrastructure::traits::{FileSystem, Host};

/// Mode of written unit files.
pub const UNIT_FILE_MODE: u32 = 0o644;

/// Mode of created runtime directories.
pub const RUNTIME_DIR_MODE: u32 = 0o755;

/// Suffix of the previous copy of a replaced unit file.
pub const BACKUP_SUFFIX: &str = ".prev";

/// What happened to one unit file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitChange {
    Created,
    Updated,
    Unchanged,
    Failed(String),
}

impl UnitChange {
    pub fn is_written(&self) -> bool {
        !matches!(self, UnitChange::Failed(_))
    }
}

impl fmt::Display for UnitChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitChange::Created => write!(f, "created"),
            UnitChange::Updated => write!(f, "updated"),
            UnitChange::Unchanged => write!(f, "unchanged"),
            UnitChange::Failed(msg) => write!(f, "failed: {msg}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenUnit {
    pub name: String,
    pub path: PathBuf,
    pub change: UnitChange,
    /// SHA-256 of the rendered content, hex encoded
    pub digest: String,
    /// Previous content, kept when the file was updated
    pub backup: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeDir {
    pub path: PathBuf,
    pub created: bool,
}

/// Outcome of one apply run.
#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    pub units: Vec<WrittenUnit>,
    pub runtime_dirs: Vec<RuntimeDir>,
    pub warnings: Vec<Diagnostic>,
}

impl ApplyReport {
    /// Whether anything on disk changed.
    pub fn changed(&self) -> bool {
        self.runtime_dirs.iter().any(|d| d.created)
            || self
                .units
                .iter()
                .any(|u| matches!(u.change, UnitChange::Created | UnitChange::Updated))
    }
}

/// Outcome of restoring one unit file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    Restored { unit: String, path: PathBuf },
    NoBackup { unit: String },
}

pub struct FilesystemApplier {
    fs: Arc<dyn FileSystem>,
    host: Arc<dyn Host>,
    unit_dir: PathBuf,
}

impl FilesystemApplier {
    pub fn new(fs: Arc<dyn FileSystem>, host: Arc<dyn Host>, unit_dir: PathBuf) -> Self {
        Self { fs, host, unit_dir }
    }

    pub fn unit_dir(&self) -> &Path {
        &self.unit_dir
    }

    pub fn unit_path(&self, unit: &str) -> PathBuf {
        self.unit_dir.join(unit)
    }

    pub fn backup_path(&self, unit: &str) -> PathBuf {
        self.unit_dir.join(format!("{unit}{BACKUP_SUFFIX}"))
    }

    /// Write `units` and prepare the runtime directories of `config`.
    ///
    /// Fails with [`ApplicationError::Privilege`] before touching anything
    /// when the process is not privileged, and as soon as any write is
    /// refused with `PermissionDenied`. Other per-unit write errors are
    /// recorded in the report.
    pub fn apply(
        &self,
        config: &DeploymentConfig,
        units: &[RenderedUnit],
    ) -> ApplicationResult<ApplyReport> {
        self.ensure_privileged()?;
        let mut report = ApplyReport::default();

        for dir in config.runtime.all() {
            report.runtime_dirs.push(self.prepare_runtime_dir(config, dir)?);
        }
        // collectstatic may have run as root
        self.chown_tree(config, &config.runtime.static_root)?;

        if !self.fs.is_dir(&self.unit_dir) {
            self.fs
                .create_dir_all(&self.unit_dir)
                .or_privilege("create unit directory", &self.unit_dir)?;
        }

        for rendered in units {
            report.units.push(self.write_unit(&rendered.unit.name, &rendered.text)?);
            report
                .warnings
                .extend(rendered.warnings.iter().map(|w| Diagnostic::warning(w.as_str())));
        }

        if let Some(env) = &config.env_file {
            if env.is_hard() && !self.fs.is_file(&env.path) {
                warn!("apply: environment file missing: {}", env.path.display());
                report.warnings.push(Diagnostic::warning(format!(
                    "environment file not found: {} (units referencing it will fail to start)",
                    env.path.display()
                )));
            }
        }

        debug!(
            "apply: {} units, changed={}",
            report.units.len(),
            report.changed()
        );
        Ok(report)
    }

    /// Write one unit file unless its content is already in place.
    pub fn write_unit(&self, name: &str, text: &str) -> ApplicationResult<WrittenUnit> {
        let path = self.unit_path(name);
        let digest = content_digest(text);
        let mut backup = None;

        let change = if self.fs.is_file(&path) {
            let existing = self.fs.read_to_string(&path).or_privilege("read unit", &path)?;
            if existing == text {
                UnitChange::Unchanged
            } else {
                let prev = self.backup_path(name);
                let saved = self
                    .fs
                    .write_atomic(&prev, &existing)
                    .and_then(|()| self.fs.set_mode(&prev, UNIT_FILE_MODE))
                    .or_privilege("back up unit", &prev);
                match saved {
                    Ok(()) => {
                        backup = Some(prev);
                        UnitChange::Updated
                    }
                    Err(e @ ApplicationError::Privilege(_)) => return Err(e),
                    Err(e) => UnitChange::Failed(e.to_string()),
                }
            }
        } else {
            UnitChange::Created
        };

        let change = if matches!(change, UnitChange::Created | UnitChange::Updated) {
            let written = self
                .fs
                .write_atomic(&path, text)
                .and_then(|()| self.fs.set_mode(&path, UNIT_FILE_MODE))
                .or_privilege("write unit", &path);
            match written {
                Ok(()) => change,
                Err(e @ ApplicationError::Privilege(_)) => return Err(e),
                Err(e) => UnitChange::Failed(e.to_string()),
            }
        } else {
            change
        };
        debug!("write_unit: {} {}", path.display(), change);

        Ok(WrittenUnit {
            name: name.to_string(),
            path,
            change,
            digest,
            backup,
        })
    }

    /// Move each unit's `.prev` copy back into place.
    pub fn restore_previous(&self, units: &[String]) -> ApplicationResult<Vec<RestoreOutcome>> {
        self.ensure_privileged()?;
        let mut outcomes = Vec::with_capacity(units.len());
        for unit in units {
            let prev = self.backup_path(unit);
            if !self.fs.is_file(&prev) {
                outcomes.push(RestoreOutcome::NoBackup { unit: unit.clone() });
                continue;
            }
            let path = self.unit_path(unit);
            self.fs.rename(&prev, &path).or_privilege("restore unit", &path)?;
            self.fs
                .set_mode(&path, UNIT_FILE_MODE)
                .or_privilege("set mode", &path)?;
            debug!("restore_previous: {}", path.display());
            outcomes.push(RestoreOutcome::Restored {
                unit: unit.clone(),
                path,
            });
        }
        Ok(outcomes)
    }

    fn prepare_runtime_dir(
        &self,
        config: &DeploymentConfig,
        dir: &Path,
    ) -> ApplicationResult<RuntimeDir> {
        let created = !self.fs.is_dir(dir);
        if created {
            self.fs
                .create_dir_all(dir)
                .or_privilege("create directory", dir)?;
        }
        self.fs
            .set_mode(dir, RUNTIME_DIR_MODE)
            .or_privilege("set mode", dir)?;
        let account = &config.service_user;
        self.fs
            .set_owner(dir, account.uid, account.gid)
            .or_privilege("set owner", dir)?;
        Ok(RuntimeDir {
            path: dir.to_path_buf(),
            created,
        })
    }

    /// Hand everything below `dir` to the service account. Symlinks are
    /// left alone.
    fn chown_tree(&self, config: &DeploymentConfig, dir: &Path) -> ApplicationResult<()> {
        let account = &config.service_user;
        for entry in self.fs.read_dir(dir).or_privilege("read directory", dir)? {
            if self.fs.is_symlink(&entry) {
                continue;
            }
            self.fs
                .set_owner(&entry, account.uid, account.gid)
                .or_privilege("set owner", &entry)?;
            if self.fs.is_dir(&entry) {
                self.chown_tree(config, &entry)?;
            }
        }
        Ok(())
    }

    /// Fail with [`ApplicationError::Privilege`] unless the process may
    /// write to the unit directory.
    pub fn ensure_privileged(&self) -> ApplicationResult<()> {
        if self.host.is_privileged() {
            Ok(())
        } else {
            Err(ApplicationError::Privilege(format!(
                "writing to {}",
                self.unit_dir.display()
            )))
        }
    }
}

/// Hex SHA-256 of unit content.
pub fn content_digest(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_same_text_when_digest_then_stable() {
        let a = content_digest("[Unit]\n");
        assert_eq!(a, content_digest("[Unit]\n"));
        assert_ne!(a, content_digest("[Unit]\n\n"));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn given_changes_when_is_written_then_only_failed_is_false() {
        assert!(UnitChange::Created.is_written());
        assert!(UnitChange::Unchanged.is_written());
        assert!(!UnitChange::Failed("x".into()).is_written());
    }
}
