//! Service container for dependency injection
//!
//! Wires up all services with their dependencies.

use std::sync::Arc;

use crate::application::services::{
    BuildRunner, DeployService, FilesystemApplier, InputCollector, InputValidator,
    ServiceController,
};
use crate::config::Settings;
use crate::infrastructure::traits::{
    CommandRunner, FileSystem, Host, Prompter, RealCommandRunner, RealFileSystem, StdinPrompter,
    SystemHost,
};

/// Container holding the I/O implementations shared by all services.
///
/// Services are cheap and built on demand.
pub struct ServiceContainer {
    /// Application settings
    pub settings: Arc<Settings>,

    /// Filesystem abstraction
    pub fs: Arc<dyn FileSystem>,

    /// Command runner abstraction
    pub cmd: Arc<dyn CommandRunner>,

    /// User database and privilege information
    pub host: Arc<dyn Host>,

    /// Interactive prompts
    pub prompter: Arc<dyn Prompter>,
}

impl ServiceContainer {
    /// Create a new service container with real implementations.
    pub fn new(settings: Settings) -> Self {
        Self::with_deps(
            settings,
            Arc::new(RealFileSystem),
            Arc::new(RealCommandRunner),
            Arc::new(SystemHost),
            Arc::new(StdinPrompter),
        )
    }

    /// Create a service container with custom dependencies (for testing).
    pub fn with_deps(
        settings: Settings,
        fs: Arc<dyn FileSystem>,
        cmd: Arc<dyn CommandRunner>,
        host: Arc<dyn Host>,
        prompter: Arc<dyn Prompter>,
    ) -> Self {
        let settings = Arc::new(settings);

        Self {
            settings,
            fs,
            cmd,
            host,
            prompter,
        }
    }

    pub fn validator(&self) -> InputValidator {
        InputValidator::new(self.fs.clone(), self.host.clone(), self.settings.clone())
    }

    pub fn collector(&self) -> InputCollector {
        InputCollector::new(self.prompter.clone())
    }

    pub fn applier(&self) -> FilesystemApplier {
        FilesystemApplier::new(
            self.fs.clone(),
            self.host.clone(),
            self.settings.unit_dir.clone(),
        )
    }

    pub fn controller(&self) -> ServiceController {
        ServiceController::new(
            self.cmd.clone(),
            self.fs.clone(),
            self.settings.systemctl.clone(),
            self.settings.unit_dir.clone(),
        )
    }

    pub fn build_runner(&self) -> BuildRunner {
        BuildRunner::new(
            self.cmd.clone(),
            self.fs.clone(),
            self.settings.python.clone(),
        )
    }

    pub fn deploy_service(&self) -> DeployService {
        DeployService::new(self.applier(), self.controller(), self.build_runner())
    }
}
