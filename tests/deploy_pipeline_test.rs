//! Tests for the deploy pipeline wired through ServiceContainer

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use unitsmith::application::services::{
    DeployOptions, RawDeploymentInput, StepStatus, UnitChange,
};
use unitsmith::application::ApplicationError;
use unitsmith::config::Settings;
use unitsmith::domain::{DomainError, UnitState};
use unitsmith::infrastructure::di::ServiceContainer;
use unitsmith::infrastructure::traits::RealFileSystem;
use unitsmith::util::testing::{
    create_django_project, init_test_setup, RecordingCommandRunner, ScriptedPrompter, StaticHost,
};

struct Fixture {
    _temp: TempDir,
    project: PathBuf,
    unit_dir: PathBuf,
    runner: Arc<RecordingCommandRunner>,
    container: ServiceContainer,
}

fn setup(runner: RecordingCommandRunner, privileged: bool) -> Fixture {
    init_test_setup();
    let temp = TempDir::new().unwrap();
    let project = temp.path().join("shop");
    create_django_project(&project, "shop", true).unwrap();
    std::fs::write(project.join(".env"), "SECRET_KEY=x\n").unwrap();
    let unit_dir = temp.path().join("units");

    let settings = Settings {
        unit_dir: unit_dir.clone(),
        ..Settings::default()
    };
    let runner = Arc::new(runner);
    let container = ServiceContainer::with_deps(
        settings,
        Arc::new(RealFileSystem),
        runner.clone(),
        Arc::new(StaticHost::new(privileged).with_current_user("svc")),
        Arc::new(ScriptedPrompter::default()),
    );
    Fixture {
        _temp: temp,
        project,
        unit_dir,
        runner,
        container,
    }
}

fn raw(fx: &Fixture, user: &str) -> RawDeploymentInput {
    RawDeploymentInput {
        project_dir: Some(fx.project.to_string_lossy().to_string()),
        service_user: Some(user.to_string()),
        ..Default::default()
    }
}

#[test]
fn given_valid_input_when_deploy_without_flags_then_written_and_reloaded_only() {
    let fx = setup(RecordingCommandRunner::new(), true);
    let validated = fx.container.validator().validate(&raw(&fx, "svc")).unwrap();

    let report = fx
        .container
        .deploy_service()
        .deploy(validated, DeployOptions::default())
        .unwrap();

    assert!(report.is_success());
    assert!(report.units.iter().all(|u| u.state == UnitState::Written));
    assert!(report
        .units
        .iter()
        .all(|u| u.change == Some(UnitChange::Created)));
    assert_eq!(fx.runner.lines(), vec!["systemctl daemon-reload"]);
    assert!(fx.unit_dir.join("shop-web.service").is_file());
}

#[test]
fn given_enable_and_start_when_deploy_then_units_started() {
    let fx = setup(RecordingCommandRunner::new(), true);
    let validated = fx.container.validator().validate(&raw(&fx, "svc")).unwrap();
    let options = DeployOptions {
        enable: true,
        start: true,
        ..Default::default()
    };

    let report = fx.container.deploy_service().deploy(validated, options).unwrap();

    assert!(report.is_success());
    assert!(report.units.iter().all(|u| u.state == UnitState::Started));
    let lines = fx.runner.lines();
    assert_eq!(lines[0], "systemctl daemon-reload");
    assert_eq!(lines[1], "systemctl enable shop-web.service");
    assert_eq!(lines[4], "systemctl start shop-web.service");
    assert_eq!(lines.len(), 7);
}

#[test]
fn given_start_failure_for_one_unit_when_deploy_then_others_started_and_failure_reported() {
    let runner = RecordingCommandRunner::new().fail_on("start shop-beat", 1, "beat failed");
    let fx = setup(runner, true);
    let validated = fx.container.validator().validate(&raw(&fx, "svc")).unwrap();
    let options = DeployOptions {
        start: true,
        ..Default::default()
    };

    let report = fx.container.deploy_service().deploy(validated, options).unwrap();

    assert!(!report.is_success());
    let failed: Vec<&str> = report.failed_units().map(|u| u.name.as_str()).collect();
    assert_eq!(failed, vec!["shop-beat.service"]);
    assert_eq!(report.units[0].state, UnitState::Started);
    assert_eq!(report.units[1].state, UnitState::Started);
    assert_eq!(report.units[2].state, UnitState::Written);
}

#[test]
fn given_reload_failure_when_deploy_then_no_enable_or_start() {
    let runner = RecordingCommandRunner::new().fail_on("daemon-reload", 1, "bus error");
    let fx = setup(runner, true);
    let validated = fx.container.validator().validate(&raw(&fx, "svc")).unwrap();
    let options = DeployOptions {
        enable: true,
        start: true,
        ..Default::default()
    };

    let report = fx.container.deploy_service().deploy(validated, options).unwrap();

    assert!(!report.is_success());
    assert!(report.reload_error.as_deref().unwrap().contains("bus error"));
    assert_eq!(fx.runner.lines(), vec!["systemctl daemon-reload"]);
    assert!(report.units.iter().all(|u| u.state == UnitState::Written));
}

#[test]
fn given_unknown_user_when_validating_then_no_files_written_and_no_commands() {
    let fx = setup(RecordingCommandRunner::new(), true);

    let err = fx.container.validator().validate(&raw(&fx, "ghost")).unwrap_err();

    assert!(matches!(
        err,
        ApplicationError::Domain(DomainError::UserNotFound(_))
    ));
    assert!(!fx.unit_dir.exists());
    assert!(!fx.project.join("logs").exists());
    assert!(fx.runner.calls().is_empty());
}

#[test]
fn given_unprivileged_when_deploy_then_privilege_error_and_no_commands() {
    let fx = setup(RecordingCommandRunner::new(), false);
    let validated = fx.container.validator().validate(&raw(&fx, "svc")).unwrap();

    let err = fx
        .container
        .deploy_service()
        .deploy(validated, DeployOptions::default())
        .unwrap_err();

    assert!(matches!(err, ApplicationError::Privilege(_)));
    assert!(!fx.unit_dir.exists());
    assert!(fx.runner.calls().is_empty());
}

#[test]
fn given_unprivileged_when_deploy_with_build_then_no_build_step_runs() {
    let fx = setup(RecordingCommandRunner::new(), false);
    let validated = fx.container.validator().validate(&raw(&fx, "svc")).unwrap();
    let options = DeployOptions {
        build: true,
        ..Default::default()
    };

    let err = fx.container.deploy_service().deploy(validated, options).unwrap_err();

    assert!(matches!(err, ApplicationError::Privilege(_)));
    assert!(fx.runner.calls().is_empty());
}

// ============================================================
// build steps
// ============================================================

#[test]
fn given_build_when_deploy_then_steps_run_in_project_dir_in_order() {
    let fx = setup(RecordingCommandRunner::new(), true);
    std::fs::write(fx.project.join("requirements.txt"), "django\n").unwrap();
    let validated = fx.container.validator().validate(&raw(&fx, "svc")).unwrap();
    let project = validated.config.project_dir.clone();
    let options = DeployOptions {
        build: true,
        ..Default::default()
    };

    let report = fx.container.deploy_service().deploy(validated, options).unwrap();

    let steps: Vec<&str> = report.build.iter().map(|s| s.step).collect();
    assert_eq!(steps, vec!["venv", "requirements", "collectstatic", "migrate"]);
    assert!(report.build.iter().all(|s| s.status == StepStatus::Ran));
    let calls = fx.runner.calls();
    let project = project.to_string_lossy().to_string();
    assert!(calls[..4].iter().all(|c| c.dir.as_deref() == Some(project.as_str())));
    assert_eq!(calls[0].line(), format!("python3 -m venv {project}/venv"));
    assert!(calls[3].line().ends_with("manage.py migrate --noinput"));
    assert_eq!(calls[4].line(), "systemctl daemon-reload");
}

#[test]
fn given_failing_migration_when_deploy_with_build_then_aborts_before_writing() {
    let runner = RecordingCommandRunner::new().fail_on("migrate", 1, "relation does not exist");
    let fx = setup(runner, true);
    let validated = fx.container.validator().validate(&raw(&fx, "svc")).unwrap();
    let options = DeployOptions {
        build: true,
        ..Default::default()
    };

    let err = fx.container.deploy_service().deploy(validated, options).unwrap_err();

    assert!(matches!(err, ApplicationError::BuildStep { ref step, .. } if step == "migrate"));
    assert!(!fx.unit_dir.exists());
    assert!(!fx.runner.lines().iter().any(|l| l.starts_with("systemctl")));
}

#[test]
fn given_no_requirements_file_when_build_then_step_skipped() {
    let fx = setup(RecordingCommandRunner::new(), true);
    let validated = fx.container.validator().validate(&raw(&fx, "svc")).unwrap();

    let steps = fx.container.build_runner().run(&validated.config).unwrap();

    assert!(matches!(steps[1].status, StepStatus::Skipped(_)));
    assert!(!fx.runner.lines().iter().any(|l| l.contains("pip install")));
}
