//! Tests for ServiceController

use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use unitsmith::application::services::{ControlAction, ServiceController};
use unitsmith::application::ApplicationError;
use unitsmith::infrastructure::traits::RealFileSystem;
use unitsmith::util::testing::RecordingCommandRunner;

const UNITS: [&str; 3] = ["app-web.service", "app-worker.service", "app-beat.service"];

fn units() -> Vec<String> {
    UNITS.iter().map(|u| u.to_string()).collect()
}

fn controller(runner: Arc<RecordingCommandRunner>, unit_dir: &Path) -> ServiceController {
    ServiceController::new(
        runner,
        Arc::new(RealFileSystem),
        "systemctl".to_string(),
        unit_dir.to_path_buf(),
    )
}

fn write_unit(dir: &Path, name: &str, env_file: Option<&Path>) {
    let mut text = String::from("[Service]\n");
    if let Some(env) = env_file {
        text.push_str(&format!("EnvironmentFile={}\n", env.display()));
    }
    text.push_str("ExecStart=/bin/true\n");
    std::fs::write(dir.join(name), text).unwrap();
}

// ============================================================
// reload()
// ============================================================

#[test]
fn given_systemctl_ok_when_reload_then_daemon_reload_called() {
    let temp = TempDir::new().unwrap();
    let runner = Arc::new(RecordingCommandRunner::new());

    controller(runner.clone(), temp.path()).reload().unwrap();

    assert_eq!(runner.lines(), vec!["systemctl daemon-reload"]);
}

#[test]
fn given_systemctl_fails_when_reload_then_reload_error() {
    let temp = TempDir::new().unwrap();
    let runner = Arc::new(RecordingCommandRunner::new().fail_on(
        "daemon-reload",
        1,
        "Access denied",
    ));

    let err = controller(runner, temp.path()).reload().unwrap_err();

    assert!(matches!(err, ApplicationError::Reload(msg) if msg.contains("Access denied")));
}

// ============================================================
// enable() / start()
// ============================================================

#[test]
fn given_units_when_enable_then_each_enabled_in_order() {
    let temp = TempDir::new().unwrap();
    let runner = Arc::new(RecordingCommandRunner::new());

    let outcomes = controller(runner.clone(), temp.path()).enable(&units());

    assert!(outcomes.iter().all(|o| o.is_ok() && o.action == ControlAction::Enable));
    assert_eq!(
        runner.lines(),
        vec![
            "systemctl enable app-web.service",
            "systemctl enable app-worker.service",
            "systemctl enable app-beat.service",
        ]
    );
}

#[test]
fn given_one_unit_fails_when_start_then_others_still_started() {
    let temp = TempDir::new().unwrap();
    for unit in UNITS {
        write_unit(temp.path(), unit, None);
    }
    let runner = Arc::new(RecordingCommandRunner::new().fail_on(
        "start app-worker",
        1,
        "Job for app-worker.service failed",
    ));

    let outcomes = controller(runner.clone(), temp.path()).start(&units());

    assert!(outcomes[0].is_ok());
    assert!(!outcomes[1].is_ok());
    assert!(outcomes[1].error.as_deref().unwrap().contains("Job for app-worker"));
    assert!(outcomes[2].is_ok());
    assert_eq!(runner.calls().len(), 3);
}

#[test]
fn given_missing_env_file_when_start_then_unit_fails_without_systemctl() {
    let temp = TempDir::new().unwrap();
    let missing = temp.path().join(".env");
    write_unit(temp.path(), "app-web.service", Some(&missing));
    write_unit(temp.path(), "app-worker.service", None);
    write_unit(temp.path(), "app-beat.service", None);
    let runner = Arc::new(RecordingCommandRunner::new());

    let outcomes = controller(runner.clone(), temp.path()).start(&units());

    assert!(outcomes[0]
        .error
        .as_deref()
        .unwrap()
        .contains("environment file not found"));
    assert!(outcomes[1].is_ok());
    assert!(outcomes[2].is_ok());
    assert_eq!(
        runner.lines(),
        vec![
            "systemctl start app-worker.service",
            "systemctl start app-beat.service",
        ]
    );
}

#[test]
fn given_present_env_file_when_start_then_systemctl_called() {
    let temp = TempDir::new().unwrap();
    let env = temp.path().join(".env");
    std::fs::write(&env, "DEBUG=0\n").unwrap();
    write_unit(temp.path(), "app-web.service", Some(&env));
    let runner = Arc::new(RecordingCommandRunner::new());

    let outcomes =
        controller(runner.clone(), temp.path()).start(&["app-web.service".to_string()]);

    assert!(outcomes[0].is_ok());
    assert_eq!(runner.lines(), vec!["systemctl start app-web.service"]);
}

// ============================================================
// status()
// ============================================================

#[test]
fn given_installed_unit_when_status_then_reports_systemctl_state() {
    let temp = TempDir::new().unwrap();
    write_unit(temp.path(), "app-web.service", None);
    let runner = Arc::new(
        RecordingCommandRunner::new()
            .respond("is-enabled app-web", "enabled\n")
            .respond("is-active app-web", "active\n"),
    );

    let status = controller(runner, temp.path()).status(&units());

    assert!(status[0].installed);
    assert_eq!(status[0].enabled, "enabled");
    assert_eq!(status[0].active, "active");
    assert!(!status[1].installed);
    assert_eq!(status[1].enabled, "unknown");
}
