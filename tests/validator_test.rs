//! Tests for InputValidator

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rstest::rstest;
use tempfile::TempDir;

use unitsmith::application::services::{InputValidator, RawDeploymentInput};
use unitsmith::application::ApplicationError;
use unitsmith::config::Settings;
use unitsmith::domain::{DomainError, EntryPoint, EnvFileMode, Severity};
use unitsmith::infrastructure::traits::RealFileSystem;
use unitsmith::util::testing::{create_django_project, init_test_setup, StaticHost};

fn validator_with(settings: Settings) -> InputValidator {
    let host = StaticHost::new(true).with_current_user("svc");
    InputValidator::new(Arc::new(RealFileSystem), Arc::new(host), Arc::new(settings))
}

fn validator() -> InputValidator {
    validator_with(Settings::default())
}

/// Django project `shop` with package `shop` (ASGI).
fn setup_project(temp: &TempDir) -> PathBuf {
    let dir = temp.path().join("shop");
    create_django_project(&dir, "shop", true).unwrap();
    dir
}

fn raw(project_dir: &Path, user: &str) -> RawDeploymentInput {
    RawDeploymentInput {
        project_dir: Some(project_dir.to_string_lossy().to_string()),
        service_user: Some(user.to_string()),
        ..Default::default()
    }
}

fn domain_err(err: ApplicationError) -> DomainError {
    match err {
        ApplicationError::Domain(e) => e,
        other => panic!("expected domain error, got {other:?}"),
    }
}

// ============================================================
// valid input
// ============================================================

#[test]
fn given_valid_project_when_validate_then_builds_config_with_defaults() {
    init_test_setup();
    let temp = TempDir::new().unwrap();
    let dir = setup_project(&temp);

    let validated = validator().validate(&raw(&dir, "svc")).unwrap();

    let config = validated.config;
    assert_eq!(config.project_dir, dir.canonicalize().unwrap());
    assert_eq!(config.app_module, "shop");
    assert_eq!(config.entry_point, EntryPoint::Asgi);
    assert_eq!(config.service_user.name, "svc");
    assert_eq!(config.gunicorn_workers, 4);
    assert_eq!(config.celery_concurrency, 2);
    assert_eq!(config.unit_prefix, "shop");
    assert_eq!(config.venv_path, config.project_dir.join("venv"));
    let env = config.env_file.unwrap();
    assert_eq!(env.path, config.project_dir.join(".env"));
    assert_eq!(env.mode, EnvFileMode::Required);
}

#[test]
fn given_missing_venv_when_validate_then_warns_but_succeeds() {
    let temp = TempDir::new().unwrap();
    let dir = setup_project(&temp);

    let validated = validator().validate(&raw(&dir, "svc")).unwrap();

    assert_eq!(validated.warnings.len(), 1);
    assert_eq!(validated.warnings[0].severity, Severity::Warning);
    assert!(validated.warnings[0].message.contains("virtualenv not found"));
}

#[test]
fn given_venv_with_binaries_when_validate_then_no_warnings() {
    let temp = TempDir::new().unwrap();
    let dir = setup_project(&temp);
    let bin = dir.join("venv").join("bin");
    std::fs::create_dir_all(&bin).unwrap();
    std::fs::write(bin.join("gunicorn"), "").unwrap();
    std::fs::write(bin.join("celery"), "").unwrap();

    let validated = validator().validate(&raw(&dir, "svc")).unwrap();

    assert!(validated.warnings.is_empty());
}

#[test]
fn given_explicit_counts_when_validate_then_used() {
    let temp = TempDir::new().unwrap();
    let dir = setup_project(&temp);
    let mut input = raw(&dir, "svc");
    input.workers = Some("8".into());
    input.concurrency = Some(" 3 ".into());

    let config = validator().validate(&input).unwrap().config;

    assert_eq!(config.gunicorn_workers, 8);
    assert_eq!(config.celery_concurrency, 3);
}

#[test]
fn given_manage_py_without_settings_when_validate_then_detects_wsgi_package() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("legacy");
    std::fs::create_dir_all(dir.join("core")).unwrap();
    std::fs::write(dir.join("manage.py"), "import sys\n").unwrap();
    std::fs::write(dir.join("core").join("wsgi.py"), "").unwrap();

    let config = validator().validate(&raw(&dir, "svc")).unwrap().config;

    assert_eq!(config.app_module, "core");
    assert_eq!(config.entry_point, EntryPoint::Wsgi);
    assert_eq!(config.options.worker_class, None);
}

#[test]
fn given_app_module_override_when_validate_then_used() {
    let temp = TempDir::new().unwrap();
    let dir = setup_project(&temp);
    std::fs::create_dir_all(dir.join("api")).unwrap();
    std::fs::write(dir.join("api").join("wsgi.py"), "").unwrap();
    let mut input = raw(&dir, "svc");
    input.app_module = Some("api".into());

    let config = validator().validate(&input).unwrap().config;

    assert_eq!(config.app_module, "api");
    assert_eq!(config.entry_point, EntryPoint::Wsgi);
}

#[test]
fn given_empty_env_file_when_validate_then_no_reference() {
    let temp = TempDir::new().unwrap();
    let dir = setup_project(&temp);
    let mut input = raw(&dir, "svc");
    input.env_file = Some(String::new());

    let config = validator().validate(&input).unwrap().config;

    assert_eq!(config.env_file, None);
}

// ============================================================
// invalid input
// ============================================================

#[test]
fn given_missing_directory_when_validate_then_directory_not_found() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("nope");

    let err = validator().validate(&raw(&dir, "svc")).unwrap_err();

    assert!(matches!(domain_err(err), DomainError::DirectoryNotFound(_)));
}

#[test]
fn given_directory_without_manage_py_when_validate_then_not_a_project() {
    let temp = TempDir::new().unwrap();

    let err = validator().validate(&raw(temp.path(), "svc")).unwrap_err();

    assert!(matches!(domain_err(err), DomainError::NotAProject { .. }));
}

#[test]
fn given_unknown_user_when_validate_then_user_not_found() {
    let temp = TempDir::new().unwrap();
    let dir = setup_project(&temp);

    let err = validator().validate(&raw(&dir, "nobody")).unwrap_err();

    assert!(matches!(domain_err(err), DomainError::UserNotFound(name) if name == "nobody"));
}

#[test]
fn given_malformed_user_when_validate_then_invalid_user_name() {
    let temp = TempDir::new().unwrap();
    let dir = setup_project(&temp);

    let err = validator().validate(&raw(&dir, "Bad User")).unwrap_err();

    assert!(matches!(domain_err(err), DomainError::InvalidUserName(_)));
}

#[test]
fn given_no_user_when_validate_then_missing_input() {
    let temp = TempDir::new().unwrap();
    let dir = setup_project(&temp);
    let mut input = raw(&dir, "svc");
    input.service_user = None;

    let err = validator().validate(&input).unwrap_err();

    assert!(matches!(domain_err(err), DomainError::MissingInput("service user")));
}

#[rstest]
#[case("0")]
#[case("-1")]
#[case("four")]
#[case("1025")]
#[case("2.5")]
fn given_bad_worker_count_when_validate_then_invalid_count(#[case] workers: &str) {
    let temp = TempDir::new().unwrap();
    let dir = setup_project(&temp);
    let mut input = raw(&dir, "svc");
    input.workers = Some(workers.into());

    let err = validator().validate(&input).unwrap_err();

    assert!(matches!(
        domain_err(err),
        DomainError::InvalidCount { field: "worker count", .. }
    ));
}

#[test]
fn given_strict_mode_and_missing_env_file_when_validate_then_env_file_missing() {
    let temp = TempDir::new().unwrap();
    let dir = setup_project(&temp);
    let mut settings = Settings::default();
    settings.env_file.mode = EnvFileMode::Strict;

    let err = validator_with(settings).validate(&raw(&dir, "svc")).unwrap_err();

    assert!(matches!(domain_err(err), DomainError::EnvFileMissing(_)));
}

#[test]
fn given_strict_mode_and_present_env_file_when_validate_then_ok() {
    let temp = TempDir::new().unwrap();
    let dir = setup_project(&temp);
    std::fs::write(dir.join(".env"), "SECRET_KEY=x\n").unwrap();
    let mut settings = Settings::default();
    settings.env_file.mode = EnvFileMode::Strict;

    let config = validator_with(settings).validate(&raw(&dir, "svc")).unwrap().config;

    assert_eq!(config.env_file.unwrap().mode, EnvFileMode::Strict);
}

#[test]
fn given_invalid_app_module_when_validate_then_invalid_app_module() {
    let temp = TempDir::new().unwrap();
    let dir = setup_project(&temp);
    let mut input = raw(&dir, "svc");
    input.app_module = Some("my-app".into());

    let err = validator().validate(&input).unwrap_err();

    assert!(matches!(domain_err(err), DomainError::InvalidAppModule(_)));
}

#[test]
fn given_invalid_input_when_validate_then_nothing_written() {
    let temp = TempDir::new().unwrap();
    let dir = setup_project(&temp);
    let before: Vec<_> = std::fs::read_dir(&dir).unwrap().collect();

    let _ = validator().validate(&raw(&dir, "nobody"));

    let after: Vec<_> = std::fs::read_dir(&dir).unwrap().collect();
    assert_eq!(before.len(), after.len());
}
