//! Integration tests for Settings config loading with layered precedence.
//!
//! Precedence (lowest to highest):
//! - Compiled defaults
//! - Global config file
//! - Project-local `.unitsmith.toml`
//! - `UNITSMITH_*` environment variables
//!
//! These tests pass explicit file locations to `Settings::load_from` so the
//! operator's real global config never leaks in.

use std::fs;
use std::path::PathBuf;

use rstest::rstest;
use tempfile::TempDir;

use unitsmith::application::ApplicationError;
use unitsmith::config::{project_config_path, Settings};
use unitsmith::domain::{EnvFileMode, RestartPolicy, ServiceRole};

// ============================================================
// file layering
// ============================================================

#[test]
fn given_global_config_when_load_then_overrides_defaults() {
    // Arrange
    let temp = TempDir::new().unwrap();
    let global = temp.path().join("unitsmith.toml");
    fs::write(
        &global,
        r#"
unit_dir = "/run/systemd/system"

[defaults]
workers = 6

[restart]
policy = "on-failure"
"#,
    )
    .unwrap();

    // Act
    let settings = Settings::load_from(Some(&global), None).expect("load settings");

    // Assert
    assert_eq!(settings.unit_dir, PathBuf::from("/run/systemd/system"));
    assert_eq!(settings.defaults.workers, 6);
    assert_eq!(settings.restart.policy, RestartPolicy::OnFailure);
    // untouched keys keep their defaults
    assert_eq!(settings.defaults.concurrency, 2);
    assert_eq!(settings.restart.delay_sec, 10);
}

#[test]
fn given_global_and_local_config_when_load_then_local_wins() {
    // Arrange
    let temp = TempDir::new().unwrap();
    let global = temp.path().join("unitsmith.toml");
    fs::write(&global, "[defaults]\nworkers = 6\nconcurrency = 3\n").unwrap();
    let project = temp.path().join("shop");
    fs::create_dir_all(&project).unwrap();
    let local = project_config_path(&project);
    fs::write(&local, "[defaults]\nworkers = 12\n").unwrap();

    // Act
    let settings = Settings::load_from(Some(&global), Some(&local)).expect("load settings");

    // Assert
    assert_eq!(settings.defaults.workers, 12);
    assert_eq!(settings.defaults.concurrency, 3);
}

#[test]
fn given_missing_files_when_load_then_defaults() {
    let temp = TempDir::new().unwrap();
    let global = temp.path().join("absent.toml");

    let settings = Settings::load_from(Some(&global), None).expect("load settings");

    assert_eq!(settings.unit_dir, PathBuf::from("/etc/systemd/system"));
    assert_eq!(settings.defaults, Settings::default().defaults);
    assert_eq!(settings.env_file, Settings::default().env_file);
}

#[test]
fn given_env_file_section_when_load_then_mode_and_roles_parsed() {
    let temp = TempDir::new().unwrap();
    let local = temp.path().join(".unitsmith.toml");
    fs::write(
        &local,
        r#"
[env_file]
name = "deploy/prod.env"
mode = "optional"
roles = ["web", "worker"]
"#,
    )
    .unwrap();

    let settings = Settings::load_from(None, Some(&local)).expect("load settings");

    assert_eq!(settings.env_file.name, "deploy/prod.env");
    assert_eq!(settings.env_file.mode, EnvFileMode::Optional);
    assert_eq!(
        settings.env_file.roles,
        vec![ServiceRole::Web, ServiceRole::Worker]
    );
}

#[test]
fn given_invalid_toml_when_load_then_config_error() {
    let temp = TempDir::new().unwrap();
    let local = temp.path().join(".unitsmith.toml");
    fs::write(&local, "[defaults\nworkers = ").unwrap();

    let err = Settings::load_from(None, Some(&local)).unwrap_err();

    assert!(err.to_string().starts_with("config error"));
}

#[rstest]
#[case("systemctl = \"/tmp/evil\"\n", "systemctl")]
#[case("python = \"/tmp/evil\"\n", "python")]
#[case("unit_dir = \"/tmp/units\"\n", "unit_dir")]
fn given_project_config_with_global_only_key_when_load_then_config_error(
    #[case] content: &str,
    #[case] key: &str,
) {
    // Arrange
    let temp = TempDir::new().unwrap();
    let local = temp.path().join(".unitsmith.toml");
    fs::write(&local, content).unwrap();

    // Act
    let err = Settings::load_from(None, Some(&local)).unwrap_err();

    // Assert
    assert!(matches!(err, ApplicationError::Config { .. }));
    assert!(err.to_string().contains(key));
}

#[test]
fn given_global_config_with_systemctl_when_load_then_accepted() {
    let temp = TempDir::new().unwrap();
    let global = temp.path().join("unitsmith.toml");
    fs::write(&global, "systemctl = \"/usr/bin/systemctl\"\npython = \"python3.12\"\n").unwrap();
    let local = temp.path().join(".unitsmith.toml");
    fs::write(&local, "[defaults]\nworkers = 2\n").unwrap();

    let settings = Settings::load_from(Some(&global), Some(&local)).expect("load settings");

    assert_eq!(settings.systemctl, "/usr/bin/systemctl");
    assert_eq!(settings.python, "python3.12");
    assert_eq!(settings.defaults.workers, 2);
}

// ============================================================
// environment variables
// ============================================================

#[test]
fn given_env_var_when_load_then_overrides_files() {
    // Arrange
    let temp = TempDir::new().unwrap();
    let local = temp.path().join(".unitsmith.toml");
    fs::write(&local, "[web]\nbind = \"127.0.0.1:9000\"\n").unwrap();
    std::env::set_var("UNITSMITH_WEB__BIND", "0.0.0.0:8080");

    // Act
    let result = Settings::load_from(None, Some(&local));
    std::env::remove_var("UNITSMITH_WEB__BIND");

    // Assert
    assert_eq!(result.expect("load settings").web.bind, "0.0.0.0:8080");
}

// ============================================================
// round trips of the effective configuration
// ============================================================

#[test]
fn given_settings_when_to_toml_then_loads_back_equal() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("unitsmith.toml");
    let mut settings = Settings::default();
    settings.unit_prefix = Some("store".into());
    settings.web.worker_class = Some("gthread".into());
    fs::write(&path, settings.to_toml().unwrap()).unwrap();

    let loaded = Settings::load_from(Some(&path), None).expect("load settings");

    assert_eq!(loaded.unit_prefix.as_deref(), Some("store"));
    assert_eq!(loaded.web.worker_class.as_deref(), Some("gthread"));
    assert_eq!(loaded.defaults, settings.defaults);
    assert_eq!(loaded.celery, settings.celery);
    assert_eq!(loaded.env_file, settings.env_file);
    assert_eq!(loaded.restart, settings.restart);
}
