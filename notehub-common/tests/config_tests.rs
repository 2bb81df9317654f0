//! Configuration resolution and graceful degradation
//!
//! Tests touching `NOTEHUB_ROOT` / `NOTEHUB_CONFIG` are `#[serial]` so they
//! never observe each other's environment.

use notehub_common::config::{
    locate_config_file, resolve_root_folder, Overrides, ServerConfig, TomlConfig, CONFIG_ENV_VAR,
    ROOT_ENV_VAR,
};
use notehub_common::Permission;
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[test]
#[serial]
fn test_cli_root_beats_environment() {
    env::set_var(ROOT_ENV_VAR, "/tmp/from-env");
    let toml = TomlConfig::default();

    let root = resolve_root_folder(Some(Path::new("/tmp/from-cli")), &toml);
    assert_eq!(root, PathBuf::from("/tmp/from-cli"));

    env::remove_var(ROOT_ENV_VAR);
}

#[test]
#[serial]
fn test_environment_root_beats_toml() {
    env::set_var(ROOT_ENV_VAR, "/tmp/from-env");
    let toml = TomlConfig::from_toml_str("root_folder = \"/tmp/from-toml\"").unwrap();

    assert_eq!(resolve_root_folder(None, &toml), PathBuf::from("/tmp/from-env"));

    env::remove_var(ROOT_ENV_VAR);
    assert_eq!(resolve_root_folder(None, &toml), PathBuf::from("/tmp/from-toml"));
}

#[test]
#[serial]
fn test_missing_config_file_falls_back_to_defaults() {
    env::remove_var(CONFIG_ENV_VAR);
    let config = TomlConfig::load(Some(Path::new("/nonexistent/notehub/config.toml")));
    assert_eq!(config.port, 3000);
    assert_eq!(config.default_permission, "limited");
}

#[test]
#[serial]
fn test_invalid_config_file_falls_back_to_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "port = \"not a number\"").unwrap();

    let config = TomlConfig::load(Some(&path));
    assert_eq!(config.port, 3000);
}

#[test]
#[serial]
fn test_config_env_var_is_located() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("custom.toml");
    std::fs::write(&path, "port = 4100\n").unwrap();

    env::set_var(CONFIG_ENV_VAR, &path);
    assert_eq!(locate_config_file(None), Some(path.clone()));
    let config = TomlConfig::load(None);
    assert_eq!(config.port, 4100);
    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_resolve_derives_paths_and_url() {
    env::remove_var(ROOT_ENV_VAR);
    let dir = TempDir::new().unwrap();
    let toml = TomlConfig::from_toml_str(
        r#"
        port = 8123
        default_permission = "private"
        allow_pdf_export = true

        [realtime]
        max_clients_per_note = 3
        "#,
    )
    .unwrap();

    let config = ServerConfig::resolve(
        toml,
        Overrides {
            root_folder: Some(dir.path().to_path_buf()),
            host: Some("0.0.0.0".into()),
            ..Default::default()
        },
    )
    .unwrap();

    assert_eq!(config.db_path, dir.path().join("notehub.db"));
    assert_eq!(config.uploads_path, dir.path().join("uploads"));
    assert_eq!(config.server_url, "http://0.0.0.0:8123");
    assert_eq!(config.bind_addr(), "0.0.0.0:8123");
    assert_eq!(config.default_permission, Permission::Private);
    assert!(config.allow_pdf_export);
    assert_eq!(config.realtime.max_clients_per_note, 3);
    assert_eq!(config.realtime.save_interval_secs, 5);
}

#[test]
#[serial]
fn test_unknown_default_permission_is_rejected() {
    let toml = TomlConfig::from_toml_str("default_permission = \"everyone\"").unwrap();
    assert!(ServerConfig::resolve(toml, Overrides::default()).is_err());
}

#[test]
#[serial]
fn test_ensure_directories_creates_uploads() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("data");
    let config = ServerConfig::for_root(&root).unwrap();

    config.ensure_directories().unwrap();
    assert!(root.is_dir());
    assert!(config.uploads_path.is_dir());
}
