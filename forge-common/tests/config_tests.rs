//! Configuration resolution tests
//!
//! Tests that touch process environment are marked `#[serial]` so they never
//! observe each other's variables.

use forge_common::config::{
    load_toml_config, resolve_root_folder, CliOverrides, Config, Credential, TomlConfig,
    DEFAULT_PORT, ROOT_FOLDER_ENV,
};
use serial_test::serial;
use std::path::{Path, PathBuf};
use std::time::Duration;

fn clear_env() {
    for credential in Credential::ALL {
        std::env::remove_var(credential.env_var());
    }
    std::env::remove_var(ROOT_FOLDER_ENV);
    std::env::remove_var("FORGE_BIND");
    std::env::remove_var("FORGE_LOG");
    std::env::remove_var("FORGE_CONVERTER_BIN");
}

// ============================================================================
// Root folder resolution
// ============================================================================

#[test]
#[serial]
fn test_cli_root_folder_wins() {
    clear_env();
    std::env::set_var(ROOT_FOLDER_ENV, "/tmp/from-env");

    let resolved = resolve_root_folder(
        Some(Path::new("/tmp/from-cli")),
        ROOT_FOLDER_ENV,
        Some(Path::new("/tmp/from-toml")),
    );
    assert_eq!(resolved, PathBuf::from("/tmp/from-cli"));

    clear_env();
}

#[test]
#[serial]
fn test_env_root_folder_beats_toml() {
    clear_env();
    std::env::set_var(ROOT_FOLDER_ENV, "/tmp/from-env");

    let resolved = resolve_root_folder(None, ROOT_FOLDER_ENV, Some(Path::new("/tmp/from-toml")));
    assert_eq!(resolved, PathBuf::from("/tmp/from-env"));

    clear_env();
}

#[test]
#[serial]
fn test_toml_root_folder_used_without_env() {
    clear_env();

    let resolved = resolve_root_folder(None, ROOT_FOLDER_ENV, Some(Path::new("/tmp/from-toml")));
    assert_eq!(resolved, PathBuf::from("/tmp/from-toml"));
}

// ============================================================================
// Credentials
// ============================================================================

#[test]
#[serial]
fn test_credentials_from_env() {
    clear_env();
    std::env::set_var("MESHY_API_KEY", "env-meshy");
    std::env::set_var("TRIPO_API_KEY", "your_tripo_key_here");

    let config = Config::from_sources(&CliOverrides::default(), &TomlConfig::default());
    assert_eq!(config.credentials.get(Credential::Meshy), Some("env-meshy"));
    assert_eq!(config.credentials.get(Credential::Tripo), None);
    assert_eq!(config.credentials.get(Credential::Rodin), None);

    clear_env();
}

#[test]
#[serial]
fn test_override_file_beats_env() {
    clear_env();
    std::env::set_var("RODIN_API_KEY", "env-rodin");
    std::env::set_var("MESHY_API_KEY", "env-meshy");

    let toml_config: TomlConfig = toml::from_str(
        r#"
        [credentials]
        rodin_api_key = "file-rodin"
        meshy_api_key = ""
        "#,
    )
    .unwrap();

    let config = Config::from_sources(&CliOverrides::default(), &toml_config);
    assert_eq!(config.credentials.get(Credential::Rodin), Some("file-rodin"));
    // Empty override falls back to the environment
    assert_eq!(config.credentials.get(Credential::Meshy), Some("env-meshy"));

    clear_env();
}

// ============================================================================
// Service settings
// ============================================================================

#[test]
#[serial]
fn test_defaults() {
    clear_env();

    let cli = CliOverrides {
        root_folder: Some(PathBuf::from("/tmp/forge-root")),
        ..Default::default()
    };
    let config = Config::from_sources(&cli, &TomlConfig::default());

    assert_eq!(config.bind_address, format!("127.0.0.1:{}", DEFAULT_PORT));
    assert_eq!(config.log_level, "info");
    assert_eq!(config.converter.binary, "assimp");
    assert_eq!(config.converter.timeout, Duration::from_secs(30));
    assert_eq!(config.database_path(), PathBuf::from("/tmp/forge-root/forge.db"));
    assert_eq!(config.storage_dir(), PathBuf::from("/tmp/forge-root/storage"));
}

#[test]
#[serial]
fn test_cli_port_replaces_bind_port() {
    clear_env();
    std::env::set_var("FORGE_BIND", "0.0.0.0:9000");

    let cli = CliOverrides {
        port: Some(9100),
        ..Default::default()
    };
    let config = Config::from_sources(&cli, &TomlConfig::default());
    assert_eq!(config.bind_address, "0.0.0.0:9100");

    clear_env();
}

#[test]
#[serial]
fn test_load_reads_override_file() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("forge.toml");
    std::fs::write(
        &path,
        r#"
        root_folder = "/tmp/forge-file-root"
        log_level = "debug"

        [converter]
        binary = "/opt/assimp/bin/assimp"
        timeout_secs = 12

        [credentials]
        replicate_api_key = "r8_file"
        "#,
    )
    .unwrap();

    let cli = CliOverrides {
        config_file: Some(path),
        ..Default::default()
    };
    let config = Config::load(&cli).unwrap();

    assert_eq!(config.root_folder, PathBuf::from("/tmp/forge-file-root"));
    assert_eq!(config.log_level, "debug");
    assert_eq!(config.converter.binary, "/opt/assimp/bin/assimp");
    assert_eq!(config.converter.timeout, Duration::from_secs(12));
    assert_eq!(config.credentials.get(Credential::Replicate), Some("r8_file"));
}

#[test]
fn test_malformed_override_file_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "root_folder = [unterminated").unwrap();

    let err = load_toml_config(&path).unwrap_err();
    assert!(matches!(err, forge_common::Error::Config(_)));
}
