//! Integration tests for xtag-config
//!
//! These tests verify the full config loading pipeline with real file system operations.

use tempfile::tempdir;
use xtag_config::{Config, ConfigError, LogLevel};
use xtag_record::Algorithm;

/// Test config loading from a real global config file
#[test]
fn test_load_global_config_from_file() {
    let temp = tempdir().unwrap();
    let global = temp.path().join("global/config.toml");
    std::fs::create_dir_all(global.parent().unwrap()).unwrap();
    std::fs::write(
        &global,
        r#"
[hashing]
algorithm = "RIPEMD160"

[walk]
follow_symlinks = true

[errors]
stop_on_soft_error = true

[dispatch]
threads = 4

[log]
level = "debug"
"#,
    )
    .unwrap();

    let config = Config::load_from(Some(&global), &temp.path().join("absent.toml")).unwrap();
    assert_eq!(config.hashing.algorithm, Algorithm::Ripemd160);
    assert!(config.walk.follow_symlinks);
    assert!(config.errors.stop_on_soft_error);
    assert_eq!(config.dispatch.threads, Some(4));
    assert_eq!(config.log.level, LogLevel::Debug);
}

/// Test config hierarchy: project config overrides global
#[test]
fn test_config_hierarchy_project_overrides_global() {
    let temp = tempdir().unwrap();

    let global = temp.path().join("global/.xtag/config.toml");
    std::fs::create_dir_all(global.parent().unwrap()).unwrap();
    std::fs::write(
        &global,
        r#"
[hashing]
algorithm = "SHA3256"

[dispatch]
threads = 2
"#,
    )
    .unwrap();

    let project = temp.path().join("project/.xtag/config.toml");
    std::fs::create_dir_all(project.parent().unwrap()).unwrap();
    std::fs::write(
        &project,
        r#"
[dispatch]
threads = 16
"#,
    )
    .unwrap();

    let config = Config::load_from(Some(&global), &project).unwrap();
    // Overridden by the project file
    assert_eq!(config.dispatch.threads, Some(16));
    // Kept from the global file
    assert_eq!(config.hashing.algorithm, Algorithm::Sha3_256);
    // Neither file sets it
    assert_eq!(config.log.level, LogLevel::Error);
}

/// A bad value is reported against the file it came from
#[test]
fn test_invalid_file_names_its_path() {
    let temp = tempdir().unwrap();
    let project = temp.path().join("config.toml");
    std::fs::write(&project, "[hashing]\nalgorithm = \"MD5\"\n").unwrap();

    let err = Config::load_from(None, &project).unwrap_err();
    match err {
        ConfigError::Toml { path, .. } => assert_eq!(path, project),
        other => panic!("unexpected error: {other}"),
    }
}

/// No files at all yields the defaults
#[test]
fn test_missing_files_yield_defaults() {
    let temp = tempdir().unwrap();
    let config = Config::load_from(
        Some(&temp.path().join("nope.toml")),
        &temp.path().join("also-nope.toml"),
    )
    .unwrap();
    assert_eq!(config, Config::default());
}

/// Test complete config serialization/deserialization cycle
#[test]
fn test_config_full_roundtrip_with_all_sections() {
    let mut original = Config::default();
    original.hashing.algorithm = Algorithm::Ripemd160;
    original.dispatch.threads = Some(7);
    original.log.level = LogLevel::Trace;

    let temp = tempdir().unwrap();
    let config_path = temp.path().join("config.toml");
    std::fs::write(&config_path, toml::to_string_pretty(&original).unwrap()).unwrap();

    let loaded = Config::load_from(None, &config_path).unwrap();
    assert_eq!(original, loaded);
}
