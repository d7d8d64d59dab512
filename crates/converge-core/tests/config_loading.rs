//! Functional tests for configuration loading.

use converge_core::{ConvergeConfig, ConvergeError};
use std::path::PathBuf;
use tempfile::TempDir;

/// Tenet: an explicit config file is read and unspecified keys keep their
/// defaults.
#[test]
fn explicit_file_overrides_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("converge.toml");
    std::fs::write(
        &path,
        "workspace_id = \"01HZX3Q2J8R6V5W4T3S2K1M0N9\"\nchange_set_prefix = \"ci\"\nschemas_root = \"defs\"\nbuiltin_override = true\n",
    )
    .unwrap();

    let config = ConvergeConfig::from_file(&path).unwrap();
    assert_eq!(config.workspace_id.as_deref(), Some("01HZX3Q2J8R6V5W4T3S2K1M0N9"));
    assert_eq!(config.change_set_prefix, "ci");
    assert_eq!(config.schemas_root, PathBuf::from("defs"));
    assert!(config.builtin_override);
    assert_eq!(config.timeout_secs, 30);
    assert_eq!(config.overlays_root, PathBuf::from("overlays"));
}

/// Tenet: an explicit config path that does not exist is an error, not a
/// silent fallback to defaults.
#[test]
fn missing_explicit_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let err = ConvergeConfig::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
    assert!(matches!(err, ConvergeError::Io { .. }));
}

/// Tenet: malformed TOML is reported as a configuration error.
#[test]
fn malformed_file_is_config_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("converge.toml");
    std::fs::write(&path, "timeout_secs = \"soon\"").unwrap();

    let err = ConvergeConfig::from_file(&path).unwrap_err();
    assert!(matches!(err, ConvergeError::Config(_)));
    assert!(err.is_fatal());
}
