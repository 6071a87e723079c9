//! Tests for TOML config loading, creation, and path resolution.

use super::*;
use std::path::Path;

#[test]
fn load_from_nonexistent_returns_file_not_found() {
    let result = load_from_path(Path::new("/tmp/nonexistent_lounge_config.toml"));
    let err = result.unwrap_err();
    assert!(matches!(err, lounge_common::ConfigError::FileNotFound(_)));
}

#[test]
fn load_valid_partial_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[realtime]
project_ref = "abcd"

[presence]
typing_timeout_ms = 5000
"#,
    )
    .unwrap();

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.realtime.project_ref, "abcd");
    assert_eq!(config.presence.typing_timeout_ms, 5000);
    // Defaults preserved
    assert_eq!(config.presence.debounce_ms, 1000);
    assert_eq!(config.realtime.heartbeat_interval_secs, 25);
    assert_eq!(config.store.tables.len(), 4);
}

#[test]
fn load_custom_tables_replaces_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[[store.tables]]
kind = "post_like"
table = "reactions"
subject_column = "profile_id"
resource_column = "video_id"
state_column = "liked"
"#,
    )
    .unwrap();

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.store.tables.len(), 1);
    let table = config.store.table_for("post_like").unwrap();
    assert_eq!(table.table, "reactions");
    assert_eq!(table.state_column, "liked");
}

#[test]
fn load_invalid_toml_returns_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "this is not valid toml {{{").unwrap();

    let err = load_from_path(&path).unwrap_err();
    assert!(matches!(err, lounge_common::ConfigError::ParseError(_)));
}

#[test]
fn load_config_with_invalid_values_falls_back_to_default() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[presence]
typing_timeout_ms = 500
debounce_ms = 1000
"#,
    )
    .unwrap();

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.presence.typing_timeout_ms, 3000);
    assert_eq!(config.presence.debounce_ms, 1000);
}

#[test]
fn create_and_load_default_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lounge").join("config.toml");

    create_default_config(&path).unwrap();
    assert!(path.exists());

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.presence.typing_timeout_ms, 3000);
    assert!(config.realtime.project_ref.is_empty());
}

#[test]
fn default_config_path_ends_with_lounge_config() {
    if let Ok(path) = super::paths::resolve_config_path(None) {
        assert!(path.ends_with("lounge/config.toml"));
    }
}

#[test]
fn explicit_config_path_wins() {
    let path = super::paths::resolve_config_path(Some("/srv/lounge.toml".into())).unwrap();
    assert_eq!(path, Path::new("/srv/lounge.toml"));

    if let Ok(path) = super::paths::resolve_config_path(Some("".into())) {
        assert!(path.ends_with("lounge/config.toml"));
    }
}

#[test]
fn create_default_config_keeps_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[realtime]\nproject_ref = \"mine\"\n").unwrap();

    create_default_config(&path).unwrap();
    let config = load_from_path(&path).unwrap();
    assert_eq!(config.realtime.project_ref, "mine");
}

#[cfg(unix)]
#[test]
fn default_config_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    create_default_config(&path).unwrap();
    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}
