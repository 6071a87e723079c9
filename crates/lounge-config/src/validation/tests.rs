use super::*;
use crate::schema::ToggleTableConfig;

#[test]
fn default_config_is_valid() {
    assert!(validate(&LoungeConfig::default()).is_ok());
}

#[test]
fn debounce_must_be_below_timeout() {
    let mut config = LoungeConfig::default();
    config.presence.debounce_ms = 3000;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("presence.debounce_ms"));
}

#[test]
fn zero_timeouts_are_rejected() {
    let mut config = LoungeConfig::default();
    config.presence.typing_timeout_ms = 0;
    config.presence.local_idle_ms = 0;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("presence.typing_timeout_ms = 0"));
    assert!(err.contains("presence.local_idle_ms = 0"));
}

#[test]
fn max_reconnect_below_base_is_rejected() {
    let mut config = LoungeConfig::default();
    config.realtime.reconnect_delay_secs = 10;
    config.realtime.max_reconnect_delay_secs = 5;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("max_reconnect_delay_secs"));
}

#[test]
fn project_ref_must_be_alphanumeric() {
    let mut config = LoungeConfig::default();
    config.realtime.project_ref = "abc.evil.com/".into();
    assert!(validate(&config).is_err());
}

#[test]
fn duplicate_and_unknown_kinds_are_rejected() {
    let mut config = LoungeConfig::default();
    config.store.tables.push(ToggleTableConfig {
        kind: "post_like".into(),
        table: "likes_v2".into(),
        subject_column: "user_id".into(),
        resource_column: "post_id".into(),
        state_column: "active".into(),
    });
    config.store.tables.push(ToggleTableConfig {
        kind: "bookmark".into(),
        table: "bookmarks".into(),
        subject_column: "user_id".into(),
        resource_column: "post_id".into(),
        state_column: "active".into(),
    });
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("is duplicated"));
    assert!(err.contains("\"bookmark\""));
}

#[test]
fn table_identifiers_are_checked() {
    let mut config = LoungeConfig::default();
    config.store.tables[0].table = "likes; drop table users".into();
    config.store.tables[0].state_column = String::new();
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("store.tables[0].table"));
    assert!(err.contains("store.tables[0].state_column must not be empty"));
}

#[test]
fn errors_are_collected_not_short_circuited() {
    let mut config = LoungeConfig::default();
    config.realtime.heartbeat_interval_secs = 0;
    config.store.request_timeout_secs = 0;
    config.store.rest_url = "ftp://nope".into();
    let err = validate(&config).unwrap_err().to_string();
    assert_eq!(err.matches(';').count(), 2);
}
