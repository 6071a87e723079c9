//! Lounge configuration system.
//!
//! Provides TOML-based configuration for the realtime transport, the
//! typing/presence engine and the durable counter store. All sections use
//! defaults so partial configs work out of the box.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use lounge_config::{load_config, config_to_json};
//!
//! let config = load_config().expect("failed to load config");
//! let json = config_to_json(&config);
//! println!("{json}");
//! ```

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{
    LoungeConfig, PresenceSettings, RealtimeSettings, StoreSettings, ToggleTableConfig,
    CONFIG_SCHEMA_VERSION,
};
pub use toml_loader::{
    create_default_config, default_config_path, load_default, load_from_path, CONFIG_PATH_ENV,
};

use lounge_common::ConfigError;

/// Load config from the platform default path and validate it.
pub fn load_config() -> Result<LoungeConfig, ConfigError> {
    let config = toml_loader::load_default()?;
    validation::validate(&config)?;
    Ok(config)
}

/// Serialize a config to a pretty-printed JSON string. Secrets are masked.
pub fn config_to_json(config: &LoungeConfig) -> String {
    let mut redacted = config.clone();
    if !redacted.realtime.api_key.is_empty() {
        redacted.realtime.api_key = "[REDACTED]".into();
    }
    if redacted.realtime.access_token.is_some() {
        redacted.realtime.access_token = Some("[REDACTED]".into());
    }
    serde_json::to_string_pretty(&redacted)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize config: {e}\"}}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_to_json_contains_all_sections() {
        let json = config_to_json(&LoungeConfig::default());
        assert!(json.contains("\"realtime\""));
        assert!(json.contains("\"presence\""));
        assert!(json.contains("\"store\""));
    }

    #[test]
    fn config_to_json_masks_secrets() {
        let mut config = LoungeConfig::default();
        config.realtime.api_key = "super-secret".into();
        config.realtime.access_token = Some("jwt".into());
        let json = config_to_json(&config);
        assert!(!json.contains("super-secret"));
        assert!(!json.contains("\"jwt\""));
        assert!(json.contains("[REDACTED]"));
    }

    #[test]
    fn config_schema_version_is_1() {
        assert_eq!(CONFIG_SCHEMA_VERSION, 1);
    }

    #[test]
    fn default_config_round_trips_through_json() {
        let json = serde_json::to_string(&LoungeConfig::default()).unwrap();
        let parsed: LoungeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.presence.typing_timeout_ms, 3000);
        assert_eq!(parsed.presence.debounce_ms, 1000);
        assert_eq!(parsed.store.tables.len(), 4);
    }
}
