//! Full configuration validation.
//!
//! Each section has its own submodule; this orchestrator calls them all
//! and collects errors into a single `ConfigError`.

mod helpers;
mod presence;
mod realtime;
mod store;

#[cfg(test)]
mod tests;

use crate::schema::LoungeConfig;
use lounge_common::ConfigError;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &LoungeConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    realtime::validate_realtime(&mut errors, config);
    presence::validate_presence(&mut errors, config);
    store::validate_store(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}
