//! Where lounge keeps its config file, and writing the commented default.
//!
//! The file carries the Supabase keys, so it is created owner-only and an
//! existing file is never replaced.

use lounge_common::ConfigError;
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use super::template::default_config_toml;

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "LOUNGE_CONFIG";

/// `$LOUNGE_CONFIG` if set, else `<platform config dir>/lounge/config.toml`.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    resolve_config_path(std::env::var_os(CONFIG_PATH_ENV))
}

pub(crate) fn resolve_config_path(explicit: Option<OsString>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit.filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::ParseError("could not determine config directory".into()))?;
    Ok(config_dir.join("lounge").join("config.toml"))
}

/// Write the commented default config to `path` unless a file is already
/// there.
pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            ConfigError::ParseError(format!(
                "failed to create config directory {}: {e}",
                parent.display()
            ))
        })?;
    }

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = match options.open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            info!("keeping existing config at {}", path.display());
            return Ok(());
        }
        Err(e) => {
            return Err(ConfigError::ParseError(format!(
                "failed to create {}: {e}",
                path.display()
            )))
        }
    };
    file.write_all(default_config_toml().as_bytes()).map_err(|e| {
        ConfigError::ParseError(format!(
            "failed to write default config to {}: {e}",
            path.display()
        ))
    })?;

    info!("created default config at {}", path.display());
    Ok(())
}
