//! Configuration schema types for Lounge.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod presence;
mod realtime;
mod store;

pub use presence::*;
pub use realtime::*;
pub use store::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoungeConfig {
    pub realtime: RealtimeSettings,
    pub presence: PresenceSettings,
    pub store: StoreSettings,
}
