//! deisctl's own settings file.
//!
//! Selects the backend and KV store at startup and carries their connection
//! details. A missing file is equivalent to an empty one.

mod parser;
mod schema;
mod store;

pub use parser::{parse_settings, parse_settings_str};
pub use schema::{EtcdSettings, FleetSettings, KvKind, Settings};
pub use store::{SETTINGS_FILE, SettingsStore, default_state_dir};
