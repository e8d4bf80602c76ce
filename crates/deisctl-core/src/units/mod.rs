//! Unit definitions: where they are loaded from before install, and how
//! they are refreshed from upstream.
//!
//! Install never refreshes implicitly; the two operations are independent.

mod refresh;
mod search;

pub use refresh::{
    DEFAULT_UNITS_REF, DEFAULT_UNITS_URL, RefreshReport, refresh_units, refresh_units_blocking,
    unit_file_url,
};
pub use search::{
    SYSTEM_UNITS_DIR, UNITS_ENV, UnitDefinition, UnitSearchPath, default_user_units_dir,
};
