//! # cable-settings
//!
//! Layered configuration for the cable server.
//!
//! Settings are resolved from three layers (in priority order):
//! 1. **Compiled defaults**: [`CableSettings::default()`]
//! 2. **Config file**: a JSON file deep-merged over the defaults
//! 3. **Environment variables**: `CABLE_*` overrides (highest priority)
//!
//! Command-line flags are applied on top by the binary.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, deep_merge, load_settings, load_settings_from_path, validate};
pub use types::*;
