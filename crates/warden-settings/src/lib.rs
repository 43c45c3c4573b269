//! # warden-settings
//!
//! Typed auth configuration.
//!
//! Options are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`AuthOptions::default()`]
//! 2. **Config file**: `$WARDEN_CONFIG` or `./warden.json` (deep-merged over defaults)
//! 3. **Environment variables**: `WARDEN_*` overrides (highest priority)
//!
//! Strategies stay raw JSON until [`resolve_strategies`] merges scheme
//! defaults and provider presets underneath and types them.

#![deny(unsafe_code)]

pub mod defaults;
pub mod errors;
pub mod falsy;
pub mod loader;
pub mod providers;
pub mod resolve;
pub mod types;

pub use defaults::scheme_defaults;
pub use errors::{Result, SettingsError};
pub use loader::{config_path, deep_merge, load_options, load_options_from_path};
pub use resolve::{GrantKind, ResolvedStrategies, ServerGrant, resolve_strategies};
pub use types::*;
