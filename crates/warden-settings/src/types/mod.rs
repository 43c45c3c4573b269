//! Configuration type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` so configs written for
//! the browser side load unchanged. Each type implements [`Default`]; missing
//! fields get their default during deserialization.

mod auth;
mod endpoint;
mod stores;
mod strategy;

pub use auth::*;
pub use endpoint::*;
pub use stores::*;
pub use strategy::*;
