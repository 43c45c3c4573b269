//! # warden-storage
//!
//! Universal storage for auth session state.
//!
//! [`Storage`] spans four surfaces: in-memory reactive state, cookies,
//! `localStorage` and `sessionStorage`. Each durable surface is a
//! [`StorageBackend`] in a fixed precedence list; platform primitives are
//! injected through [`CookieJar`] and [`WebStorage`].

#![deny(unsafe_code)]

pub mod backend;
pub mod codec;
pub mod cookies;
pub mod errors;
pub mod memory;
mod storage;
pub mod web;

pub use backend::{BackendKind, BackendSet, StorageBackend};
pub use codec::{decode_value, encode_value};
pub use cookies::{CookieBackend, CookieJar, MemoryCookieJar, build_cookie};
pub use errors::{Result, StorageError};
pub use memory::{MemoryState, StateChange, is_private_key};
pub use storage::{Platform, Storage};
pub use web::{MemoryWebStorage, WebStorage, WebStorageBackend};
