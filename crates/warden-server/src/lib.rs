//! # warden-server
//!
//! Server half of warden: endpoints that hold OAuth client secrets and clear
//! httpOnly credential cookies the browser cannot touch.
//!
//! - [`AuthServer`]: resolved grants plus the axum router
//! - [`ServerError`]: error type mapped to HTTP responses

#![deny(unsafe_code)]

pub mod errors;
pub mod payload;
pub mod server;

pub use errors::ServerError;
pub use server::{AuthServer, RESET_ROUTE};
