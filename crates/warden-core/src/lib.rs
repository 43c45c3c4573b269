//! # warden-core
//!
//! Foundation pieces shared by every warden crate:
//!
//! - [`clock`]: millisecond wall clock behind a trait so expiry math is testable
//! - [`RenderContext`]: which side of the server/client boundary an instance runs on
//! - [`random`]: URL-safe random strings for OAuth `state`, `nonce` and PKCE verifiers
//! - [`logging`]: `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod clock;
pub mod logging;
pub mod random;
mod render;

pub use clock::{Clock, ManualClock, SystemClock};
pub use render::RenderContext;
