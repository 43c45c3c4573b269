//! # warden-auth
//!
//! Authentication strategies and the session façade.
//!
//! - [`Auth`]: active strategy, login/logout, user state, redirects
//! - [`schemes`]: local, cookie, refresh (and LaravelJWT), OAuth 2.0, OpenID Connect
//! - [`token`]: access, refresh and id token records in universal storage
//! - [`request_handler`]: interceptors that attach tokens and refresh on expiry
//! - [`refresh_controller`]: at most one refresh in flight per scheme
//! - [`middleware`]: route guard
//!
//! Platform services (HTTP transport, router, cookies, web storage, clock)
//! are injected through [`AuthBuilder`].

#![deny(unsafe_code)]

pub mod auth;
mod background;
pub mod context;
pub mod errors;
pub mod http;
pub mod jwt;
pub mod middleware;
pub mod refresh_controller;
pub mod request_handler;
pub mod router;
pub mod schemes;
pub mod token;
pub mod token_status;
pub mod utils;

pub use auth::{Auth, AuthBuilder};
pub use context::{AuthContext, ErrorListener, RedirectListener};
pub use errors::{AuthError, Result};
pub use http::{HttpClient, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
pub use middleware::{GuardDecision, guard_route};
pub use refresh_controller::RefreshController;
pub use request_handler::{RequestHandler, ResetOnResponseError};
pub use router::{MemoryRouter, Route, RouteAuth, Router};
pub use schemes::{LoginRequest, ResetOptions, Scheme, SchemeCheck};
pub use token::{CredentialValue, IdToken, RefreshToken, Token};
pub use token_status::TokenStatus;
