//! Curevia Gateway - HTTP surface for the site assistant
//!
//! Exposes the answer resolution pipeline of `curevia-core` to the browser
//! widget.
//!
//! # Endpoints
//!
//! - `GET /resolve`: metadata (cache readiness, suggested questions, flags)
//! - `POST /resolve`: `{ message, assumptions? }` answered as JSON, or as a
//!   server-sent event stream with `Accept: text/event-stream` or `?stream=1`
//! - `POST /resolve` with `contact` or `feedback`: lead relay and votes
//! - `GET /health`: liveness
//!
//! Every `/resolve` request passes the ingress gate first: a general
//! per-client rate limit and a request body cap.

pub mod config;
pub mod contact;
pub mod error;
pub mod gateway;
pub mod security;

pub use config::GatewayConfig;
pub use contact::{ContactForm, ContactLead, ContactRelay};
pub use error::{ApiError, GatewayError, Result};
pub use gateway::{Gateway, GatewayState};
pub use security::IngressGate;

/// Gateway version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 8787;

/// Default host
pub const DEFAULT_HOST: &str = "127.0.0.1";
