//! wicket - a named-service forwarding gateway with dynamic IP allow-lists.
//!
//! wicket relays HTTP requests addressed to `/{service}` to that service's
//! configured upstream target. Each relay is gated by a per-service CIDR
//! allow-list that a background task periodically repopulates from a remote
//! JSON document (or from static configuration). The crate follows a
//! **hexagonal architecture**: business logic lives in `core`, I/O behind
//! `ports` traits implemented by `adapters`.
//!
//! # Features
//! - Path-segment service addressing with case-insensitive names
//! - Verbatim relay of method, query string, headers and body
//! - Per-service CIDR allow-lists (IPv4 + IPv6) with an unconditional
//!   loopback bypass
//! - Timer-driven allow-list refresh from remote JSON sources, with a
//!   configurable query path into the document
//! - Atomic list replacement: request handlers never observe a partial set
//! - Classified forwarding failures mapped to client responses at a single
//!   point
//! - Configuration in YAML / JSON / TOML with startup validation
//! - Structured tracing via `tracing`
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use wicket::{config, core::ServiceRegistry};
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let cfg = config::loader::load_config("config.yaml").await?;
//! config::GatewayConfigValidator::validate(&cfg)?;
//! let registry = Arc::new(ServiceRegistry::from_config(&cfg)?);
//! // Wire the registry into HttpHandler / AllowlistRefresher (see the
//! // binary crate for the full assembly).
//! # Ok(()) }
//! ```
//!
//! # Error Handling
//! Fallible binary-level APIs return `eyre::Result<T>`; domain failures are
//! typed (`ForwardError`, `RefreshError`, `ValidationError`). Per-request
//! failures are caught at the handler boundary and become client responses;
//! refresh-cycle failures are logged and never affect request serving.
//!
//! # License
//! Licensed under Apache-2.0.
pub mod config;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

// These modules are implementation details and should not be directly used by users
pub mod adapters;
pub mod core;

// Re-export the specific types needed by the binary crate
pub use crate::{
    adapters::{AllowlistRefresher, HttpClientAdapter, HttpHandler},
    core::{ServiceRegistry, UpstreamForwarder},
    ports::http_client::HttpClient,
};
