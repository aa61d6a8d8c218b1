//! Outbound - resilient outbound HTTP client
//!
//! Issues external HTTP requests through rotating egress proxies.
//!
//! ## Features
//!
//! - Round-robin proxy rotation with protected (never proxied) destinations
//! - Static per-client proxies, with credentials anonymized in every log line
//! - Retry of transient failures with linear backoff and cancellation
//! - Blocked-request and Cloudflare challenge reporting
//! - Response charset inspection
//! - Per-client cookie store and browser-like default headers
//! - Mock transport for testing code built on the client

pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod models;
pub mod proxy;

pub use client::{Client, ClientBuilder, MockTransport, ReqwestTransport, Transport};
pub use config::Config;
pub use context::HttpContext;
pub use error::{OutboundError, Result};
pub use models::{ClientEvent, EventKind, HttpRequest, HttpResponse, ProxyEndpoint};
pub use proxy::ProxyManager;
