//! Outbound HTTP client
//!
//! This module provides:
//! - The request executor (`Client`) and its builder
//! - Retry with linear backoff
//! - Charset inspection and blocked-request reporting
//! - Per-client cookie store and default headers
//! - Redirect following with per-hop cookies
//! - Production, traced and mock transports

pub mod cookies;
pub mod encoding;
pub mod events;
pub mod executor;
pub mod headers;
pub mod mock;
pub mod retry;
pub mod session;
pub mod transport;
pub mod user_agents;

pub use cookies::CookieStore;
pub use encoding::{deduce_charset, DEFAULT_CHARSET};
pub use events::EventLog;
pub use executor::{Client, ClientBuilder};
pub use mock::{MockResponse, MockTransport, RecordedRequest};
pub use retry::{backoff, RetryPolicy};
pub use session::RedirectPolicy;
pub use transport::{ReqwestTransport, TracedTransport, Transport, TransportSettings};
