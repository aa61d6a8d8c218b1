//! Egress proxy handling
//!
//! This module provides:
//! - Parsing of the configured proxy list
//! - Round-robin rotation with a random starting position
//! - Per-request proxy decisions (protected hosts, static proxies, rotation)

pub mod manager;
pub mod rotation;

pub use manager::{parse_proxy_list, ProxyManager};
pub use rotation::RoundRobinRotation;
