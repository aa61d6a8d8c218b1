//! Proxy rotation
//!
//! Endpoints are handed out in round-robin order starting from a random
//! position chosen whenever the list is (re)loaded.

mod round_robin;

pub use round_robin::RoundRobinRotation;
