//! Round-robin rotation over a reloadable endpoint list

use parking_lot::Mutex;
use rand::Rng;

use crate::models::ProxyEndpoint;

#[derive(Debug, Default)]
struct RotationState {
    endpoints: Vec<ProxyEndpoint>,
    /// Always `< endpoints.len()` while the list is non-empty.
    cursor: usize,
}

/// Hands out endpoints in round-robin order.
///
/// Reading the current endpoint and advancing the cursor happen under one
/// lock, so concurrent callers never observe the same cursor value.
#[derive(Debug, Default)]
pub struct RoundRobinRotation {
    state: Mutex<RotationState>,
}

impl RoundRobinRotation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the list and start from a uniformly random position
    pub fn replace<R: Rng>(&self, endpoints: Vec<ProxyEndpoint>, rng: &mut R) {
        let mut state = self.state.lock();
        if !endpoints.is_empty() {
            state.cursor = rng.gen_range(0..endpoints.len());
        } else {
            state.cursor = 0;
        }
        state.endpoints = endpoints;
    }

    pub fn next(&self) -> Option<ProxyEndpoint> {
        let mut state = self.state.lock();
        if state.endpoints.is_empty() {
            return None;
        }

        let proxy = state.endpoints[state.cursor].clone();
        state.cursor = (state.cursor + 1) % state.endpoints.len();
        Some(proxy)
    }

    pub fn len(&self) -> usize {
        self.state.lock().endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn endpoints(&self) -> Vec<ProxyEndpoint> {
        self.state.lock().endpoints.clone()
    }

    #[cfg(test)]
    pub(crate) fn cursor(&self) -> usize {
        self.state.lock().cursor
    }
}
