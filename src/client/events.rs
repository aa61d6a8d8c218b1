//! Client event sink: tracing output plus an optional broadcast channel

use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::models::{ClientEvent, EventLevel};

/// Where a client's events go.
///
/// Emission never fails and never changes request behaviour.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    sender: Option<broadcast::Sender<ClientEvent>>,
}

impl EventLog {
    pub fn new(sender: Option<broadcast::Sender<ClientEvent>>) -> Self {
        Self { sender }
    }

    pub fn subscribe(&self) -> Option<broadcast::Receiver<ClientEvent>> {
        self.sender.as_ref().map(|s| s.subscribe())
    }

    pub fn emit(&self, event: ClientEvent) {
        let properties = format_properties(&event.properties);
        let request_id = event.request_id.map(|id| id.to_string());

        match event.kind.level() {
            EventLevel::Info => info!(
                event = event.kind.as_str(),
                request_id = request_id.as_deref(),
                method = %event.method,
                url = %event.url,
                status = event.status,
                elapsed_ms = event.elapsed_ms,
                proxy_used = event.proxy_used.as_deref(),
                error = event.error.as_deref(),
                properties = %properties,
                "{}",
                event.kind
            ),
            EventLevel::Warning => warn!(
                event = event.kind.as_str(),
                request_id = request_id.as_deref(),
                method = %event.method,
                url = %event.url,
                status = event.status,
                elapsed_ms = event.elapsed_ms,
                proxy_used = event.proxy_used.as_deref(),
                error = event.error.as_deref(),
                properties = %properties,
                "{}",
                event.kind
            ),
        }

        if let Some(sender) = &self.sender {
            // No receivers is fine
            let _ = sender.send(event);
        }
    }
}

fn format_properties(properties: &[(String, String)]) -> String {
    properties
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}
