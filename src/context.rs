//! Process-wide HTTP context
//!
//! Built once at start-up and handed to whatever needs to make outbound
//! requests. Owns the shared proxy manager, the pooled transport, the event
//! channel and the default client.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::info;

use crate::client::{Client, ClientBuilder, ReqwestTransport, Transport, TransportSettings};
use crate::config::Config;
use crate::error::Result;
use crate::models::ClientEvent;
use crate::proxy::ProxyManager;

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 1024;

pub struct HttpContext {
    config: Config,
    transport: Arc<dyn Transport>,
    proxies: Arc<ProxyManager>,
    events: broadcast::Sender<ClientEvent>,
    default_client: Arc<Client>,
}

impl HttpContext {
    pub fn from_env() -> Result<Self> {
        Self::from_config(Config::from_env()?)
    }

    /// Context backed by the pooled reqwest transport
    pub fn from_config(config: Config) -> Result<Self> {
        let transport = Arc::new(ReqwestTransport::new(TransportSettings::from(&config.http)));
        Self::with_transport(config, transport)
    }

    pub fn with_transport(config: Config, transport: Arc<dyn Transport>) -> Result<Self> {
        let proxies = Arc::new(ProxyManager::from_config(&config.proxy));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let default_client = Client::builder(transport.clone(), proxies.clone())
            .config(&config.http)
            .event_sender(events.clone())
            .build()?;

        info!(
            proxies = proxies.available_count(),
            rotation = proxies.rotation_enabled(),
            timeout_secs = config.http.timeout.as_secs(),
            retries = config.http.max_retries,
            "HTTP context initialized"
        );

        Ok(Self {
            config,
            transport,
            proxies,
            events,
            default_client: Arc::new(default_client),
        })
    }

    /// Builder for an additional client sharing this context's transport,
    /// proxy manager and event channel
    pub fn client_builder(&self) -> ClientBuilder {
        Client::builder(self.transport.clone(), self.proxies.clone())
            .config(&self.config.http)
            .event_sender(self.events.clone())
    }

    pub fn default_client(&self) -> &Arc<Client> {
        &self.default_client
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Per-attempt timeout applied by clients of this context
    pub fn timeout(&self) -> Duration {
        self.config.http.timeout
    }

    pub fn proxy_manager(&self) -> &Arc<ProxyManager> {
        &self.proxies
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Re-read the proxy list from the environment
    pub fn reload_proxies(&self) {
        self.proxies.reload_from_env();
    }
}
