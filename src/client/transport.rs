//! Transport layer: one prepared request in, one buffered response out
//!
//! The production transport is backed by reqwest with one pooled client per
//! egress proxy. Redirects are never followed here; `Session` walks them so
//! every hop sees the client's cookies. `TracedTransport` wraps any
//! transport in a tracing span.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::redirect::Policy;
use tracing::{debug, field, info_span, Instrument};

use crate::config::HttpClientConfig;
use crate::error::TransportError;
use crate::models::{HttpRequest, HttpResponse, ProxyEndpoint};

/// Something that can execute one prepared request
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Connection-level settings shared by every pooled client
#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub timeout: Duration,
    pub skip_tls_verify: bool,
    pub allow_http2: bool,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: Duration,
    pub tcp_keepalive: Duration,
}

impl From<&HttpClientConfig> for TransportSettings {
    fn from(config: &HttpClientConfig) -> Self {
        Self {
            timeout: config.timeout,
            skip_tls_verify: config.skip_tls_verify,
            allow_http2: config.force_attempt_http2,
            pool_max_idle_per_host: 128,
            pool_idle_timeout: Duration::from_secs(60),
            tcp_keepalive: Duration::from_secs(60),
        }
    }
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self::from(&HttpClientConfig::default())
    }
}

/// reqwest-backed transport.
///
/// reqwest binds proxies per client, so one client is kept per proxy URL and
/// reused across requests; their connection pools are shared by every
/// `Client` holding this transport.
pub struct ReqwestTransport {
    settings: TransportSettings,
    clients: DashMap<Option<String>, reqwest::Client>,
}

impl ReqwestTransport {
    pub fn new(settings: TransportSettings) -> Self {
        Self {
            settings,
            clients: DashMap::new(),
        }
    }

    pub fn settings(&self) -> &TransportSettings {
        &self.settings
    }

    /// Number of pooled clients built so far
    pub fn pooled_clients(&self) -> usize {
        self.clients.len()
    }

    fn client_for(&self, proxy: Option<&ProxyEndpoint>) -> Result<reqwest::Client, TransportError> {
        let key = proxy.map(|p| p.url().to_string());
        if let Some(client) = self.clients.get(&key) {
            return Ok(client.clone());
        }

        let client = self.build_client(proxy)?;
        Ok(self.clients.entry(key).or_insert(client).clone())
    }

    fn build_client(&self, proxy: Option<&ProxyEndpoint>) -> Result<reqwest::Client, TransportError> {
        let settings = &self.settings;
        let mut builder = reqwest::Client::builder()
            .timeout(settings.timeout)
            .pool_max_idle_per_host(settings.pool_max_idle_per_host)
            .pool_idle_timeout(settings.pool_idle_timeout)
            .tcp_keepalive(settings.tcp_keepalive)
            .danger_accept_invalid_certs(settings.skip_tls_verify)
            .redirect(Policy::none());

        if !settings.allow_http2 {
            builder = builder.http1_only();
        }

        builder = match proxy {
            Some(proxy) => {
                debug!(proxy = %proxy, "Building pooled client for proxy");
                let proxy = reqwest::Proxy::all(proxy.url().as_str())
                    .map_err(|e| TransportError::InvalidProxy(e.to_string()))?;
                builder.proxy(proxy)
            }
            None => builder.no_proxy(),
        };

        builder.build().map_err(|e| match proxy {
            Some(_) => TransportError::InvalidProxy(e.to_string()),
            None => TransportError::InvalidRequest(e.to_string()),
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let client = self.client_for(request.proxy())?;

        let mut builder = client
            .request(request.method().clone(), request.url().clone())
            .headers(request.headers().clone());
        if let Some(body) = request.body() {
            builder = builder.body(body.clone());
        }
        let response = builder.send().await?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;
        Ok(HttpResponse::new(status, headers, body))
    }
}

/// Wraps a transport in one tracing span per dispatch
pub struct TracedTransport {
    inner: Arc<dyn Transport>,
}

impl TracedTransport {
    pub fn new(inner: Arc<dyn Transport>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Transport for TracedTransport {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let span = info_span!(
            "http.client",
            http.method = %request.method(),
            http.url = %request.url(),
            http.status_code = field::Empty,
        );

        let outcome = self.inner.execute(request).instrument(span.clone()).await;
        if let Ok(response) = &outcome {
            span.record("http.status_code", response.status().as_u16());
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::MockTransport;
    use http::{Method, StatusCode};

    #[test]
    fn test_settings_from_config() {
        let config = HttpClientConfig {
            timeout: Duration::from_secs(3),
            skip_tls_verify: true,
            force_attempt_http2: true,
            ..HttpClientConfig::default()
        };
        let settings = TransportSettings::from(&config);
        assert_eq!(settings.timeout, Duration::from_secs(3));
        assert!(settings.skip_tls_verify);
        assert!(settings.allow_http2);
    }

    #[test]
    fn test_one_pooled_client_per_proxy() {
        let transport = ReqwestTransport::new(TransportSettings::default());
        let proxy = ProxyEndpoint::parse("http://user:pw@proxy.example:3128").unwrap();
        let socks = ProxyEndpoint::parse("socks5://proxy.example:1080").unwrap();

        transport.client_for(None).unwrap();
        transport.client_for(Some(&proxy)).unwrap();
        transport.client_for(Some(&proxy)).unwrap();
        transport.client_for(Some(&socks)).unwrap();

        assert_eq!(transport.pooled_clients(), 3);
    }

    #[tokio::test]
    async fn test_traced_transport_is_transparent() {
        let mock = Arc::new(MockTransport::new());
        mock.add_response(Method::GET, "http://traced.example/", StatusCode::ACCEPTED, "body");

        let traced = TracedTransport::new(mock.clone());
        let request = HttpRequest::parse(Method::GET, "http://traced.example/").unwrap();
        let response = traced.execute(&request).await.unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(response.body().as_ref(), b"body");
        assert_eq!(mock.requests().len(), 1);

        let missing = HttpRequest::parse(Method::GET, "http://other.example/").unwrap();
        assert!(matches!(
            traced.execute(&missing).await,
            Err(TransportError::NoResponder)
        ));
    }
}
