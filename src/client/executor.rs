//! Request executor
//!
//! `Client` merges default headers, asks the proxy manager which proxy to
//! bind, dispatches through the retry pipeline (each attempt follows
//! redirects in a `Session`), and reports what happened:
//! performed/failed events, charset warnings, and blocked requests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::header::SERVER;
use http::{HeaderMap, Method, StatusCode};
use rand::Rng;
use tokio::sync::broadcast;
use url::Url;
use uuid::Uuid;

use crate::client::cookies::CookieStore;
use crate::client::encoding::{deduce_charset, DEFAULT_CHARSET};
use crate::client::events::EventLog;
use crate::client::headers::DefaultHeaders;
use crate::client::retry::RetryPolicy;
use crate::client::session::{RedirectPolicy, Session};
use crate::client::transport::{TracedTransport, Transport};
use crate::client::user_agents::USER_AGENTS;
use crate::config::{HttpClientConfig, DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_SECS};
use crate::error::{OutboundError, Result};
use crate::models::{
    proxy_indicator, ClientEvent, EventKind, HttpRequest, HttpResponse, ProxyEndpoint,
    RequestOrigin,
};
use crate::proxy::ProxyManager;

/// Builder for [`Client`]
pub struct ClientBuilder {
    transport: Arc<dyn Transport>,
    proxies: Arc<ProxyManager>,
    timeout: Duration,
    max_retries: u32,
    static_proxy: Option<ProxyEndpoint>,
    properties: Vec<(String, String)>,
    cookie_store: bool,
    redirects: RedirectPolicy,
    user_agents: Option<Vec<String>>,
    traced: bool,
    event_sender: Option<broadcast::Sender<ClientEvent>>,
}

impl ClientBuilder {
    pub fn new(transport: Arc<dyn Transport>, proxies: Arc<ProxyManager>) -> Self {
        Self {
            transport,
            proxies,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            static_proxy: None,
            properties: Vec::new(),
            cookie_store: true,
            redirects: RedirectPolicy::default(),
            user_agents: None,
            traced: false,
            event_sender: None,
        }
    }

    /// Take timeout, retry budget, redirect scheme and tracing from process configuration
    pub fn config(mut self, config: &HttpClientConfig) -> Self {
        self.timeout = config.timeout;
        self.max_retries = config.max_retries;
        self.redirects.force_https = config.force_https_redirect;
        self.traced = config.tracing_enabled;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Pin every request of this client to one proxy
    pub fn static_proxy(mut self, proxy: ProxyEndpoint) -> Self {
        self.static_proxy = Some(proxy);
        self
    }

    /// Extra key/value pairs attached to every event
    pub fn properties(mut self, properties: Vec<(String, String)>) -> Self {
        self.properties = properties;
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.push((key.into(), value.into()));
        self
    }

    pub fn cookie_store(mut self, enabled: bool) -> Self {
        self.cookie_store = enabled;
        self
    }

    /// Follow every redirect over https
    pub fn force_https_redirect(mut self, enabled: bool) -> Self {
        self.redirects.force_https = enabled;
        self
    }

    /// User-Agent pool to sample from instead of the built-in one
    pub fn user_agents(mut self, pool: Vec<String>) -> Self {
        self.user_agents = Some(pool);
        self
    }

    pub fn traced(mut self, traced: bool) -> Self {
        self.traced = traced;
        self
    }

    pub fn event_sender(mut self, sender: broadcast::Sender<ClientEvent>) -> Self {
        self.event_sender = Some(sender);
        self
    }

    pub fn build(self) -> Result<Client> {
        self.build_with_rng(&mut rand::thread_rng())
    }

    /// Build with an explicit random source for the User-Agent choice
    pub fn build_with_rng<R: Rng>(self, rng: &mut R) -> Result<Client> {
        let pool = self
            .user_agents
            .unwrap_or_else(|| USER_AGENTS.iter().map(|s| s.to_string()).collect());
        let defaults = DefaultHeaders::sample(&pool, rng)?;

        let transport: Arc<dyn Transport> = if self.traced {
            Arc::new(TracedTransport::new(self.transport))
        } else {
            self.transport
        };

        Ok(Client {
            transport,
            proxies: self.proxies,
            defaults,
            cookies: self.cookie_store.then(CookieStore::new),
            redirects: self.redirects,
            static_proxy: self.static_proxy,
            properties: self.properties,
            retry: RetryPolicy::with_max_retries(self.max_retries),
            timeout: self.timeout,
            events: EventLog::new(self.event_sender),
        })
    }
}

/// Outbound HTTP client. Safe to share between tasks.
pub struct Client {
    transport: Arc<dyn Transport>,
    proxies: Arc<ProxyManager>,
    defaults: DefaultHeaders,
    cookies: Option<CookieStore>,
    redirects: RedirectPolicy,
    static_proxy: Option<ProxyEndpoint>,
    properties: Vec<(String, String)>,
    retry: RetryPolicy,
    timeout: Duration,
    events: EventLog,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("user_agent", &self.defaults.user_agent())
            .field("static_proxy", &self.static_proxy)
            .field("retry", &self.retry)
            .field("redirects", &self.redirects)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Client {
    pub fn builder(transport: Arc<dyn Transport>, proxies: Arc<ProxyManager>) -> ClientBuilder {
        ClientBuilder::new(transport, proxies)
    }

    pub fn user_agent(&self) -> &str {
        self.defaults.user_agent()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn proxy_manager(&self) -> &Arc<ProxyManager> {
        &self.proxies
    }

    /// GET with `params` appended to the query string
    pub async fn get(&self, url: &str, headers: HeaderMap, params: &[(&str, &str)]) -> Result<HttpResponse> {
        let mut url = Url::parse(url)?;
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        let request = self.prepare(Method::GET, url, &headers, Bytes::new());
        self.dispatch(request).await
    }

    /// POST with `form` sent as an urlencoded body
    pub async fn post(&self, url: &str, headers: HeaderMap, form: &[(&str, &str)]) -> Result<HttpResponse> {
        let url = Url::parse(url)?;
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(form)
            .finish();
        let request = self.prepare(Method::POST, url, &headers, Bytes::from(body));
        self.dispatch(request).await
    }

    pub async fn send_request(
        &self,
        method: Method,
        url: &str,
        headers: HeaderMap,
        body: impl Into<Bytes>,
    ) -> Result<HttpResponse> {
        let url = Url::parse(url)?;
        let request = self.prepare(method, url, &headers, body.into());
        self.dispatch(request).await
    }

    /// Send a caller-built request. Defaults only fill headers it leaves unset,
    /// and its cancellation token is honoured.
    pub async fn send_raw_request(&self, mut request: HttpRequest) -> Result<HttpResponse> {
        let method = request.method().clone();
        self.defaults.fill_missing(&method, request.headers_mut());
        self.dispatch(request).await
    }

    fn prepare(&self, method: Method, url: Url, headers: &HeaderMap, body: Bytes) -> HttpRequest {
        let headers = self.defaults.merged(&method, headers);
        HttpRequest::new(method, url)
            .with_headers(headers)
            .with_body(body)
    }

    async fn dispatch(&self, request: HttpRequest) -> Result<HttpResponse> {
        let (request, _) = self
            .proxies
            .decide_for_request(request, self.static_proxy.as_ref());

        let request_id = Uuid::new_v4();
        let origin = RequestOrigin::from(&request);
        let proxy_used = proxy_indicator(
            ProxyManager::proxy_for_bound_request(&request),
            self.proxies.rotation_enabled(),
        );

        let session = Session::new(self.transport.as_ref(), self.cookies.as_ref(), self.redirects);
        let start = Instant::now();
        let outcome = self.retry.execute(&session, &request, self.timeout).await;
        let elapsed = start.elapsed();

        let response = match outcome {
            Ok(response) => response.with_origin(origin.clone()),
            Err(e) => {
                self.events.emit(
                    self.event(EventKind::RequestFailed, &origin, request_id)
                        .with_proxy(proxy_used)
                        .with_elapsed(elapsed)
                        .with_error(&e),
                );
                return Err(e);
            }
        };

        self.events.emit(
            self.event(EventKind::RequestPerformed, &origin, request_id)
                .with_status(response.status())
                .with_elapsed(elapsed)
                .with_proxy(proxy_used),
        );

        self.inspect_charset(&response, &origin, request_id);

        if response.status() == StatusCode::FORBIDDEN {
            if is_cloudflare(&response) {
                self.events.emit(
                    self.event(EventKind::CloudflareChallengeDetected, &origin, request_id)
                        .with_status(response.status()),
                );
            }
            self.emit_blocked(&response, Some(request_id))?;
        }

        Ok(response)
    }

    fn inspect_charset(&self, response: &HttpResponse, origin: &RequestOrigin, request_id: Uuid) {
        match deduce_charset(Some(response)) {
            Err(e) => self.events.emit(
                self.event(EventKind::DeduceResponseEncodingFailed, origin, request_id)
                    .with_error(e),
            ),
            Ok(charset) if charset != DEFAULT_CHARSET => self.events.emit(
                self.event(EventKind::UnknownResponseEncoding, origin, request_id)
                    .with_error(format!(
                        "unknown response encoding '{}' in page {}",
                        charset, origin.url
                    )),
            ),
            Ok(_) => {}
        }
    }

    /// Report a response as blocked by its destination.
    ///
    /// The proxy reported is the one bound when the request was dispatched.
    /// Responses that did not come from this crate's executor carry no
    /// request origin and are rejected, as is a missing response.
    pub fn report_blocked(&self, response: Option<&HttpResponse>) -> Result<()> {
        let response = response.ok_or(OutboundError::InvalidResponse)?;
        self.emit_blocked(response, None)
    }

    fn emit_blocked(&self, response: &HttpResponse, request_id: Option<Uuid>) -> Result<()> {
        let origin = response.origin().ok_or(OutboundError::InvalidResponse)?;
        let proxy_used = proxy_indicator(origin.proxy.as_ref(), self.proxies.rotation_enabled());

        let mut event = ClientEvent::new(EventKind::RequestBlocked, origin.method.as_str(), origin.url.as_str())
            .with_status(response.status())
            .with_proxy(proxy_used)
            .with_properties(&self.properties);
        if let Some(id) = request_id {
            event = event.with_request_id(id);
        }
        self.events.emit(event);
        Ok(())
    }

    fn event(&self, kind: EventKind, origin: &RequestOrigin, request_id: Uuid) -> ClientEvent {
        ClientEvent::new(kind, origin.method.as_str(), origin.url.as_str())
            .with_request_id(request_id)
            .with_properties(&self.properties)
    }

    /// Store cookies for `url` from a raw `Cookie` header value. No-op without a store.
    pub fn set_cookies(&self, url: &Url, raw: &str) {
        if let Some(cookies) = &self.cookies {
            cookies.set_raw(url, raw);
        }
    }

    /// Stored cookies for `url` as `a=b;c=d;`, empty without a store
    pub fn get_cookies(&self, url: &Url) -> String {
        self.cookies
            .as_ref()
            .map(|cookies| cookies.get(url))
            .unwrap_or_default()
    }

    pub fn clear_cookies(&self, url: &Url) -> Result<()> {
        let cookies = self.cookies.as_ref().ok_or(OutboundError::NoCookieStore)?;
        cookies.clear(url);
        Ok(())
    }
}

fn is_cloudflare(response: &HttpResponse) -> bool {
    response
        .headers()
        .get(SERVER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|server| server.trim().eq_ignore_ascii_case("cloudflare"))
}
