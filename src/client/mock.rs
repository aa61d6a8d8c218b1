//! In-memory transport with canned responses, for tests of code built on `Client`
//!
//! Responders are registered per (method, URL). Requests that match nothing
//! fail with `TransportError::NoResponder`.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use parking_lot::Mutex;
use url::Url;

use crate::client::transport::Transport;
use crate::error::{AttemptErrors, Result, TransportError};
use crate::models::{HttpRequest, HttpResponse, ProxyEndpoint};

/// A canned response
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl MockResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    fn to_response(&self) -> HttpResponse {
        HttpResponse::new(self.status, self.headers.clone(), self.body.clone())
    }
}

type Outcome = std::result::Result<MockResponse, String>;

#[derive(Debug)]
enum Responder {
    /// Same outcome for every call
    Always(Outcome),
    /// One outcome per call, then `ResponseNotFound`
    Sequence(VecDeque<Outcome>),
}

/// A request as the mock saw it
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub proxy: Option<ProxyEndpoint>,
}

#[derive(Debug, Default)]
pub struct MockTransport {
    responders: Mutex<HashMap<(Method, String), Responder>>,
    requests: Mutex<Vec<RecordedRequest>>,
    latency: Mutex<Duration>,
}

/// Registration key: the URL as the url crate serializes it
fn normalize(url: &str) -> String {
    Url::parse(url)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.to_string())
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, method: Method, url: &str, responder: Responder) {
        self.responders
            .lock()
            .insert((method, normalize(url)), responder);
    }

    pub fn add_response(&self, method: Method, url: &str, status: StatusCode, body: impl Into<Bytes>) {
        self.register(method, url, Responder::Always(Ok(MockResponse::new(status, body))));
    }

    pub fn add_response_with_headers(
        &self,
        method: Method,
        url: &str,
        status: StatusCode,
        headers: HeaderMap,
        body: impl Into<Bytes>,
    ) {
        let response = MockResponse::new(status, body).with_headers(headers);
        self.register(method, url, Responder::Always(Ok(response)));
    }

    /// Serve the contents of `path` on every call
    pub fn add_response_from_file(
        &self,
        method: Method,
        url: &str,
        status: StatusCode,
        path: impl AsRef<Path>,
    ) -> Result<()> {
        let body = std::fs::read(path)?;
        self.add_response(method, url, status, body);
        Ok(())
    }

    /// Serve each file once, in order; later calls get `ResponseNotFound`
    pub fn add_multiple_responses_from_files<P: AsRef<Path>>(
        &self,
        method: Method,
        url: &str,
        status: StatusCode,
        paths: &[P],
    ) -> Result<()> {
        let mut outcomes = VecDeque::with_capacity(paths.len());
        for path in paths {
            outcomes.push_back(Ok(MockResponse::new(status, std::fs::read(path)?)));
        }
        self.register(method, url, Responder::Sequence(outcomes));
        Ok(())
    }

    /// Fail every call with `message`.
    ///
    /// Returns the error text a client with `retries` extra attempts reports
    /// once its budget is spent.
    pub fn add_error(&self, method: Method, url: &str, message: &str, retries: u32) -> String {
        let normalized = normalize(url);
        let expected = (0..=retries)
            .map(|_| AttemptErrors::format_attempt(&method, &normalized, &message))
            .collect::<Vec<_>>()
            .join(", ");
        self.register(method, url, Responder::Always(Err(message.to_string())));
        expected
    }

    /// Script one outcome per attempt
    pub fn add_sequence(&self, method: Method, url: &str, outcomes: Vec<Outcome>) {
        self.register(method, url, Responder::Sequence(outcomes.into()));
    }

    /// Delay every response by `latency`
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    /// Drop all responders and recorded requests
    pub fn reset(&self) {
        self.responders.lock().clear();
        self.requests.lock().clear();
        *self.latency.lock() = Duration::ZERO;
    }

    fn next_outcome(&self, request: &HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        let key = (request.method().clone(), request.url().to_string());
        let mut responders = self.responders.lock();
        let outcome = match responders.get_mut(&key) {
            None => return Err(TransportError::NoResponder),
            Some(Responder::Always(outcome)) => outcome.clone(),
            Some(Responder::Sequence(queue)) => queue.pop_front().ok_or(TransportError::ResponseNotFound)?,
        };
        outcome
            .map(|r| r.to_response())
            .map_err(TransportError::Mocked)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, request: &HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        self.requests.lock().push(RecordedRequest {
            method: request.method().clone(),
            url: request.url().clone(),
            headers: request.headers().clone(),
            body: request.body().cloned(),
            proxy: request.proxy().cloned(),
        });

        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        self.next_outcome(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn request(method: Method, url: &str) -> HttpRequest {
        HttpRequest::parse(method, url).unwrap()
    }

    #[tokio::test]
    async fn test_responders_keyed_by_method_and_url() {
        let mock = MockTransport::new();
        mock.add_response(Method::GET, "http://mock.example", StatusCode::OK, "get");
        mock.add_response(Method::POST, "http://mock.example/", StatusCode::CREATED, "post");

        let get = mock.execute(&request(Method::GET, "http://mock.example/")).await.unwrap();
        assert_eq!(get.text_lossy(), "get");

        let post = mock.execute(&request(Method::POST, "http://mock.example/")).await.unwrap();
        assert_eq!(post.status(), StatusCode::CREATED);

        let err = mock
            .execute(&request(Method::DELETE, "http://mock.example/"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::NoResponder));
        assert_eq!(mock.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_response_with_headers() {
        let mock = MockTransport::new();
        let mut headers = HeaderMap::new();
        headers.insert("server", "cloudflare".parse().unwrap());
        mock.add_response_with_headers(Method::GET, "http://h.example/", StatusCode::FORBIDDEN, headers, "");

        let response = mock.execute(&request(Method::GET, "http://h.example/")).await.unwrap();
        assert_eq!(response.header("server"), Some("cloudflare"));
    }

    #[tokio::test]
    async fn test_multiple_files_served_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = Vec::new();
        for (i, body) in ["first", "second"].iter().enumerate() {
            let path = dir.path().join(format!("page{}.html", i));
            let mut file = std::fs::File::create(&path).unwrap();
            file.write_all(body.as_bytes()).unwrap();
            paths.push(path);
        }

        let mock = MockTransport::new();
        mock.add_multiple_responses_from_files(Method::GET, "http://files.example/", StatusCode::OK, &paths)
            .unwrap();

        let req = request(Method::GET, "http://files.example/");
        assert_eq!(mock.execute(&req).await.unwrap().text_lossy(), "first");
        assert_eq!(mock.execute(&req).await.unwrap().text_lossy(), "second");
        assert!(matches!(
            mock.execute(&req).await,
            Err(TransportError::ResponseNotFound)
        ));
    }

    #[tokio::test]
    async fn test_response_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"<html>ok</html>").unwrap();

        let mock = MockTransport::new();
        mock.add_response_from_file(Method::GET, "http://file.example/", StatusCode::OK, file.path())
            .unwrap();

        let response = mock.execute(&request(Method::GET, "http://file.example/")).await.unwrap();
        assert_eq!(response.body().as_ref(), b"<html>ok</html>");

        assert!(mock
            .add_response_from_file(Method::GET, "http://file.example/", StatusCode::OK, "/nonexistent/file")
            .is_err());
    }

    #[test]
    fn test_add_error_expected_message() {
        let mock = MockTransport::new();
        let expected = mock.add_error(Method::POST, "http://err.example", "boom", 1);
        assert_eq!(
            expected,
            "Post \"http://err.example/\": boom, Post \"http://err.example/\": boom"
        );
    }

    #[tokio::test]
    async fn test_reset_and_recorded_proxy() {
        let mock = MockTransport::new();
        mock.add_response(Method::GET, "http://r.example/", StatusCode::OK, "");

        let proxy = ProxyEndpoint::parse("http://proxy.example:3128").unwrap();
        let req = request(Method::GET, "http://r.example/").bind_proxy(proxy.clone());
        mock.execute(&req).await.unwrap();
        assert_eq!(mock.requests()[0].proxy.as_ref(), Some(&proxy));

        mock.reset();
        assert!(mock.requests().is_empty());
        assert!(matches!(
            mock.execute(&req).await,
            Err(TransportError::NoResponder)
        ));
    }
}
