use std::fmt;

use http::Method;
use thiserror::Error;

/// Unified error type for the outbound client
#[derive(Error, Debug)]
pub enum OutboundError {
    // Response classification
    #[error("invalid nil response")]
    NilResponse,

    #[error("invalid content type")]
    InvalidContentType,

    #[error("unknown encoding: {0}")]
    UnknownEncoding(String),

    #[error("invalid http response")]
    InvalidResponse,

    // Cookie store
    #[error("cookie store is not present")]
    NoCookieStore,

    // Request construction
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    // Dispatch
    #[error(transparent)]
    Transport(#[from] AttemptErrors),

    #[error("request cancelled")]
    Cancelled,

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for outbound operations
pub type Result<T> = std::result::Result<T, OutboundError>;

impl OutboundError {
    /// The transport failure of the last attempt, if dispatch failed at the transport level
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            OutboundError::Transport(errors) => errors.last(),
            _ => None,
        }
    }

    /// Whether the error came from the request being cancelled by its caller
    pub fn is_cancelled(&self) -> bool {
        matches!(self, OutboundError::Cancelled)
    }
}

impl From<http::header::InvalidHeaderValue> for OutboundError {
    fn from(err: http::header::InvalidHeaderValue) -> Self {
        OutboundError::InvalidHeader(err.to_string())
    }
}

/// Failure of a single dispatch attempt
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid proxy: {0}")]
    InvalidProxy(String),

    #[error("stopped after {0} redirects")]
    TooManyRedirects(usize),

    #[error("no responder found")]
    NoResponder,

    #[error("response not found")]
    ResponseNotFound,

    #[error("{0}")]
    Mocked(String),
}

impl TransportError {
    /// Whether another attempt may succeed where this one failed
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            TransportError::InvalidRequest(_)
                | TransportError::InvalidProxy(_)
                | TransportError::NoResponder
                | TransportError::TooManyRedirects(_)
        )
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_builder() {
            TransportError::InvalidRequest(err.to_string())
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else if err.is_body() || err.is_decode() {
            TransportError::Body(err.to_string())
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

/// Attempt failures of one logical request, oldest first
#[derive(Debug)]
pub struct AttemptErrors {
    method: Method,
    url: String,
    errors: Vec<TransportError>,
}

impl AttemptErrors {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            errors: Vec::new(),
        }
    }

    pub fn push(&mut self, error: TransportError) {
        self.errors.push(error);
    }

    pub fn last(&self) -> Option<&TransportError> {
        self.errors.last()
    }

    pub fn errors(&self) -> &[TransportError] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Format one attempt the way the aggregated message renders it
    pub fn format_attempt(method: &Method, url: &str, error: &dyn fmt::Display) -> String {
        format!("{} \"{}\": {}", title_case(method.as_str()), url, error)
    }
}

impl fmt::Display for AttemptErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self
            .errors
            .iter()
            .map(|e| Self::format_attempt(&self.method, &self.url, e))
            .collect();
        write!(f, "{}", messages.join(", "))
    }
}

impl std::error::Error for AttemptErrors {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.errors
            .last()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// "GET" -> "Get"
fn title_case(word: &str) -> String {
    let lower = word.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
