use std::time::Duration;

use chrono::{DateTime, Utc};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Named client events consumed by downstream log pipelines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    #[serde(rename = "http_request_performed")]
    RequestPerformed,
    #[serde(rename = "http_request_failed")]
    RequestFailed,
    #[serde(rename = "http_request_blocked")]
    RequestBlocked,
    CloudflareChallengeDetected,
    DeduceResponseEncodingFailed,
    UnknownResponseEncoding,
}

/// Severity an event is logged at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLevel {
    Info,
    Warning,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::RequestPerformed => "http_request_performed",
            EventKind::RequestFailed => "http_request_failed",
            EventKind::RequestBlocked => "http_request_blocked",
            EventKind::CloudflareChallengeDetected => "cloudflare_challenge_detected",
            EventKind::DeduceResponseEncodingFailed => "deduce_response_encoding_failed",
            EventKind::UnknownResponseEncoding => "unknown_response_encoding",
        }
    }

    pub fn level(&self) -> EventLevel {
        match self {
            EventKind::RequestPerformed | EventKind::RequestBlocked => EventLevel::Info,
            _ => EventLevel::Warning,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One structured client event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientEvent {
    pub kind: EventKind,
    pub request_id: Option<Uuid>,
    pub method: String,
    pub url: String,
    pub status: Option<u16>,
    pub elapsed_ms: Option<u64>,
    pub error: Option<String>,
    pub proxy_used: Option<String>,
    pub properties: Vec<(String, String)>,
    pub timestamp: DateTime<Utc>,
}

impl ClientEvent {
    pub fn new(kind: EventKind, method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            kind,
            request_id: None,
            method: method.into(),
            url: url.into(),
            status: None,
            elapsed_ms: None,
            error: None,
            proxy_used: None,
            properties: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_request_id(mut self, id: Uuid) -> Self {
        self.request_id = Some(id);
        self
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status.as_u16());
        self
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed_ms = Some(elapsed.as_millis() as u64);
        self
    }

    pub fn with_error(mut self, error: impl std::fmt::Display) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn with_proxy(mut self, proxy_used: Option<String>) -> Self {
        self.proxy_used = proxy_used;
        self
    }

    pub fn with_properties(mut self, properties: &[(String, String)]) -> Self {
        self.properties = properties.to_vec();
        self
    }
}
