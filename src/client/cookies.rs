//! Per-client cookie store keyed by destination origin
//!
//! Each origin gets its own `reqwest::cookie::Jar`, which owns `Set-Cookie`
//! parsing, expiry (`Max-Age` and `Expires`) and path matching.

use std::collections::HashMap;
use std::sync::Arc;

use http::header::SET_COOKIE;
use http::{HeaderMap, HeaderValue};
use parking_lot::Mutex;
use reqwest::cookie::{CookieStore as _, Jar};
use url::Url;

/// Cookies per origin (`scheme://host:port`).
///
/// Each jar serializes its own reads and writes, so concurrent requests on
/// one client never lose updates.
#[derive(Debug, Default)]
pub struct CookieStore {
    jars: Mutex<HashMap<String, Arc<Jar>>>,
}

fn origin_key(url: &Url) -> String {
    url.origin().ascii_serialization()
}

/// Split `name=value` pairs from a `Cookie` header style string
fn parse_pairs(raw: &str) -> impl Iterator<Item = (&str, &str)> {
    raw.split(';').filter_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        Some((name, value.trim().trim_matches('"')))
    })
}

impl CookieStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn jar(&self, url: &Url) -> Arc<Jar> {
        self.jars.lock().entry(origin_key(url)).or_default().clone()
    }

    fn existing_jar(&self, url: &Url) -> Option<Arc<Jar>> {
        self.jars.lock().get(&origin_key(url)).cloned()
    }

    /// Store cookies from a raw `Cookie` header value (`a=b; c=d`)
    pub fn set_raw(&self, url: &Url, raw: &str) {
        let values: Vec<HeaderValue> = parse_pairs(raw)
            .filter_map(|(name, value)| HeaderValue::from_str(&format!("{}={}", name, value)).ok())
            .collect();
        if values.is_empty() {
            return;
        }
        self.jar(url).set_cookies(&mut values.iter(), url);
    }

    /// Apply `Set-Cookie` headers from a response. Expired cookies are removed.
    pub fn store_response(&self, url: &Url, headers: &HeaderMap) {
        let mut values = headers.get_all(SET_COOKIE).iter().peekable();
        if values.peek().is_none() {
            return;
        }
        self.jar(url).set_cookies(&mut values, url);
    }

    /// Cookies that apply to `url`, sorted by name
    fn pairs(&self, url: &Url) -> Vec<(String, String)> {
        let Some(header) = self.existing_jar(url).and_then(|jar| jar.cookies(url)) else {
            return Vec::new();
        };
        let mut pairs: Vec<(String, String)> = header
            .to_str()
            .map(|raw| {
                parse_pairs(raw)
                    .map(|(name, value)| (name.to_string(), value.to_string()))
                    .collect()
            })
            .unwrap_or_default();
        pairs.sort();
        pairs
    }

    /// `Cookie` header value for a destination, if any cookies apply
    pub fn header_value(&self, url: &Url) -> Option<String> {
        let pairs = self.pairs(url);
        if pairs.is_empty() {
            return None;
        }
        Some(
            pairs
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Cookies for a destination as `a=b;c=d;`
    pub fn get(&self, url: &Url) -> String {
        self.pairs(url)
            .iter()
            .map(|(name, value)| format!("{}={};", name, value))
            .collect()
    }

    pub fn clear(&self, url: &Url) {
        self.jars.lock().remove(&origin_key(url));
    }
}
