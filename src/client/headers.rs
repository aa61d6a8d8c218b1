//! Default header sets and caller overrides

use http::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use http::{HeaderMap, HeaderValue, Method};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::Result;

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Per-client default headers, fixed at construction
#[derive(Debug, Clone)]
pub struct DefaultHeaders {
    user_agent: String,
    get: HeaderMap,
    post: HeaderMap,
}

impl DefaultHeaders {
    pub fn new(user_agent: &str) -> Result<Self> {
        let agent = HeaderValue::from_str(user_agent)?;

        let mut get = HeaderMap::new();
        get.insert(USER_AGENT, agent.clone());

        let mut post = HeaderMap::new();
        post.insert(USER_AGENT, agent);
        post.insert(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE));
        post.insert(ACCEPT, HeaderValue::from_static("*/*"));

        Ok(Self {
            user_agent: user_agent.to_string(),
            get,
            post,
        })
    }

    /// Pick one agent from `pool` and build the defaults around it
    pub fn sample<R: Rng>(pool: &[String], rng: &mut R) -> Result<Self> {
        let agent = pool
            .choose(rng)
            .map(String::as_str)
            .unwrap_or(super::user_agents::USER_AGENTS[0]);
        Self::new(agent)
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// POST and PUT get the form defaults; every other method the minimal set
    pub fn for_method(&self, method: &Method) -> HeaderMap {
        if method == Method::POST || method == Method::PUT {
            self.post.clone()
        } else {
            self.get.clone()
        }
    }

    /// Defaults for `method` with every key in `overrides` replacing the default
    pub fn merged(&self, method: &Method, overrides: &HeaderMap) -> HeaderMap {
        let mut headers = self.for_method(method);
        for key in overrides.keys() {
            headers.remove(key);
            for value in overrides.get_all(key) {
                headers.append(key.clone(), value.clone());
            }
        }
        headers
    }

    /// Add defaults for keys the request does not set yet
    pub fn fill_missing(&self, method: &Method, headers: &mut HeaderMap) {
        for (key, value) in self.for_method(method).iter() {
            if !headers.contains_key(key) {
                headers.insert(key.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::user_agents::USER_AGENTS;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_post_and_put_get_form_defaults() {
        let defaults = DefaultHeaders::new("agent/1.0").unwrap();

        for method in [Method::POST, Method::PUT] {
            let headers = defaults.for_method(&method);
            assert_eq!(headers[USER_AGENT], "agent/1.0");
            assert_eq!(headers[CONTENT_TYPE], FORM_CONTENT_TYPE);
            assert_eq!(headers[ACCEPT], "*/*");
        }

        for method in [Method::GET, Method::DELETE, Method::HEAD] {
            let headers = defaults.for_method(&method);
            assert_eq!(headers.len(), 1);
            assert_eq!(headers[USER_AGENT], "agent/1.0");
        }
    }

    #[test]
    fn test_overrides_replace_defaults() {
        let defaults = DefaultHeaders::new("agent/1.0").unwrap();
        let mut overrides = HeaderMap::new();
        overrides.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        overrides.append("x-trace", HeaderValue::from_static("a"));
        overrides.append("x-trace", HeaderValue::from_static("b"));

        let headers = defaults.merged(&Method::POST, &overrides);
        assert_eq!(headers[CONTENT_TYPE], "application/json");
        assert_eq!(headers.get_all(CONTENT_TYPE).iter().count(), 1);
        assert_eq!(headers.get_all("x-trace").iter().count(), 2);
        assert_eq!(headers[USER_AGENT], "agent/1.0");
    }

    #[test]
    fn test_fill_missing_keeps_existing() {
        let defaults = DefaultHeaders::new("agent/1.0").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("custom"));

        defaults.fill_missing(&Method::POST, &mut headers);
        assert_eq!(headers[USER_AGENT], "custom");
        assert_eq!(headers[CONTENT_TYPE], FORM_CONTENT_TYPE);
    }

    #[test]
    fn test_sample_is_deterministic_for_seed() {
        let pool: Vec<String> = USER_AGENTS.iter().map(|s| s.to_string()).collect();
        let a = DefaultHeaders::sample(&pool, &mut StdRng::seed_from_u64(11)).unwrap();
        let b = DefaultHeaders::sample(&pool, &mut StdRng::seed_from_u64(11)).unwrap();
        assert_eq!(a.user_agent(), b.user_agent());
        assert!(USER_AGENTS.contains(&a.user_agent()));
    }

    #[test]
    fn test_invalid_user_agent_rejected() {
        let err = DefaultHeaders::new("agent\n1.0").unwrap_err();
        assert!(matches!(err, crate::error::OutboundError::InvalidHeader(_)));
    }

    #[test]
    fn test_sample_from_empty_pool_falls_back() {
        let defaults = DefaultHeaders::sample(&[], &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(defaults.user_agent(), USER_AGENTS[0]);
    }
}
