//! Proxy selection for outbound requests

use rand::Rng;
use tracing::{debug, info};

use crate::config::ProxyConfig;
use crate::models::{HttpRequest, ProxyEndpoint};
use crate::proxy::rotation::RoundRobinRotation;

/// Parse a semicolon-separated proxy list. Unparseable entries are dropped.
pub fn parse_proxy_list(raw: &str) -> Vec<ProxyEndpoint> {
    raw.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| match ProxyEndpoint::parse(entry) {
            Ok(proxy) => Some(proxy),
            Err(e) => {
                debug!(error = %e, "Skipping unparseable proxy entry");
                None
            }
        })
        .collect()
}

/// Decides which proxy, if any, each outbound request goes through
#[derive(Debug)]
pub struct ProxyManager {
    rotation: RoundRobinRotation,
    use_rotation: bool,
    no_proxy_suffixes: Vec<String>,
}

impl ProxyManager {
    pub fn from_config(config: &ProxyConfig) -> Self {
        Self::from_config_with_rng(config, &mut rand::thread_rng())
    }

    pub fn from_config_with_rng<R: Rng>(config: &ProxyConfig, rng: &mut R) -> Self {
        let manager = Self {
            rotation: RoundRobinRotation::new(),
            use_rotation: config.use_rotation,
            no_proxy_suffixes: config
                .no_proxy_suffixes
                .iter()
                .map(|s| s.to_lowercase())
                .collect(),
        };
        manager.load_with_rng(&config.proxies, rng);
        manager
    }

    /// Replace the rotation list from a configuration value
    pub fn load_from_config(&self, config: &ProxyConfig) {
        self.load_with_rng(&config.proxies, &mut rand::thread_rng());
    }

    /// Re-read the rotation list from the environment
    pub fn reload_from_env(&self) {
        self.load_from_config(&ProxyConfig::from_env());
    }

    pub fn load_with_rng<R: Rng>(&self, raw_proxies: &str, rng: &mut R) {
        let proxies = parse_proxy_list(raw_proxies);
        info!(count = proxies.len(), "Loaded proxy rotation list");
        self.rotation.replace(proxies, rng);
    }

    pub fn rotation_enabled(&self) -> bool {
        self.use_rotation
    }

    pub fn available_count(&self) -> usize {
        self.rotation.len()
    }

    pub fn endpoints(&self) -> Vec<ProxyEndpoint> {
        self.rotation.endpoints()
    }

    #[cfg(test)]
    pub(crate) fn rotation_cursor(&self) -> usize {
        self.rotation.cursor()
    }

    /// Next endpoint in rotation order, or `None` when the list is empty
    pub fn next(&self) -> Option<ProxyEndpoint> {
        self.rotation.next()
    }

    /// Whether a destination host must never be proxied
    pub fn is_protected_host(&self, host: &str) -> bool {
        let host = host.to_lowercase();
        self.no_proxy_suffixes
            .iter()
            .any(|suffix| host.ends_with(suffix.as_str()))
    }

    /// Decide the proxy for a request and bind it into the request.
    ///
    /// Protected destinations are never proxied. Otherwise an explicit proxy
    /// wins; without one the rotation list is used only when rotation is on.
    pub fn decide_for_request(
        &self,
        request: HttpRequest,
        explicit: Option<&ProxyEndpoint>,
    ) -> (HttpRequest, Option<ProxyEndpoint>) {
        if request.host().is_some_and(|host| self.is_protected_host(host)) {
            return (request, None);
        }

        if let Some(proxy) = explicit {
            return (request.bind_proxy(proxy.clone()), Some(proxy.clone()));
        }

        if !self.use_rotation {
            return (request, None);
        }

        match self.next() {
            Some(proxy) => (request.bind_proxy(proxy.clone()), Some(proxy)),
            None => (request, None),
        }
    }

    /// The proxy previously bound to a request. Never touches rotation state.
    pub fn proxy_for_bound_request(request: &HttpRequest) -> Option<&ProxyEndpoint> {
        request.proxy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const THREE_PROXIES: &str = "http://p1.example:8001;http://p2.example:8002;http://p3.example:8003";

    fn config(proxies: &str, use_rotation: bool) -> ProxyConfig {
        ProxyConfig {
            proxies: proxies.to_string(),
            use_rotation,
            no_proxy_suffixes: vec!["amazonaws.com".to_string(), "internal.example".to_string()],
        }
    }

    fn request(url: &str) -> HttpRequest {
        HttpRequest::parse(Method::GET, url).unwrap()
    }

    #[test]
    fn test_parse_proxy_list_drops_invalid_entries() {
        let proxies = parse_proxy_list("http://a.example:1; not a url ;;socks5://u:p@b.example:2");
        assert_eq!(proxies.len(), 2);
        assert_eq!(proxies[0].url().host_str(), Some("a.example"));
        assert_eq!(proxies[1].url().scheme(), "socks5");

        assert!(parse_proxy_list("").is_empty());
    }

    #[test]
    fn test_next_on_empty_list() {
        let manager = ProxyManager::from_config(&config("", true));
        assert!(manager.next().is_none());
        assert_eq!(manager.available_count(), 0);
    }

    #[test]
    fn test_next_is_cyclic() {
        let manager =
            ProxyManager::from_config_with_rng(&config(THREE_PROXIES, true), &mut StdRng::seed_from_u64(9));
        let first: Vec<ProxyEndpoint> = (0..3).map(|_| manager.next().unwrap()).collect();
        let second: Vec<ProxyEndpoint> = (0..3).map(|_| manager.next().unwrap()).collect();

        assert_eq!(first, second);
        let distinct: std::collections::HashSet<_> = first.iter().collect();
        assert_eq!(distinct.len(), 3);
    }

    #[test]
    fn test_protected_host_never_proxied() {
        let explicit = ProxyEndpoint::parse("http://static.example:9000").unwrap();

        for rotation in [true, false] {
            let manager = ProxyManager::from_config(&config(THREE_PROXIES, rotation));
            for url in [
                "https://sqs.us-east-1.amazonaws.com/queue",
                "http://api.internal.example/health",
            ] {
                let (req, proxy) = manager.decide_for_request(request(url), Some(&explicit));
                assert!(proxy.is_none());
                assert!(req.proxy().is_none());

                let (req, proxy) = manager.decide_for_request(request(url), None);
                assert!(proxy.is_none());
                assert!(req.proxy().is_none());
            }
        }
    }

    #[test]
    fn test_rotation_disabled_skips_configured_proxy() {
        let manager = ProxyManager::from_config(&config("http://only.example:8000", false));

        for _ in 0..3 {
            let (req, proxy) = manager.decide_for_request(request("http://target.example"), None);
            assert!(proxy.is_none());
            assert!(req.proxy().is_none());
        }
    }

    #[test]
    fn test_explicit_proxy_wins_over_rotation() {
        let manager = ProxyManager::from_config(&config(THREE_PROXIES, true));
        let explicit = ProxyEndpoint::parse("http://static.example:9000").unwrap();

        let (req, proxy) =
            manager.decide_for_request(request("http://target.example"), Some(&explicit));
        assert_eq!(proxy.as_ref(), Some(&explicit));
        assert_eq!(ProxyManager::proxy_for_bound_request(&req), Some(&explicit));
    }

    #[test]
    fn test_explicit_proxy_used_even_when_rotation_disabled() {
        let manager = ProxyManager::from_config(&config("", false));
        let explicit = ProxyEndpoint::parse("http://static.example:9000").unwrap();

        let (_, proxy) = manager.decide_for_request(request("http://target.example"), Some(&explicit));
        assert_eq!(proxy, Some(explicit));
    }

    #[test]
    fn test_bound_lookup_does_not_advance_rotation() {
        let manager =
            ProxyManager::from_config_with_rng(&config(THREE_PROXIES, true), &mut StdRng::seed_from_u64(1));

        let (req, chosen) = manager.decide_for_request(request("http://target.example"), None);
        let chosen = chosen.unwrap();

        for _ in 0..5 {
            assert_eq!(ProxyManager::proxy_for_bound_request(&req), Some(&chosen));
        }

        // The rotation only moved once
        let (_, next) = manager.decide_for_request(request("http://target.example"), None);
        assert_ne!(next.unwrap(), chosen);
    }

    #[test]
    fn test_rotation_enabled_with_empty_list_goes_direct() {
        let manager = ProxyManager::from_config(&config("", true));
        let (req, proxy) = manager.decide_for_request(request("http://target.example"), None);
        assert!(proxy.is_none());
        assert!(req.proxy().is_none());
    }

    #[test]
    fn test_load_from_config_replaces_list() {
        let manager = ProxyManager::from_config(&config(THREE_PROXIES, true));
        assert_eq!(manager.available_count(), 3);

        manager.load_from_config(&config("http://fresh.example:1", true));
        assert_eq!(manager.available_count(), 1);
        assert_eq!(
            manager.next().unwrap().url().host_str(),
            Some("fresh.example")
        );
    }
}
