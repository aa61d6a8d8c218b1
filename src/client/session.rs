//! Redirect following for one dispatch
//!
//! Transports send exactly one request per call. `Session` walks the redirect
//! chain on top of them: every hop stores its `Set-Cookie` headers, gets the
//! cookies that apply to the next URL, and loses credentials when it leaves
//! the first request's site.

use async_trait::async_trait;
use http::header::{
    AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, COOKIE, LOCATION, PROXY_AUTHORIZATION,
};
use http::{HeaderValue, Method, StatusCode};
use tracing::debug;
use url::Url;

use crate::client::cookies::CookieStore;
use crate::client::transport::Transport;
use crate::error::TransportError;
use crate::models::{HttpRequest, HttpResponse};

/// Redirects followed before giving up
pub const MAX_REDIRECTS: usize = 10;

#[derive(Debug, Clone, Copy)]
pub struct RedirectPolicy {
    pub max_redirects: usize,
    /// Rewrite every `http` redirect target to `https`
    pub force_https: bool,
}

impl Default for RedirectPolicy {
    fn default() -> Self {
        Self {
            max_redirects: MAX_REDIRECTS,
            force_https: false,
        }
    }
}

/// A transport plus the client state one dispatch needs across redirect hops
pub(crate) struct Session<'a> {
    transport: &'a dyn Transport,
    cookies: Option<&'a CookieStore>,
    policy: RedirectPolicy,
}

impl<'a> Session<'a> {
    pub(crate) fn new(
        transport: &'a dyn Transport,
        cookies: Option<&'a CookieStore>,
        policy: RedirectPolicy,
    ) -> Self {
        Self {
            transport,
            cookies,
            policy,
        }
    }

    /// Replace the `Cookie` header with what the store holds for the request URL
    fn attach_cookies(&self, request: &mut HttpRequest) {
        let Some(cookies) = self.cookies else {
            return;
        };
        match cookies.header_value(request.url()).map(|v| HeaderValue::from_str(&v)) {
            Some(Ok(value)) => {
                request.headers_mut().insert(COOKIE, value);
            }
            Some(Err(e)) => debug!(error = %e, "Stored cookies are not a valid header value"),
            None => {
                request.headers_mut().remove(COOKIE);
            }
        }
    }

    fn redirect_target(&self, current: &Url, response: &HttpResponse) -> Option<Url> {
        if !is_followed_redirect(response.status()) {
            return None;
        }
        let location = response.header(LOCATION.as_str())?;
        if self.policy.force_https {
            https_redirect_target(current, location)
        } else {
            current.join(location).ok()
        }
    }
}

#[async_trait]
impl Transport for Session<'_> {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut current = request.clone();
        // A caller-supplied Cookie header wins until the chain leaves the site
        let mut caller_cookie = current.headers().contains_key(COOKIE);
        if !caller_cookie {
            self.attach_cookies(&mut current);
        }
        let mut redirects = 0;

        loop {
            let response = self.transport.execute(&current).await?;
            if let Some(cookies) = self.cookies {
                cookies.store_response(current.url(), response.headers());
            }

            let Some(target) = self.redirect_target(current.url(), &response) else {
                return Ok(response);
            };
            redirects += 1;
            if redirects > self.policy.max_redirects {
                return Err(TransportError::TooManyRedirects(self.policy.max_redirects));
            }

            debug!(
                from = %current.url(),
                to = %target,
                status = response.status().as_u16(),
                "Following redirect"
            );
            let cross_site = !same_site(current.url(), &target);
            let as_get = redirect_drops_body(response.status(), current.method());
            current = current.redirected(target, as_get);

            let headers = current.headers_mut();
            if cross_site {
                headers.remove(AUTHORIZATION);
                headers.remove(PROXY_AUTHORIZATION);
                headers.remove(COOKIE);
                caller_cookie = false;
            }
            if as_get {
                headers.remove(CONTENT_TYPE);
                headers.remove(CONTENT_LENGTH);
            }
            if !caller_cookie {
                self.attach_cookies(&mut current);
            }
        }
    }
}

fn is_followed_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

/// Same host and port. An http to https upgrade on default ports stays on site.
fn same_site(from: &Url, to: &Url) -> bool {
    if from.host_str() != to.host_str() {
        return false;
    }
    if from.port_or_known_default() == to.port_or_known_default() {
        return true;
    }
    from.scheme() == "http" && to.scheme() == "https" && from.port().is_none() && to.port().is_none()
}

/// Resolve a `Location` against the current URL and force the https scheme
pub fn https_redirect_target(current: &Url, location: &str) -> Option<Url> {
    let mut target = current.join(location).ok()?;
    if target.scheme() == "http" && target.set_scheme("https").is_err() {
        return None;
    }
    Some(target)
}

/// 303 always, and 301/302 after a POST, are replayed as a bodiless GET
pub fn redirect_drops_body(status: StatusCode, method: &Method) -> bool {
    status == StatusCode::SEE_OTHER
        || (*method == Method::POST
            && (status == StatusCode::MOVED_PERMANENTLY || status == StatusCode::FOUND))
}
