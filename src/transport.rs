//! Pluggable transport used to read redirect responses.
//!
//! The transport only ever reports a status code and headers. Response
//! bodies are never read.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ToStrError, LOCATION};
use reqwest::redirect::Policy as RedirectPolicy;
use reqwest::Client;
use url::Url;

/// Boxed error returned by [`Transport`] and
/// [`HostResolver`](crate::HostResolver) implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// HTTP method used for a hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Always tried first.
    Head,
    /// Fallback when HEAD is not supported.
    Get,
}

impl Method {
    fn as_reqwest(self) -> reqwest::Method {
        match self {
            Method::Head => reqwest::Method::HEAD,
            Method::Get => reqwest::Method::GET,
        }
    }
}

/// A single request the walker wants answered.
#[derive(Debug, Clone, Copy)]
pub struct TransportRequest<'a> {
    /// The URL to request.
    pub url: &'a Url,
    /// HEAD or GET.
    pub method: Method,
    /// Addresses the hostname was vetted against. Empty when the pipeline
    /// does not resolve names itself. Implementations should connect only
    /// to these when non-empty.
    pub addrs: &'a [IpAddr],
}

/// Status and headers of a response.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HeaderMap,
}

impl TransportResponse {
    /// A response with no headers.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
        }
    }

    /// A redirect response pointing at `location`.
    pub fn redirect(status: u16, location: &str) -> Self {
        Self::new(status).with_header(LOCATION.as_str(), location)
    }

    /// Add a header. Names or values that are not valid HTTP are skipped.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    /// The `Location` header. `Ok(None)` when absent, an error when present
    /// but not visible ASCII.
    pub fn location(&self) -> Result<Option<&str>, ToStrError> {
        self.headers
            .get(LOCATION)
            .map(HeaderValue::to_str)
            .transpose()
    }
}

/// Something that can answer a HEAD or GET request with a status and
/// headers.
///
/// Production code uses [`ReqwestTransport`]; tests supply deterministic
/// stubs. Implementations must not follow redirects themselves. Timeouts
/// are enforced by the caller.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request and report its status and headers.
    async fn send(&self, request: TransportRequest<'_>) -> Result<TransportResponse, BoxError>;
}

/// Transport backed by `reqwest` with automatic redirects disabled.
///
/// A client is built per request so that, when vetted addresses are
/// supplied, the connection is pinned to them. TLS SNI and the `Host` header
/// still use the original hostname.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    user_agent: String,
    connect_timeout: Duration,
}

impl ReqwestTransport {
    /// Create a transport with the default user agent.
    pub fn new() -> Self {
        Self {
            user_agent: concat!("linkgate/", env!("CARGO_PKG_VERSION")).to_string(),
            connect_timeout: Duration::from_secs(3),
        }
    }

    /// Set the `User-Agent` header sent with every request.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    fn client_for(&self, request: &TransportRequest<'_>) -> Result<Client, BoxError> {
        let mut builder = Client::builder()
            .redirect(RedirectPolicy::none())
            .user_agent(self.user_agent.as_str())
            .connect_timeout(self.connect_timeout);

        if let (Some(host), false) = (request.url.host_str(), request.addrs.is_empty()) {
            let port = request.url.port_or_known_default().unwrap_or(443);
            let pinned: Vec<SocketAddr> = request
                .addrs
                .iter()
                .map(|ip| SocketAddr::new(*ip, port))
                .collect();
            builder = builder.resolve_to_addrs(host, &pinned);
        }

        Ok(builder.build()?)
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: TransportRequest<'_>) -> Result<TransportResponse, BoxError> {
        let client = self.client_for(&request)?;
        let response = client
            .request(request.method.as_reqwest(), request.url.as_str())
            .send()
            .await?;

        // Dropping the response without touching the body closes the
        // connection; nothing past the headers is read.
        Ok(TransportResponse {
            status: response.status().as_u16(),
            headers: response.headers().clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_response_has_location() {
        let response = TransportResponse::redirect(302, "/next");
        assert_eq!(response.status, 302);
        assert_eq!(response.location().unwrap(), Some("/next"));
    }

    #[test]
    fn test_invalid_header_is_skipped() {
        let response = TransportResponse::new(301)
            .with_header("Location", "bad\nvalue");
        assert_eq!(response.location().unwrap(), None);
    }

    #[test]
    fn test_undecodable_location_is_an_error() {
        let mut response = TransportResponse::new(302);
        let location = HeaderValue::from_bytes(b"/caf\xe9").unwrap();
        response.headers.insert(LOCATION, location);
        assert!(response.location().is_err());
    }

    #[test]
    fn test_client_builds_with_pinned_addrs() {
        let transport = ReqwestTransport::new().with_user_agent("test");
        let url = Url::parse("https://example.com/").unwrap();
        let addrs = ["93.184.216.34".parse().unwrap()];
        let request = TransportRequest {
            url: &url,
            method: Method::Head,
            addrs: &addrs,
        };
        assert!(transport.client_for(&request).is_ok());
    }
}
