//! Bounded redirect walking with per-hop validation.
//!
//! Each hop is vetted by a [`HopGuard`] before any request is made to it, so
//! a redirect to a disallowed target never produces traffic. Only status
//! codes and headers are read.

use std::collections::HashSet;
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{Error, Reason};
use crate::safe_url::SafeUrl;
use crate::transport::{Method, Transport, TransportRequest, TransportResponse};

/// Statuses treated as redirects. 303 is not one of them: it points at a
/// different resource rather than a new location for the same one.
const REDIRECT_STATUSES: [u16; 4] = [301, 302, 307, 308];

/// Statuses that make a HEAD request fall back to GET once.
const HEAD_FALLBACK_STATUSES: [u16; 2] = [405, 501];

/// Pipeline-specific check run on every hop before it is requested.
///
/// Returns the addresses the hop's host was vetted against, or an empty
/// list when the pipeline does not resolve names.
#[async_trait]
pub(crate) trait HopGuard: Send + Sync {
    async fn check(&self, url: &SafeUrl) -> Result<Vec<IpAddr>, Error>;
}

#[derive(Clone, Copy)]
pub(crate) struct Walker<'a> {
    pub transport: &'a dyn Transport,
    pub max_redirects: usize,
    pub timeout: Duration,
}

/// Where a walk ended.
#[derive(Debug)]
pub(crate) struct Walked {
    pub url: SafeUrl,
    pub redirects: usize,
}

impl Walker<'_> {
    /// Follow redirects from `start` until a non-redirect response.
    pub async fn walk(&self, start: SafeUrl, guard: &dyn HopGuard) -> Result<Walked, Error> {
        let mut visited = HashSet::new();
        let mut current = start;
        let mut redirects = 0;

        loop {
            let addrs = guard.check(&current).await?;
            visited.insert(hop_key(&current));

            debug!(url = %current.as_str(), hop = redirects, "visiting");
            let response = self.fetch(&current, &addrs).await?;

            if !REDIRECT_STATUSES.contains(&response.status) {
                debug!(
                    url = %current.as_str(),
                    status = response.status,
                    redirects,
                    "walk finished"
                );
                return Ok(Walked {
                    url: current,
                    redirects,
                });
            }

            let location = match response.location() {
                Ok(Some(location)) => location,
                Ok(None) => {
                    warn!(url = %current.as_str(), status = response.status, "no Location");
                    let err = Error::invalid_url(current.as_str(), Reason::MissingLocation);
                    return Err(err);
                }
                Err(e) => {
                    warn!(url = %current.as_str(), status = response.status, "bad Location");
                    let err = Error::invalid_url(current.as_str(), Reason::Malformed);
                    return Err(err.with_detail(e));
                }
            };

            let next = current.join(location).map_err(|e| {
                warn!(
                    from = %current.as_str(),
                    location = %location,
                    reason = %e.reason(),
                    "redirect target refused"
                );
                e
            })?;

            if visited.contains(&hop_key(&next)) {
                warn!(from = %current.as_str(), to = %next.as_str(), "redirect loop");
                return Err(Error::invalid_url(next.as_str(), Reason::RedirectLoop));
            }

            if redirects >= self.max_redirects {
                warn!(
                    url = %current.as_str(),
                    max = self.max_redirects,
                    "redirect budget exhausted"
                );
                return Err(Error::invalid_url(next.as_str(), Reason::TooManyRedirects));
            }

            redirects += 1;
            current = next;
        }
    }

    /// HEAD the URL, retrying once with GET if HEAD is not supported.
    async fn fetch(&self, url: &SafeUrl, addrs: &[IpAddr]) -> Result<TransportResponse, Error> {
        let response = self.send(url, Method::Head, addrs).await?;
        if HEAD_FALLBACK_STATUSES.contains(&response.status) {
            debug!(url = %url.as_str(), status = response.status, "HEAD unsupported, using GET");
            return self.send(url, Method::Get, addrs).await;
        }
        Ok(response)
    }

    async fn send(
        &self,
        url: &SafeUrl,
        method: Method,
        addrs: &[IpAddr],
    ) -> Result<TransportResponse, Error> {
        let request = TransportRequest {
            url: url.url(),
            method,
            addrs,
        };

        let sent = tokio::time::timeout(self.timeout, self.transport.send(request));
        match sent.await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => {
                debug!(url = %url.as_str(), ?method, error = %e, "request failed");
                let err = Error::invalid_url(url.as_str(), Reason::RequestFailed);
                Err(err.with_detail(e))
            }
            Err(_) => {
                debug!(url = %url.as_str(), ?method, timeout = ?self.timeout, "request timed out");
                Err(Error::invalid_url(url.as_str(), Reason::Timeout))
            }
        }
    }
}

/// Visited-set key: the serialized URL without its fragment.
fn hop_key(url: &SafeUrl) -> String {
    let mut url = url.url().clone();
    url.set_fragment(None);
    url.into()
}
