//! The two resolution pipelines.

use std::future::Future;
use std::net::IpAddr;

use async_trait::async_trait;
use serde::Serialize;
use tokio::runtime::RuntimeFlavor;
use tracing::debug;

use crate::canonical::{canonicalize_document, extract_status_id, status_url};
use crate::dns::{vet_host, HostCheck, HostResolver};
use crate::error::{Error, Reason};
use crate::options::{DocumentOptions, SocialOptions};
use crate::redirect::{HopGuard, Walker};
use crate::safe_url::SafeUrl;

/// Result of a successful resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalResult {
    /// The canonical, safe-to-store URL.
    pub canonical_url: String,

    /// Numeric status ID (social pipeline only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_id: Option<String>,

    /// Number of redirects followed.
    pub redirects: usize,
}

struct SocialGuard<'a> {
    hosts: &'a [String],
}

#[async_trait]
impl<'a> HopGuard for SocialGuard<'a> {
    async fn check(&self, url: &SafeUrl) -> Result<Vec<IpAddr>, Error> {
        url.require_host_in(self.hosts)?;
        Ok(Vec::new())
    }
}

struct DocumentGuard<'a> {
    resolver: &'a dyn HostResolver,
    check: HostCheck<'a>,
}

#[async_trait]
impl<'a> HopGuard for DocumentGuard<'a> {
    async fn check(&self, url: &SafeUrl) -> Result<Vec<IpAddr>, Error> {
        vet_host(url, self.resolver, &self.check).await
    }
}

/// Resolve a link to a status on the social platform.
///
/// The link may be any status URL shape on a platform host, or a short link
/// that redirects to one. Every hop must stay on the configured hosts.
///
/// # Example
///
/// ```rust,no_run
/// use linkgate::{resolve_social_status_url, SocialOptions};
///
/// # async fn example() -> Result<(), linkgate::Error> {
/// let options = SocialOptions::default();
/// let result = resolve_social_status_url("https://platform-alt.com/status/123", &options).await?;
/// assert_eq!(result.canonical_url, "https://platform.com/i/web/status/123");
/// assert_eq!(result.status_id.as_deref(), Some("123"));
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if the input or any hop is not a safe `https` URL on an
/// allowed host, if the redirect chain loops or is too long, if a request
/// fails or times out, or if the final URL does not name a status.
pub async fn resolve_social_status_url(
    raw: &str,
    options: &SocialOptions,
) -> Result<CanonicalResult, Error> {
    let input = SafeUrl::parse(raw)?;

    let walker = Walker {
        transport: options.transport.as_ref(),
        max_redirects: options.max_redirects,
        timeout: options.timeout,
    };
    let guard = SocialGuard {
        hosts: &options.hosts,
    };
    let walked = walker.walk(input, &guard).await?;

    let id = extract_status_id(&walked.url, &options.status_hosts)?;
    let canonical_url = status_url(&id);
    debug!(
        input = %raw,
        canonical = %canonical_url,
        redirects = walked.redirects,
        "status resolved"
    );

    Ok(CanonicalResult {
        canonical_url,
        status_id: Some(id),
        redirects: walked.redirects,
    })
}

/// Resolve an arbitrary document link to its canonical form.
///
/// Tracking parameters and the fragment are stripped before and after the
/// redirect walk. Every hop's hostname is resolved and refused if any of its
/// addresses is private, loopback, link-local, or otherwise reserved.
///
/// # Example
///
/// ```rust,no_run
/// use linkgate::{resolve_document_url, DocumentOptions};
///
/// # async fn example() -> Result<(), linkgate::Error> {
/// let options = DocumentOptions::default();
/// let result = resolve_document_url("https://example.com/a?utm_source=x#top", &options).await?;
/// println!("store {}", result.canonical_url);
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if the input or any hop is not a safe `https` URL, if a
/// hostname is blocked, unresolvable, or resolves to a blocked address, if
/// the redirect chain loops or is too long, or if a request fails or times
/// out.
pub async fn resolve_document_url(
    raw: &str,
    options: &DocumentOptions,
) -> Result<CanonicalResult, Error> {
    let input = canonicalize_document(SafeUrl::parse(raw)?)?;

    let walker = Walker {
        transport: options.transport.as_ref(),
        max_redirects: options.max_redirects,
        timeout: options.timeout,
    };
    let guard = DocumentGuard {
        resolver: options.resolver.as_ref(),
        check: HostCheck {
            blocked_hosts: &options.blocked_hosts,
            blocked_cidrs: &options.blocked_cidrs,
            timeout: options.timeout,
        },
    };
    let walked = walker.walk(input, &guard).await?;

    let canonical = canonicalize_document(walked.url)?;
    debug!(
        input = %raw,
        canonical = %canonical.as_str(),
        redirects = walked.redirects,
        "document resolved"
    );

    Ok(CanonicalResult {
        canonical_url: canonical.as_str().to_string(),
        status_id: None,
        redirects: walked.redirects,
    })
}

/// Synchronous version of [`resolve_social_status_url`].
///
/// Works both inside and outside of a Tokio runtime. Inside a
/// current-thread runtime the resolution runs on a separate thread.
pub fn resolve_social_status_url_sync(
    raw: &str,
    options: &SocialOptions,
) -> Result<CanonicalResult, Error> {
    block_on(raw, resolve_social_status_url(raw, options))
}

/// Synchronous version of [`resolve_document_url`].
///
/// Works both inside and outside of a Tokio runtime. Inside a
/// current-thread runtime the resolution runs on a separate thread.
pub fn resolve_document_url_sync(
    raw: &str,
    options: &DocumentOptions,
) -> Result<CanonicalResult, Error> {
    block_on(raw, resolve_document_url(raw, options))
}

fn block_on<F>(raw: &str, future: F) -> Result<CanonicalResult, Error>
where
    F: Future<Output = Result<CanonicalResult, Error>> + Send,
{
    match tokio::runtime::Handle::try_current() {
        // block_in_place panics on a current-thread scheduler, and a new
        // runtime cannot be started on a thread that is already inside one.
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::CurrentThread => {
            std::thread::scope(|scope| {
                scope
                    .spawn(|| run_on_new_runtime(raw, future))
                    .join()
                    .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
            })
        }
        Ok(handle) => tokio::task::block_in_place(|| handle.block_on(future)),
        Err(_) => run_on_new_runtime(raw, future),
    }
}

fn run_on_new_runtime<F>(raw: &str, future: F) -> Result<CanonicalResult, Error>
where
    F: Future<Output = Result<CanonicalResult, Error>>,
{
    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| Error::invalid_url(raw, Reason::RequestFailed).with_detail(e))?;
    rt.block_on(future)
}
