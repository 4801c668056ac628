//! # linkgate
//!
//! SSRF-safe canonicalization of user-submitted links.
//!
//! `linkgate` takes a raw link from an untrusted form and reduces it to one
//! canonical, safe-to-store URL. It follows redirects itself, but only after
//! vetting every hop: `https` only, no credentials, no non-default ports, no
//! oversized URLs, and (for arbitrary documents) no hostnames that resolve
//! into private, loopback, link-local, metadata, or otherwise reserved
//! address ranges. Response bodies are never read.
//!
//! Two pipelines are provided:
//!
//! - [`resolve_social_status_url`] collapses any link to a status on the
//!   social platform, including short links, into
//!   `https://platform.com/i/web/status/<id>`.
//! - [`resolve_document_url`] canonicalizes an arbitrary document link,
//!   stripping tracking parameters and the fragment.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use linkgate::{resolve_document_url, DocumentOptions};
//!
//! # async fn example() -> Result<(), linkgate::Error> {
//! let options = DocumentOptions::builder().block_cidr("10.200.0.0/16").build();
//! let result = resolve_document_url("https://example.com/post?utm_source=feed", &options).await?;
//! println!("store {} after {} redirects", result.canonical_url, result.redirects);
//! # Ok(())
//! # }
//! ```
//!
//! Network access goes through the [`Transport`] and [`HostResolver`]
//! traits, so tests can substitute deterministic stubs.

mod blocklist;
mod canonical;
mod dns;
mod error;
mod options;
mod redirect;
mod resolve;
mod safe_url;
mod transport;

pub use blocklist::{is_blocked_ip, is_blocked_resolved_ip, is_hostname_blocked};
pub use canonical::{canonicalize_document, extract_status_id, is_tracking_param, status_url};
pub use dns::{HostResolver, SystemResolver};
pub use error::{Error, Reason};
pub use options::{
    DocumentOptions, DocumentOptionsBuilder, Settings, SocialOptions, SocialOptionsBuilder,
    DEFAULT_DOCUMENT_MAX_REDIRECTS, DEFAULT_SOCIAL_MAX_REDIRECTS, DEFAULT_TIMEOUT,
    SHORT_LINK_HOST, STATUS_HOSTS,
};
pub use resolve::{
    resolve_document_url, resolve_document_url_sync, resolve_social_status_url,
    resolve_social_status_url_sync, CanonicalResult,
};
pub use safe_url::{SafeUrl, MAX_URL_LEN};
pub use transport::{
    BoxError, Method, ReqwestTransport, Transport, TransportRequest, TransportResponse,
};
