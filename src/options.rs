//! Resolver options and their builders.
//!
//! Options are immutable once built. Builders consume `self` on every call,
//! so a half-configured builder cannot be reused by accident.
//!
//! ## Security considerations
//!
//! The builders can only *add* restrictions on top of the built-in tables:
//! extra blocked CIDR ranges, extra blocked hostnames, and (for the social
//! pipeline) the exact set of platform hosts. There is no way to re-allow a
//! built-in blocked range.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use ipnet::IpNet;
use serde::Deserialize;

use crate::dns::{HostResolver, SystemResolver};
use crate::transport::{ReqwestTransport, Transport};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(3000);

/// Default redirect budget for the social pipeline.
pub const DEFAULT_SOCIAL_MAX_REDIRECTS: usize = 5;

/// Default redirect budget for the document pipeline.
pub const DEFAULT_DOCUMENT_MAX_REDIRECTS: usize = 3;

/// Hosts whose pages carry status IDs.
pub const STATUS_HOSTS: &[&str] = &[
    "platform.com",
    "www.platform.com",
    "platform-alt.com",
    "www.platform-alt.com",
];

/// The platform's short-link redirector.
pub const SHORT_LINK_HOST: &str = "pltfm.co";

/// Options for [`resolve_document_url`](crate::resolve_document_url).
#[derive(Clone)]
pub struct DocumentOptions {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) resolver: Arc<dyn HostResolver>,
    pub(crate) max_redirects: usize,
    pub(crate) timeout: Duration,
    pub(crate) blocked_cidrs: Vec<IpNet>,
    pub(crate) blocked_hosts: Vec<String>,
}

impl DocumentOptions {
    /// Start building options from the defaults.
    pub fn builder() -> DocumentOptionsBuilder {
        DocumentOptionsBuilder::default()
    }

    /// Get the redirect budget.
    pub fn max_redirects(&self) -> usize {
        self.max_redirects
    }

    /// Get the per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for DocumentOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for DocumentOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentOptions")
            .field("max_redirects", &self.max_redirects)
            .field("timeout", &self.timeout)
            .field("blocked_cidrs", &self.blocked_cidrs)
            .field("blocked_hosts", &self.blocked_hosts)
            .finish_non_exhaustive()
    }
}

/// Builder for [`DocumentOptions`].
#[derive(Clone)]
pub struct DocumentOptionsBuilder {
    transport: Option<Arc<dyn Transport>>,
    resolver: Option<Arc<dyn HostResolver>>,
    max_redirects: usize,
    timeout: Duration,
    blocked_cidrs: Vec<IpNet>,
    blocked_hosts: Vec<String>,
}

impl Default for DocumentOptionsBuilder {
    fn default() -> Self {
        Self {
            transport: None,
            resolver: None,
            max_redirects: DEFAULT_DOCUMENT_MAX_REDIRECTS,
            timeout: DEFAULT_TIMEOUT,
            blocked_cidrs: Vec::new(),
            blocked_hosts: Vec::new(),
        }
    }
}

impl DocumentOptionsBuilder {
    /// Apply loaded [`Settings`] on top of the current values.
    pub fn from_settings(mut self, settings: &Settings) -> Self {
        if let Some(max) = settings.max_redirects {
            self.max_redirects = max;
        }
        if let Some(ms) = settings.timeout_ms {
            self.timeout = Duration::from_millis(ms);
        }
        for cidr in &settings.blocked_cidrs {
            self = self.block_cidr(cidr);
        }
        for host in &settings.blocked_hosts {
            self = self.block_host(host);
        }
        self
    }

    /// Use a custom transport instead of the reqwest-based default.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use a custom hostname resolver instead of system DNS.
    pub fn resolver(mut self, resolver: Arc<dyn HostResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Maximum number of redirects to follow.
    pub fn max_redirects(mut self, max: usize) -> Self {
        self.max_redirects = max;
        self
    }

    /// Timeout applied to each transport request and DNS lookup.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Block an additional IP range (CIDR notation).
    ///
    /// Invalid CIDRs are ignored.
    ///
    /// # Example
    /// ```
    /// use linkgate::DocumentOptions;
    ///
    /// let options = DocumentOptions::builder()
    ///     .block_cidr("10.200.0.0/16")
    ///     .build();
    /// ```
    pub fn block_cidr(mut self, cidr: &str) -> Self {
        match cidr.parse::<IpNet>() {
            Ok(net) => self.blocked_cidrs.push(net.trunc()),
            Err(e) => tracing::warn!(cidr = %cidr, error = %e, "ignoring invalid CIDR"),
        }
        self
    }

    /// Block a hostname or pattern.
    ///
    /// `name` blocks the name and its subdomains, `*.name` only subdomains.
    pub fn block_host(mut self, pattern: &str) -> Self {
        self.blocked_hosts
            .push(pattern.trim_end_matches('.').to_ascii_lowercase());
        self
    }

    /// Build the options.
    pub fn build(self) -> DocumentOptions {
        DocumentOptions {
            transport: self
                .transport
                .unwrap_or_else(|| Arc::new(ReqwestTransport::new())),
            resolver: self.resolver.unwrap_or_else(|| Arc::new(SystemResolver)),
            max_redirects: self.max_redirects,
            timeout: self.timeout,
            blocked_cidrs: self.blocked_cidrs,
            blocked_hosts: self.blocked_hosts,
        }
    }
}

/// Options for [`resolve_social_status_url`](crate::resolve_social_status_url).
#[derive(Clone)]
pub struct SocialOptions {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) max_redirects: usize,
    pub(crate) timeout: Duration,
    pub(crate) hosts: Vec<String>,
    pub(crate) status_hosts: Vec<String>,
}

impl SocialOptions {
    /// Start building options from the defaults.
    pub fn builder() -> SocialOptionsBuilder {
        SocialOptionsBuilder::default()
    }

    /// Get the redirect budget.
    pub fn max_redirects(&self) -> usize {
        self.max_redirects
    }

    /// Get the per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Every host a link may visit.
    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }
}

impl Default for SocialOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for SocialOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocialOptions")
            .field("max_redirects", &self.max_redirects)
            .field("timeout", &self.timeout)
            .field("hosts", &self.hosts)
            .field("status_hosts", &self.status_hosts)
            .finish_non_exhaustive()
    }
}

/// Builder for [`SocialOptions`].
#[derive(Clone)]
pub struct SocialOptionsBuilder {
    transport: Option<Arc<dyn Transport>>,
    max_redirects: usize,
    timeout: Duration,
    hosts: Vec<String>,
    status_hosts: Vec<String>,
}

impl Default for SocialOptionsBuilder {
    fn default() -> Self {
        let status_hosts: Vec<String> = STATUS_HOSTS.iter().map(|h| h.to_string()).collect();
        let mut hosts = status_hosts.clone();
        hosts.push(SHORT_LINK_HOST.to_string());
        Self {
            transport: None,
            max_redirects: DEFAULT_SOCIAL_MAX_REDIRECTS,
            timeout: DEFAULT_TIMEOUT,
            hosts,
            status_hosts,
        }
    }
}

impl SocialOptionsBuilder {
    /// Apply loaded [`Settings`] on top of the current values.
    pub fn from_settings(mut self, settings: &Settings) -> Self {
        if let Some(max) = settings.max_redirects {
            self.max_redirects = max;
        }
        if let Some(ms) = settings.timeout_ms {
            self.timeout = Duration::from_millis(ms);
        }
        for host in &settings.social_hosts {
            self = self.allow_host(host);
        }
        self
    }

    /// Use a custom transport instead of the reqwest-based default.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Maximum number of redirects to follow.
    pub fn max_redirects(mut self, max: usize) -> Self {
        self.max_redirects = max;
        self
    }

    /// Timeout applied to each transport request.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Allow links to pass through another host, e.g. a new short-link
    /// domain. Status IDs are still only read from status hosts.
    pub fn allow_host(mut self, host: &str) -> Self {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        if !self.hosts.contains(&host) {
            self.hosts.push(host);
        }
        self
    }

    /// Allow a host and accept status IDs from its pages.
    pub fn status_host(mut self, host: &str) -> Self {
        self = self.allow_host(host);
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        if !self.status_hosts.contains(&host) {
            self.status_hosts.push(host);
        }
        self
    }

    /// Build the options.
    pub fn build(self) -> SocialOptions {
        SocialOptions {
            transport: self
                .transport
                .unwrap_or_else(|| Arc::new(ReqwestTransport::new())),
            max_redirects: self.max_redirects,
            timeout: self.timeout,
            hosts: self.hosts,
            status_hosts: self.status_hosts,
        }
    }
}

/// Plain-data settings, for loading from the application's config file.
///
/// Unset fields keep the pipeline defaults.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Redirect budget.
    pub max_redirects: Option<usize>,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Extra blocked ranges for the document pipeline.
    pub blocked_cidrs: Vec<String>,
    /// Extra blocked hostnames for the document pipeline.
    pub blocked_hosts: Vec<String>,
    /// Extra pass-through hosts for the social pipeline.
    pub social_hosts: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_defaults() {
        let options = DocumentOptions::default();
        assert_eq!(options.max_redirects(), 3);
        assert_eq!(options.timeout(), Duration::from_millis(3000));
        assert!(options.blocked_cidrs.is_empty());
    }

    #[test]
    fn test_social_defaults() {
        let options = SocialOptions::default();
        assert_eq!(options.max_redirects(), 5);
        assert!(options.hosts().iter().any(|h| h == "platform.com"));
        assert!(options.hosts().iter().any(|h| h == SHORT_LINK_HOST));
        assert!(!options.status_hosts.iter().any(|h| h == SHORT_LINK_HOST));
    }

    #[test]
    fn test_block_cidr_ignores_invalid() {
        let options = DocumentOptions::builder()
            .block_cidr("10.200.0.0/16")
            .block_cidr("not-a-cidr")
            .block_cidr("8.8.8.8/24")
            .build();
        assert_eq!(options.blocked_cidrs.len(), 2);
        // Host bits are dropped.
        assert_eq!(options.blocked_cidrs[1].to_string(), "8.8.8.0/24");
    }

    #[test]
    fn test_block_host_normalizes() {
        let options = DocumentOptions::builder()
            .block_host("*.Corp.Test.")
            .build();
        assert_eq!(options.blocked_hosts, vec!["*.corp.test".to_string()]);
    }

    #[test]
    fn test_status_host_is_also_allowed() {
        let options = SocialOptions::builder()
            .status_host("Platform-Next.com")
            .allow_host("pltfm.co")
            .build();
        let next = "platform-next.com".to_string();
        assert!(options.hosts().contains(&next));
        assert!(options.status_hosts.contains(&next));
        let short_links = options.hosts().iter().filter(|h| *h == "pltfm.co");
        assert_eq!(short_links.count(), 1);
    }

    #[test]
    fn test_settings_from_json() {
        let settings: Settings = serde_json::from_str(
            r#"{
                "max_redirects": 2,
                "timeout_ms": 1500,
                "blocked_cidrs": ["10.200.0.0/16"],
                "blocked_hosts": ["internal.test"],
                "social_hosts": ["go.platform.com"]
            }"#,
        )
        .unwrap();

        let doc = DocumentOptions::builder().from_settings(&settings).build();
        assert_eq!(doc.max_redirects(), 2);
        assert_eq!(doc.timeout(), Duration::from_millis(1500));
        assert_eq!(doc.blocked_cidrs.len(), 1);
        assert_eq!(doc.blocked_hosts, vec!["internal.test".to_string()]);

        let social = SocialOptions::builder().from_settings(&settings).build();
        assert_eq!(social.max_redirects(), 2);
        assert!(social.hosts().iter().any(|h| h == "go.platform.com"));
    }

    #[test]
    fn test_empty_settings_keep_defaults() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, Settings::default());
        let doc = DocumentOptions::builder().from_settings(&settings).build();
        assert_eq!(doc.max_redirects(), DEFAULT_DOCUMENT_MAX_REDIRECTS);
        let social = SocialOptions::builder().from_settings(&settings).build();
        assert_eq!(social.max_redirects(), DEFAULT_SOCIAL_MAX_REDIRECTS);
    }
}
