//! Hostname vetting with DNS resolution.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::TokioResolver;
use ipnet::IpNet;
use tracing::{debug, warn};

use crate::blocklist::{blocked_by_with, is_hostname_blocked, matches_hostname_pattern};
use crate::error::{Error, Reason};
use crate::safe_url::SafeUrl;
use crate::transport::BoxError;

/// Resolves a hostname to every address it points at.
///
/// Implementations must return all records, not just the first: a single
/// blocked address rejects the whole hostname.
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, BoxError>;
}

/// Resolver using the system DNS configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl HostResolver for SystemResolver {
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, BoxError> {
        let resolver = TokioResolver::builder_tokio()?.build();
        let response = resolver.lookup_ip(host).await?;
        Ok(response.iter().collect())
    }
}

/// What a hostname is checked against before and after resolution.
#[derive(Debug, Clone, Copy)]
pub(crate) struct HostCheck<'a> {
    pub blocked_hosts: &'a [String],
    pub blocked_cidrs: &'a [IpNet],
    pub timeout: Duration,
}

/// Vet the host of `url` and return the addresses it resolved to.
///
/// IP-literal hosts are refused outright; only names are resolved. The
/// name is refused if it is blocked, does not resolve, or if *any* of its
/// addresses is blocked.
pub(crate) async fn vet_host(
    url: &SafeUrl,
    resolver: &dyn HostResolver,
    check: &HostCheck<'_>,
) -> Result<Vec<IpAddr>, Error> {
    let host = url.host();

    if url.is_ip_literal() {
        warn!(url = %url.as_str(), host = %host, "IP literal host refused");
        return Err(Error::invalid_url(url.as_str(), Reason::HostnameNotAllowed));
    }

    let pattern = is_hostname_blocked(host).map(str::to_string).or_else(|| {
        check
            .blocked_hosts
            .iter()
            .find(|p| matches_hostname_pattern(host, p))
            .cloned()
    });
    if let Some(pattern) = pattern {
        warn!(url = %url.as_str(), host = %host, pattern = %pattern, "blocked hostname refused");
        return Err(Error::invalid_url(url.as_str(), Reason::HostnameNotAllowed));
    }

    let lookup = tokio::time::timeout(check.timeout, resolver.resolve(host));
    let addrs = match lookup.await {
        Ok(Ok(addrs)) => addrs,
        Ok(Err(e)) => {
            debug!(host = %host, error = %e, "DNS resolution failed");
            let err = Error::invalid_url(url.as_str(), Reason::Unresolved);
            return Err(err.with_detail(e));
        }
        Err(_) => {
            debug!(host = %host, timeout = ?check.timeout, "DNS resolution timed out");
            let err = Error::invalid_url(url.as_str(), Reason::Unresolved);
            return Err(err.with_detail("DNS lookup timed out"));
        }
    };

    if addrs.is_empty() {
        let err = Error::invalid_url(url.as_str(), Reason::Unresolved);
        return Err(err.with_detail("no IP addresses found"));
    }

    for ip in &addrs {
        if let Some(rule) = blocked_by_with(*ip, check.blocked_cidrs) {
            warn!(
                url = %url.as_str(),
                host = %host,
                ip = %ip,
                rule = %rule,
                "resolved address blocked"
            );
            let err = Error::invalid_url(url.as_str(), Reason::BlockedAddress);
            return Err(err.with_detail(format!("{} is in {}", ip, rule)));
        }
    }

    debug!(host = %host, addrs = ?addrs, "hostname vetted");
    Ok(addrs)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct StubResolver {
        records: HashMap<&'static str, Vec<&'static str>>,
        calls: AtomicUsize,
    }

    impl StubResolver {
        fn with(mut self, host: &'static str, addrs: &[&'static str]) -> Self {
            self.records.insert(host, addrs.to_vec());
            self
        }
    }

    #[async_trait]
    impl HostResolver for StubResolver {
        async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, BoxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.records.get(host) {
                Some(addrs) => Ok(addrs.iter().map(|a| a.parse().unwrap()).collect()),
                None => Err("NXDOMAIN".into()),
            }
        }
    }

    struct SlowResolver;

    #[async_trait]
    impl HostResolver for SlowResolver {
        async fn resolve(&self, _host: &str) -> Result<Vec<IpAddr>, BoxError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(vec!["93.184.216.34".parse().unwrap()])
        }
    }

    fn check<'a>(hosts: &'a [String], cidrs: &'a [IpNet]) -> HostCheck<'a> {
        HostCheck {
            blocked_hosts: hosts,
            blocked_cidrs: cidrs,
            timeout: Duration::from_millis(3000),
        }
    }

    async fn vet(url: &str, resolver: &StubResolver) -> Result<Vec<IpAddr>, Error> {
        let url = SafeUrl::parse(url).unwrap();
        vet_host(&url, resolver, &check(&[], &[])).await
    }

    #[tokio::test]
    async fn test_public_host_passes() {
        let resolver = StubResolver::default()
            .with("docs.test", &["93.184.216.34", "2606:4700::1111"]);
        let addrs = vet("https://docs.test/a", &resolver).await.unwrap();
        assert_eq!(addrs.len(), 2);
    }

    #[tokio::test]
    async fn test_any_blocked_address_rejects_host() {
        let resolver = StubResolver::default()
            .with("mixed.test", &["93.184.216.34", "10.0.0.5"]);
        let err = vet("https://mixed.test/", &resolver).await.unwrap_err();
        assert_eq!(err.reason(), Reason::BlockedAddress);
    }

    #[tokio::test]
    async fn test_mapped_loopback_rejects_host() {
        let resolver = StubResolver::default()
            .with("sneaky.test", &["::ffff:127.0.0.1"]);
        let err = vet("https://sneaky.test/", &resolver).await.unwrap_err();
        assert_eq!(err.reason(), Reason::BlockedAddress);
    }

    #[tokio::test]
    async fn test_unresolvable_and_empty() {
        let resolver = StubResolver::default().with("empty.test", &[]);
        let err = vet("https://missing.test/", &resolver).await.unwrap_err();
        assert_eq!(err.reason(), Reason::Unresolved);
        assert_eq!(err.detail(), Some("NXDOMAIN"));
        let err = vet("https://empty.test/", &resolver).await.unwrap_err();
        assert_eq!(err.reason(), Reason::Unresolved);
    }

    #[tokio::test]
    async fn test_localhost_and_literals_never_resolved() {
        let resolver = StubResolver::default()
            .with("localhost", &["93.184.216.34"]);
        for url in [
            "https://localhost/",
            "https://app.localhost/",
            "https://metadata.google.internal/",
            "https://93.184.216.34/",
            "https://[2606:4700::1111]/",
            "https://0x7f000001/",
        ] {
            let err = vet(url, &resolver).await.unwrap_err();
            assert_eq!(err.reason(), Reason::HostnameNotAllowed, "{}", url);
        }
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_configured_host_patterns_and_ranges() {
        let resolver = StubResolver::default()
            .with("wiki.corp.test", &["93.184.216.34"])
            .with("cdn.test", &["8.8.8.8"]);
        let hosts = vec!["*.corp.test".to_string()];
        let cidrs: Vec<IpNet> = vec!["8.8.8.0/24".parse().unwrap()];

        let url = SafeUrl::parse("https://wiki.corp.test/").unwrap();
        let err = vet_host(&url, &resolver, &check(&hosts, &cidrs))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), Reason::HostnameNotAllowed);

        let url = SafeUrl::parse("https://cdn.test/").unwrap();
        let err = vet_host(&url, &resolver, &check(&hosts, &cidrs))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), Reason::BlockedAddress);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolution_timeout() {
        let url = SafeUrl::parse("https://slow.test/").unwrap();
        let err = vet_host(&url, &SlowResolver, &check(&[], &[]))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), Reason::Unresolved);
        assert_eq!(err.detail(), Some("DNS lookup timed out"));
    }
}
