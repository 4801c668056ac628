//! Safe URL parsing and validation.

use url::{Host, Url};

use crate::error::{Error, Reason};

/// Longest URL accepted, in characters. Applies to the raw input and to
/// every serialized hop and result.
pub const MAX_URL_LEN: usize = 2048;

/// A parsed URL that passed the structural safety checks.
///
/// Holding a `SafeUrl` means: the scheme is `https`, there is no userinfo,
/// the port (if any) is 443, and the serialized form fits in
/// [`MAX_URL_LEN`]. It says nothing about where the host resolves to; see
/// [`HostResolver`](crate::HostResolver) for that.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeUrl {
    inner: Url,
    host: String,
}

impl SafeUrl {
    /// Parse and validate a raw URL string.
    ///
    /// The length limit is checked before anything else so oversized input
    /// never reaches the parser. Surrounding whitespace is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error`] with one of [`Reason::TooLong`], [`Reason::Empty`],
    /// [`Reason::Malformed`], or any reason from [`SafeUrl::from_url`].
    pub fn parse(input: &str) -> Result<Self, Error> {
        if input.chars().count() > MAX_URL_LEN {
            return Err(Error::invalid_url(truncate(input), Reason::TooLong));
        }

        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(Error::invalid_url(input, Reason::Empty));
        }

        let url = Url::parse(trimmed)
            .map_err(|e| Error::invalid_url(trimmed, Reason::Malformed).with_detail(e))?;

        Self::from_url(url)
    }

    /// Validate an already parsed URL, e.g. a resolved `Location` header.
    ///
    /// # Errors
    ///
    /// Returns [`Error`] with [`Reason::Scheme`], [`Reason::Credentials`],
    /// [`Reason::NonDefaultPort`], [`Reason::Malformed`] (no host) or
    /// [`Reason::TooLong`].
    pub fn from_url(url: Url) -> Result<Self, Error> {
        if url.scheme() != "https" {
            return Err(Error::invalid_url(url.as_str(), Reason::Scheme));
        }

        if !url.username().is_empty() || url.password().is_some() {
            return Err(Error::invalid_url(url.as_str(), Reason::Credentials));
        }

        // `Url` already drops a port equal to the scheme default.
        if url.port().is_some() {
            return Err(Error::invalid_url(url.as_str(), Reason::NonDefaultPort));
        }

        if url.as_str().len() > MAX_URL_LEN {
            return Err(Error::invalid_url(truncate(url.as_str()), Reason::TooLong));
        }

        let host = match url.host_str() {
            Some(h) if !h.is_empty() => normalize_host(h),
            _ => return Err(Error::invalid_url(url.as_str(), Reason::Malformed)),
        };

        Ok(Self { inner: url, host })
    }

    /// Reject the URL unless its host is one of `allowed`.
    ///
    /// Matching is case-insensitive and ignores a trailing dot.
    pub fn require_host_in(&self, allowed: &[String]) -> Result<(), Error> {
        if allowed.iter().any(|h| normalize_host(h) == self.host) {
            Ok(())
        } else {
            Err(Error::invalid_url(self.as_str(), Reason::HostNotAllowed))
        }
    }

    /// Resolve a possibly relative reference (a `Location` header) against
    /// this URL and validate the result.
    pub fn join(&self, reference: &str) -> Result<SafeUrl, Error> {
        let next = self
            .inner
            .join(reference)
            .map_err(|e| {
                Error::invalid_url(truncate(reference), Reason::Malformed).with_detail(e)
            })?;
        SafeUrl::from_url(next)
    }

    /// Normalized hostname: lowercase, no trailing dot. IPv6 hosts keep
    /// their brackets.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Whether the host is written as an IP address rather than a name.
    pub fn is_ip_literal(&self) -> bool {
        matches!(self.inner.host(), Some(Host::Ipv4(_)) | Some(Host::Ipv6(_)))
    }

    /// Get the path.
    pub fn path(&self) -> &str {
        self.inner.path()
    }

    /// Get the full URL as a string.
    pub fn as_str(&self) -> &str {
        self.inner.as_str()
    }

    /// Borrow the underlying URL.
    pub fn url(&self) -> &Url {
        &self.inner
    }

    /// Get the underlying URL.
    pub fn into_url(self) -> Url {
        self.inner
    }
}

/// Normalize a hostname: lowercase, remove trailing dot.
pub(crate) fn normalize_host(host: &str) -> String {
    let mut normalized = host.to_ascii_lowercase();
    if normalized.ends_with('.') {
        normalized.pop();
    }
    normalized
}

/// Keep error payloads bounded when the input itself is the problem.
fn truncate(s: &str) -> String {
    s.chars().take(128).collect()
}
