//! Error types for linkgate.

use std::fmt;

use thiserror::Error;

/// Why a URL was rejected.
///
/// Every rejection is terminal for the resolution attempt. The variants are
/// stable so callers can map them to user-facing messages or metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Reason {
    /// Input (or a serialized hop) is longer than [`MAX_URL_LEN`](crate::MAX_URL_LEN).
    TooLong,
    /// Input is empty after trimming.
    Empty,
    /// Syntax error, or a `Location` header that cannot be decoded or does
    /// not resolve to a URL.
    Malformed,
    /// Scheme other than `https`.
    Scheme,
    /// Username or password present.
    Credentials,
    /// Explicit port other than 443.
    NonDefaultPort,
    /// Host is not on the social platform allow-list.
    HostNotAllowed,
    /// `localhost`, a metadata name, a blocked pattern, or an IP literal.
    HostnameNotAllowed,
    /// DNS lookup failed, timed out or returned nothing.
    Unresolved,
    /// At least one resolved address is in a blocked range.
    BlockedAddress,
    /// A redirect pointed back to a URL already visited.
    RedirectLoop,
    /// The redirect budget ran out.
    TooManyRedirects,
    /// A redirect response without a `Location` header.
    MissingLocation,
    /// The final URL does not name a status.
    NotAStatus,
    /// A transport request exceeded its timeout.
    Timeout,
    /// The transport failed to produce a response.
    RequestFailed,
}

impl Reason {
    /// Short machine-readable description.
    pub fn as_str(self) -> &'static str {
        match self {
            Reason::TooLong => "URL too long",
            Reason::Empty => "URL is empty",
            Reason::Malformed => "not a valid URL",
            Reason::Scheme => "only https allowed",
            Reason::Credentials => "must not include credentials",
            Reason::NonDefaultPort => "non-default port",
            Reason::HostNotAllowed => "host not allowed",
            Reason::HostnameNotAllowed => "hostname not allowed",
            Reason::Unresolved => "failed to resolve hostname",
            Reason::BlockedAddress => "resolved hostname not allowed",
            Reason::RedirectLoop => "redirect loop detected",
            Reason::TooManyRedirects => "too many redirects",
            Reason::MissingLocation => "redirect missing location header",
            Reason::NotAStatus => "not a valid status URL",
            Reason::Timeout => "request timed out",
            Reason::RequestFailed => "request failed",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A URL was rejected.
///
/// This is the only error the resolvers return. The offending URL is the one
/// being checked when the failure happened, which for redirect chains is the
/// hop rather than the original input.
#[derive(Debug, Clone, Error)]
#[error("invalid URL: {reason}")]
pub struct Error {
    url: String,
    reason: Reason,
    detail: Option<String>,
}

impl Error {
    pub(crate) fn invalid_url(url: impl Into<String>, reason: Reason) -> Self {
        Self {
            url: url.into(),
            reason,
            detail: None,
        }
    }

    pub(crate) fn with_detail(mut self, detail: impl fmt::Display) -> Self {
        self.detail = Some(detail.to_string());
        self
    }

    /// The rejection reason.
    pub fn reason(&self) -> Reason {
        self.reason
    }

    /// The URL that was being checked.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Underlying transport or DNS message, if any. Meant for logs, not users.
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }
}
