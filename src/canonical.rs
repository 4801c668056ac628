//! Canonical forms for stored links.

use url::form_urlencoded;

use crate::error::{Error, Reason};
use crate::safe_url::{normalize_host, SafeUrl};

/// Host used in every canonical status URL.
pub const CANONICAL_STATUS_HOST: &str = "platform.com";

/// Query keys dropped from document URLs, compared case-insensitively.
const TRACKING_KEYS: &[&str] = &["fbclid", "gclid", "msclkid"];

/// Build the canonical status URL for a status ID.
pub fn status_url(id: &str) -> String {
    format!("https://{}/i/web/status/{}", CANONICAL_STATUS_HOST, id)
}

/// Extract the numeric status ID from a URL on one of `status_hosts`.
///
/// Trailing slashes are ignored. Recognized paths, in order:
/// `/i/web/status/<id>`, `/status/<id>`, `/<user>/status/<id>`.
pub fn extract_status_id(url: &SafeUrl, status_hosts: &[String]) -> Result<String, Error> {
    let not_status = || Error::invalid_url(url.as_str(), Reason::NotAStatus);

    if !status_hosts.iter().any(|h| normalize_host(h) == url.host()) {
        return Err(not_status());
    }

    let path = url.path().trim_end_matches('/');

    let id = if let Some(rest) = path.strip_prefix("/i/web/status/") {
        rest
    } else if let Some(rest) = path.strip_prefix("/status/") {
        rest
    } else {
        match path.split('/').collect::<Vec<_>>().as_slice() {
            ["", user, "status", id] if !user.is_empty() => *id,
            _ => return Err(not_status()),
        }
    };

    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(not_status());
    }
    Ok(id.to_string())
}

/// Whether a query key is a known tracking parameter.
pub fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_KEYS.contains(&key.as_str())
}

/// Decoded key of a raw `key=value` query pair.
fn query_key(pair: &str) -> String {
    form_urlencoded::parse(pair.as_bytes())
        .next()
        .map(|(k, _)| k.into_owned())
        .unwrap_or_default()
}

/// Canonicalize a document URL.
///
/// Drops the fragment and tracking parameters (retained parameters keep
/// their order and original encoding), drops an empty query, and strips a
/// trailing dot from the hostname. `Url` never serializes the default port,
/// so an explicit `:443` is already gone. The result is validated again.
pub fn canonicalize_document(url: SafeUrl) -> Result<SafeUrl, Error> {
    let mut url = url.into_url();

    url.set_fragment(None);

    let retained = url.query().map(|query| {
        query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .filter(|pair| !is_tracking_param(&query_key(pair)))
            .collect::<Vec<_>>()
            .join("&")
    });
    if let Some(retained) = retained {
        url.set_query(if retained.is_empty() { None } else { Some(&retained) });
    }

    let dotted = url
        .host_str()
        .filter(|h| h.ends_with('.'))
        .map(str::to_string);
    if let Some(host) = dotted {
        url.set_host(Some(host.trim_end_matches('.')))
            .map_err(|e| Error::invalid_url(url.as_str(), Reason::Malformed).with_detail(e))?;
    }

    SafeUrl::from_url(url)
}
