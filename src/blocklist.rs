//! Blocklists for hostnames and IP addresses.
//!
//! The address tables are computed at compile time. Every rule stores its
//! base address already masked to the prefix length, so a membership test is
//! a single masked comparison.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnet::IpNet;

/// An IPv4 range, pre-masked.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Ipv4CidrRule {
    base: u32,
    mask: u32,
    label: &'static str,
}

impl Ipv4CidrRule {
    const fn new(octets: [u8; 4], prefix: u8, label: &'static str) -> Self {
        let mask = if prefix == 0 {
            0
        } else {
            u32::MAX << (32 - prefix as u32)
        };
        Self {
            base: u32::from_be_bytes(octets) & mask,
            mask,
            label,
        }
    }

    fn contains(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & self.mask == self.base
    }
}

/// An IPv6 range, pre-masked. Compared byte by byte with a partial mask on
/// the byte the prefix ends in.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Ipv6CidrRule {
    base: [u8; 16],
    prefix: u8,
    label: &'static str,
}

impl Ipv6CidrRule {
    const fn new(segments: [u16; 8], prefix: u8, label: &'static str) -> Self {
        let mut base = [0u8; 16];
        let mut i = 0;
        while i < 8 {
            base[2 * i] = (segments[i] >> 8) as u8;
            base[2 * i + 1] = segments[i] as u8;
            i += 1;
        }

        let prefix_bits = prefix as usize;
        let mut j = 0;
        while j < 16 {
            let start = j * 8;
            if start >= prefix_bits {
                base[j] = 0;
            } else if start + 8 > prefix_bits {
                base[j] &= partial_mask(prefix_bits - start);
            }
            j += 1;
        }

        Self {
            base,
            prefix,
            label,
        }
    }

    fn contains(&self, addr: Ipv6Addr) -> bool {
        let octets = addr.octets();
        let full = (self.prefix / 8) as usize;
        let rem = (self.prefix % 8) as usize;

        if octets[..full] != self.base[..full] {
            return false;
        }
        rem == 0 || octets[full] & partial_mask(rem) == self.base[full]
    }
}

/// Mask keeping the top `bits` bits of a byte, `bits` in `1..8`.
const fn partial_mask(bits: usize) -> u8 {
    0xFFu8 << (8 - bits) as u32
}

pub(crate) const IPV4_RULES: [Ipv4CidrRule; 16] = [
    Ipv4CidrRule::new([0, 0, 0, 0], 8, "0.0.0.0/8 (this network)"),
    Ipv4CidrRule::new([10, 0, 0, 0], 8, "10.0.0.0/8 (private)"),
    Ipv4CidrRule::new([100, 64, 0, 0], 10, "100.64.0.0/10 (shared address space)"),
    Ipv4CidrRule::new([127, 0, 0, 0], 8, "127.0.0.0/8 (loopback)"),
    Ipv4CidrRule::new(
        [169, 254, 0, 0],
        16,
        "169.254.0.0/16 (link-local, metadata)",
    ),
    Ipv4CidrRule::new([172, 16, 0, 0], 12, "172.16.0.0/12 (private)"),
    Ipv4CidrRule::new(
        [192, 0, 0, 0],
        24,
        "192.0.0.0/24 (IETF protocol assignments)",
    ),
    Ipv4CidrRule::new([192, 0, 2, 0], 24, "192.0.2.0/24 (documentation)"),
    Ipv4CidrRule::new([192, 168, 0, 0], 16, "192.168.0.0/16 (private)"),
    Ipv4CidrRule::new([192, 88, 99, 0], 24, "192.88.99.0/24 (6to4 relay anycast)"),
    Ipv4CidrRule::new([198, 18, 0, 0], 15, "198.18.0.0/15 (benchmarking)"),
    Ipv4CidrRule::new([198, 51, 100, 0], 24, "198.51.100.0/24 (documentation)"),
    Ipv4CidrRule::new([203, 0, 113, 0], 24, "203.0.113.0/24 (documentation)"),
    Ipv4CidrRule::new([224, 0, 0, 0], 4, "224.0.0.0/4 (multicast)"),
    Ipv4CidrRule::new([240, 0, 0, 0], 4, "240.0.0.0/4 (reserved)"),
    Ipv4CidrRule::new([255, 255, 255, 255], 32, "255.255.255.255/32 (broadcast)"),
];

pub(crate) const IPV6_RULES: [Ipv6CidrRule; 6] = [
    Ipv6CidrRule::new([0; 8], 128, "::/128 (unspecified)"),
    Ipv6CidrRule::new([0, 0, 0, 0, 0, 0, 0, 1], 128, "::1/128 (loopback)"),
    Ipv6CidrRule::new([0xfc00, 0, 0, 0, 0, 0, 0, 0], 7, "fc00::/7 (unique local)"),
    Ipv6CidrRule::new([0xfe80, 0, 0, 0, 0, 0, 0, 0], 10, "fe80::/10 (link-local)"),
    Ipv6CidrRule::new([0xff00, 0, 0, 0, 0, 0, 0, 0], 8, "ff00::/8 (multicast)"),
    Ipv6CidrRule::new(
        [0x2001, 0x0db8, 0, 0, 0, 0, 0, 0],
        32,
        "2001:db8::/32 (documentation)",
    ),
];

/// Hostnames that are always blocked (checked before DNS resolution).
/// Subdomains are blocked too.
const BLOCKED_HOSTNAMES: &[&str] = &[
    "localhost",
    "metadata.google.internal",
    "metadata.goog",
    "metadata.azure.internal",
    "instance-data", // AWS alternate (EC2-Classic)
];

/// Check if a hostname is blocked. Returns the matching blocklist entry.
pub fn is_hostname_blocked(host: &str) -> Option<&'static str> {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    BLOCKED_HOSTNAMES
        .iter()
        .copied()
        .find(|blocked| matches_hostname_pattern(&host, blocked))
}

/// Match a lowercase hostname against a pattern: `name` matches itself and
/// its subdomains, `*.name` matches only subdomains.
pub(crate) fn matches_hostname_pattern(host: &str, pattern: &str) -> bool {
    match pattern.strip_prefix("*.") {
        Some(suffix) => is_subdomain_of(host, suffix),
        None => host == pattern || is_subdomain_of(host, pattern),
    }
}

fn is_subdomain_of(host: &str, parent: &str) -> bool {
    host.len() > parent.len()
        && host.ends_with(parent)
        && host[..host.len() - parent.len()].ends_with('.')
}

/// Parse an IP literal as returned by a resolver.
///
/// Accepts a dotted-quad IPv4 address or an IPv6 address, optionally in
/// brackets and optionally with a `%zone` suffix. Anything else, including
/// octal, hex, or shortened IPv4 forms, is rejected.
pub(crate) fn parse_ip_literal(literal: &str) -> Option<IpAddr> {
    let mut s = literal.trim();
    if let Some(inner) = s.strip_prefix('[') {
        s = inner.strip_suffix(']')?;
    }
    if s.contains(':') {
        if let Some(pos) = s.find('%') {
            s = &s[..pos];
        }
        return s.parse::<Ipv6Addr>().ok().map(IpAddr::V6);
    }
    s.parse::<Ipv4Addr>().ok().map(IpAddr::V4)
}

/// Whether a resolved address literal must be refused.
///
/// Fails closed: anything that does not parse as an IP address is blocked.
pub fn is_blocked_resolved_ip(literal: &str) -> bool {
    match parse_ip_literal(literal) {
        Some(ip) => is_blocked_ip(ip),
        None => true,
    }
}

/// Whether an address falls in a built-in blocked range.
pub fn is_blocked_ip(ip: IpAddr) -> bool {
    blocked_by(ip).is_some()
}

/// The built-in rule that blocks `ip`, if any.
pub(crate) fn blocked_by(ip: IpAddr) -> Option<&'static str> {
    match ip {
        IpAddr::V4(v4) => ipv4_rule(v4),
        IpAddr::V6(v6) => ipv6_rule(v6),
    }
}

/// Check `ip` against the built-in tables and then the caller's extra
/// ranges. Returns a description of the matching rule.
pub(crate) fn blocked_by_with(ip: IpAddr, extra: &[IpNet]) -> Option<String> {
    if let Some(label) = blocked_by(ip) {
        return Some(label.to_string());
    }

    let embedded = match ip {
        IpAddr::V6(v6) => embedded_ipv4(v6).map(IpAddr::V4),
        IpAddr::V4(_) => None,
    };

    extra
        .iter()
        .find(|net| {
            net.contains(&ip) || embedded.is_some_and(|v4| net.contains(&v4))
        })
        .map(|net| format!("{} (configured)", net))
}

fn ipv4_rule(ip: Ipv4Addr) -> Option<&'static str> {
    IPV4_RULES.iter().find(|r| r.contains(ip)).map(|r| r.label)
}

fn ipv6_rule(ip: Ipv6Addr) -> Option<&'static str> {
    if let Some(rule) = IPV6_RULES.iter().find(|r| r.contains(ip)) {
        return Some(rule.label);
    }

    // An IPv4 address written in IPv6 form gets the IPv4 verdict.
    embedded_ipv4(ip).and_then(ipv4_rule)
}

/// IPv4 address carried in an IPv4-mapped (`::ffff:a.b.c.d`) or deprecated
/// IPv4-compatible (`::a.b.c.d`) IPv6 address.
fn embedded_ipv4(ip: Ipv6Addr) -> Option<Ipv4Addr> {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return Some(v4);
    }

    // `::` and `::1` are not IPv4-compatible addresses.
    let segments = ip.segments();
    if segments[..6] == [0, 0, 0, 0, 0, 0] && (segments[6] != 0 || segments[7] > 1) {
        let [a, b] = segments[6].to_be_bytes();
        let [c, d] = segments[7].to_be_bytes();
        return Some(Ipv4Addr::new(a, b, c, d));
    }

    None
}
