//! Sender domain and sending IP extraction
//!
//! Works on whatever the host hands us: loose ticket fields plus the raw
//! header block. Nothing here fails; a missing value is `None`.

use regex::Regex;
use spamblock_common::types::TicketVars;
use std::net::IpAddr;
use std::sync::OnceLock;

/// Ticket fields that may carry the sending IP, in priority order
const IP_FIELDS: [&str; 5] = ["ip", "ip_address", "ipaddr", "client_ip", "clientip"];

/// Headers whose whole value is an address
const IP_HEADERS: [&str; 4] = ["x-originating-ip", "x-sender-ip", "x-client-ip", "x-real-ip"];

fn ipv4_with_port() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\[?(\d{1,3}(?:\.\d{1,3}){3})\]?:\d{1,5}$").expect("valid regex")
    })
}

fn sender_ip_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)sender\s+ip\s+is\s+\[?([0-9a-f:.]+)\]?").expect("valid regex")
    })
}

fn ip_token_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b((?:[0-9]{1,3}(?:\.[0-9]{1,3}){3}\b)|(?:[a-f0-9]*:[a-f0-9:]*:[a-f0-9:.]*))")
            .expect("valid regex")
    })
}

fn sender_domain_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9.-]+$").expect("valid regex"))
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let n = prefix.len();
    if s.len() >= n && s.is_char_boundary(n) && s[..n].eq_ignore_ascii_case(prefix) {
        Some(&s[n..])
    } else {
        None
    }
}

/// Lowercased domain of an address with exactly one `@`
///
/// The domain must be non-empty and made of `[a-z0-9.-]` only.
pub fn sender_domain(email: &str) -> Option<String> {
    let email = email.trim();
    if email.matches('@').count() != 1 {
        return None;
    }

    let (_, domain) = email.split_once('@')?;
    let domain = domain.trim().to_lowercase();
    if domain.is_empty() || !sender_domain_pattern().is_match(&domain) {
        return None;
    }

    Some(domain)
}

fn trim_decoration(s: &str) -> &str {
    s.trim_matches(|c: char| {
        c.is_whitespace()
            || matches!(c, '[' | ']' | '(' | ')' | '<' | '>' | '"' | '\'' | ',' | ';' | '.')
    })
}

/// Parse a loosely formatted address
///
/// Accepts things like `[1.2.3.4]:25`, `(10.0.0.1)`, `IPv6:2001:db8::1`.
pub fn normalize_ip(raw: &str) -> Option<IpAddr> {
    let mut value = trim_decoration(raw);

    if let Some(caps) = ipv4_with_port().captures(value) {
        value = caps.get(1)?.as_str();
    }

    if let Some(rest) = strip_prefix_ci(value, "ipv6:") {
        value = trim_decoration(rest);
    }

    value.parse::<IpAddr>().ok()
}

/// Routable on the public internet
///
/// Private, loopback, link-local, CGNAT, multicast, unspecified and
/// reserved ranges are not public. IPv4-mapped IPv6 follows the IPv4 rules.
pub fn is_public_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            !(v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                || v4.is_multicast()
                || o[0] == 0
                || o[0] >= 240
                || (o[0] == 100 && (o[1] & 0xc0) == 64))
        }
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return is_public_ip(IpAddr::V4(v4));
            }
            let s = v6.segments();
            !(v6.is_loopback()
                || v6.is_unspecified()
                || v6.is_multicast()
                || (s[0] & 0xfe00) == 0xfc00
                || (s[0] & 0xffc0) == 0xfe80)
        }
    }
}

/// Join folded header continuation lines
fn unfold_headers(header: &str) -> String {
    let mut out = String::with_capacity(header.len());
    for line in header.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            out.push(' ');
            out.push_str(line.trim());
        } else {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(line);
        }
    }
    out
}

/// Addresses the header block mentions, most specific sources first
///
/// Bare address-shaped tokens anywhere in the block are only collected
/// when no IP header, `X-Forwarded-For` or "sender IP is" text yields one.
pub fn header_ip_candidates(header: &str) -> Vec<IpAddr> {
    let unfolded = unfold_headers(header);
    let mut candidates = Vec::new();

    for line in unfolded.lines() {
        let (name, value) = match line.split_once(':') {
            Some((name, value)) => (name.trim().to_ascii_lowercase(), value),
            None => continue,
        };

        if IP_HEADERS.contains(&name.as_str()) {
            candidates.extend(normalize_ip(value));
        } else if name == "x-forwarded-for" {
            if let Some(first) = value.split(',').next() {
                candidates.extend(normalize_ip(first));
            }
        }
    }

    for caps in sender_ip_pattern().captures_iter(&unfolded) {
        if let Some(m) = caps.get(1) {
            candidates.extend(normalize_ip(m.as_str()));
        }
    }

    if !candidates.is_empty() {
        return candidates;
    }

    for caps in ip_token_pattern().captures_iter(&unfolded) {
        if let Some(m) = caps.get(1) {
            candidates.extend(normalize_ip(m.as_str()));
        }
    }

    candidates
}

/// First public address, else the first valid one
pub fn prefer_public(candidates: &[IpAddr]) -> Option<IpAddr> {
    candidates
        .iter()
        .copied()
        .find(|ip| is_public_ip(*ip))
        .or_else(|| candidates.first().copied())
}

/// Best-effort sending IP for a message
///
/// Explicit ticket fields win outright; otherwise the header block is
/// scanned and a public address preferred.
pub fn extract_ip(vars: &TicketVars, header: &str) -> Option<IpAddr> {
    for field in IP_FIELDS {
        if let Some(ip) = vars
            .get(field)
            .and_then(|v| v.as_str())
            .and_then(normalize_ip)
        {
            return Some(ip);
        }
    }

    prefer_public(&header_ip_candidates(header))
}
