//! CIDR prefix matching

use std::net::IpAddr;

/// Check whether `ip` lies inside `cidr`.
///
/// A missing prefix length means a single host (`/32` or `/128`).
/// Unparsable input, out-of-range prefixes and address family mismatches
/// never match.
pub fn cidr_match(ip: &str, cidr: &str) -> bool {
    match ip.trim().parse::<IpAddr>() {
        Ok(ip) => ip_in_cidr(ip, cidr),
        Err(_) => false,
    }
}

/// Same as [`cidr_match`] for an already parsed address
pub fn ip_in_cidr(ip: IpAddr, cidr: &str) -> bool {
    let cidr = cidr.trim();
    if cidr.is_empty() {
        return false;
    }

    let (subnet, prefix) = match cidr.split_once('/') {
        Some((subnet, prefix)) => match prefix.parse::<u8>() {
            Ok(prefix) => (subnet, Some(prefix)),
            Err(_) => return false,
        },
        None => (cidr, None),
    };

    let subnet = match subnet.parse::<IpAddr>() {
        Ok(subnet) => subnet,
        Err(_) => return false,
    };

    match (ip, subnet) {
        (IpAddr::V4(ip), IpAddr::V4(net)) => {
            prefix_matches(&ip.octets(), &net.octets(), prefix.unwrap_or(32))
        }
        (IpAddr::V6(ip), IpAddr::V6(net)) => {
            prefix_matches(&ip.octets(), &net.octets(), prefix.unwrap_or(128))
        }
        _ => false,
    }
}

/// Compare whole bytes, then the high-order bits of the last partial byte
fn prefix_matches(ip: &[u8], net: &[u8], prefix: u8) -> bool {
    let prefix = usize::from(prefix);
    if prefix > ip.len() * 8 {
        return false;
    }

    let whole = prefix / 8;
    let bits = prefix % 8;

    if ip[..whole] != net[..whole] {
        return false;
    }

    if bits == 0 {
        return true;
    }

    let mask = 0xFFu8 << (8 - bits);
    (ip[whole] & mask) == (net[whole] & mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_prefix_matches_itself() {
        for ip in ["8.8.8.8", "10.1.2.3", "203.0.113.55", "0.0.0.0", "255.255.255.255"] {
            assert!(cidr_match(ip, &format!("{}/32", ip)), "{}", ip);
            assert!(cidr_match(ip, ip), "{}", ip);
        }
    }

    #[test]
    fn test_narrower_prefix_excludes() {
        // 10.0.0.0/31 covers .0 and .1 only
        assert!(cidr_match("10.0.0.1", "10.0.0.0/31"));
        assert!(!cidr_match("10.0.0.2", "10.0.0.0/31"));
        assert!(!cidr_match("8.8.8.9", "8.8.8.8/32"));
    }

    #[test]
    fn test_ipv4_ranges() {
        assert!(cidr_match("10.1.2.3", "10.0.0.0/8"));
        assert!(!cidr_match("8.8.8.8", "10.0.0.0/8"));
        assert!(cidr_match("203.0.113.55", "203.0.113.0/24"));
        assert!(!cidr_match("198.51.100.10", "203.0.113.0/24"));
        assert!(cidr_match("172.31.255.1", "172.16.0.0/12"));
        assert!(!cidr_match("172.32.0.1", "172.16.0.0/12"));
        assert!(cidr_match("1.2.3.4", "0.0.0.0/0"));
    }

    #[test]
    fn test_ipv6_ranges() {
        assert!(cidr_match("2001:db8::1", "2001:db8::/32"));
        assert!(!cidr_match("2001:db9::1", "2001:db8::/32"));
        assert!(cidr_match("2001:db8:abcd:12::5", "2001:db8:abcd:10::/60"));
        assert!(!cidr_match("2001:db8:abcd:20::5", "2001:db8:abcd:10::/60"));
        assert!(cidr_match("2001:db8::1", "2001:db8::1"));
        assert!(!cidr_match("2001:db8::2", "2001:db8::1"));
    }

    #[test]
    fn test_family_mismatch_never_matches() {
        assert!(!cidr_match("10.0.0.1", "::/0"));
        assert!(!cidr_match("2001:db8::1", "0.0.0.0/0"));
    }

    #[test]
    fn test_invalid_input_never_matches() {
        assert!(!cidr_match("", "10.0.0.0/8"));
        assert!(!cidr_match("10.0.0.1", ""));
        assert!(!cidr_match("not-an-ip", "10.0.0.0/8"));
        assert!(!cidr_match("10.0.0.1", "10.0.0.0/33"));
        assert!(!cidr_match("10.0.0.1", "10.0.0.0/abc"));
        assert!(!cidr_match("10.0.0.1", "10.0.0/8"));
        assert!(!cidr_match("2001:db8::1", "2001:db8::/129"));
    }
}
