//! BGP field validation: ASNs, prefixes, and the keepalive/hold-time
//! invariant.

use ipnetwork::IpNetwork;
use std::net::IpAddr;

/// Private ASN ranges per RFC 6996 and the 32-bit private range.
const PRIVATE_ASN_RANGES: [(u32, u32); 2] = [(64512, 65534), (4_200_000_000, 4_294_967_294)];

/// True if `asn` is in 1..=4294967295.
pub fn validate_asn(asn: u32) -> bool {
    asn >= 1
}

/// True if `asn` falls in one of the reserved private ranges.
pub fn is_private_asn(asn: u32) -> bool {
    PRIVATE_ASN_RANGES.iter().any(|&(lo, hi)| asn >= lo && asn <= hi)
}

/// True if `ip` is a private (RFC 1918 / ULA / link-local) address.
pub fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_link_local() || v4.is_loopback(),
        IpAddr::V6(v6) => {
            let segments = v6.segments();
            v6.is_loopback() || (segments[0] & 0xfe00) == 0xfc00 || (segments[0] & 0xffc0) == 0xfe80
        }
    }
}

/// Parses a prefix in CIDR notation, accepting non-strict host bits.
pub fn parse_prefix(prefix: &str) -> Result<IpNetwork, String> {
    prefix
        .parse::<IpNetwork>()
        .map_err(|_| format!("invalid prefix: {prefix}"))
}

/// Enforces `keepalive * 3 <= hold_time` whenever `hold_time > 0`, and that
/// `hold_time` is `0` or in `3..=65535`.
pub fn validate_timers(hold_time: u16, keepalive: u16) -> Result<(), String> {
    if hold_time != 0 && hold_time < 3 {
        return Err(format!("hold_time must be 0 or in 3..=65535, got {hold_time}"));
    }
    if keepalive < 1 {
        return Err("keepalive must be >= 1".to_string());
    }
    if hold_time > 0 && (keepalive as u32) * 3 > hold_time as u32 {
        return Err(format!(
            "keepalive must be <= hold_time/3, got keepalive={keepalive} hold_time={hold_time}"
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_asn_ranges() {
        assert!(is_private_asn(64512));
        assert!(is_private_asn(65534));
        assert!(is_private_asn(4_200_000_000));
        assert!(!is_private_asn(65000));
        assert!(!is_private_asn(1));
    }

    #[test]
    fn timers_reject_too_short_keepalive() {
        assert!(validate_timers(180, 61).is_err());
        assert!(validate_timers(180, 60).is_ok());
    }

    #[test]
    fn timers_allow_zero_hold_time() {
        assert!(validate_timers(0, 10).is_ok());
    }
}
