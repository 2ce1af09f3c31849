//! Utilities for working with IPv4 and IPv6 addresses in a single 128-bit space.
//!
//! IPv4 addresses are stored as IPv4-mapped IPv6 addresses (`::ffff:a.b.c.d`),
//! and IPv4 prefix lengths are offset by 96 bits.
use std::net::{AddrParseError, IpAddr, Ipv4Addr, Ipv6Addr};

/// Number of bits preceding the IPv4 part of an IPv4-mapped address.
pub const MAPPED_PREFIX_LEN: u32 = 96;

/// Parse an IPv4 or IPv6 address into its IPv6 representation.
///
/// ```
/// use routethrough::utilities::parse_as_ipv6;
/// assert_eq!(parse_as_ipv6("8.8.8.8").unwrap().to_string(), "::ffff:8.8.8.8");
/// assert_eq!(parse_as_ipv6("2001:db8::1").unwrap().to_string(), "2001:db8::1");
/// ```
pub fn parse_as_ipv6(addr: &str) -> Result<Ipv6Addr, AddrParseError> {
    addr.parse::<IpAddr>().map(to_mapped)
}

/// Return the 128-bit form of an address.
pub fn to_mapped(addr: IpAddr) -> Ipv6Addr {
    match addr {
        IpAddr::V4(addr) => addr.to_ipv6_mapped(),
        IpAddr::V6(addr) => addr,
    }
}

/// Return the canonical form of a 128-bit address: IPv4-mapped addresses become IPv4.
pub fn from_mapped(addr: Ipv6Addr) -> IpAddr {
    match addr.to_ipv4_mapped() {
        Some(v4) => IpAddr::V4(v4),
        None => IpAddr::V6(addr),
    }
}

/// Return an address with the given family and canonical form.
pub fn canonical(addr: IpAddr) -> IpAddr {
    from_mapped(to_mapped(addr))
}

/// Return the network mask for a prefix length, in 128-bit form.
pub fn prefix_mask(length: u32) -> u128 {
    u128::MAX.checked_shl(128 - length.min(128)).unwrap_or(0)
}

/// Zero all the bits of `addr` beyond the first `length` bits.
pub fn mask_prefix(addr: Ipv6Addr, length: u32) -> Ipv6Addr {
    Ipv6Addr::from(u128::from(addr) & prefix_mask(length))
}

/// Apply a 128-bit mask to an address.
pub fn mask_with(addr: Ipv6Addr, mask: Ipv6Addr) -> Ipv6Addr {
    Ipv6Addr::from(u128::from(addr) & u128::from(mask))
}

/// Return the 128-bit form of an IPv4 netmask: the 96 mapped-prefix bits followed by the mask.
pub fn mapped_netmask(mask: Ipv4Addr) -> Ipv6Addr {
    Ipv6Addr::from(prefix_mask(MAPPED_PREFIX_LEN) | u32::from(mask) as u128)
}

/// Return the loopback address of the same family as `addr`.
pub fn loopback_for(addr: IpAddr) -> IpAddr {
    match canonical(addr) {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::LOCALHOST),
    }
}

/// Strip the alias suffix from an interface name (`eth0:1` → `eth0`).
pub fn strip_alias(name: &str) -> &str {
    match name.split_once(':') {
        Some((base, _)) => base,
        None => name,
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

    use crate::utilities::{
        canonical, loopback_for, mapped_netmask, mask_prefix, parse_as_ipv6, prefix_mask,
        strip_alias,
    };

    #[test]
    fn test_prefix_mask_bounds() {
        assert_eq!(prefix_mask(0), 0);
        assert_eq!(prefix_mask(128), u128::MAX);
        assert_eq!(prefix_mask(200), u128::MAX);
        assert_eq!(prefix_mask(1), 1 << 127);
    }

    #[test]
    fn test_mask_prefix_idempotent() {
        let addrs = [
            parse_as_ipv6("192.0.2.201").unwrap(),
            parse_as_ipv6("255.255.255.255").unwrap(),
            parse_as_ipv6("2001:db8:dead:beef:1234:5678:9abc:def0").unwrap(),
            Ipv6Addr::from(u128::MAX),
        ];
        for addr in addrs {
            for length in 0..=128 {
                let once = mask_prefix(addr, length);
                assert_eq!(mask_prefix(once, length), once);
            }
        }
    }

    #[test]
    fn test_mask_prefix_mapped() {
        let addr = parse_as_ipv6("10.0.0.42").unwrap();
        assert_eq!(mask_prefix(addr, 96 + 24), parse_as_ipv6("10.0.0.0").unwrap());
        assert_eq!(mask_prefix(addr, 96), parse_as_ipv6("0.0.0.0").unwrap());
        assert_eq!(mask_prefix(addr, 96 + 32), addr);
    }

    #[test]
    fn test_mapped_netmask() {
        let mask = mapped_netmask(Ipv4Addr::new(255, 255, 255, 0));
        assert_eq!(u128::from(mask), prefix_mask(120));
    }

    #[test]
    fn test_canonical() {
        let mapped = IpAddr::V6(Ipv4Addr::new(192, 0, 2, 1).to_ipv6_mapped());
        assert_eq!(canonical(mapped), IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)));
        assert_eq!(loopback_for(mapped), IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(
            loopback_for("2001:db8::1".parse().unwrap()),
            IpAddr::V6(Ipv6Addr::LOCALHOST)
        );
    }

    #[test]
    fn test_strip_alias() {
        assert_eq!(strip_alias("eth0:1"), "eth0");
        assert_eq!(strip_alias("eth0"), "eth0");
        assert_eq!(strip_alias("br-lan:a:b"), "br-lan");
    }
}
