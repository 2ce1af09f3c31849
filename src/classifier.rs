//! Predicates over addresses.
//!
//! [`is_within_local_subnet`] answers "is this address on the same network as one of our
//! interfaces", while [`resolves_to_local_interface`] answers "is this address this machine".
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::interfaces::{is_unicast_link_local, InterfaceInventory};
use crate::utilities::{canonical, mask_with, to_mapped};

/// True for `127.0.0.0/8` (also in IPv4-mapped form) and `::1`.
pub fn is_loopback(addr: IpAddr) -> bool {
    match canonical(addr) {
        IpAddr::V4(addr) => addr.octets()[0] == 127,
        IpAddr::V6(addr) => addr == Ipv6Addr::LOCALHOST,
    }
}

/// True for IPv6 link-local unicast addresses (`fe80::/10`).
pub fn is_link_local(addr: IpAddr) -> bool {
    match canonical(addr) {
        IpAddr::V4(_) => false,
        IpAddr::V6(addr) => is_unicast_link_local(&addr),
    }
}

/// True for `0.0.0.0`, also in IPv4-mapped form.
pub fn is_zero(addr: IpAddr) -> bool {
    canonical(addr) == IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

/// True if `addr` is in the same subnet as one of the addresses bound to a local interface.
pub fn is_within_local_subnet(addr: IpAddr, inventory: &InterfaceInventory) -> bool {
    let target = to_mapped(addr);
    inventory
        .iter()
        .flat_map(|record| record.addresses.iter())
        .any(|bound| {
            let (network, mask) = bound.mapped();
            mask_with(target, mask) == mask_with(network, mask)
        })
}

/// True if `addr` is bound to a local interface, or is a loopback or zero address.
pub fn resolves_to_local_interface(addr: IpAddr, inventory: &InterfaceInventory) -> bool {
    is_loopback(addr) || is_zero(addr) || inventory.find_by_address(addr).is_some()
}

#[cfg(test)]
mod tests {
    use std::net::IpAddr;

    use crate::classifier::{
        is_link_local, is_loopback, is_within_local_subnet, is_zero,
        resolves_to_local_interface,
    };
    use crate::interfaces::InterfaceInventory;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn inventory() -> InterfaceInventory {
        InterfaceInventory::from_addresses([
            ("eth0", ip("10.0.0.5"), Some(ip("255.255.255.0"))),
            ("eth0", ip("2001:db8:1::5"), Some(ip("ffff:ffff:ffff:ffff::"))),
        ])
    }

    #[test]
    fn test_is_loopback() {
        assert!(is_loopback(ip("127.0.0.1")));
        assert!(is_loopback(ip("127.255.255.254")));
        assert!(is_loopback(ip("::1")));
        assert!(is_loopback(ip("::ffff:127.0.0.1")));
        assert!(!is_loopback(ip("8.8.8.8")));
        assert!(!is_loopback(ip("::2")));
    }

    #[test]
    fn test_is_link_local() {
        assert!(is_link_local(ip("fe80::1")));
        assert!(is_link_local(ip("febf::1")));
        assert!(!is_link_local(ip("fec0::1")));
        assert!(!is_link_local(ip("169.254.1.1")));
    }

    #[test]
    fn test_is_zero() {
        assert!(is_zero(ip("0.0.0.0")));
        assert!(is_zero(ip("::ffff:0.0.0.0")));
        assert!(!is_zero(ip("::")));
        assert!(!is_zero(ip("0.0.0.1")));
    }

    #[test]
    fn test_subnet_and_local_are_distinct() {
        let inventory = inventory();
        // Same subnet, but not this machine.
        assert!(is_within_local_subnet(ip("10.0.0.42"), &inventory));
        assert!(!resolves_to_local_interface(ip("10.0.0.42"), &inventory));
        // This machine.
        assert!(is_within_local_subnet(ip("10.0.0.5"), &inventory));
        assert!(resolves_to_local_interface(ip("10.0.0.5"), &inventory));
        // Elsewhere.
        assert!(!is_within_local_subnet(ip("10.0.1.42"), &inventory));
        assert!(!resolves_to_local_interface(ip("10.0.1.42"), &inventory));
    }

    #[test]
    fn test_subnet_ipv6() {
        let inventory = inventory();
        assert!(is_within_local_subnet(ip("2001:db8:1::99"), &inventory));
        assert!(!is_within_local_subnet(ip("2001:db8:2::99"), &inventory));
        // An IPv4 netmask never matches a native IPv6 address.
        assert!(!is_within_local_subnet(ip("::a00:2a"), &inventory));
    }

    #[test]
    fn test_resolves_to_local_interface_special() {
        let inventory = InterfaceInventory::default();
        assert!(resolves_to_local_interface(ip("127.0.0.2"), &inventory));
        assert!(resolves_to_local_interface(ip("0.0.0.0"), &inventory));
        assert!(resolves_to_local_interface(ip("::1"), &inventory));
        assert!(!resolves_to_local_interface(ip("192.0.2.1"), &inventory));
    }
}
