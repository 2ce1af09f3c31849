//! Local network interfaces and their addresses.
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use log::debug;
use pcap::Device;

use crate::error::EnumerationError;
use crate::utilities::{canonical, mapped_netmask, strip_alias, to_mapped};

/// An address bound to an interface.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct InterfaceAddress {
    pub address: IpAddr,
    pub netmask: IpAddr,
}

impl InterfaceAddress {
    /// Build an address; a missing netmask is a host mask.
    pub fn new(address: IpAddr, netmask: Option<IpAddr>) -> Self {
        let address = canonical(address);
        let netmask = match (address, netmask.map(canonical)) {
            (IpAddr::V4(_), Some(IpAddr::V4(mask))) => IpAddr::V4(mask),
            (IpAddr::V6(_), Some(IpAddr::V6(mask))) => IpAddr::V6(mask),
            (IpAddr::V4(_), _) => IpAddr::V4(Ipv4Addr::BROADCAST),
            (IpAddr::V6(_), _) => IpAddr::V6(Ipv6Addr::from(u128::MAX)),
        };
        Self { address, netmask }
    }

    /// The address and netmask in 128-bit form.
    pub fn mapped(&self) -> (Ipv6Addr, Ipv6Addr) {
        let netmask = match self.netmask {
            IpAddr::V4(mask) => mapped_netmask(mask),
            IpAddr::V6(mask) => mask,
        };
        (to_mapped(self.address), netmask)
    }
}

/// A network interface, with aliases collapsed into their base name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InterfaceRecord {
    pub name: String,
    /// Bound addresses, in enumeration order.
    pub addresses: Vec<InterfaceAddress>,
}

impl InterfaceRecord {
    pub fn new(name: &str) -> Self {
        Self {
            name: strip_alias(name).to_string(),
            addresses: Vec::new(),
        }
    }

    /// The IPv4 address of the interface: the last one written.
    pub fn ipv4_address(&self) -> Option<Ipv4Addr> {
        self.ipv4().map(|(address, _)| address)
    }

    pub fn ipv4_mask(&self) -> Option<Ipv4Addr> {
        self.ipv4().map(|(_, mask)| mask)
    }

    /// The IPv6 address of the interface: the last one written,
    /// skipping link-local addresses when the interface has another one.
    pub fn ipv6_address(&self) -> Option<Ipv6Addr> {
        self.ipv6().map(|(address, _)| address)
    }

    pub fn ipv6_mask(&self) -> Option<Ipv6Addr> {
        self.ipv6().map(|(_, mask)| mask)
    }

    /// The address to use as a source for destinations of the same family as `destination`.
    pub fn address_for(&self, destination: IpAddr) -> Option<IpAddr> {
        match canonical(destination) {
            IpAddr::V4(_) => self.ipv4_address().map(IpAddr::V4),
            IpAddr::V6(_) => self.ipv6_address().map(IpAddr::V6),
        }
    }

    /// Whether the interface can carry IPv6 routes (has a native IPv6 address).
    pub fn is_ipv6_capable(&self) -> bool {
        self.ipv6().is_some()
    }

    pub fn has_address(&self, addr: IpAddr) -> bool {
        let addr = canonical(addr);
        self.addresses.iter().any(|a| a.address == addr)
    }

    fn ipv4(&self) -> Option<(Ipv4Addr, Ipv4Addr)> {
        self.addresses.iter().rev().find_map(|a| match (a.address, a.netmask) {
            (IpAddr::V4(address), IpAddr::V4(mask)) => Some((address, mask)),
            _ => None,
        })
    }

    fn ipv6(&self) -> Option<(Ipv6Addr, Ipv6Addr)> {
        let mut addresses = self
            .addresses
            .iter()
            .rev()
            .filter_map(|a| match (a.address, a.netmask) {
                (IpAddr::V6(address), IpAddr::V6(mask)) => Some((address, mask)),
                _ => None,
            });
        let last = addresses.next()?;
        if !is_unicast_link_local(&last.0) {
            return Some(last);
        }
        Some(
            addresses
                .find(|(address, _)| !is_unicast_link_local(address))
                .unwrap_or(last),
        )
    }
}

/// A snapshot of the local interfaces.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InterfaceInventory {
    records: Vec<InterfaceRecord>,
}

impl InterfaceInventory {
    /// Build an inventory from `(interface name, address, netmask)` triples.
    ///
    /// Aliases (`eth0:1`) are folded into their base interface (`eth0`).
    ///
    /// ```
    /// use std::net::IpAddr;
    /// use routethrough::interfaces::InterfaceInventory;
    ///
    /// let ip = |s: &str| -> IpAddr { s.parse().unwrap() };
    /// let inventory = InterfaceInventory::from_addresses([
    ///     ("eth0", ip("10.0.0.5"), Some(ip("255.255.255.0"))),
    ///     ("eth0:1", ip("10.0.1.5"), Some(ip("255.255.255.0"))),
    /// ]);
    /// assert_eq!(inventory.len(), 1);
    /// assert_eq!(inventory.get("eth0").unwrap().ipv4_address(), Some("10.0.1.5".parse().unwrap()));
    /// ```
    pub fn from_addresses<'a, I>(addresses: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, IpAddr, Option<IpAddr>)>,
    {
        let mut inventory = Self::default();
        for (name, address, netmask) in addresses {
            inventory.insert(name, InterfaceAddress::new(address, netmask));
        }
        inventory
    }

    fn insert(&mut self, name: &str, address: InterfaceAddress) {
        let base = strip_alias(name);
        let index = match self.records.iter().position(|r| r.name == base) {
            Some(index) => index,
            None => {
                self.records.push(InterfaceRecord::new(base));
                self.records.len() - 1
            }
        };
        let record = &mut self.records[index];
        record.addresses.retain(|a| a.address != address.address);
        record.addresses.push(address);
    }

    pub fn get(&self, name: &str) -> Option<&InterfaceRecord> {
        let name = strip_alias(name);
        self.records.iter().find(|r| r.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &InterfaceRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Return the interface to which `addr` is bound.
    pub fn find_by_address(&self, addr: IpAddr) -> Option<&InterfaceRecord> {
        self.records.iter().find(|r| r.has_address(addr))
    }

    /// Return the loopback interface, preferring the one of the same family as `destination`.
    pub fn loopback_for(&self, destination: IpAddr) -> Option<&InterfaceRecord> {
        let (preferred, other) = match canonical(destination) {
            IpAddr::V4(_) => (IpAddr::V4(Ipv4Addr::LOCALHOST), IpAddr::V6(Ipv6Addr::LOCALHOST)),
            IpAddr::V6(_) => (IpAddr::V6(Ipv6Addr::LOCALHOST), IpAddr::V4(Ipv4Addr::LOCALHOST)),
        };
        self.find_by_address(preferred)
            .or_else(|| self.find_by_address(other))
    }
}

impl<'a> IntoIterator for &'a InterfaceInventory {
    type Item = &'a InterfaceRecord;
    type IntoIter = std::slice::Iter<'a, InterfaceRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Something that can list the local interfaces.
pub trait InterfaceSource: Send + Sync {
    fn enumerate(&self) -> Result<InterfaceInventory, EnumerationError>;
}

/// List the interfaces known to the capture library.
#[derive(Copy, Clone, Debug, Default)]
pub struct PcapInterfaces;

impl InterfaceSource for PcapInterfaces {
    fn enumerate(&self) -> Result<InterfaceInventory, EnumerationError> {
        let devices = Device::list()?;
        let inventory = InterfaceInventory::from_addresses(devices.iter().flat_map(|device| {
            device
                .addresses
                .iter()
                .map(move |addr| (device.name.as_str(), addr.addr, addr.netmask))
        }));
        debug!("enumerated {} interfaces", inventory.len());
        Ok(inventory)
    }
}

/// A fixed inventory, returned as-is on every enumeration.
impl InterfaceSource for InterfaceInventory {
    fn enumerate(&self) -> Result<InterfaceInventory, EnumerationError> {
        Ok(self.clone())
    }
}

// TODO: Use `Ipv6Addr::is_unicast_link_local` (stable since 1.84) when raising the minimum Rust version.
pub(crate) fn is_unicast_link_local(addr: &Ipv6Addr) -> bool {
    (addr.segments()[0] & 0xffc0) == 0xfe80
}
