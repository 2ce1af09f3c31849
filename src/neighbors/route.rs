use std::fmt::{Debug, Formatter};
use std::fs::File;
use std::io;
use std::io::{BufRead, BufReader};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::PathBuf;

use log::{debug, warn};

use crate::error::{MalformedRouteLine, RouteTableError};
use crate::interfaces::InterfaceInventory;
use crate::utilities::{mask_prefix, strip_alias, to_mapped, MAPPED_PREFIX_LEN};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AddressFamily {
    IPv4,
    IPv6,
}

impl AddressFamily {
    pub fn of(addr: IpAddr) -> Self {
        match to_mapped(addr).to_ipv4_mapped() {
            Some(_) => AddressFamily::IPv4,
            None => AddressFamily::IPv6,
        }
    }
}

/// A route, in 128-bit form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteEntry {
    pub family: AddressFamily,
    /// Destination network; IPv4 networks are stored IPv4-mapped.
    pub network: Ipv6Addr,
    /// Prefix length in the 128-bit space (96 + n for IPv4 routes).
    pub length: u32,
    /// Interface named by the route source, without its alias suffix.
    pub interface: String,
    /// Name of the inventory interface the route was bound to when ingested.
    /// Unbound routes never match.
    pub binding: Option<String>,
}

impl RouteEntry {
    /// Parse a line of `/proc/net/route`.
    ///
    /// `Iface Destination Gateway Flags RefCnt Use Metric Mask MTU Window IRTT`,
    /// with the destination and the mask printed as hexadecimal integers in host byte order.
    pub fn from_procfs_v4(line: &str) -> Result<Self, MalformedRouteLine> {
        let elems: Vec<&str> = line.split_whitespace().collect();
        let field = |i: usize| elems.get(i).copied().ok_or(MalformedRouteLine::MissingField(i));
        let interface = strip_alias(field(0)?).to_string();
        let destination = field(1)?;
        let destination = u32::from_str_radix(destination, 16)
            .map_err(|_| MalformedRouteLine::Destination(destination.to_string()))?;
        let mask = field(7)?;
        let mask = u32::from_str_radix(mask, 16)
            .map_err(|_| MalformedRouteLine::Mask(mask.to_string()))?;
        let network = Ipv4Addr::from(destination.to_ne_bytes());
        let length = u32::from_be_bytes(mask.to_ne_bytes()).leading_ones();
        Ok(Self {
            family: AddressFamily::IPv4,
            network: network.to_ipv6_mapped(),
            length: length + MAPPED_PREFIX_LEN,
            interface,
            binding: None,
        })
    }

    /// Parse a line of `/proc/net/ipv6_route`.
    ///
    /// `Destination PrefixLen Source SourcePrefixLen NextHop Metric RefCnt Use Flags Iface`,
    /// with the destination as 32 hexadecimal digits and the prefix length in hexadecimal.
    pub fn from_procfs_v6(line: &str) -> Result<Self, MalformedRouteLine> {
        let elems: Vec<&str> = line.split_whitespace().collect();
        let field = |i: usize| elems.get(i).copied().ok_or(MalformedRouteLine::MissingField(i));
        let destination = field(0)?;
        if destination.len() != 32 || !destination.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(MalformedRouteLine::Destination(destination.to_string()));
        }
        let network = u128::from_str_radix(destination, 16)
            .map_err(|_| MalformedRouteLine::Destination(destination.to_string()))?;
        let length = field(1)?;
        let length = u32::from_str_radix(length, 16)
            .ok()
            .filter(|&length| length <= 128)
            .ok_or_else(|| MalformedRouteLine::PrefixLength(length.to_string()))?;
        let interface = strip_alias(field(9)?).to_string();
        Ok(Self {
            family: AddressFamily::IPv6,
            network: Ipv6Addr::from(network),
            length,
            interface,
            binding: None,
        })
    }

    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    /// Whether `destination` (in 128-bit form) falls in this route.
    pub fn contains(&self, destination: Ipv6Addr) -> bool {
        mask_prefix(destination, self.length) == self.network
    }
}

/// Routes in the order they were ingested.
pub struct RoutingTable {
    entries: Vec<RouteEntry>,
    limit: usize,
}

impl RoutingTable {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: Vec::new(),
            limit,
        }
    }

    /// Ingest the IPv4 routes of `reader`, formatted as `/proc/net/route`.
    ///
    /// The first line is a header. Routes are bound to the inventory interface of the same name.
    /// Returns the number of routes added.
    pub fn ingest_ipv4<R: BufRead>(
        &mut self,
        reader: R,
        inventory: &InterfaceInventory,
    ) -> Result<usize, RouteTableError> {
        self.ingest(reader.split(b'\n').skip(1), RouteEntry::from_procfs_v4, |entry| {
            inventory.get(&entry.interface).map(|r| r.name.clone())
        })
    }

    /// Ingest the IPv6 routes of `reader`, formatted as `/proc/net/ipv6_route`.
    ///
    /// Routes are only bound to interfaces with a native IPv6 address.
    /// Returns the number of routes added.
    pub fn ingest_ipv6<R: BufRead>(
        &mut self,
        reader: R,
        inventory: &InterfaceInventory,
    ) -> Result<usize, RouteTableError> {
        self.ingest(reader.split(b'\n'), RouteEntry::from_procfs_v6, |entry| {
            inventory
                .get(&entry.interface)
                .filter(|r| r.is_ipv6_capable())
                .map(|r| r.name.clone())
        })
    }

    fn ingest<L, P, B>(&mut self, lines: L, parse: P, bind: B) -> Result<usize, RouteTableError>
    where
        L: Iterator<Item = io::Result<Vec<u8>>>,
        P: Fn(&str) -> Result<RouteEntry, MalformedRouteLine>,
        B: Fn(&RouteEntry) -> Option<String>,
    {
        let mut count = 0;
        for line in lines {
            let line = match String::from_utf8(line?) {
                Ok(line) => line,
                Err(error) => {
                    let line = String::from_utf8_lossy(error.as_bytes()).into_owned();
                    let error = MalformedRouteLine::Encoding(error.utf8_error().valid_up_to());
                    warn!("skipping route line {:?}: {}", line, error);
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            let mut entry = match parse(&line) {
                Ok(entry) => entry,
                Err(error) => {
                    warn!("skipping route line {:?}: {}", line, error);
                    continue;
                }
            };
            if self.entries.len() >= self.limit {
                warn!("too many routes, keeping the first {}", self.limit);
                return Err(RouteTableError::Overflow { limit: self.limit });
            }
            entry.binding = bind(&entry);
            if !entry.is_bound() {
                warn!("cannot find interface {} of route {:?}", entry.interface, line);
            }
            self.entries.push(entry);
            count += 1;
        }
        debug!("ingested {} routes", count);
        Ok(count)
    }

    /// Return the first bound route containing `destination`, in ingestion order.
    ///
    /// IPv4 routes only match IPv4 destinations and IPv6 routes only match IPv6 destinations.
    pub fn get(&self, destination: IpAddr) -> Option<&RouteEntry> {
        let family = AddressFamily::of(destination);
        let destination = to_mapped(destination);
        self.entries
            .iter()
            .filter(|entry| entry.is_bound() && entry.family == family)
            .find(|entry| entry.contains(destination))
    }

    pub fn all(&self) -> &[RouteEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Debug for RoutingTable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.entries.fmt(f)
    }
}

/// Where the kernel routing tables are read from.
pub trait RouteSource: Send + Sync {
    fn ipv4(&self) -> io::Result<Box<dyn BufRead + '_>>;
    fn ipv6(&self) -> io::Result<Box<dyn BufRead + '_>>;
}

/// Routing tables in procfs.
#[derive(Clone, Debug)]
pub struct ProcfsRoutes {
    pub ipv4: PathBuf,
    pub ipv6: PathBuf,
}

impl RouteSource for ProcfsRoutes {
    fn ipv4(&self) -> io::Result<Box<dyn BufRead + '_>> {
        Ok(Box::new(BufReader::new(File::open(&self.ipv4)?)))
    }

    fn ipv6(&self) -> io::Result<Box<dyn BufRead + '_>> {
        Ok(Box::new(BufReader::new(File::open(&self.ipv6)?)))
    }
}

/// Routing tables held in memory, in procfs format. A missing table reads as not found.
#[derive(Clone, Debug, Default)]
pub struct StaticRoutes {
    pub ipv4: Option<String>,
    pub ipv6: Option<String>,
}

impl RouteSource for StaticRoutes {
    fn ipv4(&self) -> io::Result<Box<dyn BufRead + '_>> {
        match &self.ipv4 {
            Some(table) => Ok(Box::new(table.as_bytes())),
            None => Err(io::Error::new(io::ErrorKind::NotFound, "no IPv4 routes")),
        }
    }

    fn ipv6(&self) -> io::Result<Box<dyn BufRead + '_>> {
        match &self.ipv6 {
            Some(table) => Ok(Box::new(table.as_bytes())),
            None => Err(io::Error::new(io::ErrorKind::NotFound, "no IPv6 routes")),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv6Addr};

    use crate::error::{MalformedRouteLine, RouteTableError};
    use crate::interfaces::InterfaceInventory;
    use crate::neighbors::{AddressFamily, RouteEntry, RoutingTable};
    use crate::utilities::parse_as_ipv6;

    const IPV6_ROUTE: &str = "\
20010db8000000000000000000000000 40 00000000000000000000000000000000 00 00000000000000000000000000000000 00000100 00000001 00000000 00000001     eth0
fe800000000000000000000000000000 40 00000000000000000000000000000000 00 00000000000000000000000000000000 00000100 00000001 00000000 00000001     eth0
00000000000000000000000000000001 80 00000000000000000000000000000000 00 00000000000000000000000000000000 00000000 00000003 00000000 80200001       lo
00000000000000000000000000000000 00 00000000000000000000000000000000 00 20010db8000000000000000000000001 00000400 00000001 00000000 00000003     eth0
";

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn inventory() -> InterfaceInventory {
        InterfaceInventory::from_addresses([
            ("lo", ip("127.0.0.1"), Some(ip("255.0.0.0"))),
            ("lo", ip("::1"), None),
            ("eth0", ip("10.0.0.5"), Some(ip("255.255.255.0"))),
            ("eth0", ip("2001:db8::5"), Some(ip("ffff:ffff:ffff:ffff::"))),
            ("wlan0", ip("192.168.1.20"), Some(ip("255.255.255.0"))),
        ])
    }

    #[test]
    #[cfg(target_endian = "little")]
    fn test_from_procfs_v4() {
        let entry = RouteEntry::from_procfs_v4(
            "eth0:1\t0000000A\t00000000\t0001\t0\t0\t100\t00FFFFFF\t0\t0\t0",
        )
        .unwrap();
        assert_eq!(entry.family, AddressFamily::IPv4);
        assert_eq!(entry.network, parse_as_ipv6("10.0.0.0").unwrap());
        assert_eq!(entry.length, 96 + 24);
        assert_eq!(entry.interface, "eth0");
        assert!(!entry.is_bound());

        let host = RouteEntry::from_procfs_v4(
            "eth0\t0100000A\t00000000\t0005\t0\t0\t0\tFFFFFFFF\t0\t0\t0",
        )
        .unwrap();
        assert_eq!(host.network, parse_as_ipv6("10.0.0.1").unwrap());
        assert_eq!(host.length, 128);
    }

    #[test]
    fn test_from_procfs_v4_malformed() {
        assert_eq!(
            RouteEntry::from_procfs_v4("eth0\tnothex\t00000000\t0001\t0\t0\t100\t00FFFFFF"),
            Err(MalformedRouteLine::Destination("nothex".to_string()))
        );
        assert_eq!(
            RouteEntry::from_procfs_v4("eth0\t0000000A\t00000000\t0001\t0\t0\t100\tzz"),
            Err(MalformedRouteLine::Mask("zz".to_string()))
        );
        assert_eq!(
            RouteEntry::from_procfs_v4("eth0\t0000000A\t00000000"),
            Err(MalformedRouteLine::MissingField(7))
        );
    }

    #[test]
    fn test_from_procfs_v6() {
        let line = IPV6_ROUTE.lines().next().unwrap();
        let entry = RouteEntry::from_procfs_v6(line).unwrap();
        assert_eq!(entry.family, AddressFamily::IPv6);
        assert_eq!(entry.network, "2001:db8::".parse::<Ipv6Addr>().unwrap());
        assert_eq!(entry.length, 64);
        assert_eq!(entry.interface, "eth0");
    }

    #[test]
    fn test_from_procfs_v6_malformed() {
        assert!(matches!(
            RouteEntry::from_procfs_v6("2001 40 0 0 0 0 0 0 0 eth0"),
            Err(MalformedRouteLine::Destination(_))
        ));
        assert!(matches!(
            RouteEntry::from_procfs_v6("20010db8000000000000000000000000 81 0 0 0 0 0 0 0 eth0"),
            Err(MalformedRouteLine::PrefixLength(_))
        ));
        assert_eq!(
            RouteEntry::from_procfs_v6("20010db8000000000000000000000000 40 0 0 0"),
            Err(MalformedRouteLine::MissingField(9))
        );
    }

    #[test]
    fn test_ingest_ipv6_binding() {
        let mut table = RoutingTable::new(1024);
        let count = table.ingest_ipv6(IPV6_ROUTE.as_bytes(), &inventory()).unwrap();
        assert_eq!(count, 4);
        assert!(table.all().iter().all(|entry| entry.is_bound()));
        assert_eq!(table.get(ip("2001:db8::42")).unwrap().length, 64);
        assert_eq!(table.get(ip("2001:4860::1")).unwrap().length, 0);
        // IPv6 routes never match IPv4 destinations, even the default route.
        assert!(table.get(ip("10.0.0.42")).is_none());
    }

    #[test]
    fn test_ingest_ipv6_skips_malformed_lines() {
        let mut lines = IPV6_ROUTE.lines();
        let routes = format!(
            "{}\nnot a route\n20010db8 40 0 0 0 0 0 0 0 eth0\n{}\n",
            lines.next().unwrap(),
            lines.nth(2).unwrap()
        );
        let mut table = RoutingTable::new(1024);
        let count = table.ingest_ipv6(routes.as_bytes(), &inventory()).unwrap();
        assert_eq!(count, 2);
        assert_eq!(table.get(ip("2001:db8::42")).unwrap().length, 64);
        assert_eq!(table.get(ip("2001:4860::1")).unwrap().length, 0);
    }

    #[test]
    #[cfg(target_endian = "little")]
    fn test_ingest_skips_invalid_utf8() {
        let mut routes = b"Iface\tDestination\tGateway\tFlags\tMask\n".to_vec();
        routes.extend_from_slice(b"eth0\t0000000A\t00000000\t0001\t0\t0\t100\t00FFFFFF\t0\t0\t0\n");
        routes.extend_from_slice(b"e\xfft0\t0000A8C0\t00000000\t0001\t0\t0\t100\t00FFFFFF\t0\t0\t0\n");
        routes.extend_from_slice(b"wlan0\t0001A8C0\t00000000\t0001\t0\t0\t600\t00FFFFFF\t0\t0\t0\n");
        let mut table = RoutingTable::new(1024);
        let count = table.ingest_ipv4(routes.as_slice(), &inventory()).unwrap();
        assert_eq!(count, 2);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(ip("192.168.1.1")).unwrap().interface, "wlan0");
    }

    #[test]
    fn test_ingest_ipv6_requires_ipv6_interface() {
        let inventory = InterfaceInventory::from_addresses([(
            "eth0",
            ip("10.0.0.5"),
            Some(ip("255.255.255.0")),
        )]);
        let mut table = RoutingTable::new(1024);
        table.ingest_ipv6(IPV6_ROUTE.as_bytes(), &inventory).unwrap();
        assert_eq!(table.len(), 4);
        assert!(table.all().iter().all(|entry| !entry.is_bound()));
        assert!(table.get(ip("2001:db8::42")).is_none());
    }

    #[test]
    #[cfg(target_endian = "little")]
    fn test_ingest_ipv4() {
        let routes = "\
Iface\tDestination\tGateway \tFlags\tRefCnt\tUse\tMetric\tMask\t\tMTU\tWindow\tIRTT
eth0\t0000000A\t00000000\t0001\t0\t0\t100\t00FFFFFF\t0\t0\t0
bogus line
wlan0\t0001A8C0\t00000000\t0001\t0\t0\t600\t00FFFFFF\t0\t0\t0
docker0\t000011AC\t00000000\t0001\t0\t0\t0\t0000FFFF\t0\t0\t0
eth0\t00000000\t0100000A\t0003\t0\t0\t100\t00000000\t0\t0\t0
";
        let mut table = RoutingTable::new(1024);
        let count = table.ingest_ipv4(routes.as_bytes(), &inventory()).unwrap();
        assert_eq!(count, 4);
        assert_eq!(table.all()[2].interface, "docker0");
        assert!(!table.all()[2].is_bound());
        assert_eq!(table.get(ip("10.0.0.42")).unwrap().interface, "eth0");
        assert_eq!(table.get(ip("192.168.1.1")).unwrap().interface, "wlan0");
        // The unbound docker0 route is skipped, the default route matches.
        assert_eq!(table.get(ip("172.17.0.2")).unwrap().length, 96);
        assert!(table.get(ip("2001:db8::1")).is_none());
    }

    #[test]
    #[cfg(target_endian = "little")]
    fn test_first_match_wins() {
        // The default route comes first: it wins over the more specific route.
        let routes = "\
Iface\tDestination\tGateway \tFlags\tRefCnt\tUse\tMetric\tMask\t\tMTU\tWindow\tIRTT
wlan0\t00000000\t0101A8C0\t0003\t0\t0\t600\t00000000\t0\t0\t0
eth0\t0000000A\t00000000\t0001\t0\t0\t100\t00FFFFFF\t0\t0\t0
";
        let mut table = RoutingTable::new(1024);
        table.ingest_ipv4(routes.as_bytes(), &inventory()).unwrap();
        assert_eq!(table.get(ip("10.0.0.42")).unwrap().interface, "wlan0");
    }

    #[test]
    #[cfg(target_endian = "little")]
    fn test_ingest_overflow() {
        let mut routes = String::from("Iface\tDestination\tGateway\tFlags\tMask\n");
        for i in 0..5u32 {
            routes.push_str(&format!(
                "eth0\t{:08X}\t00000000\t0001\t0\t0\t0\tFFFFFFFF\t0\t0\t0\n",
                u32::from_ne_bytes([10, 0, 0, i as u8])
            ));
        }
        let mut table = RoutingTable::new(3);
        let result = table.ingest_ipv4(routes.as_bytes(), &inventory());
        assert!(matches!(result, Err(RouteTableError::Overflow { limit: 3 })));
        assert_eq!(table.len(), 3);
        assert!(table.get(ip("10.0.0.2")).is_some());
        assert!(table.get(ip("10.0.0.3")).is_none());
        assert!(table.get(ip("10.0.0.4")).is_none());
    }

    #[test]
    #[cfg(target_endian = "little")]
    fn test_ingest_exactly_at_limit() {
        let routes = "\
Iface\tDestination\tGateway \tFlags\tRefCnt\tUse\tMetric\tMask\t\tMTU\tWindow\tIRTT
eth0\t0000000A\t00000000\t0001\t0\t0\t100\t00FFFFFF\t0\t0\t0
wlan0\t0001A8C0\t00000000\t0001\t0\t0\t600\t00FFFFFF\t0\t0\t0
";
        let mut table = RoutingTable::new(2);
        assert_eq!(table.ingest_ipv4(routes.as_bytes(), &inventory()).unwrap(), 2);
    }
}
