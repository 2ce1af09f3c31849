//! Resolver configuration.
use std::fmt::{Display, Formatter};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::PathBuf;
use std::time::Duration;

/// Path to the IPv4 routing table in procfs.
pub const DEFAULT_PROCFS_ROUTE: &str = "/proc/net/route";
/// Path to the IPv6 routing table in procfs.
pub const DEFAULT_PROCFS_IPV6_ROUTE: &str = "/proc/net/ipv6_route";
/// Maximum number of routes kept in a routing table.
pub const DEFAULT_MAX_ROUTES: usize = 1024;
/// Entropy devices, in order of preference.
pub const DEFAULT_RANDOM_DEVICES: [&str; 2] = ["/dev/urandom", "/dev/random"];

/// Resolver configuration.
#[derive(Clone, Debug)]
pub struct ResolverConfig {
    /// Kernel IPv4 routing table.
    pub ipv4_routes: PathBuf,
    /// Kernel IPv6 routing table.
    pub ipv6_routes: PathBuf,
    /// Stop ingesting routes past this count.
    pub max_routes: usize,
    /// Entropy devices, tried in order.
    pub random_devices: Vec<PathBuf>,
    /// Lowest port drawn for connect probes.
    pub min_ephemeral_port: u16,
    /// Destination port of the datagram sent to trigger address resolution.
    pub discard_port: u16,
    /// How long to wait for a frame when resolving a MAC address.
    pub capture_timeout: Duration,
    /// Capture buffer size in bytes.
    pub capture_buffer_size: i32,
    /// Source address to use for IPv4 destinations, if chosen by the operator.
    pub source_v4: Option<Ipv4Addr>,
    /// Source address to use for IPv6 destinations, if chosen by the operator.
    pub source_v6: Option<Ipv6Addr>,
}

impl ResolverConfig {
    /// Return the operator-chosen source address for the family of `destination`.
    pub fn source_for(&self, destination: IpAddr) -> Option<IpAddr> {
        match destination {
            IpAddr::V4(_) => self.source_v4.map(IpAddr::V4),
            IpAddr::V6(_) => self.source_v6.map(IpAddr::V6),
        }
        .filter(|addr| !addr.is_unspecified())
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            ipv4_routes: PathBuf::from(DEFAULT_PROCFS_ROUTE),
            ipv6_routes: PathBuf::from(DEFAULT_PROCFS_IPV6_ROUTE),
            max_routes: DEFAULT_MAX_ROUTES,
            random_devices: DEFAULT_RANDOM_DEVICES.iter().map(PathBuf::from).collect(),
            min_ephemeral_port: 5000,
            discard_port: 9,
            capture_timeout: Duration::from_secs(1),
            capture_buffer_size: 1024 * 1024,
            source_v4: None,
            source_v6: None,
        }
    }
}

impl Display for ResolverConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ipv4_routes={:?}", self.ipv4_routes)?;
        write!(f, " ipv6_routes={:?}", self.ipv6_routes)?;
        write!(f, " max_routes={:?}", self.max_routes)?;
        write!(f, " random_devices={:?}", self.random_devices)?;
        write!(f, " min_ephemeral_port={:?}", self.min_ephemeral_port)?;
        write!(f, " discard_port={:?}", self.discard_port)?;
        write!(f, " capture_timeout={:?}", self.capture_timeout)?;
        write!(f, " capture_buffer_size={:?}", self.capture_buffer_size)?;
        write!(f, " source_v4={:?}", self.source_v4)?;
        write!(f, " source_v6={:?}", self.source_v6)
    }
}
