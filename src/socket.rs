//! Datagram sockets used to ask the kernel about routes.
//!
//! Every call opens its own socket and closes it before returning.
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};

use dns_lookup::{get_hostname, lookup_host};
use log::debug;

pub trait SocketProbe: Send + Sync {
    /// Connect a datagram socket to `destination` and return the local address picked by the OS.
    ///
    /// No packet is sent.
    fn local_address(&self, destination: IpAddr, port: u16) -> io::Result<IpAddr>;

    /// Send an empty datagram to `destination`.
    fn send_empty(&self, destination: IpAddr, port: u16) -> io::Result<()>;

    /// Return the addresses the local host name resolves to.
    fn host_addresses(&self) -> io::Result<Vec<IpAddr>>;
}

/// Probes backed by UDP sockets.
#[derive(Copy, Clone, Debug, Default)]
pub struct UdpProbe;

impl UdpProbe {
    fn bind(destination: IpAddr) -> io::Result<UdpSocket> {
        match destination {
            IpAddr::V4(_) => UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)),
            IpAddr::V6(_) => UdpSocket::bind((Ipv6Addr::UNSPECIFIED, 0)),
        }
    }
}

impl SocketProbe for UdpProbe {
    fn local_address(&self, destination: IpAddr, port: u16) -> io::Result<IpAddr> {
        let socket = Self::bind(destination)?;
        socket.connect(SocketAddr::new(destination, port))?;
        let local = socket.local_addr()?;
        debug!("{} via {}", destination, local.ip());
        Ok(local.ip())
    }

    fn send_empty(&self, destination: IpAddr, port: u16) -> io::Result<()> {
        let socket = Self::bind(destination)?;
        socket.send_to(&[], SocketAddr::new(destination, port))?;
        Ok(())
    }

    fn host_addresses(&self) -> io::Result<Vec<IpAddr>> {
        let hostname = get_hostname()?;
        lookup_host(&hostname)
    }
}
