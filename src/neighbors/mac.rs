use std::net::IpAddr;

use log::debug;
use pnet::packet::ethernet::EthernetPacket;
use pnet::util::MacAddr;

use crate::capture::{CaptureBackend, HeaderLengths, LinkLayer, PcapCapture};
use crate::config::ResolverConfig;
use crate::error::{MacError, ResolveError};
use crate::neighbors::resolver::RouteResolver;
use crate::utilities::canonical;

/// Find the next-hop MAC address of a destination by watching our own traffic to it.
///
/// An empty datagram is sent to the destination while capturing on the outgoing interface.
/// The kernel resolves the next hop (ARP or NDP) before sending it, and the destination
/// address of the captured frame is the answer.
pub struct NeighborMacResolver {
    routes: RouteResolver,
    capture: Box<dyn CaptureBackend>,
    header_lengths: HeaderLengths,
}

impl NeighborMacResolver {
    pub fn new(config: ResolverConfig) -> Self {
        let capture = PcapCapture::new(config.capture_timeout, config.capture_buffer_size);
        Self::with_capture(RouteResolver::new(config), capture)
    }

    pub fn with_capture<C: CaptureBackend + 'static>(routes: RouteResolver, capture: C) -> Self {
        Self {
            routes,
            capture: Box::new(capture),
            header_lengths: HeaderLengths::native(),
        }
    }

    pub fn routes(&self) -> &RouteResolver {
        &self.routes
    }

    /// Return the MAC address of the next hop towards `destination`.
    pub fn resolve_mac(&self, destination: IpAddr) -> Result<MacAddr, MacError> {
        let destination = canonical(destination);
        // Local destinations have no next hop.
        if self
            .routes
            .is_local_host(destination)
            .map_err(ResolveError::from)?
        {
            return Err(MacError::NoReply(destination));
        }
        let route = self.routes.resolve(destination)?;
        let filter = capture_filter(route.source, destination);
        debug!("capturing on {} with filter {:?}", route.interface, filter);

        let mut handle = self.capture.open(&route.interface, &filter)?;
        let link_layer = handle.link_layer();
        if link_layer != LinkLayer::Ethernet {
            return Err(MacError::UnsupportedLinkLayer(link_layer));
        }

        let port = self.routes.config().discard_port;
        self.routes.sockets().send_empty(destination, port)?;

        let frame = handle
            .next_frame()?
            .ok_or(MacError::NoReply(destination))?;
        let header_length = self
            .header_lengths
            .get(link_layer)
            .unwrap_or_else(EthernetPacket::minimum_packet_size);
        if frame.len() < header_length {
            debug!("frame too short: {} bytes", frame.len());
            return Err(MacError::NoReply(destination));
        }

        // The frame is our own datagram: its destination is the next hop.
        let mac = EthernetPacket::new(&frame)
            .map(|eth| eth.get_destination())
            .ok_or(MacError::NoReply(destination))?;
        if mac == MacAddr::broadcast() {
            return Err(MacError::NoReply(destination));
        }
        debug!("{} via {}", destination, mac);
        Ok(mac)
    }
}

/// Capture filter matching datagrams from `source` to `destination`.
pub fn capture_filter(source: IpAddr, destination: IpAddr) -> String {
    match destination {
        IpAddr::V4(_) => format!("ip and src host {source} and dst host {destination}"),
        IpAddr::V6(_) => format!("ip6 and src host {source} and dst host {destination}"),
    }
}
