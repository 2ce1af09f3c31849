//! Live packet capture.
use std::collections::HashMap;
use std::thread::sleep;
use std::time::{Duration, Instant};

use pcap::{Active, Capture, Linktype};
use strum::Display;

/// Link-layer type of a capture handle.
#[derive(Copy, Clone, Debug, Display, PartialEq, Eq, Hash)]
pub enum LinkLayer {
    /// BSD loopback encapsulation.
    Null,
    /// 10/100/1000 Mb/s Ethernet.
    Ethernet,
    /// IEEE 802.5 Token Ring.
    Ieee802,
    Slip,
    Ppp,
    /// Raw IP, no link-layer header.
    Raw,
    Other(i32),
}

impl From<Linktype> for LinkLayer {
    fn from(value: Linktype) -> Self {
        match value.0 {
            0 => LinkLayer::Null,
            1 => LinkLayer::Ethernet,
            6 => LinkLayer::Ieee802,
            8 => LinkLayer::Slip,
            9 => LinkLayer::Ppp,
            // DLT_RAW is 12 on most systems and 14 on OpenBSD, LINKTYPE_RAW is 101.
            12 | 101 => LinkLayer::Raw,
            14 if cfg!(target_os = "openbsd") => LinkLayer::Raw,
            other => LinkLayer::Other(other),
        }
    }
}

/// Length of the link-layer header for each link type, for the current platform.
#[derive(Clone, Debug)]
pub struct HeaderLengths {
    lengths: HashMap<LinkLayer, usize>,
}

impl HeaderLengths {
    pub fn native() -> Self {
        let bsd = cfg!(any(
            target_os = "freebsd",
            target_os = "openbsd",
            target_os = "netbsd",
            target_os = "dragonfly",
            target_os = "macos",
            target_os = "ios"
        ));
        let solaris = cfg!(any(target_os = "solaris", target_os = "illumos"));
        let slip = if bsd { 16 } else { 24 };
        let ppp = if bsd {
            4
        } else if solaris {
            8
        } else {
            24
        };
        Self {
            lengths: HashMap::from([
                (LinkLayer::Ethernet, 14),
                (LinkLayer::Ieee802, 22),
                (LinkLayer::Null, 4),
                (LinkLayer::Slip, slip),
                (LinkLayer::Ppp, ppp),
                (LinkLayer::Raw, 0),
            ]),
        }
    }

    pub fn get(&self, link_layer: LinkLayer) -> Option<usize> {
        self.lengths.get(&link_layer).copied()
    }
}

impl Default for HeaderLengths {
    fn default() -> Self {
        Self::native()
    }
}

/// An open capture. Dropping the handle closes it.
pub trait CaptureHandle {
    fn link_layer(&self) -> LinkLayer;

    /// Wait for the next frame, returns `None` if none arrived before the handle's timeout.
    fn next_frame(&mut self) -> Result<Option<Vec<u8>>, pcap::Error>;
}

/// Something that can open captures.
pub trait CaptureBackend: Send + Sync {
    fn open(&self, interface: &str, filter: &str) -> Result<Box<dyn CaptureHandle>, pcap::Error>;
}

/// Captures opened with libpcap.
#[derive(Copy, Clone, Debug)]
pub struct PcapCapture {
    pub timeout: Duration,
    pub buffer_size: i32,
}

impl PcapCapture {
    pub fn new(timeout: Duration, buffer_size: i32) -> Self {
        Self {
            timeout,
            buffer_size,
        }
    }
}

impl CaptureBackend for PcapCapture {
    fn open(&self, interface: &str, filter: &str) -> Result<Box<dyn CaptureHandle>, pcap::Error> {
        // A short pcap timeout lets `next_frame` enforce our own timeout,
        // pcap's timeout alone may never fire if no packet is received.
        let mut cap = pcap::Capture::from_device(interface)?
            .buffer_size(self.buffer_size)
            .immediate_mode(true)
            .timeout(50)
            .open()?;
        // Our own outgoing frames must match, so the direction is left to in+out.
        cap.filter(filter, true)?;
        let link_layer = cap.get_datalink().into();
        Ok(Box::new(PcapHandle {
            cap,
            link_layer,
            timeout: self.timeout,
        }))
    }
}

struct PcapHandle {
    cap: Capture<Active>,
    link_layer: LinkLayer,
    timeout: Duration,
}

impl CaptureHandle for PcapHandle {
    fn link_layer(&self) -> LinkLayer {
        self.link_layer
    }

    fn next_frame(&mut self) -> Result<Option<Vec<u8>>, pcap::Error> {
        let start = Instant::now();
        let poll_interval = Duration::from_millis(10);
        loop {
            match self.cap.next_packet() {
                Ok(packet) => return Ok(Some(packet.data.to_vec())),
                Err(pcap::Error::TimeoutExpired) | Err(pcap::Error::NoMorePackets) => {
                    if start.elapsed() >= self.timeout {
                        return Ok(None);
                    }
                    sleep(poll_interval);
                }
                Err(error) => return Err(error),
            }
        }
    }
}
