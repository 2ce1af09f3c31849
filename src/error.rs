//! Error types.
use std::io;
use std::net::IpAddr;

use crate::capture::LinkLayer;

/// The operating system could not list the network interfaces at all.
#[derive(Debug, thiserror::Error)]
#[error("cannot enumerate network interfaces: {0}")]
pub struct EnumerationError(#[from] pcap::Error);

/// A single route line that could not be parsed.
///
/// Ingestion logs these and moves on to the next line.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum MalformedRouteLine {
    #[error("missing field {0}")]
    MissingField(usize),

    #[error("invalid UTF-8 after byte {0}")]
    Encoding(usize),

    #[error("invalid destination: {0}")]
    Destination(String),

    #[error("invalid mask: {0}")]
    Mask(String),

    #[error("invalid prefix length: {0}")]
    PrefixLength(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RouteTableError {
    #[error("route source unavailable: {0}")]
    SourceUnavailable(#[from] io::Error),

    #[error("too many routes, table truncated at {limit} entries")]
    Overflow { limit: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error(transparent)]
    Enumeration(#[from] EnumerationError),

    #[error("no route found to {0}")]
    NoRouteFound(IpAddr),
}

#[derive(Debug, thiserror::Error)]
pub enum MacError {
    #[error(transparent)]
    Route(#[from] ResolveError),

    #[error("capture error: {0}")]
    Capture(#[from] pcap::Error),

    #[error("socket error: {0}")]
    Socket(#[from] io::Error),

    #[error("unsupported link layer: {0:?}")]
    UnsupportedLinkLayer(LinkLayer),

    #[error("no reply from {0}")]
    NoReply(IpAddr),
}

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum RandomError {
    #[error("invalid random buffer size: {0} (max 65535)")]
    InvalidSize(usize),
}
