//! Find routes and resolve link-layer addresses.
//!
//! # Examples
//!
//! ```no_run
//! use anyhow::Result;
//! use std::net::IpAddr;
//! use routethrough::config::ResolverConfig;
//! use routethrough::neighbors::NeighborMacResolver;
//!
//! fn main() -> Result<()> {
//!     let target: IpAddr = "192.0.2.1".parse()?;
//!     let resolver = NeighborMacResolver::new(ResolverConfig::default());
//!
//!     let route = resolver.routes().resolve(target)?;
//!     let mac = resolver.resolve_mac(target)?;
//!
//!     println!("{} via {} from {} ({})", target, route.interface, route.source, mac);
//!     Ok(())
//! }
//! ```
mod mac;
mod resolver;
mod route;

pub use mac::*;
pub use resolver::*;
pub use route::*;

pub use pnet::util::MacAddr;

use std::net::IpAddr;

use crate::config::ResolverConfig;
use crate::error::MacError;

/// Resolve the next-hop MAC address of `addr` with the default configuration.
pub fn resolve_mac_address(addr: IpAddr) -> Result<MacAddr, MacError> {
    NeighborMacResolver::new(ResolverConfig::default()).resolve_mac(addr)
}
