//! Find the interface, source address and next-hop MAC address used to reach a destination.
//!
//! IPv4 and IPv6 addresses are handled in a single 128-bit space, IPv4 addresses being
//! stored in their IPv4-mapped form (`::ffff:a.b.c.d`).
pub mod capture;
pub mod classifier;
pub mod config;
pub mod error;
pub mod interfaces;
pub mod neighbors;
pub mod random;
pub mod socket;
pub mod utilities;

pub use error::*;
