//! Print the interface, source address and next-hop MAC address used to reach hosts.
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use dns_lookup::lookup_host;
use log::info;

use routethrough::config::ResolverConfig;
use routethrough::neighbors::NeighborMacResolver;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Also resolve the next-hop MAC address (requires capture privileges).
    #[arg(short = 'm', long, default_value_t = false)]
    mac: bool,
    /// Source address for IPv4 destinations.
    #[arg(short = 'S', long)]
    source_v4: Option<Ipv4Addr>,
    /// Source address for IPv6 destinations.
    #[arg(long)]
    source_v6: Option<Ipv6Addr>,
    /// IPv4 routing table.
    #[arg(long, default_value = "/proc/net/route")]
    ipv4_routes: PathBuf,
    /// IPv6 routing table.
    #[arg(long, default_value = "/proc/net/ipv6_route")]
    ipv6_routes: PathBuf,
    /// Time in milliseconds to wait for a frame when resolving a MAC address.
    #[arg(short = 'w', long, default_value_t = 1000)]
    wait: u64,
    /// Hosts to resolve.
    #[arg(required = true)]
    hosts: Vec<String>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = ResolverConfig {
        ipv4_routes: args.ipv4_routes,
        ipv6_routes: args.ipv6_routes,
        capture_timeout: Duration::from_millis(args.wait),
        source_v4: args.source_v4,
        source_v6: args.source_v6,
        ..Default::default()
    };
    info!("{}", config);
    let resolver = NeighborMacResolver::new(config);
    info!("technique={}", resolver.routes().technique()?);

    for host in &args.hosts {
        let addr: IpAddr = match host.parse() {
            Ok(addr) => addr,
            Err(_) => *lookup_host(host)?
                .first()
                .context(format!("{host} has no address"))?,
        };
        let route = match resolver.routes().resolve(addr) {
            Ok(route) => route,
            Err(error) => {
                println!("{host} ({addr}): {error}");
                continue;
            }
        };
        if args.mac {
            match resolver.resolve_mac(addr) {
                Ok(mac) => println!(
                    "{host} ({addr}) dev {} src {} via {mac}",
                    route.interface, route.source
                ),
                Err(error) => println!(
                    "{host} ({addr}) dev {} src {}: {error}",
                    route.interface, route.source
                ),
            }
        } else {
            println!("{host} ({addr}) dev {} src {}", route.interface, route.source);
        }
    }
    Ok(())
}
