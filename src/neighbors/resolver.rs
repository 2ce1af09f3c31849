use std::net::IpAddr;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use log::{debug, info, warn};
use strum::Display;

use crate::classifier::{is_within_local_subnet, resolves_to_local_interface};
use crate::config::ResolverConfig;
use crate::error::{EnumerationError, ResolveError, RouteTableError};
use crate::interfaces::{InterfaceInventory, InterfaceSource, PcapInterfaces};
use crate::neighbors::route::{AddressFamily, ProcfsRoutes, RouteSource, RoutingTable};
use crate::random::RandomByteSource;
use crate::socket::{SocketProbe, UdpProbe};
use crate::utilities::{canonical, loopback_for};

/// How the outgoing interface of a destination is found.
#[derive(Copy, Clone, Debug, Display, PartialEq, Eq)]
pub enum Technique {
    /// Match the destination against the kernel routing tables.
    RouteTableLookup,
    /// Connect a datagram socket and ask the kernel which address it picked.
    ConnectProbe,
}

/// The interface and source address used to reach a destination.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolutionResult {
    pub interface: String,
    pub source: IpAddr,
}

struct Routing {
    technique: Technique,
    table: RoutingTable,
}

/// Find the interface and source address used to reach a destination.
///
/// The routing tables are read, and the technique chosen, on first use.
/// They are never refreshed afterwards; the interfaces are enumerated again on every call.
pub struct RouteResolver {
    config: ResolverConfig,
    interfaces: Box<dyn InterfaceSource>,
    routes: Box<dyn RouteSource>,
    sockets: Arc<dyn SocketProbe>,
    random: Mutex<RandomByteSource>,
    routing: OnceLock<Routing>,
}

impl RouteResolver {
    /// Build a resolver reading the system interfaces and routing tables.
    pub fn new(config: ResolverConfig) -> Self {
        let routes = ProcfsRoutes {
            ipv4: config.ipv4_routes.clone(),
            ipv6: config.ipv6_routes.clone(),
        };
        Self::with_sources(config, PcapInterfaces, routes, Arc::new(UdpProbe))
    }

    pub fn with_sources<I, R>(
        config: ResolverConfig,
        interfaces: I,
        routes: R,
        sockets: Arc<dyn SocketProbe>,
    ) -> Self
    where
        I: InterfaceSource + 'static,
        R: RouteSource + 'static,
    {
        let random = RandomByteSource::new(config.random_devices.clone());
        Self {
            config,
            interfaces: Box::new(interfaces),
            routes: Box::new(routes),
            sockets,
            random: Mutex::new(random),
            routing: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn sockets(&self) -> Arc<dyn SocketProbe> {
        self.sockets.clone()
    }

    /// Enumerate the local interfaces.
    pub fn interfaces(&self) -> Result<InterfaceInventory, EnumerationError> {
        self.interfaces.enumerate()
    }

    /// Return the technique in use, reading the routing tables if needed.
    pub fn technique(&self) -> Result<Technique, EnumerationError> {
        let inventory = self.interfaces()?;
        Ok(self.routing(&inventory).technique)
    }

    /// Return the routes read from the kernel, reading them if needed.
    pub fn routes(&self) -> Result<&RoutingTable, EnumerationError> {
        let inventory = self.interfaces()?;
        Ok(&self.routing(&inventory).table)
    }

    /// Whether `addr` is this machine.
    pub fn is_local_host(&self, addr: IpAddr) -> Result<bool, EnumerationError> {
        Ok(resolves_to_local_interface(addr, &self.interfaces()?))
    }

    /// Whether `addr` is on the same network as one of our interfaces.
    pub fn is_on_local_subnet(&self, addr: IpAddr) -> Result<bool, EnumerationError> {
        Ok(is_within_local_subnet(addr, &self.interfaces()?))
    }

    /// Return the interface and source address used to reach `destination`.
    pub fn resolve(&self, destination: IpAddr) -> Result<ResolutionResult, ResolveError> {
        let destination = canonical(destination);
        let inventory = self.interfaces()?;
        let routing = self.routing(&inventory);

        if resolves_to_local_interface(destination, &inventory) {
            let record = inventory
                .loopback_for(destination)
                .ok_or(ResolveError::NoRouteFound(destination))?;
            debug!("{} is local, using {}", destination, record.name);
            return Ok(ResolutionResult {
                interface: record.name.clone(),
                source: loopback_for(destination),
            });
        }

        match routing.technique {
            Technique::RouteTableLookup => self.lookup(&routing.table, destination, &inventory),
            Technique::ConnectProbe => self.connect_probe(destination, &inventory),
        }
    }

    fn routing(&self, inventory: &InterfaceInventory) -> &Routing {
        self.routing.get_or_init(|| self.read_routes(inventory))
    }

    fn read_routes(&self, inventory: &InterfaceInventory) -> Routing {
        let mut table = RoutingTable::new(self.config.max_routes);
        let ipv4 = self
            .routes
            .ipv4()
            .map_err(RouteTableError::from)
            .and_then(|reader| table.ingest_ipv4(reader, inventory));
        let ipv6 = self
            .routes
            .ipv6()
            .map_err(RouteTableError::from)
            .and_then(|reader| table.ingest_ipv6(reader, inventory));
        let ipv4 = is_available("IPv4", &ipv4);
        let ipv6 = is_available("IPv6", &ipv6);
        let technique = if ipv4 || ipv6 {
            Technique::RouteTableLookup
        } else {
            Technique::ConnectProbe
        };
        info!("technique={} routes={}", technique, table.len());
        Routing { technique, table }
    }

    fn lookup(
        &self,
        table: &RoutingTable,
        destination: IpAddr,
        inventory: &InterfaceInventory,
    ) -> Result<ResolutionResult, ResolveError> {
        let (route, interface) = table
            .get(destination)
            .and_then(|route| Some((route, route.binding.as_deref()?)))
            .ok_or(ResolveError::NoRouteFound(destination))?;
        debug!("{} matches {:?}", destination, route);
        let source = self
            .config
            .source_for(destination)
            .or_else(|| self.preferred_source(destination))
            .or_else(|| {
                inventory
                    .get(interface)
                    .and_then(|record| record.address_for(destination))
            })
            .ok_or(ResolveError::NoRouteFound(destination))?;
        Ok(ResolutionResult {
            interface: interface.to_string(),
            source,
        })
    }

    fn connect_probe(
        &self,
        destination: IpAddr,
        inventory: &InterfaceInventory,
    ) -> Result<ResolutionResult, ResolveError> {
        let source = match self.config.source_for(destination) {
            Some(source) => source,
            None => {
                let source = self
                    .probe_source(destination)
                    .ok_or(ResolveError::NoRouteFound(destination))?;
                if source.is_unspecified() {
                    self.host_address(destination)
                        .ok_or(ResolveError::NoRouteFound(destination))?
                } else {
                    source
                }
            }
        };
        // Make sure the address belongs to one of our interfaces.
        let record = inventory
            .find_by_address(source)
            .ok_or(ResolveError::NoRouteFound(destination))?;
        Ok(ResolutionResult {
            interface: record.name.clone(),
            source,
        })
    }

    /// The source address the kernel picks for `destination`, if it picks one.
    fn preferred_source(&self, destination: IpAddr) -> Option<IpAddr> {
        self.probe_source(destination)
            .filter(|source| !source.is_unspecified())
    }

    fn probe_source(&self, destination: IpAddr) -> Option<IpAddr> {
        let port = self.ephemeral_port();
        match self.sockets.local_address(destination, port) {
            Ok(source) => Some(canonical(source)),
            Err(error) => {
                debug!("cannot connect to {}:{}: {}", destination, port, error);
                None
            }
        }
    }

    /// The first address of the local host name in the family of `destination`.
    fn host_address(&self, destination: IpAddr) -> Option<IpAddr> {
        let family = AddressFamily::of(destination);
        match self.sockets.host_addresses() {
            Ok(addresses) => addresses
                .into_iter()
                .map(canonical)
                .find(|addr| AddressFamily::of(*addr) == family),
            Err(error) => {
                warn!("cannot resolve the local host name: {}", error);
                None
            }
        }
    }

    fn ephemeral_port(&self) -> u16 {
        let mut random = self.random.lock().unwrap_or_else(PoisonError::into_inner);
        let port = random.next_u16().unwrap_or(0);
        let min = self.config.min_ephemeral_port;
        if port < min {
            port.saturating_add(min)
        } else {
            port
        }
    }
}

fn is_available(family: &str, result: &Result<usize, RouteTableError>) -> bool {
    match result {
        Ok(count) => {
            info!("read {} {} routes", count, family);
            true
        }
        Err(RouteTableError::Overflow { limit }) => {
            warn!("{} routes truncated to {} entries", family, limit);
            true
        }
        Err(RouteTableError::SourceUnavailable(error)) => {
            warn!("cannot read {} routes: {}", family, error);
            false
        }
    }
}
