//! Network reachability.
//!
//! The server is only useful when the device has an address a VNC client
//! can reach. Reachability is a trait so tests and embedders can supply
//! their own answer.

use crate::config::ServerConfig;
use std::net::IpAddr;
use tracing::{debug, warn};

/// Predicate answering "which address would a client connect to".
pub trait Reachability: Send + Sync {
    /// The address clients should use, or `None` when not connected.
    fn address(&self) -> Option<IpAddr>;

    /// Whether any usable address is present.
    fn is_connected(&self) -> bool {
        self.address().is_some()
    }
}

/// Reachability based on the host's network interfaces.
///
/// Picks the first non-loopback IPv4 address on an interface whose name
/// starts with one of the configured prefixes.
#[derive(Debug, Clone)]
pub struct InterfaceReachability {
    prefixes: Vec<String>,
}

impl Default for InterfaceReachability {
    fn default() -> Self {
        Self::new(ServerConfig::INTERFACE_PREFIXES.iter().copied())
    }
}

impl InterfaceReachability {
    /// Create a predicate matching the given interface name prefixes.
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    /// The interface name prefixes this predicate considers.
    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }
}

impl Reachability for InterfaceReachability {
    fn address(&self) -> Option<IpAddr> {
        select_address(interface_addresses(), &self.prefixes)
    }
}

/// Choose the address to advertise from `(interface name, address)` pairs.
pub fn select_address<I>(candidates: I, prefixes: &[String]) -> Option<IpAddr>
where
    I: IntoIterator<Item = (String, IpAddr)>,
{
    candidates
        .into_iter()
        .filter(|(name, _)| prefixes.iter().any(|p| name.starts_with(p.as_str())))
        .map(|(_, addr)| addr)
        .find(|addr| addr.is_ipv4() && !addr.is_loopback())
}

/// Render the `<address>:<port>` string clients connect to.
pub fn connected_status(reachability: &dyn Reachability, port: Option<u16>) -> Option<String> {
    let address = reachability.address()?;
    Some(format!(
        "{}:{}",
        address,
        port.unwrap_or(ServerConfig::DEFAULT_PORT)
    ))
}

#[cfg(unix)]
fn interface_addresses() -> Vec<(String, IpAddr)> {
    use nix::ifaddrs::getifaddrs;
    use std::net::SocketAddrV4;

    let addrs = match getifaddrs() {
        Ok(addrs) => addrs,
        Err(e) => {
            warn!("Failed to list network interfaces: {}", e);
            return vec![];
        }
    };

    let found: Vec<(String, IpAddr)> = addrs
        .filter_map(|ifaddr| {
            let address = ifaddr.address?;
            let v4 = SocketAddrV4::from(*address.as_sockaddr_in()?);
            Some((ifaddr.interface_name, IpAddr::V4(*v4.ip())))
        })
        .collect();
    debug!("Found {} IPv4 interface addresses", found.len());
    found
}

#[cfg(not(unix))]
fn interface_addresses() -> Vec<(String, IpAddr)> {
    warn!("Interface enumeration not implemented for this platform");
    debug!("No interface addresses available");
    vec![]
}
