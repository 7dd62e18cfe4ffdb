//! Facts about the executing host.

use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PaddockResult;

/// Read-only facts about the host the engine runs on.
///
/// Facts are detected once at startup and passed by value into topology
/// construction; the core never consults ambient global state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostFacts {
    /// The kernel host name.
    pub host_name: String,
    /// A human-friendly host name (systemd pretty host name when available,
    /// otherwise the first label of the host name).
    pub pretty_name: String,
    /// The primary address of the host.
    pub address: IpAddr,
}

impl HostFacts {
    /// Detect the facts of the current host.
    pub fn detect() -> PaddockResult<Self> {
        let uname = rustix::system::uname();
        let host_name = uname.nodename().to_string_lossy().into_owned();

        let pretty_name = pretty_host_name(Path::new("/etc/machine-info"))
            .unwrap_or_else(|| short_host_name(&host_name).to_string());

        let address = primary_address().unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));

        tracing::debug!(
            host = %host_name,
            pretty = %pretty_name,
            address = %address,
            "Detected host facts"
        );

        Ok(Self {
            host_name,
            pretty_name,
            address,
        })
    }
}

/// The host name without its domain part.
fn short_host_name(host_name: &str) -> &str {
    host_name.split('.').next().unwrap_or(host_name)
}

/// Read `PRETTY_HOSTNAME` from an `/etc/machine-info` style file.
fn pretty_host_name(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    parse_pretty_host_name(&content)
}

fn parse_pretty_host_name(content: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let value = line.strip_prefix("PRETTY_HOSTNAME=")?;
        let value = value.trim().trim_matches('"');
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    })
}

/// The address the host would use to reach the outside world.
///
/// Connecting a UDP socket sends no packets but lets the kernel pick the
/// source address of the default route.
fn primary_address() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("10.254.254.254:1").ok()?;
    socket.local_addr().ok().map(|addr| addr.ip())
}
