//! Static override file parsing
//!
//! The optional override file is line-oriented `KEY=VALUE`:
//!
//! ```text
//! IP_ADDR=10.0.0.5
//! NETMASK=255.255.255.0
//! GATEWAY=10.0.0.1
//! DNS1=1.1.1.1
//! DNS2=8.8.8.8
//! DNS_DOMAIN=example.org
//! ```
//!
//! Unknown keys are ignored. A missing file means DHCP.

use crate::types::{StaticConfig, parse_netmask};
use ethlink_common::{EthError, EthResult};
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

/// Load the static override file.
///
/// Returns `Ok(None)` when the file does not exist.
pub fn load_static_config(path: impl AsRef<Path>) -> EthResult<Option<StaticConfig>> {
    let path = path.as_ref();
    match std::fs::read_to_string(path) {
        Ok(content) => parse_static_config(&content).map(Some),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(EthError::Io(e)),
    }
}

/// Parse the contents of a static override file
pub fn parse_static_config(content: &str) -> EthResult<StaticConfig> {
    let mut ip_addr = None;
    let mut netmask = None;
    let mut gateway = None;
    let mut dns1 = None;
    let mut dns2 = None;
    let mut dns_domain = None;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }

        match key.trim() {
            "IP_ADDR" => ip_addr = Some(value),
            "NETMASK" => netmask = Some(value),
            "GATEWAY" => gateway = Some(value),
            "DNS1" => dns1 = Some(value),
            "DNS2" => dns2 = Some(value),
            "DNS_DOMAIN" => dns_domain = Some(value),
            _ => {}
        }
    }

    let ip_addr = ip_addr.ok_or_else(|| EthError::invalid_config("IP_ADDR", "missing"))?;
    let ip_address: Ipv4Addr = ip_addr.parse().map_err(|_| {
        EthError::invalid_config("IP_ADDR", format!("'{}' is not an IPv4 address", ip_addr))
    })?;

    let netmask = netmask.ok_or_else(|| EthError::invalid_config("NETMASK", "missing"))?;
    let netmask = parse_netmask(netmask).ok_or_else(|| {
        EthError::invalid_config("NETMASK", format!("'{}' is not a netmask", netmask))
    })?;

    let mut config = StaticConfig::new(ip_address, netmask);

    if let Some(gw) = gateway {
        let gw: Ipv4Addr = gw.parse().map_err(|_| {
            EthError::invalid_config("GATEWAY", format!("'{}' is not an IPv4 address", gw))
        })?;
        config = config.with_gateway(gw);
    }

    for (key, server) in [("DNS1", dns1), ("DNS2", dns2)] {
        if let Some(server) = server {
            let server: IpAddr = server.parse().map_err(|_| {
                EthError::invalid_config(key, format!("'{}' is not an IP address", server))
            })?;
            config = config.with_dns_server(server);
        }
    }

    if let Some(domain) = dns_domain {
        config = config.with_dns_domain(domain);
    }

    Ok(config)
}
