//! Persisted configuration record format
//!
//! Records use the ifupdown stanza layout:
//!
//! ```text
//! # STATIC Configuration
//! iface eth0 inet static
//!     address 10.0.0.5
//!     netmask 255.255.255.0
//!     gateway 10.0.0.1
//!     dns-domain example.org
//!     dns-nameserver 1.1.1.1 8.8.8.8
//! ```
//!
//! Option lines are tab-indented and omitted when the value is not set.

use crate::types::{MAX_DNS_SERVERS, NetworkConfig, StaticConfig};
use ethlink_common::{EthError, EthResult};
use std::fmt::Write;
use std::net::{IpAddr, Ipv4Addr};

const STATIC_HEADER: &str = "# STATIC Configuration";
const DHCP_HEADER: &str = "# DHCP Configuration";

/// Render the record body for a device
pub fn render_record(device: &str, config: &NetworkConfig) -> String {
    let mut body = String::new();
    match config {
        NetworkConfig::Dhcp => {
            let _ = writeln!(body, "{}", DHCP_HEADER);
            let _ = writeln!(body, "iface {} inet dhcp", device);
        }
        NetworkConfig::Static(cfg) => {
            let _ = writeln!(body, "{}", STATIC_HEADER);
            let _ = writeln!(body, "iface {} inet static", device);
            let _ = writeln!(body, "\taddress {}", cfg.ip_address);
            let _ = writeln!(body, "\tnetmask {}", cfg.netmask);
            if let Some(gw) = cfg.gateway {
                let _ = writeln!(body, "\tgateway {}", gw);
            }
            if let Some(domain) = &cfg.dns_domain {
                let _ = writeln!(body, "\tdns-domain {}", domain);
            }
            if !cfg.dns_servers.is_empty() {
                let servers: Vec<String> = cfg.dns_servers.iter().map(|s| s.to_string()).collect();
                let _ = writeln!(body, "\tdns-nameserver {}", servers.join(" "));
            }
        }
    }
    body
}

/// Parse a record body back into a configuration
pub fn parse_record(body: &str) -> EthResult<NetworkConfig> {
    let mut lines = body
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'));

    let stanza = lines
        .next()
        .ok_or_else(|| EthError::invalid_config("record", "empty record"))?;
    let tokens: Vec<&str> = stanza.split_whitespace().collect();
    let method = match tokens.as_slice() {
        ["iface", _device, "inet", method] => *method,
        _ => {
            return Err(EthError::invalid_config(
                "record",
                format!("malformed stanza '{}'", stanza),
            ));
        }
    };

    match method {
        "dhcp" => Ok(NetworkConfig::Dhcp),
        "static" => parse_static_options(lines).map(NetworkConfig::Static),
        other => Err(EthError::invalid_config(
            "record",
            format!("unsupported method '{}'", other),
        )),
    }
}

fn parse_static_options<'a>(lines: impl Iterator<Item = &'a str>) -> EthResult<StaticConfig> {
    let mut address: Option<Ipv4Addr> = None;
    let mut netmask: Option<Ipv4Addr> = None;
    let mut gateway: Option<Ipv4Addr> = None;
    let mut dns_domain: Option<String> = None;
    let mut dns_servers: Vec<IpAddr> = Vec::new();

    for line in lines {
        let (key, value) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let value = value.trim();
        match key {
            "address" => address = Some(parse_ipv4("address", value)?),
            "netmask" => netmask = Some(parse_ipv4("netmask", value)?),
            "gateway" => gateway = Some(parse_ipv4("gateway", value)?),
            "dns-domain" if !value.is_empty() => dns_domain = Some(value.to_string()),
            "dns-nameserver" => {
                for server in value.split_whitespace().take(MAX_DNS_SERVERS) {
                    let server = server.parse().map_err(|_| {
                        EthError::invalid_config("dns-nameserver", format!("'{}'", server))
                    })?;
                    dns_servers.push(server);
                }
            }
            _ => {}
        }
    }

    let address = address.ok_or_else(|| EthError::invalid_config("address", "missing"))?;
    let netmask = netmask.ok_or_else(|| EthError::invalid_config("netmask", "missing"))?;

    Ok(StaticConfig {
        ip_address: address,
        netmask,
        gateway,
        dns_servers,
        dns_domain,
    })
}

fn parse_ipv4(field: &str, value: &str) -> EthResult<Ipv4Addr> {
    value
        .parse()
        .map_err(|_| EthError::invalid_config(field, format!("'{}' is not an IPv4 address", value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn full_static() -> StaticConfig {
        StaticConfig::new(Ipv4Addr::new(10, 0, 0, 5), Ipv4Addr::new(255, 255, 255, 0))
            .with_gateway(Ipv4Addr::new(10, 0, 0, 1))
            .with_dns_server("1.1.1.1".parse().unwrap())
            .with_dns_server("8.8.8.8".parse().unwrap())
            .with_dns_domain("example.org")
    }

    #[test]
    fn test_render_dhcp() {
        assert_eq!(
            render_record("eth0", &NetworkConfig::Dhcp),
            "# DHCP Configuration\niface eth0 inet dhcp\n"
        );
    }

    #[test]
    fn test_render_static() {
        let body = render_record("eth0", &NetworkConfig::Static(full_static()));
        assert_eq!(
            body,
            "# STATIC Configuration\n\
             iface eth0 inet static\n\
             \taddress 10.0.0.5\n\
             \tnetmask 255.255.255.0\n\
             \tgateway 10.0.0.1\n\
             \tdns-domain example.org\n\
             \tdns-nameserver 1.1.1.1 8.8.8.8\n"
        );
    }

    #[test]
    fn test_render_static_omits_unset_lines() {
        let config =
            StaticConfig::new(Ipv4Addr::new(192, 168, 0, 9), Ipv4Addr::new(255, 255, 0, 0));
        let body = render_record("enp3s0", &NetworkConfig::Static(config));
        assert!(body.contains("iface enp3s0 inet static"));
        assert!(!body.contains("gateway"));
        assert!(!body.contains("dns-"));
    }

    #[test]
    fn test_parse_static_record() {
        let body = render_record("eth0", &NetworkConfig::Static(full_static()));
        assert_eq!(parse_record(&body).unwrap(), NetworkConfig::Static(full_static()));
    }

    #[test]
    fn test_parse_hand_written_record() {
        // Records written by older tools carry empty option lines
        let body = "# STATIC Configuration\n\
                    iface eth1 inet static\n\
                    \taddress 172.16.0.2\n\
                    \tnetmask 255.255.0.0\n\
                    \tdns-domain \n\
                    \tdns-nameserver \n";
        let config = parse_record(body).unwrap();
        let expected =
            StaticConfig::new(Ipv4Addr::new(172, 16, 0, 2), Ipv4Addr::new(255, 255, 0, 0));
        assert_eq!(config, NetworkConfig::Static(expected));
    }

    #[test]
    fn test_parse_dhcp_record() {
        assert_eq!(
            parse_record("# DHCP Configuration\niface eth0 inet dhcp\n\n").unwrap(),
            NetworkConfig::Dhcp
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse_record("").is_err());
        assert!(parse_record("iface eth0 inet6 auto\n").is_err());
        assert!(parse_record("iface eth0 inet manual\n").is_err());
        assert!(parse_record("iface eth0 inet static\n\tnetmask 255.0.0.0\n").is_err());
    }
}
