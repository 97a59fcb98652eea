//! Interface inspector
//!
//! Reads live interface state from sysfs and the `ip`/`ping` tools. Nothing
//! is cached; every call re-queries the OS.

use crate::config::EthlinkdConfig;
use crate::types::{
    DeviceIdentity, InterfaceAddressing, LinkState, MAX_DNS_SERVERS, netmask_from_prefix,
};
use async_trait::async_trait;
use ethlink_common::shell::{self, shellquote};
use ethlink_common::{EthError, EthResult, MacAddress};
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Read-only view of one device's OS state
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InterfaceInspector: Send + Sync {
    /// Read the carrier bit. Missing or unreadable carrier is `Down`.
    async fn read_link_state(&self, device: &str) -> EthResult<LinkState>;

    /// Resolve the device name and hardware address
    async fn read_identity(&self, device: &str) -> EthResult<DeviceIdentity>;

    /// Snapshot of the device's current addressing
    async fn read_addressing(&self, device: &str) -> EthResult<InterfaceAddressing>;

    /// Send a single echo probe; true iff a reply arrives within the timeout
    async fn probe_reachable(&self, host: &str) -> bool;
}

/// Inspector backed by sysfs, `ip` and `ping`
#[derive(Debug, Clone)]
pub struct SystemInspector {
    sysfs_root: PathBuf,
    resolv_conf: PathBuf,
    ip_cmd: String,
    ping_cmd: String,
    probe_timeout: Duration,
}

impl SystemInspector {
    pub fn new(config: &EthlinkdConfig) -> Self {
        Self {
            sysfs_root: config.paths.sysfs_root.clone(),
            resolv_conf: config.paths.resolv_conf.clone(),
            ip_cmd: config.commands.ip.clone(),
            ping_cmd: config.commands.ping.clone(),
            probe_timeout: config.probe_timeout(),
        }
    }

    /// Per-device sysfs directory, or `DeviceNotFound`
    async fn device_dir(&self, device: &str) -> EthResult<PathBuf> {
        if device.is_empty() || device.contains('/') {
            return Err(EthError::device_not_found(device));
        }
        let dir = self.sysfs_root.join(device);
        match tokio::fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => Ok(dir),
            Ok(_) => Err(EthError::device_not_found(device)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(EthError::device_not_found(device)),
            Err(e) => Err(EthError::Io(e)),
        }
    }

    async fn ip_output(&self, args: &str) -> EthResult<String> {
        let cmd = format!("{} {}", self.ip_cmd, args);
        shell::run_checked(&cmd).await
    }
}

#[async_trait]
impl InterfaceInspector for SystemInspector {
    async fn read_link_state(&self, device: &str) -> EthResult<LinkState> {
        let dir = self.device_dir(device).await?;
        let state = match tokio::fs::read_to_string(dir.join("carrier")).await {
            Ok(contents) => LinkState::from_carrier(&contents),
            Err(e) => {
                // The kernel returns EINVAL for carrier while the link is admin down
                trace!(device, error = %e, "Carrier unreadable, treating as down");
                LinkState::Down
            }
        };
        debug!(device, state = state.as_str(), "Read link state");
        Ok(state)
    }

    async fn read_identity(&self, device: &str) -> EthResult<DeviceIdentity> {
        let dir = self.device_dir(device).await?;
        let raw = match tokio::fs::read_to_string(dir.join("address")).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(EthError::device_not_found(device));
            }
            Err(e) => return Err(EthError::Io(e)),
        };
        let mac: MacAddress = raw.parse()?;
        Ok(DeviceIdentity::new(device, mac))
    }

    async fn read_addressing(&self, device: &str) -> EthResult<InterfaceAddressing> {
        self.device_dir(device).await?;
        let dev = shellquote(device);

        let v4 = self
            .ip_output(&format!("-4 addr show dev {} scope global", dev))
            .await?;
        let v6 = self.ip_output(&format!("-6 addr show dev {}", dev)).await?;
        let routes = self.ip_output(&format!("route show dev {}", dev)).await?;

        let mut addressing = InterfaceAddressing::default();
        if let Some((addr, prefix)) = parse_ipv4_addr(&v4) {
            addressing.ipv4 = Some(addr);
            addressing.netmask = netmask_from_prefix(prefix);
        }
        addressing.ipv6 = parse_ipv6_addr(&v6);
        addressing.gateway = parse_default_gateway(&routes);

        match tokio::fs::read_to_string(&self.resolv_conf).await {
            Ok(content) => {
                let (servers, domain) = parse_resolv_conf(&content);
                addressing.dns_servers = servers;
                addressing.dns_domain = domain;
            }
            Err(e) => debug!(
                path = %self.resolv_conf.display(),
                error = %e,
                "Resolver file unreadable"
            ),
        }

        Ok(addressing)
    }

    async fn probe_reachable(&self, host: &str) -> bool {
        let cmd = format!(
            "{} -c 1 -W {} {} >/dev/null 2>&1",
            self.ping_cmd,
            self.probe_timeout.as_secs().max(1),
            shellquote(host)
        );
        match shell::run(&cmd).await {
            Ok(out) => out.succeeded(),
            Err(e) => {
                warn!(host, error = %e, "Failed to run reachability probe");
                false
            }
        }
    }
}

/// First `inet a.b.c.d/len` in `ip -4 addr show` output
pub fn parse_ipv4_addr(output: &str) -> Option<(Ipv4Addr, u8)> {
    output.lines().find_map(|line| {
        let mut tokens = line.split_whitespace();
        if tokens.next()? != "inet" {
            return None;
        }
        let (addr, prefix) = tokens.next()?.split_once('/')?;
        Some((addr.parse().ok()?, prefix.parse().ok()?))
    })
}

/// First `inet6` address in `ip -6 addr show` output
pub fn parse_ipv6_addr(output: &str) -> Option<Ipv6Addr> {
    output.lines().find_map(|line| {
        let mut tokens = line.split_whitespace();
        if tokens.next()? != "inet6" {
            return None;
        }
        let addr = tokens.next()?;
        let addr = addr.split_once('/').map_or(addr, |(a, _)| a);
        addr.parse().ok()
    })
}

/// Gateway of the `default via X` route in `ip route show` output
pub fn parse_default_gateway(output: &str) -> Option<IpAddr> {
    output.lines().find_map(|line| {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            ["default", "via", gw, ..] => gw.parse().ok(),
            _ => None,
        }
    })
}

/// Nameservers (at most two) and search domain from a resolver file
pub fn parse_resolv_conf(content: &str) -> (Vec<IpAddr>, Option<String>) {
    let mut servers = Vec::new();
    let mut domain = None;

    for line in content.lines() {
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("nameserver") if servers.len() < MAX_DNS_SERVERS => {
                if let Some(server) = tokens.next().and_then(|s| s.parse().ok()) {
                    servers.push(server);
                }
            }
            Some("search") | Some("domain") if domain.is_none() => {
                domain = tokens.next().map(str::to_string);
            }
            _ => {}
        }
    }

    (servers, domain)
}

/// Path of a device's carrier file under a sysfs root
pub fn carrier_path(sysfs_root: &Path, device: &str) -> PathBuf {
    sysfs_root.join(device).join("carrier")
}
