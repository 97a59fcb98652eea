//! Data model for link reconciliation
//!
//! Device identity, link state, the desired network configuration and the
//! per-cycle reconciliation report.

use ethlink_common::MacAddress;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Maximum number of DNS servers carried by a static configuration
pub const MAX_DNS_SERVERS: usize = 2;

/// A network device resolved for this run: name plus discovered MAC
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DeviceIdentity {
    /// Device name (e.g., "eth0")
    pub name: String,
    /// Hardware address read from the device
    pub mac: MacAddress,
}

impl DeviceIdentity {
    /// Create a new device identity
    pub fn new(name: impl Into<String>, mac: MacAddress) -> Self {
        Self {
            name: name.into(),
            mac,
        }
    }

    /// Canonical MAC form: lowercase, no separators
    pub fn mac_compact(&self) -> String {
        self.mac.compact()
    }

    /// Record file name, `{name}-{mac}.conf`
    pub fn record_file_name(&self) -> String {
        format!("{}-{}.conf", self.name, self.mac_compact())
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.mac)
    }
}

/// Physical link state derived from the carrier bit
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkState {
    /// Carrier present
    Up,
    /// No carrier, or carrier unreadable
    Down,
}

impl LinkState {
    /// Interpret the contents of a sysfs `carrier` file
    pub fn from_carrier(contents: &str) -> Self {
        if contents.trim() == "1" {
            LinkState::Up
        } else {
            LinkState::Down
        }
    }

    /// Convert state to string for logs and notifications
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkState::Up => "up",
            LinkState::Down => "down",
        }
    }
}

/// Static IPv4 configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaticConfig {
    /// Interface address
    pub ip_address: Ipv4Addr,
    /// Contiguous netmask
    pub netmask: Ipv4Addr,
    /// Default gateway, if any
    pub gateway: Option<Ipv4Addr>,
    /// Ordered nameservers, at most [`MAX_DNS_SERVERS`]
    pub dns_servers: Vec<IpAddr>,
    /// Resolver search domain
    pub dns_domain: Option<String>,
}

impl StaticConfig {
    /// Create a static configuration with no gateway and no DNS
    pub fn new(ip_address: Ipv4Addr, netmask: Ipv4Addr) -> Self {
        Self {
            ip_address,
            netmask,
            gateway: None,
            dns_servers: Vec::new(),
            dns_domain: None,
        }
    }

    /// Set the default gateway
    pub fn with_gateway(mut self, gateway: Ipv4Addr) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Append a nameserver; servers beyond [`MAX_DNS_SERVERS`] are dropped
    pub fn with_dns_server(mut self, server: IpAddr) -> Self {
        if self.dns_servers.len() < MAX_DNS_SERVERS {
            self.dns_servers.push(server);
        }
        self
    }

    /// Set the resolver search domain
    pub fn with_dns_domain(mut self, domain: impl Into<String>) -> Self {
        self.dns_domain = Some(domain.into());
        self
    }

    /// Prefix length of the netmask
    pub fn prefix_len(&self) -> u32 {
        u32::from(self.netmask).count_ones()
    }

    /// Address in CIDR notation, e.g. `10.0.0.5/24`
    pub fn cidr(&self) -> String {
        format!("{}/{}", self.ip_address, self.prefix_len())
    }
}

/// Desired configuration for the device
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NetworkConfig {
    /// Lease an address from a DHCP server
    Dhcp,
    /// Apply a fixed configuration
    Static(StaticConfig),
}

impl NetworkConfig {
    /// Configuration method as used in records and logs
    pub fn kind(&self) -> &'static str {
        match self {
            NetworkConfig::Dhcp => "dhcp",
            NetworkConfig::Static(_) => "static",
        }
    }
}

/// Parse a netmask given either dotted (`255.255.255.0`) or as a prefix
/// length (`24` or `/24`). Non-contiguous masks are rejected.
pub fn parse_netmask(value: &str) -> Option<Ipv4Addr> {
    let value = value.trim();
    let prefix = value.strip_prefix('/').unwrap_or(value);
    if let Ok(len) = prefix.parse::<u8>() {
        return netmask_from_prefix(len);
    }

    let mask: Ipv4Addr = value.parse().ok()?;
    let bits = u32::from(mask);
    if bits.leading_ones() + bits.trailing_zeros() == 32 {
        Some(mask)
    } else {
        None
    }
}

/// Dotted netmask for a prefix length (0-32)
pub fn netmask_from_prefix(len: u8) -> Option<Ipv4Addr> {
    match len {
        0 => Some(Ipv4Addr::UNSPECIFIED),
        1..=32 => Some(Ipv4Addr::from(u32::MAX << (32 - u32::from(len)))),
        _ => None,
    }
}

/// Reconciliation controller state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControllerState {
    AwaitingEvent,
    Evaluating,
    ConfiguringLink,
    LinkIdle,
    Verifying,
    Converged,
    Escalating,
    /// Terminal; only reachable from `Escalating`
    FatalExit,
}

impl ControllerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControllerState::AwaitingEvent => "awaiting-event",
            ControllerState::Evaluating => "evaluating",
            ControllerState::ConfiguringLink => "configuring-link",
            ControllerState::LinkIdle => "link-idle",
            ControllerState::Verifying => "verifying",
            ControllerState::Converged => "converged",
            ControllerState::Escalating => "escalating",
            ControllerState::FatalExit => "fatal-exit",
        }
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Link change notification from the event source
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkEvent {
    /// Synthetic event emitted once at subscription
    Initial,
    /// The carrier file was created or modified
    CarrierChanged,
}

/// Current addressing of an interface as reported by the OS
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InterfaceAddressing {
    /// First global IPv4 address
    pub ipv4: Option<Ipv4Addr>,
    /// Netmask of the IPv4 address
    pub netmask: Option<Ipv4Addr>,
    /// First IPv6 address
    pub ipv6: Option<Ipv6Addr>,
    /// Default gateway via this device
    pub gateway: Option<IpAddr>,
    /// Nameservers from the resolver file, at most two
    pub dns_servers: Vec<IpAddr>,
    /// Resolver search domain
    pub dns_domain: Option<String>,
}

/// Outcome of one reconciliation cycle; rebuilt from live reads every time
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconciliationAttempt {
    /// Link state read at the start of the cycle
    pub link_state: LinkState,
    /// Every apply step reported success
    pub config_applied: bool,
    /// Reachability was confirmed
    pub verified: bool,
    /// Failed probes in the primary verification loop
    pub retry_count: u32,
    /// Total probes issued, including the escalation probe
    pub probe_attempts: u32,
    /// The escalation path was taken
    pub escalated: bool,
}

impl ReconciliationAttempt {
    /// Start a new attempt for the given link state
    pub fn new(link_state: LinkState) -> Self {
        Self {
            link_state,
            config_applied: false,
            verified: false,
            retry_count: 0,
            probe_attempts: 0,
            escalated: false,
        }
    }
}
