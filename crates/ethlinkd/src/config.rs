//! Daemon configuration
//!
//! Loads ethlinkd settings from a TOML file. Every field has a default, so a
//! missing file runs the daemon with the stock paths and verification policy.
//! Default location: /etc/ethlinkd/ethlinkd.toml

use crate::error::{EthlinkdError, Result};
use ethlink_common::shell::{DHCLIENT_CMD, IP_CMD, PING_CMD};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{Level, info};

/// Default daemon configuration path
pub const DEFAULT_CONFIG_PATH: &str = "/etc/ethlinkd/ethlinkd.toml";

/// Filesystem locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root of the per-device sysfs tree
    #[serde(default = "default_sysfs_root")]
    pub sysfs_root: PathBuf,

    /// Resolver file written for static DNS
    #[serde(default = "default_resolv_conf")]
    pub resolv_conf: PathBuf,

    /// Directory holding persisted `{device}-{mac}.conf` records
    #[serde(default = "default_record_dir")]
    pub record_dir: PathBuf,
}

/// External command paths
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandsConfig {
    #[serde(default = "default_ip")]
    pub ip: String,

    #[serde(default = "default_ping")]
    pub ping: String,

    #[serde(default = "default_dhcp_client")]
    pub dhcp_client: String,
}

/// Connectivity verification policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyConfig {
    /// Host probed to confirm connectivity
    #[serde(default = "default_target")]
    pub target: String,

    /// Probes in the primary verification loop
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay between failed probes in seconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,

    /// Wait after the escalation reapply in seconds
    #[serde(default = "default_settle_delay")]
    pub settle_delay_secs: u64,

    /// Wait before reading the carrier bit in milliseconds
    #[serde(default = "default_stabilize_delay")]
    pub stabilize_delay_ms: u64,

    /// Per-probe reply timeout in seconds
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Take the link down and up again during escalation
    #[serde(default)]
    pub bounce_on_escalation: bool,
}

/// Complete ethlinkd configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EthlinkdConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub commands: CommandsConfig,

    #[serde(default)]
    pub verify: VerifyConfig,
}

fn default_sysfs_root() -> PathBuf {
    PathBuf::from("/sys/class/net")
}

fn default_resolv_conf() -> PathBuf {
    PathBuf::from("/etc/resolv.conf")
}

fn default_record_dir() -> PathBuf {
    PathBuf::from("/var/lib/ethlinkd/netcfg")
}

fn default_ip() -> String {
    IP_CMD.to_string()
}

fn default_ping() -> String {
    PING_CMD.to_string()
}

fn default_dhcp_client() -> String {
    DHCLIENT_CMD.to_string()
}

fn default_target() -> String {
    "8.8.8.8".to_string()
}

fn default_max_attempts() -> u32 {
    10
}

fn default_retry_delay() -> u64 {
    10
}

fn default_settle_delay() -> u64 {
    10
}

fn default_stabilize_delay() -> u64 {
    1000
}

fn default_probe_timeout() -> u64 {
    1
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            sysfs_root: default_sysfs_root(),
            resolv_conf: default_resolv_conf(),
            record_dir: default_record_dir(),
        }
    }
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            ip: default_ip(),
            ping: default_ping(),
            dhcp_client: default_dhcp_client(),
        }
    }
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            target: default_target(),
            max_attempts: default_max_attempts(),
            retry_delay_secs: default_retry_delay(),
            settle_delay_secs: default_settle_delay(),
            stabilize_delay_ms: default_stabilize_delay(),
            probe_timeout_secs: default_probe_timeout(),
            bounce_on_escalation: false,
        }
    }
}

impl EthlinkdConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                EthlinkdError::Configuration(format!(
                    "Failed to parse config file {}: {}",
                    path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "Daemon config not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(EthlinkdError::Io(e)),
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.verify.retry_delay_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.verify.settle_delay_secs)
    }

    pub fn stabilize_delay(&self) -> Duration {
        Duration::from_millis(self.verify.stabilize_delay_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.verify.probe_timeout_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.verify.max_attempts == 0 {
            return Err(EthlinkdError::Configuration(
                "max_attempts must be > 0".to_string(),
            ));
        }

        if self.verify.target.trim().is_empty() {
            return Err(EthlinkdError::Configuration(
                "verify target must not be empty".to_string(),
            ));
        }

        if self.verify.probe_timeout_secs == 0 {
            return Err(EthlinkdError::Configuration(
                "probe_timeout_secs must be > 0".to_string(),
            ));
        }

        for (name, path) in [
            ("sysfs_root", &self.paths.sysfs_root),
            ("resolv_conf", &self.paths.resolv_conf),
            ("record_dir", &self.paths.record_dir),
        ] {
            if path.as_os_str().is_empty() {
                return Err(EthlinkdError::Configuration(format!(
                    "{} must not be empty",
                    name
                )));
            }
        }

        for (name, cmd) in [
            ("ip", &self.commands.ip),
            ("ping", &self.commands.ping),
            ("dhcp_client", &self.commands.dhcp_client),
        ] {
            if cmd.trim().is_empty() {
                return Err(EthlinkdError::Configuration(format!(
                    "command {} must not be empty",
                    name
                )));
            }
        }

        Ok(())
    }
}

/// Log verbosity selected on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebugLevel {
    /// Errors only
    Error = 0,
    /// Transitions and outcomes
    #[default]
    Info = 1,
    /// Every collaborator call
    Verbose = 2,
    /// Command output and raw reads
    Noisy = 3,
}

impl DebugLevel {
    /// Map a raw CLI value; `None` when outside 0-3
    pub fn try_from_raw(level: u8) -> Option<Self> {
        match level {
            0 => Some(DebugLevel::Error),
            1 => Some(DebugLevel::Info),
            2 => Some(DebugLevel::Verbose),
            3 => Some(DebugLevel::Noisy),
            _ => None,
        }
    }

    /// Parse a command-line level; anything but 0..=3 is `None`
    pub fn from_arg(raw: &str) -> Option<Self> {
        raw.trim().parse::<u8>().ok().and_then(Self::try_from_raw)
    }

    /// Tracing level for this verbosity
    pub fn tracing_level(self) -> Level {
        match self {
            DebugLevel::Error => Level::ERROR,
            DebugLevel::Info => Level::INFO,
            DebugLevel::Verbose => Level::DEBUG,
            DebugLevel::Noisy => Level::TRACE,
        }
    }
}
