//! Ethernet link supervisor
//!
//! ethlinkd keeps one network interface connected:
//! - Watches the carrier bit through inotify on sysfs
//! - Applies a static or DHCP configuration when the link comes up
//! - Persists a per-device record keyed by name and MAC
//! - Verifies reachability with bounded linear retries
//! - Escalates to a full reconfigure, then fails hard

pub mod applier;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod inspector;
pub mod notifier;
pub mod record;
pub mod static_config;
pub mod store;
pub mod types;

pub use applier::{NetworkApplier, ShellApplier};
pub use config::{DebugLevel, EthlinkdConfig};
pub use controller::{ReconcileController, VerifyPolicy, resolve_desired_config};
pub use error::{EthlinkdError, Result};
pub use events::{CarrierWatcher, LinkEventSource};
pub use inspector::{InterfaceInspector, SystemInspector};
pub use notifier::{StateNotifier, SystemdNotifier};
pub use static_config::{load_static_config, parse_static_config};
pub use store::{ConfigStore, FileConfigStore};
pub use types::{
    ControllerState, DeviceIdentity, InterfaceAddressing, LinkEvent, LinkState, NetworkConfig,
    ReconciliationAttempt, StaticConfig,
};
