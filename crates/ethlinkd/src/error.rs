//! Error types for ethlinkd

use ethlink_common::EthError;
use thiserror::Error;

/// Link supervisor daemon errors
#[derive(Error, Debug)]
pub enum EthlinkdError {
    /// Error reported by an inspector, applier, store or event source
    #[error(transparent)]
    Link(#[from] EthError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The daemon lacks the privileges to reconfigure interfaces
    #[error("Insufficient privileges: {0}")]
    Privilege(String),

    /// Connectivity could not be restored even after escalation
    #[error("Reconfiguration of {device} failed: {target} unreachable after {attempts} attempts")]
    ReconfigurationExhausted {
        /// Device being reconciled
        device: String,
        /// Reachability target
        target: String,
        /// Probes issued in the primary loop
        attempts: u32,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for ethlinkd operations
pub type Result<T> = std::result::Result<T, EthlinkdError>;
