//! Error types shared by the link supervisor collaborators.
//!
//! Every inspector, applier, store and event-source operation reports one
//! of these. Only [`EthError::DeviceNotFound`] is ever fatal on its own; the
//! rest are absorbed and logged by the reconciliation controller.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for link supervisor operations.
pub type EthResult<T> = Result<T, EthError>;

/// Errors that can occur while inspecting or configuring an interface.
#[derive(Debug, Error)]
pub enum EthError {
    /// Failed to execute a shell command (spawn error).
    #[error("Failed to execute shell command '{command}': {source}")]
    ShellExec {
        /// The command that failed to execute.
        command: String,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Shell command returned non-zero exit code.
    #[error("Shell command failed: '{command}' (exit code {exit_code}): {output}")]
    ShellCommandFailed {
        /// The command that failed.
        command: String,
        /// The exit code.
        exit_code: i32,
        /// Combined stdout/stderr output.
        output: String,
    },

    /// The network device does not exist.
    #[error("Network device '{device}' not found")]
    DeviceNotFound {
        /// The device name.
        device: String,
    },

    /// A persisted configuration record could not be created.
    #[error("Failed to write configuration record {}: {source}", .path.display())]
    ConfigWriteFailed {
        /// The record path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// A persisted configuration record could not be removed.
    #[error("Failed to remove configuration record {}: {source}", .path.display())]
    ConfigRemoveFailed {
        /// The record path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// An interface configuration step failed.
    #[error("Failed to {operation} on '{device}': {message}")]
    ApplyFailed {
        /// The operation that failed (e.g. "assign address").
        operation: String,
        /// The device name.
        device: String,
        /// Error message.
        message: String,
    },

    /// Configuration validation error.
    #[error("Invalid configuration for {field}: {message}")]
    InvalidConfig {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// Change notification on the carrier file failed.
    #[error("Carrier watch failed: {message}")]
    Watch {
        /// Error message.
        message: String,
    },

    /// Generic IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl EthError {
    /// Creates a device not found error.
    pub fn device_not_found(device: impl Into<String>) -> Self {
        Self::DeviceNotFound {
            device: device.into(),
        }
    }

    /// Creates an apply failure.
    pub fn apply_failed(
        operation: impl Into<String>,
        device: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ApplyFailed {
            operation: operation.into(),
            device: device.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a carrier watch error.
    pub fn watch(message: impl Into<String>) -> Self {
        Self::Watch {
            message: message.into(),
        }
    }

    /// Returns true if this error must stop the daemon rather than be
    /// logged and absorbed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EthError::DeviceNotFound { .. })
    }
}
