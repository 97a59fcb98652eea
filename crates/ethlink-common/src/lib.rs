//! Common infrastructure for the ethlinkd link supervisor.
//!
//! This crate holds the pieces of the daemon that do not depend on the
//! reconciliation logic itself:
//!
//! - [`shell`]: Async shell command execution with proper quoting
//! - [`mac`]: MAC address parsing and the compact form used in record names
//! - [`error`]: Error types shared by every collaborator
//!
//! # Example
//!
//! ```ignore
//! use ethlink_common::{
//!     shell::{self, IP_CMD, shellquote},
//!     error::EthResult,
//! };
//!
//! async fn flush(device: &str) -> EthResult<()> {
//!     let cmd = format!("{} addr flush dev {}", IP_CMD, shellquote(device));
//!     shell::run_checked(&cmd).await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod mac;
pub mod shell;

// Re-export commonly used items at crate root
pub use error::{EthError, EthResult};
pub use mac::MacAddress;
