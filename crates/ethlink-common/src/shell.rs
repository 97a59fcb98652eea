//! Shell command execution.
//!
//! The applier and inspector drive `ip`, `ping` and the DHCP client through
//! `/bin/sh -c`, so configured command paths may carry extra arguments or
//! redirects. Interpolated values always go through [`shellquote`].
//!
//! ```ignore
//! use ethlink_common::shell::{self, IP_CMD, shellquote};
//!
//! let out = shell::run(&format!("{} link set dev {} up", IP_CMD, shellquote("eth0"))).await?;
//! if !out.succeeded() {
//!     eprintln!("{}", out.diagnostic());
//! }
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, trace};

use crate::error::{EthError, EthResult};

/// Default `ip` binary for link, address and route changes.
pub const IP_CMD: &str = "/sbin/ip";

/// Default `ping` binary for reachability probes.
pub const PING_CMD: &str = "/bin/ping";

/// Default ISC DHCP client.
pub const DHCLIENT_CMD: &str = "/sbin/dhclient";

/// Characters that keep their meaning inside double quotes.
static SPECIAL_IN_QUOTES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[$`"\\\n]"#).expect("static pattern"));

/// Wrap a value in double quotes, escaping `$`, `` ` ``, `"`, `\` and newline.
///
/// ```
/// use ethlink_common::shell::shellquote;
///
/// assert_eq!(shellquote("eth0"), "\"eth0\"");
/// assert_eq!(shellquote("a$b"), "\"a\\$b\"");
/// ```
pub fn shellquote(value: &str) -> String {
    format!("\"{}\"", SPECIAL_IN_QUOTES.replace_all(value, r"\$0"))
}

/// Captured result of a finished command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit status; -1 when the process was killed by a signal
    pub status: i32,
    /// Trimmed standard output
    pub stdout: String,
    /// Trimmed standard error
    pub stderr: String,
}

impl CommandOutput {
    pub fn succeeded(&self) -> bool {
        self.status == 0
    }

    /// The most useful text for an error message: stderr, else stdout
    pub fn diagnostic(&self) -> &str {
        if self.stderr.is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }
}

/// Run a command line through `/bin/sh -c`.
///
/// Only a spawn failure is an `Err`; a nonzero exit is reported through
/// [`CommandOutput::status`].
pub async fn run(cmd: &str) -> EthResult<CommandOutput> {
    debug!(command = %cmd, "Running");

    let output = Command::new("/bin/sh")
        .arg("-c")
        .arg(cmd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| EthError::ShellExec {
            command: cmd.to_string(),
            source,
        })?;

    let result = CommandOutput {
        status: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    };
    trace!(command = %cmd, status = result.status, stdout = %result.stdout, "Finished");
    Ok(result)
}

/// Run a command line and return its stdout, failing on a nonzero exit
pub async fn run_checked(cmd: &str) -> EthResult<String> {
    let out = run(cmd).await?;
    if !out.succeeded() {
        return Err(EthError::ShellCommandFailed {
            command: cmd.to_string(),
            exit_code: out.status,
            output: out.diagnostic().to_string(),
        });
    }
    Ok(out.stdout)
}
