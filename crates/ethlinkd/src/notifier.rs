//! Service manager notifications
//!
//! Readiness and per-transition status messages, sent over the systemd
//! notify socket when the daemon runs with `Type=notify`.

use crate::types::ControllerState;
use tracing::{debug, warn};

/// Outbound notification on controller state transitions
pub trait StateNotifier: Send + Sync {
    /// Report a state transition with a short human-readable detail
    fn notify_state(&self, state: ControllerState, detail: &str);

    /// Report that startup finished and the watch is live
    fn notify_ready(&self);
}

/// Notifier backed by the systemd notify socket.
///
/// Enabled when the NOTIFY_SOCKET environment variable is set; otherwise
/// every call is a debug log line.
#[derive(Clone, Debug)]
pub struct SystemdNotifier {
    enabled: bool,
}

impl SystemdNotifier {
    pub fn new() -> Self {
        let enabled = std::env::var_os("NOTIFY_SOCKET").is_some();
        if enabled {
            debug!("Systemd notification socket detected");
        }
        Self { enabled }
    }

    #[cfg(test)]
    fn disabled() -> Self {
        Self { enabled: false }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn send(&self, states: &[sd_notify::NotifyState<'_>]) {
        // Keep NOTIFY_SOCKET set so later status updates still reach systemd
        if let Err(e) = sd_notify::notify(false, states) {
            warn!(error = %e, "Failed to send systemd notification");
        }
    }
}

impl Default for SystemdNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl StateNotifier for SystemdNotifier {
    fn notify_state(&self, state: ControllerState, detail: &str) {
        let status = format!("{}: {}", state, detail);
        if !self.enabled {
            debug!(status = %status, "Status");
            return;
        }
        self.send(&[sd_notify::NotifyState::Status(&status)]);
    }

    fn notify_ready(&self) {
        if !self.enabled {
            debug!("Ready");
            return;
        }
        self.send(&[sd_notify::NotifyState::Ready]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_notifier_is_silent() {
        let notifier = SystemdNotifier::disabled();
        assert!(!notifier.is_enabled());
        notifier.notify_ready();
        notifier.notify_state(ControllerState::Converged, "eth0 verified");
    }
}
