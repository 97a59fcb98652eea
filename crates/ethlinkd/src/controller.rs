//! Link-state reconciliation controller
//!
//! Consumes link events one at a time and drives the inspector, applier and
//! record store until the device is configured and the reachability target
//! answers:
//!
//! ```text
//! AwaitingEvent -> Evaluating -> LinkIdle                          -> AwaitingEvent
//!                             -> ConfiguringLink -> Verifying -> Converged
//!                                                             -> Escalating -> Converged
//!                                                                           -> FatalExit
//! ```
//!
//! Collaborator failures are logged and absorbed here. Only an exhausted
//! escalation or a fatal event-source error ends the loop with an error.

use crate::config::EthlinkdConfig;
use crate::error::{EthlinkdError, Result};
use crate::applier::NetworkApplier;
use crate::events::LinkEventSource;
use crate::inspector::InterfaceInspector;
use crate::notifier::StateNotifier;
use crate::store::ConfigStore;
use crate::types::{
    ControllerState, DeviceIdentity, LinkEvent, LinkState, NetworkConfig, ReconciliationAttempt,
    StaticConfig,
};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

/// Retry, backoff and escalation policy for connectivity verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyPolicy {
    /// Host probed to confirm connectivity
    pub target: String,
    /// Probes in the primary loop
    pub max_attempts: u32,
    /// Fixed delay between failed probes
    pub retry_delay: Duration,
    /// Wait after the escalation reapply
    pub settle_delay: Duration,
    /// Wait before reading link state on each event
    pub stabilize_delay: Duration,
    /// Take the link down and up during escalation
    pub bounce_on_escalation: bool,
}

impl Default for VerifyPolicy {
    fn default() -> Self {
        Self {
            target: "8.8.8.8".to_string(),
            max_attempts: 10,
            retry_delay: Duration::from_secs(10),
            settle_delay: Duration::from_secs(10),
            stabilize_delay: Duration::from_secs(1),
            bounce_on_escalation: false,
        }
    }
}

impl VerifyPolicy {
    pub fn from_config(config: &EthlinkdConfig) -> Self {
        Self {
            target: config.verify.target.clone(),
            max_attempts: config.verify.max_attempts,
            retry_delay: config.retry_delay(),
            settle_delay: config.settle_delay(),
            stabilize_delay: config.stabilize_delay(),
            bounce_on_escalation: config.verify.bounce_on_escalation,
        }
    }
}

/// Pick the configuration for this run: the static override when present,
/// else a readable persisted record for the identity, else DHCP.
pub async fn resolve_desired_config<S: ConfigStore + ?Sized>(
    static_config: Option<StaticConfig>,
    store: &S,
    identity: &DeviceIdentity,
) -> NetworkConfig {
    if let Some(config) = static_config {
        info!(device = %identity.name, address = %config.cidr(), "Using static configuration");
        return NetworkConfig::Static(config);
    }

    match store.read(identity).await {
        Ok(Some(config)) => {
            info!(
                device = %identity.name,
                kind = config.kind(),
                "Using persisted configuration record"
            );
            config
        }
        Ok(None) => {
            info!(device = %identity.name, "No static configuration, using DHCP");
            NetworkConfig::Dhcp
        }
        Err(e) => {
            warn!(device = %identity.name, error = %e, "Persisted record unreadable, using DHCP");
            NetworkConfig::Dhcp
        }
    }
}

/// Reconciliation controller for a single device
pub struct ReconcileController<I, A, S, N> {
    identity: DeviceIdentity,
    desired: NetworkConfig,
    policy: VerifyPolicy,
    inspector: I,
    applier: A,
    store: S,
    notifier: N,
    state: ControllerState,
}

impl<I, A, S, N> ReconcileController<I, A, S, N>
where
    I: InterfaceInspector,
    A: NetworkApplier,
    S: ConfigStore,
    N: StateNotifier,
{
    pub fn new(
        identity: DeviceIdentity,
        desired: NetworkConfig,
        policy: VerifyPolicy,
        inspector: I,
        applier: A,
        store: S,
        notifier: N,
    ) -> Self {
        Self {
            identity,
            desired,
            policy,
            inspector,
            applier,
            store,
            notifier,
            state: ControllerState::AwaitingEvent,
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Process events until the source ends.
    ///
    /// Returns `Ok` when the source ends or fails with a non-fatal error,
    /// and `Err` on a fatal source error or exhausted reconfiguration.
    #[instrument(skip_all, fields(device = %self.identity.name))]
    pub async fn run<E>(&mut self, events: &mut E) -> Result<()>
    where
        E: LinkEventSource + ?Sized,
    {
        loop {
            self.transition(ControllerState::AwaitingEvent, "waiting for link event");

            match events.next_event().await {
                Ok(Some(event)) => {
                    self.handle_event(event).await?;
                }
                Ok(None) => {
                    info!("Link event source ended");
                    return Ok(());
                }
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "Link event source failed");
                    return Err(e.into());
                }
                Err(e) => {
                    error!(error = %e, "Link event source stopped, exiting");
                    return Ok(());
                }
            }
        }
    }

    /// Run one reconciliation cycle for an event
    #[instrument(skip(self), fields(device = %self.identity.name))]
    pub async fn handle_event(&mut self, event: LinkEvent) -> Result<ReconciliationAttempt> {
        sleep(self.policy.stabilize_delay).await;

        self.transition(ControllerState::Evaluating, "reading link state");
        let link_state = match self.inspector.read_link_state(&self.identity.name).await {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "Link state unreadable, treating as down");
                LinkState::Down
            }
        };
        let mut attempt = ReconciliationAttempt::new(link_state);

        if link_state == LinkState::Down {
            self.transition(ControllerState::LinkIdle, "link down");
            if let Err(e) = self.applier.flush(&self.identity.name).await {
                warn!(error = %e, "Flush failed");
            }
            return Ok(attempt);
        }

        let detail = format!("applying {} configuration", self.desired.kind());
        self.transition(ControllerState::ConfiguringLink, &detail);
        self.sync_record().await;
        attempt.config_applied = self.apply_desired().await;

        self.transition(ControllerState::Verifying, &format!("probing {}", self.policy.target));
        if self.verify(&mut attempt).await {
            self.converge(&mut attempt).await;
            return Ok(attempt);
        }

        self.escalate(&mut attempt).await?;
        Ok(attempt)
    }

    /// Primary verification loop: linear retries, stop at first success
    async fn verify(&self, attempt: &mut ReconciliationAttempt) -> bool {
        let max_attempts = self.policy.max_attempts;
        for n in 1..=max_attempts {
            attempt.probe_attempts += 1;
            if self.inspector.probe_reachable(&self.policy.target).await {
                debug!(attempt = n, max_attempts, target = %self.policy.target, "Target reachable");
                return true;
            }

            attempt.retry_count += 1;
            info!(attempt = n, max_attempts, target = %self.policy.target, "Target unreachable");
            if n < max_attempts {
                sleep(self.policy.retry_delay).await;
            }
        }
        false
    }

    async fn escalate(&mut self, attempt: &mut ReconciliationAttempt) -> Result<()> {
        attempt.escalated = true;
        let device = self.identity.name.clone();
        self.transition(ControllerState::Escalating, "reconfiguring from scratch");

        if let Err(e) = self.applier.flush(&device).await {
            warn!(error = %e, "Flush failed during escalation");
        }
        if self.policy.bounce_on_escalation {
            if let Err(e) = self.applier.bring_down(&device).await {
                warn!(error = %e, "Link down failed during escalation");
            }
            if let Err(e) = self.applier.bring_up(&device).await {
                warn!(error = %e, "Link up failed during escalation");
            }
        }
        attempt.config_applied = self.apply_desired().await;

        sleep(self.policy.settle_delay).await;
        attempt.probe_attempts += 1;
        if self.inspector.probe_reachable(&self.policy.target).await {
            self.converge(attempt).await;
            return Ok(());
        }

        self.transition(ControllerState::FatalExit, &format!("{} unreachable", self.policy.target));
        Err(EthlinkdError::ReconfigurationExhausted {
            device,
            target: self.policy.target.clone(),
            attempts: self.policy.max_attempts,
        })
    }

    async fn converge(&mut self, attempt: &mut ReconciliationAttempt) {
        attempt.verified = true;
        self.transition(
            ControllerState::Converged,
            &format!("{} reachable after {} probes", self.policy.target, attempt.probe_attempts),
        );

        match self.inspector.read_addressing(&self.identity.name).await {
            Ok(addr) => info!(
                ipv4 = ?addr.ipv4,
                netmask = ?addr.netmask,
                ipv6 = ?addr.ipv6,
                gateway = ?addr.gateway,
                dns = ?addr.dns_servers,
                domain = ?addr.dns_domain,
                "Interface addressing"
            ),
            Err(e) => debug!(error = %e, "Could not read interface addressing"),
        }
    }

    /// Create the record if absent; replace it if its content differs
    async fn sync_record(&self) {
        if self.store.exists(&self.identity).await {
            match self.store.read(&self.identity).await {
                Ok(Some(current)) if current == self.desired => {
                    debug!("Configuration record up to date");
                    return;
                }
                Ok(_) => info!("Configuration record differs, replacing"),
                Err(e) => warn!(error = %e, "Configuration record unreadable, replacing"),
            }
        }

        if let Err(e) = self.store.write(&self.identity, &self.desired).await {
            warn!(error = %e, "Failed to persist configuration record");
        }
    }

    /// Bring the link up and apply the desired config; true iff every step succeeded
    async fn apply_desired(&self) -> bool {
        let device = &self.identity.name;
        let mut applied = true;

        if let Err(e) = self.applier.bring_up(device).await {
            warn!(error = %e, "Link up failed");
            applied = false;
        }

        let result = match &self.desired {
            NetworkConfig::Static(config) => self.applier.apply_static(device, config).await,
            NetworkConfig::Dhcp => self.applier.apply_dhcp(device).await,
        };
        if let Err(e) = result {
            warn!(error = %e, "Applying configuration failed");
            applied = false;
        }

        applied
    }

    fn transition(&mut self, state: ControllerState, detail: &str) {
        self.state = state;
        match state {
            ControllerState::FatalExit => error!(state = %state, "{}", detail),
            ControllerState::AwaitingEvent => debug!(state = %state, "{}", detail),
            _ => info!(state = %state, "{}", detail),
        }
        self.notifier.notify_state(state, detail);
    }
}
