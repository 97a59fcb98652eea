//! In-memory collaborators for driving the controller in tests.
//!
//! Every fake appends to a shared [`Journal`] so tests can assert on the
//! exact order of reads, writes, probes and state transitions.

#![allow(dead_code)]

use async_trait::async_trait;
use ethlink_common::{EthResult, MacAddress};
use ethlinkd::{
    ControllerState, DeviceIdentity, FileConfigStore, InterfaceAddressing, InterfaceInspector,
    LinkEvent, LinkEventSource, LinkState, NetworkApplier, NetworkConfig, ReconcileController,
    StateNotifier, StaticConfig, VerifyPolicy,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ReadLinkState,
    ReadAddressing,
    Probe(String),
    BringUp,
    BringDown,
    ApplyStatic(StaticConfig),
    ApplyDhcp,
    Flush,
    State(ControllerState),
}

#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<Call>>>);

impl Journal {
    pub fn push(&self, call: Call) {
        self.0.lock().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.0.lock().iter().filter(|c| pred(c)).count()
    }

    pub fn probes(&self) -> usize {
        self.count(|c| matches!(c, Call::Probe(_)))
    }

    pub fn states(&self) -> Vec<ControllerState> {
        self.0
            .lock()
            .iter()
            .filter_map(|c| match c {
                Call::State(s) => Some(*s),
                _ => None,
            })
            .collect()
    }

    /// Collaborator calls only, without state transitions
    pub fn actions(&self) -> Vec<Call> {
        self.0
            .lock()
            .iter()
            .filter(|c| !matches!(c, Call::State(_)))
            .cloned()
            .collect()
    }
}

/// Inspector answering from scripted queues; once a queue runs dry the
/// fallback value is returned.
pub struct FakeInspector {
    journal: Journal,
    links: Mutex<VecDeque<LinkState>>,
    link_fallback: LinkState,
    probes: Mutex<VecDeque<bool>>,
    probe_fallback: bool,
}

impl FakeInspector {
    pub fn new(journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
            links: Mutex::new(VecDeque::new()),
            link_fallback: LinkState::Up,
            probes: Mutex::new(VecDeque::new()),
            probe_fallback: true,
        }
    }

    pub fn links(self, states: impl IntoIterator<Item = LinkState>) -> Self {
        self.links.lock().extend(states);
        self
    }

    pub fn link_fallback(mut self, state: LinkState) -> Self {
        self.link_fallback = state;
        self
    }

    pub fn probes(self, results: impl IntoIterator<Item = bool>) -> Self {
        self.probes.lock().extend(results);
        self
    }

    pub fn probe_fallback(mut self, reachable: bool) -> Self {
        self.probe_fallback = reachable;
        self
    }
}

#[async_trait]
impl InterfaceInspector for FakeInspector {
    async fn read_link_state(&self, _device: &str) -> EthResult<LinkState> {
        self.journal.push(Call::ReadLinkState);
        Ok(self.links.lock().pop_front().unwrap_or(self.link_fallback))
    }

    async fn read_identity(&self, device: &str) -> EthResult<DeviceIdentity> {
        Ok(DeviceIdentity::new(device, mac()))
    }

    async fn read_addressing(&self, _device: &str) -> EthResult<InterfaceAddressing> {
        self.journal.push(Call::ReadAddressing);
        Ok(InterfaceAddressing::default())
    }

    async fn probe_reachable(&self, host: &str) -> bool {
        self.journal.push(Call::Probe(host.to_string()));
        self.probes.lock().pop_front().unwrap_or(self.probe_fallback)
    }
}

pub struct FakeApplier {
    journal: Journal,
}

impl FakeApplier {
    pub fn new(journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
        }
    }
}

#[async_trait]
impl NetworkApplier for FakeApplier {
    async fn bring_up(&self, _device: &str) -> EthResult<()> {
        self.journal.push(Call::BringUp);
        Ok(())
    }

    async fn bring_down(&self, _device: &str) -> EthResult<()> {
        self.journal.push(Call::BringDown);
        Ok(())
    }

    async fn apply_static(&self, _device: &str, config: &StaticConfig) -> EthResult<()> {
        self.journal.push(Call::ApplyStatic(config.clone()));
        Ok(())
    }

    async fn apply_dhcp(&self, _device: &str) -> EthResult<()> {
        self.journal.push(Call::ApplyDhcp);
        Ok(())
    }

    async fn flush(&self, _device: &str) -> EthResult<()> {
        self.journal.push(Call::Flush);
        Ok(())
    }
}

pub struct RecordingNotifier {
    journal: Journal,
}

impl RecordingNotifier {
    pub fn new(journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
        }
    }
}

impl StateNotifier for RecordingNotifier {
    fn notify_state(&self, state: ControllerState, _detail: &str) {
        self.journal.push(Call::State(state));
    }

    fn notify_ready(&self) {}
}

/// Event source replaying a fixed script, then ending
pub struct ScriptedEvents {
    events: VecDeque<EthResult<LinkEvent>>,
}

impl ScriptedEvents {
    pub fn new(events: impl IntoIterator<Item = EthResult<LinkEvent>>) -> Self {
        Self {
            events: events.into_iter().collect(),
        }
    }

    pub fn of(events: impl IntoIterator<Item = LinkEvent>) -> Self {
        Self::new(events.into_iter().map(Ok))
    }
}

#[async_trait]
impl LinkEventSource for ScriptedEvents {
    async fn next_event(&mut self) -> EthResult<Option<LinkEvent>> {
        match self.events.pop_front() {
            Some(event) => event.map(Some),
            None => Ok(None),
        }
    }
}

pub type TestController =
    ReconcileController<FakeInspector, FakeApplier, FileConfigStore, RecordingNotifier>;

pub fn mac() -> MacAddress {
    MacAddress::new([0x52, 0x54, 0x00, 0x12, 0x34, 0x56])
}

pub fn identity() -> DeviceIdentity {
    DeviceIdentity::new("eth0", mac())
}

pub fn static_config() -> StaticConfig {
    StaticConfig::new(Ipv4Addr::new(10, 0, 0, 5), Ipv4Addr::new(255, 255, 255, 0))
        .with_gateway(Ipv4Addr::new(10, 0, 0, 1))
}

pub fn controller(
    journal: &Journal,
    inspector: FakeInspector,
    record_dir: &Path,
    desired: NetworkConfig,
) -> TestController {
    ReconcileController::new(
        identity(),
        desired,
        VerifyPolicy::default(),
        inspector,
        FakeApplier::new(journal),
        FileConfigStore::new(record_dir),
        RecordingNotifier::new(journal),
    )
}
