//! Bridge state: what the event loop does with a connect, a timer tick or a
//! refresh period, decided synchronously so it can run against fakes.
//!
//! The async side (`mqtt::run_bridge`) only fetches documents and waits on
//! timers; every decision about triggering, skipping or republishing is
//! made here.

use serde_json::{Map, Value};

use crate::config::DiscoveryConfig;
use crate::device::{self, DeviceIdentity};
use crate::host::{Publisher, Timer};
use crate::integrations::shelly::DeviceSnapshot;
use crate::refresh;
use crate::scheduler::{DiscoveryScheduler, Phase};
use crate::scripts;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Disconnected, or a run is active.
    Skipped,
    /// Configuration changed; a new run was started.
    Rediscovered,
    /// Number of status messages republished.
    Refreshed(usize),
}

pub struct Bridge {
    scheduler: DiscoveryScheduler,
    /// Last fetched device state. Its config is the change-detection baseline.
    snapshot: Option<DeviceSnapshot>,
    connected: bool,
}

impl Bridge {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self {
            scheduler: DiscoveryScheduler::new(config),
            snapshot: None,
            connected: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Broker connection lost.
    pub fn disconnected(&mut self) {
        self.connected = false;
    }

    /// Broker (re)connected with a freshly fetched device. Always starts a
    /// run unless one is already active.
    pub fn connected(&mut self, fresh: DeviceSnapshot, publisher: &mut dyn Publisher, timer: &mut dyn Timer) {
        self.connected = true;
        self.rediscover(fresh, publisher, timer);
    }

    /// Whether a refresh period should fetch the device at all. A run in
    /// progress keeps the old snapshot as the baseline.
    pub fn refresh_due(&self) -> bool {
        self.connected && !self.scheduler.is_running()
    }

    /// Data-phase ticks republish status, which should be current rather
    /// than the copy taken when the run was triggered.
    pub fn wants_fresh_status(&self) -> bool {
        self.scheduler.phase() == Some(Phase::Data)
    }

    pub fn update_status(&mut self, status: Map<String, Value>) {
        if let Some(snapshot) = self.snapshot.as_mut() {
            snapshot.replace_status(status);
        }
    }

    pub fn tick(&mut self, publisher: &mut dyn Publisher, timer: &mut dyn Timer) {
        if let Some(device) = self.snapshot.as_ref() {
            self.scheduler.tick(device, publisher, timer);
        }
    }

    pub fn refresh(
        &mut self,
        fresh: DeviceSnapshot,
        publisher: &mut dyn Publisher,
        timer: &mut dyn Timer,
    ) -> RefreshOutcome {
        if !self.refresh_due() {
            return RefreshOutcome::Skipped;
        }

        let changed = self.snapshot.as_ref().map_or(true, |old| old.config_changed(&fresh));
        if changed {
            tracing::info!("Device configuration changed, rediscovering");
            self.rediscover(fresh, publisher, timer);
            return RefreshOutcome::Rediscovered;
        }

        let prefix = device::topic_prefix(&fresh);
        let mut published =
            refresh::publish_components(&fresh, publisher, &prefix, &self.scheduler.config().components_refresh);
        if let Some(list) = self.scripts_list(&fresh) {
            if scripts::publish_data(publisher, list, &fresh, &prefix) {
                published += 1;
            }
        }
        tracing::debug!("Refreshed {} components", published);

        self.snapshot = Some(fresh);
        RefreshOutcome::Refreshed(published)
    }

    fn rediscover(&mut self, fresh: DeviceSnapshot, publisher: &mut dyn Publisher, timer: &mut dyn Timer) {
        let was_running = self.scheduler.is_running();
        self.scheduler.trigger(&fresh, timer);

        if !was_running {
            if let Some(list) = self.scripts_list(&fresh) {
                let config = self.scheduler.config();
                let prefix = device::topic_prefix(&fresh);
                let identity = DeviceIdentity::from_device(&fresh, config);
                scripts::publish_discovery(publisher, &identity, &prefix, &config.discovery_prefix);
                scripts::publish_data(publisher, list, &fresh, &prefix);
            }
        }
        self.snapshot = Some(fresh);
    }

    fn scripts_list<'a>(&self, snapshot: &'a DeviceSnapshot) -> Option<&'a Value> {
        if self.scheduler.config().scripts_monitor {
            snapshot.scripts.as_ref()
        } else {
            None
        }
    }
}
