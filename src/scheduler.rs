//! Incremental discovery publisher.
//!
//! A run publishes one discovery config per timer tick, then (optionally)
//! one status refresh per touched topic per tick, then stops its timer and
//! drops all run state. Per-tick work is O(1) regardless of device size.
//!
//!   Discovery ──queue drained──▶ Data ──topics drained──▶ Finished
//!
//! Triggers arriving while a run is active are dropped, not queued.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use crate::catalog::CONTROLLABLE;
use crate::config::DiscoveryConfig;
use crate::device::{self, DeviceIdentity};
use crate::entity::{self, config_topic, LiveInstanceConfig, RunContext};
use crate::enumerate::{self, WorkItem};
use crate::host::{DeviceApi, Publisher, Qos, Timer, TimerHandle};
use crate::template;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Discovery,
    Data,
    Finished,
}

/// State of the one active run. Created on trigger, dropped on Finished.
#[derive(Debug)]
pub struct RunState {
    pub phase: Phase,
    queue: VecDeque<WorkItem>,
    /// Work items consumed so far.
    pub cursor: usize,
    touched: VecDeque<String>,
    touched_seen: HashSet<String>,
    pub context: RunContext,
    timer: Option<TimerHandle>,
}

#[cfg(test)]
impl RunState {
    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    /// Component topics still waiting for their status refresh.
    pub fn touched_topics(&self) -> impl Iterator<Item = &str> {
        self.touched.iter().map(String::as_str)
    }
}

impl RunState {
    fn touch(&mut self, topic: &str) {
        if self.touched_seen.insert(topic.to_string()) {
            self.touched.push_back(topic.to_string());
        }
    }
}

pub struct DiscoveryScheduler {
    config: DiscoveryConfig,
    run: Option<RunState>,
}

impl DiscoveryScheduler {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self { config, run: None }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.run.is_some()
    }

    /// Phase of the active run, `None` when idle.
    pub fn phase(&self) -> Option<Phase> {
        self.run.as_ref().map(|run| run.phase)
    }

    #[cfg(test)]
    pub fn run_state(&self) -> Option<&RunState> {
        self.run.as_ref()
    }

    /// Start a discovery run unless one is already active.
    pub fn trigger(&mut self, device: &dyn DeviceApi, timer: &mut dyn Timer) {
        if self.run.is_some() {
            tracing::debug!("Discovery already running, trigger ignored");
            return;
        }

        let collected = enumerate::precollect(device, &self.config);
        let context = RunContext {
            identity: DeviceIdentity::from_device(device, &self.config),
            base_prefix: device::topic_prefix(device),
            instance_counts: collected.instance_counts,
        };

        tracing::info!(
            mac = %context.identity.mac(),
            prefix = %context.base_prefix,
            "Discovery run started with {} entities",
            collected.queue.len(),
        );

        self.run = Some(RunState {
            phase: Phase::Discovery,
            queue: collected.queue.into(),
            cursor: 0,
            touched: VecDeque::new(),
            touched_seen: HashSet::new(),
            context,
            timer: None,
        });

        if self.settle() {
            self.finish(timer);
            return;
        }

        let period = Duration::from_millis(self.config.publish_pause_ms);
        if let Some(run) = self.run.as_mut() {
            run.timer = Some(timer.set_repeating(period));
        }
    }

    /// One timer callback: publish at most one discovery config or one
    /// status refresh, then advance the phase if the current one is drained.
    pub fn tick(&mut self, device: &dyn DeviceApi, publisher: &mut dyn Publisher, timer: &mut dyn Timer) {
        let Some(run) = self.run.as_mut() else {
            return;
        };

        match run.phase {
            Phase::Discovery => {
                if let Some(item) = run.queue.pop_front() {
                    run.cursor += 1;
                    publish_entity(&self.config, run, &item, device, publisher);
                    run.touch(&item.instance.topic);
                }
            }
            Phase::Data => {
                if let Some(topic) = run.touched.pop_front() {
                    publish_status(&run.context, &topic, device, publisher);
                }
            }
            Phase::Finished => {}
        }

        if self.settle() {
            self.finish(timer);
        }
    }

    /// Move past drained phases. Returns true once the run is finished.
    fn settle(&mut self) -> bool {
        let publish_init_data = self.config.publish_init_data;
        let Some(run) = self.run.as_mut() else {
            return false;
        };

        if run.phase == Phase::Discovery && run.queue.is_empty() {
            run.phase = Phase::Data;
            tracing::debug!(topics = run.touched.len(), "Discovery phase done");
        }
        if run.phase == Phase::Data && (!publish_init_data || run.touched.is_empty()) {
            run.phase = Phase::Finished;
        }
        run.phase == Phase::Finished
    }

    fn finish(&mut self, timer: &mut dyn Timer) {
        if let Some(run) = self.run.take() {
            if let Some(handle) = run.timer {
                timer.cancel(handle);
            }
            tracing::info!(published = run.cursor, "Discovery run finished");
        }
    }
}

fn publish_entity(
    config: &DiscoveryConfig,
    run: &RunState,
    item: &WorkItem,
    device: &dyn DeviceApi,
    publisher: &mut dyn Publisher,
) {
    let live = LiveInstanceConfig::read(device, item, config);
    let Some(entity) = entity::build(item, &run.context, &live, config) else {
        tracing::debug!(topic = %item.instance.topic, "No catalog entry for {}", item.raw_attribute);
        return;
    };

    let payload = match serde_json::to_string(&entity.payload) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!("Failed to serialize {}: {}", entity.object_id, e);
            return;
        }
    };

    let mac = run.context.identity.mac();

    // A switch reconfigured as a light must not leave the switch behind
    if entity.domain.is_controllable() {
        for other in CONTROLLABLE.iter().filter(|d| **d != entity.domain) {
            let stale = config_topic(&config.discovery_prefix, *other, mac, &entity.object_id);
            send(publisher, &stale, "", true);
        }
    }

    let topic = entity.config_topic(&config.discovery_prefix, mac);
    tracing::debug!(topic = %topic, "Publishing {}", entity.payload.name);
    send(publisher, &topic, &payload, true);

    preview(&entity.payload, &item.instance.topic, device);
}

fn preview(payload: &entity::EntityPayload, topic: &str, device: &dyn DeviceApi) {
    let (Some(tmpl), Ok(status)) = (payload.template(), device.status(topic)) else {
        return;
    };
    match template::render_value(tmpl, &status) {
        Ok(value) => tracing::debug!(entity = %payload.unique_id, "Initial value {}", value),
        Err(e) => tracing::warn!(entity = %payload.unique_id, "Value template does not match status: {}", e),
    }
}

fn publish_status(context: &RunContext, topic: &str, device: &dyn DeviceApi, publisher: &mut dyn Publisher) {
    match device.status(topic) {
        Ok(status) => send(publisher, &context.state_topic(topic), &status.to_string(), false),
        Err(_) => tracing::debug!(topic = %topic, "Component gone before status refresh"),
    }
}

fn send(publisher: &mut dyn Publisher, topic: &str, payload: &str, retain: bool) {
    if let Err(e) = publisher.publish(topic, payload, Qos::AtLeastOnce, retain) {
        tracing::warn!("{}", e);
    }
}
