//! MQTT bridge: connects to the broker, fetches the device over RPC and
//! drives the discovery scheduler from one tokio task.
//!
//! Events handled by the main loop:
//!   ConnAck          -> fetch device snapshot, start a discovery run
//!   discovery timer  -> scheduler tick (one publish); Data-phase ticks
//!                       re-fetch the status first
//!   refresh interval -> re-fetch; rediscover on config change, otherwise
//!                       republish the refresh components (idle only)
//!
//! Decisions live in [`Bridge`]. RPC fetches are awaited inline, so a slow
//! device stalls MQTT polling for up to `http_timeout_secs` per call. A
//! snapshot makes up to five calls, so keep `keep_alive_secs` well above
//! that.

use std::time::Duration;

use rumqttc::{AsyncClient, Event, MqttOptions, Packet};
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::bridge::Bridge;
use crate::config::{BridgeConfig, MqttConfig};
use crate::error::PublishError;
use crate::host::{Publisher, Qos, Timer, TimerHandle};
use crate::integrations::shelly::ShellyRpc;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Fire-and-forget publisher on top of the rumqttc request queue.
pub struct MqttPublisher {
    client: AsyncClient,
}

impl MqttPublisher {
    pub fn new(client: AsyncClient) -> Self {
        Self { client }
    }
}

impl Publisher for MqttPublisher {
    fn publish(&mut self, topic: &str, payload: &str, qos: Qos, retain: bool) -> Result<(), PublishError> {
        self.client
            .try_publish(topic, qos.into(), retain, payload.as_bytes().to_vec())
            .map_err(|e| PublishError {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Single repeating timer backed by a tokio [`Interval`].
#[derive(Default)]
pub struct IntervalTimer {
    next: u64,
    active: Option<(TimerHandle, Interval)>,
}

impl IntervalTimer {
    #[cfg(test)]
    pub fn is_armed(&self) -> bool {
        self.active.is_some()
    }

    /// Resolves on the next period of the armed timer. Never resolves
    /// while nothing is armed.
    pub async fn wait(&mut self) -> TimerHandle {
        match self.active.as_mut() {
            Some((handle, interval)) => {
                interval.tick().await;
                *handle
            }
            None => std::future::pending().await,
        }
    }
}

impl Timer for IntervalTimer {
    fn set_repeating(&mut self, period: Duration) -> TimerHandle {
        self.next += 1;
        let handle = TimerHandle(self.next);
        // first tick one period from now, not immediately
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.active = Some((handle, interval));
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        if self.active.as_ref().map(|(h, _)| *h) == Some(handle) {
            self.active = None;
        }
    }
}

pub fn mqtt_options(config: &MqttConfig) -> MqttOptions {
    let client_id = config
        .client_id
        .clone()
        .unwrap_or_else(|| format!("shelly-discovery-{}", uuid::Uuid::new_v4().simple()));

    let mut opts = MqttOptions::new(client_id, &config.host, config.port);
    opts.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));

    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        opts.set_credentials(username, password);
    }
    opts
}

/// Run the bridge until the process is stopped.
pub async fn run_bridge(config: BridgeConfig) -> anyhow::Result<()> {
    let rpc = ShellyRpc::new(&config.device).with_scripts(config.discovery.scripts_monitor);
    let (client, mut eventloop) = AsyncClient::new(mqtt_options(&config.mqtt), 64);
    let mut publisher = MqttPublisher::new(client);
    let mut timer = IntervalTimer::default();
    let mut bridge = Bridge::new(config.discovery.clone());

    let period = Duration::from_secs(config.discovery.components_refresh_period_secs.max(1));
    let mut refresh_interval = tokio::time::interval(period);
    refresh_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Skip the first immediate tick
    refresh_interval.tick().await;

    tracing::info!(
        device = %rpc.host(),
        broker = %format!("{}:{}", config.mqtt.host, config.mqtt.port),
        "Shelly discovery bridge starting",
    );

    loop {
        tokio::select! {
            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    tracing::info!("Connected to MQTT broker");
                    match rpc.fetch_snapshot().await {
                        Ok(fresh) => bridge.connected(fresh, &mut publisher, &mut timer),
                        Err(e) => tracing::warn!("Device fetch failed: {}", e),
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    if bridge.is_connected() {
                        tracing::warn!("MQTT connection lost: {}", e);
                    } else {
                        tracing::debug!("MQTT connect failed: {}", e);
                    }
                    bridge.disconnected();
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            },

            _ = timer.wait() => {
                if bridge.wants_fresh_status() {
                    match rpc.fetch_status().await {
                        Ok(status) => bridge.update_status(status),
                        Err(e) => tracing::warn!("Status fetch failed, republishing last known: {}", e),
                    }
                }
                bridge.tick(&mut publisher, &mut timer);
            }

            _ = refresh_interval.tick() => {
                if !bridge.refresh_due() {
                    continue;
                }
                match rpc.fetch_snapshot().await {
                    Ok(fresh) => {
                        bridge.refresh(fresh, &mut publisher, &mut timer);
                    }
                    Err(e) => tracing::warn!("Device fetch failed: {}", e),
                }
            }
        }
    }
}
