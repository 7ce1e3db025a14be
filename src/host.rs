//! Collaborator seams of the discovery core.
//!
//! The core never talks to a device, a broker or a clock directly. It asks a
//! [`DeviceApi`] for component status and config, hands payloads to a
//! [`Publisher`], and arms/cancels a repeating [`Timer`]. The bridge in
//! `mqtt.rs` supplies real implementations; tests use [`fakes`].

use std::time::Duration;

use serde_json::Value;

use crate::error::{Absent, PublishError};

/// MQTT quality of service for a publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qos {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl From<Qos> for rumqttc::QoS {
    fn from(qos: Qos) -> Self {
        match qos {
            Qos::AtMostOnce => rumqttc::QoS::AtMostOnce,
            Qos::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
            Qos::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
        }
    }
}

/// Read access to the device's component API.
///
/// `key` is a component type for singletons (`wifi`) or `type:index` for
/// indexed instances (`switch:0`).
pub trait DeviceApi {
    /// Raw `Shelly.GetDeviceInfo` document.
    fn device_info(&self) -> Value;

    /// Status of one component instance. `Err(Absent)` when it does not exist.
    fn status(&self, key: &str) -> Result<Value, Absent>;

    /// Config of one component instance, `Value::Null` when unknown.
    fn config(&self, key: &str) -> Value;

    /// Sensor add-on peripherals grouped by kind:
    /// `{"ds18b20": {"temperature:100": {...}}, "digital_in": {}}`.
    fn peripherals(&self) -> Value;
}

pub trait Publisher {
    fn publish(&mut self, topic: &str, payload: &str, qos: Qos, retain: bool) -> Result<(), PublishError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerHandle(pub u64);

/// Repeating timer owned by the host. The host calls back into the
/// scheduler's `tick` once per period until the handle is cancelled.
pub trait Timer {
    fn set_repeating(&mut self, period: Duration) -> TimerHandle;
    fn cancel(&mut self, handle: TimerHandle);
}
