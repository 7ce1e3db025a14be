//! Script monitor: one diagnostic sensor counting running scripts, with
//! per-script memory and error details as JSON attributes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::Domain;
use crate::device::DeviceIdentity;
use crate::entity::{config_topic, Availability};
use crate::host::{DeviceApi, Publisher, Qos};

const OBJECT_ID: &str = "scripts_monitor";
const DATA_TOPIC: &str = "scripts";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScriptsPayload {
    pub name: &'static str,
    pub unique_id: String,
    pub state_topic: String,
    pub json_attributes_topic: String,
    pub value_template: &'static str,
    pub json_attributes_template: &'static str,
    pub entity_category: &'static str,
    pub icon: &'static str,
    pub availability: Vec<Availability>,
    pub device: DeviceIdentity,
}

impl ScriptsPayload {
    pub fn new(identity: &DeviceIdentity, base_prefix: &str) -> Self {
        let state_topic = data_topic(base_prefix);
        Self {
            name: "Scripts",
            unique_id: format!("{}_scripts", identity.mac()),
            json_attributes_topic: state_topic.clone(),
            state_topic,
            value_template: "{{ value_json.running_count }}",
            json_attributes_template:
                "{{ {'scripts': value_json.scripts, 'scripts_mem_free': value_json.scripts_mem_free } | tojson }}",
            entity_category: "diagnostic",
            icon: "mdi:script-text-outline",
            availability: vec![Availability {
                topic: format!("{}/online", base_prefix),
                payload_available: "true",
                payload_not_available: "false",
            }],
            device: identity.clone(),
        }
    }

    pub fn config_topic(&self, discovery_prefix: &str) -> String {
        config_topic(discovery_prefix, Domain::Sensor, self.device.mac(), OBJECT_ID)
    }
}

pub fn data_topic(base_prefix: &str) -> String {
    format!("{}/status/{}", base_prefix, DATA_TOPIC)
}

/// One entry of `Script.List`, merged with the script's live status.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ScriptStats {
    pub id: u32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub mem_used: Option<u64>,
    #[serde(default)]
    pub mem_peak: Option<u64>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub error_msg: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScriptsReport {
    pub scripts: Vec<ScriptStats>,
    pub running_count: usize,
    pub scripts_mem_free: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ScriptList {
    #[serde(default)]
    scripts: Vec<ScriptStats>,
}

#[derive(Debug, Default, Deserialize)]
struct ScriptStatus {
    #[serde(default)]
    running: bool,
    mem_used: Option<u64>,
    mem_peak: Option<u64>,
    mem_free: Option<u64>,
    #[serde(default)]
    errors: Vec<String>,
    error_msg: Option<String>,
}

/// Merge a `Script.List` result with each script's `script:{id}` status.
/// Free script memory is device-wide; the last script's reading wins.
pub fn collect(list: &Value, device: &dyn DeviceApi) -> ScriptsReport {
    let listed = match serde_json::from_value::<ScriptList>(list.clone()) {
        Ok(l) => l.scripts,
        Err(e) => {
            tracing::warn!("Unreadable script list: {}", e);
            Vec::new()
        }
    };

    let mut report = ScriptsReport::default();
    for mut stats in listed {
        let status: ScriptStatus = device
            .status(&format!("script:{}", stats.id))
            .ok()
            .and_then(|s| serde_json::from_value(s).ok())
            .unwrap_or_default();

        stats.running = status.running;
        stats.mem_used = status.mem_used;
        stats.mem_peak = status.mem_peak;
        stats.errors = status.errors;
        stats.error_msg = status.error_msg;

        if stats.running {
            report.running_count += 1;
        }
        if status.mem_free.is_some() {
            report.scripts_mem_free = status.mem_free;
        }
        report.scripts.push(stats);
    }
    report
}

/// Publish the retained discovery config of the monitor sensor.
pub fn publish_discovery(
    publisher: &mut dyn Publisher,
    identity: &DeviceIdentity,
    base_prefix: &str,
    discovery_prefix: &str,
) {
    let payload = ScriptsPayload::new(identity, base_prefix);
    let body = match serde_json::to_string(&payload) {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!("Failed to serialize scripts monitor: {}", e);
            return;
        }
    };
    if let Err(e) = publisher.publish(&payload.config_topic(discovery_prefix), &body, Qos::AtLeastOnce, true) {
        tracing::warn!("{}", e);
    }
}

/// Publish the current script report, not retained.
pub fn publish_data(publisher: &mut dyn Publisher, list: &Value, device: &dyn DeviceApi, base_prefix: &str) -> bool {
    let report = collect(list, device);
    let body = match serde_json::to_string(&report) {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!("Failed to serialize script report: {}", e);
            return false;
        }
    };
    tracing::debug!(running = report.running_count, "Publishing script report");
    match publisher.publish(&data_topic(base_prefix), &body, Qos::AtLeastOnce, false) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("{}", e);
            false
        }
    }
}
