//! Precollection: walk the device's components and queue one work item per
//! publishable attribute.
//!
//! The number of instances of a component type is not known up front. A type
//! is queried as a singleton first; if that is absent, `type:0`, `type:1`, ...
//! are queried until the first absent index.

use std::collections::HashMap;

use serde_json::Value;

use crate::alias;
use crate::catalog;
use crate::config::{DiscoveryConfig, TemperatureUnit};
use crate::error::Absent;
use crate::host::DeviceApi;

/// Built-in component types, in publish order.
pub const COMPONENT_TYPES: [&str; 12] = [
    "switch",
    "pm1",
    "wifi",
    "em",
    "em1",
    "emdata",
    "em1data",
    "temperature",
    "cover",
    "humidity",
    "voltmeter",
    "input",
];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComponentInstance {
    pub component_type: String,
    /// `None` for singletons such as `wifi`.
    pub index: Option<u32>,
    /// Key used by the device API and in MQTT topics (`switch:0`).
    pub topic: String,
}

impl ComponentInstance {
    pub fn singleton(component_type: &str) -> Self {
        Self {
            component_type: component_type.to_string(),
            index: None,
            topic: component_type.to_string(),
        }
    }

    pub fn indexed(component_type: &str, index: u32) -> Self {
        Self {
            component_type: component_type.to_string(),
            index: Some(index),
            topic: format!("{}:{}", component_type, index),
        }
    }

    /// Parse a component key (`temperature:100` or `wifi`).
    pub fn from_key(key: &str) -> Option<Self> {
        match key.split_once(':') {
            Some((component_type, index)) => {
                let index = index.parse().ok()?;
                Some(Self::indexed(component_type, index))
            }
            None if !key.is_empty() => Some(Self::singleton(key)),
            None => None,
        }
    }

    /// Topic with `:` separators removed, as used in object ids.
    pub fn object_id(&self) -> String {
        self.topic.replace(':', "")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub instance: ComponentInstance,
    /// Attribute name exactly as reported in the instance status.
    pub raw_attribute: String,
    /// Sourced from a sensor add-on peripheral.
    pub is_addon: bool,
}

#[derive(Debug, Default)]
pub struct Precollection {
    pub queue: Vec<WorkItem>,
    pub instance_counts: HashMap<String, usize>,
}

#[cfg(test)]
impl Precollection {
    pub fn instance_count(&self, component_type: &str) -> usize {
        self.instance_counts.get(component_type).copied().unwrap_or(0)
    }
}

pub fn lookup(device: &dyn DeviceApi, instance: &ComponentInstance) -> Result<Value, Absent> {
    device.status(&instance.topic)
}

/// Present instances of one component type, with their status.
///
/// Yields the singleton if it exists, otherwise `type:0`, `type:1`, ...
/// up to the first absent index. Script ids start at 1.
pub struct Instances<'a> {
    device: &'a dyn DeviceApi,
    component_type: &'a str,
    next: Option<u32>,
    singleton_checked: bool,
}

impl<'a> Iterator for Instances<'a> {
    type Item = (ComponentInstance, Value);

    fn next(&mut self) -> Option<Self::Item> {
        if !self.singleton_checked {
            self.singleton_checked = true;
            let instance = ComponentInstance::singleton(self.component_type);
            if let Ok(status) = lookup(self.device, &instance) {
                self.next = None;
                return Some((instance, status));
            }
            self.next = Some(first_index(self.component_type));
        }

        let index = self.next?;
        let instance = ComponentInstance::indexed(self.component_type, index);
        match lookup(self.device, &instance) {
            Ok(status) => {
                self.next = Some(index + 1);
                Some((instance, status))
            }
            Err(Absent) => {
                self.next = None;
                None
            }
        }
    }
}

fn first_index(component_type: &str) -> u32 {
    if component_type == "script" {
        1
    } else {
        0
    }
}

pub fn instances<'a>(device: &'a dyn DeviceApi, component_type: &'a str) -> Instances<'a> {
    Instances {
        device,
        component_type,
        next: None,
        singleton_checked: false,
    }
}

/// Raw attributes of a status document that become entities.
pub fn publishable_attributes<'s>(
    component_type: &'s str,
    status: &'s Value,
    unit: TemperatureUnit,
) -> impl Iterator<Item = &'s str> + 's {
    status
        .as_object()
        .into_iter()
        .flat_map(|map| map.keys())
        .map(String::as_str)
        .filter(move |raw| catalog::is_supported(alias::canonicalize(component_type, raw)))
        .filter(move |raw| !alias::is_temperature_variant(raw) || *raw == unit.field())
}

/// Build the work queue for one discovery run.
pub fn precollect(device: &dyn DeviceApi, config: &DiscoveryConfig) -> Precollection {
    let mut result = Precollection::default();
    let unit = config.temperature_unit;

    for component_type in COMPONENT_TYPES {
        let mut count = 0;
        for (instance, status) in instances(device, component_type) {
            count += 1;
            for raw in publishable_attributes(component_type, &status, unit) {
                result.queue.push(WorkItem {
                    instance: instance.clone(),
                    raw_attribute: raw.to_string(),
                    is_addon: false,
                });
            }
        }
        if count > 0 {
            result.instance_counts.insert(component_type.to_string(), count);
        }
    }

    collect_peripherals(device, unit, &mut result.queue);

    tracing::debug!(
        items = result.queue.len(),
        types = result.instance_counts.len(),
        "Precollection done"
    );
    result
}

fn collect_peripherals(device: &dyn DeviceApi, unit: TemperatureUnit, queue: &mut Vec<WorkItem>) {
    let peripherals = device.peripherals();
    let Some(groups) = peripherals.as_object() else {
        return;
    };

    for (kind, members) in groups {
        let Some(members) = members.as_object().filter(|m| !m.is_empty()) else {
            continue;
        };

        for key in members.keys() {
            let Some(instance) = ComponentInstance::from_key(key) else {
                tracing::debug!(peripheral = %kind, "Skipping malformed add-on key {}", key);
                continue;
            };
            let Ok(status) = lookup(device, &instance) else {
                break;
            };
            for raw in publishable_attributes(&instance.component_type, &status, unit) {
                queue.push(WorkItem {
                    instance: instance.clone(),
                    raw_attribute: raw.to_string(),
                    is_addon: true,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::fakes::FakeDevice;
    use serde_json::json;

    fn attrs(result: &Precollection) -> Vec<(String, String, bool)> {
        result
            .queue
            .iter()
            .map(|w| (w.instance.topic.clone(), w.raw_attribute.clone(), w.is_addon))
            .collect()
    }

    #[test]
    fn test_indexed_lookup_stops_at_first_absent() {
        let device = FakeDevice::new()
            .with_status("switch:0", json!({"id": 0, "output": true}))
            .with_status("switch:1", json!({"id": 1, "output": false}))
            .with_status("switch:2", json!({"id": 2, "output": false}));

        let found: Vec<String> = instances(&device, "switch").map(|(i, _)| i.topic).collect();
        assert_eq!(found, vec!["switch:0", "switch:1", "switch:2"]);
        assert_eq!(
            *device.queries.borrow(),
            vec!["switch", "switch:0", "switch:1", "switch:2", "switch:3"]
        );
    }

    #[test]
    fn test_singleton_skips_indexed_lookup() {
        let device = FakeDevice::new().with_status("wifi", json!({"rssi": -55, "sta_ip": "10.0.0.2"}));

        let found: Vec<ComponentInstance> = instances(&device, "wifi").map(|(i, _)| i).collect();
        assert_eq!(found, vec![ComponentInstance::singleton("wifi")]);
        assert_eq!(*device.queries.borrow(), vec!["wifi"]);
    }

    #[test]
    fn test_script_ids_start_at_one() {
        let device = FakeDevice::new()
            .with_status("script:1", json!({"id": 1, "running": true}))
            .with_status("script:2", json!({"id": 2, "running": false}));

        let found: Vec<String> = instances(&device, "script").map(|(i, _)| i.topic).collect();
        assert_eq!(found, vec!["script:1", "script:2"]);
        assert_eq!(*device.queries.borrow(), vec!["script", "script:1", "script:2", "script:3"]);
    }

    #[test]
    fn test_gap_in_indices_terminates() {
        // switch:1 missing: switch:2 is never reached
        let device = FakeDevice::new()
            .with_status("switch:0", json!({"output": true}))
            .with_status("switch:2", json!({"output": true}));

        let result = precollect(&device, &DiscoveryConfig::default());
        assert_eq!(result.instance_count("switch"), 1);
        assert_eq!(attrs(&result), vec![("switch:0".into(), "output".into(), false)]);
    }

    #[test]
    fn test_precollect_order_and_counts() {
        let device = FakeDevice::new()
            .with_status("switch:0", json!({"id": 0, "apower": 12.3, "voltage": 230.1, "output": true}))
            .with_status("switch:1", json!({"id": 1, "output": false, "source": "init"}))
            .with_status("wifi", json!({"sta_ip": "10.0.0.2", "status": "got ip", "rssi": -60}))
            .with_status("input:0", json!({"id": 0, "state": false}));

        let result = precollect(&device, &DiscoveryConfig::default());
        assert_eq!(
            attrs(&result),
            vec![
                ("switch:0".into(), "apower".into(), false),
                ("switch:0".into(), "voltage".into(), false),
                ("switch:0".into(), "output".into(), false),
                ("switch:1".into(), "output".into(), false),
                ("wifi".into(), "rssi".into(), false),
                ("input:0".into(), "state".into(), false),
            ]
        );
        assert_eq!(result.instance_count("switch"), 2);
        assert_eq!(result.instance_count("wifi"), 1);
        assert_eq!(result.instance_count("input"), 1);
        assert_eq!(result.instance_count("cover"), 0);
        assert!(!result.instance_counts.contains_key("cover"));
    }

    #[test]
    fn test_temperature_unit_selects_variant() {
        let device = FakeDevice::new().with_status("temperature:0", json!({"id": 0, "tC": 21.5, "tF": 70.7}));

        let result = precollect(&device, &DiscoveryConfig::default());
        assert_eq!(attrs(&result), vec![("temperature:0".into(), "tC".into(), false)]);

        let mut config = DiscoveryConfig::default();
        config.temperature_unit = TemperatureUnit::F;
        let result = precollect(&device, &config);
        assert_eq!(attrs(&result), vec![("temperature:0".into(), "tF".into(), false)]);
    }

    #[test]
    fn test_em_phase_attributes() {
        let device = FakeDevice::new().with_status(
            "em:0",
            json!({"id": 0, "a_current": 1.2, "a_voltage": 231.0, "a_act_power": 120.0,
                   "a_aprt_power": 130.0, "a_pf": 0.9, "a_freq": 50.0, "n_current": null,
                   "total_current": 1.2, "total_act_power": 120.0, "total_aprt_power": 130.0,
                   "user_calibrated_phase": []}),
        );

        let result = precollect(&device, &DiscoveryConfig::default());
        let raw: Vec<String> = result.queue.iter().map(|w| w.raw_attribute.clone()).collect();
        assert_eq!(
            raw,
            vec!["a_current", "a_voltage", "a_act_power", "a_aprt_power", "a_pf", "a_freq",
                 "total_act_power", "total_aprt_power"]
        );
    }

    #[test]
    fn test_addon_peripherals() {
        let device = FakeDevice::new()
            .with_status("switch:0", json!({"output": true}))
            .with_status("temperature:100", json!({"id": 100, "tC": 19.0, "tF": 66.2}))
            .with_status("temperature:101", json!({"id": 101, "tC": 20.0, "tF": 68.0}))
            .with_status("input:100", json!({"id": 100, "state": true}))
            .with_peripherals(json!({
                "ds18b20": {"temperature:100": {"addr": "40:255"}, "temperature:101": {"addr": "40:256"}},
                "digital_in": {"input:100": {}},
                "dht22": {},
            }));

        let result = precollect(&device, &DiscoveryConfig::default());
        assert_eq!(
            attrs(&result),
            vec![
                ("switch:0".into(), "output".into(), false),
                ("temperature:100".into(), "tC".into(), true),
                ("temperature:101".into(), "tC".into(), true),
                ("input:100".into(), "state".into(), true),
            ]
        );
        // add-ons do not count as built-in instances
        assert_eq!(result.instance_count("temperature"), 0);
        assert_eq!(result.instance_count("input"), 0);
    }

    #[test]
    fn test_absent_peripheral_ends_group() {
        let device = FakeDevice::new()
            .with_status("temperature:101", json!({"tC": 20.0}))
            .with_peripherals(json!({
                "ds18b20": {"temperature:100": {}, "temperature:101": {}},
            }));

        let result = precollect(&device, &DiscoveryConfig::default());
        assert!(result.queue.is_empty());
    }

    #[test]
    fn test_component_key_parsing() {
        assert_eq!(ComponentInstance::from_key("wifi"), Some(ComponentInstance::singleton("wifi")));
        assert_eq!(
            ComponentInstance::from_key("temperature:100"),
            Some(ComponentInstance::indexed("temperature", 100))
        );
        assert_eq!(ComponentInstance::from_key("switch:x"), None);
        assert_eq!(ComponentInstance::from_key(""), None);
        assert_eq!(ComponentInstance::indexed("switch", 0).object_id(), "switch0");
    }
}
