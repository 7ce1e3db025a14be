//! Periodic status refresh for components the device firmware does not
//! publish on its own (wifi signal, add-on temperature).

use crate::enumerate::{self, ComponentInstance};
use crate::host::{DeviceApi, Publisher, Qos};

/// Publish the current status of each listed component to
/// `{base_prefix}/status/{topic}`. A bare type (`wifi`) covers all of its
/// instances; `type:index` names exactly one. Returns the number published.
pub fn publish_components(
    device: &dyn DeviceApi,
    publisher: &mut dyn Publisher,
    base_prefix: &str,
    components: &[String],
) -> usize {
    let mut published = 0;

    for entry in components {
        let found: Vec<(ComponentInstance, serde_json::Value)> = if entry.contains(':') {
            ComponentInstance::from_key(entry)
                .and_then(|instance| {
                    let status = enumerate::lookup(device, &instance).ok()?;
                    Some((instance, status))
                })
                .into_iter()
                .collect()
        } else {
            enumerate::instances(device, entry).collect()
        };

        if found.is_empty() {
            tracing::debug!("Refresh component {} not present", entry);
        }

        for (instance, status) in found {
            let topic = format!("{}/status/{}", base_prefix, instance.topic);
            match publisher.publish(&topic, &status.to_string(), Qos::AtLeastOnce, false) {
                Ok(()) => published += 1,
                Err(e) => tracing::warn!("{}", e),
            }
        }
    }

    published
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::fakes::{FakeDevice, RecordingPublisher};
    use serde_json::json;

    fn list(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_refresh_singleton_and_indexed() {
        let device = FakeDevice::new()
            .with_status("wifi", json!({"rssi": -58}))
            .with_status("temperature:0", json!({"id": 0, "tC": 22.1}));
        let mut publisher = RecordingPublisher::default();

        let n = publish_components(&device, &mut publisher, "plug", &list(&["wifi", "temperature:0"]));

        assert_eq!(n, 2);
        let topics: Vec<&str> = publisher.messages.iter().map(|m| m.topic.as_str()).collect();
        assert_eq!(topics, vec!["plug/status/wifi", "plug/status/temperature:0"]);
        assert!(publisher.messages.iter().all(|m| !m.retain));
        assert_eq!(publisher.messages[0].json(), json!({"rssi": -58}));
    }

    #[test]
    fn test_refresh_bare_type_expands() {
        let device = FakeDevice::new()
            .with_status("temperature:0", json!({"tC": 22.1}))
            .with_status("temperature:1", json!({"tC": 23.4}));
        let mut publisher = RecordingPublisher::default();

        let n = publish_components(&device, &mut publisher, "plug", &list(&["temperature"]));
        assert_eq!(n, 2);
        assert_eq!(publisher.messages[1].topic, "plug/status/temperature:1");
    }

    #[test]
    fn test_refresh_scripts_from_id_one() {
        let device = FakeDevice::new()
            .with_status("script:1", json!({"id": 1, "running": true}))
            .with_status("script:2", json!({"id": 2, "running": false}));
        let mut publisher = RecordingPublisher::default();

        assert_eq!(publish_components(&device, &mut publisher, "plug", &list(&["script"])), 2);
        assert_eq!(publisher.messages[0].topic, "plug/status/script:1");
    }

    #[test]
    fn test_refresh_skips_missing() {
        let device = FakeDevice::new();
        let mut publisher = RecordingPublisher::default();

        let n = publish_components(&device, &mut publisher, "plug", &list(&["wifi", "temperature:0", "bogus:x"]));
        assert_eq!(n, 0);
        assert!(publisher.messages.is_empty());
    }

    #[test]
    fn test_refresh_counts_only_successes() {
        let device = FakeDevice::new().with_status("wifi", json!({"rssi": -58}));
        let mut publisher = RecordingPublisher {
            fail: true,
            ..Default::default()
        };

        assert_eq!(publish_components(&device, &mut publisher, "plug", &list(&["wifi"])), 0);
        assert_eq!(publisher.messages.len(), 1);
    }
}
