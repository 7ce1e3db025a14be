//! Device identity shared by every entity of a discovery run.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::DiscoveryConfig;
use crate::host::DeviceApi;

/// Subset of `Shelly.GetDeviceInfo` used for the HA device block.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DeviceInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mac: String,
    /// Model identifier, e.g. "SNSW-001P16EU"
    #[serde(default)]
    pub model: String,
    /// Application name, e.g. "Plus1PM"
    #[serde(default)]
    pub app: String,
    #[serde(default)]
    pub ver: String,
    #[serde(default)]
    pub gen: Value,
}

/// The `device` object of a discovery payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceIdentity {
    pub name: String,
    pub identifiers: Vec<String>,
    pub connections: Vec<[String; 2]>,
    pub manufacturer: String,
    pub model: String,
    pub model_id: String,
    pub sw_version: String,
    pub hw_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration_url: Option<String>,
}

impl DeviceIdentity {
    /// Normalized MAC, used in topics and unique ids.
    pub fn mac(&self) -> &str {
        &self.identifiers[0]
    }

    pub fn from_device(device: &dyn DeviceApi, config: &DiscoveryConfig) -> Self {
        let info: DeviceInfo = serde_json::from_value(device.device_info()).unwrap_or_else(|e| {
            tracing::warn!("Unreadable device info: {}", e);
            DeviceInfo::default()
        });

        let sta_ip = if config.report_ip {
            device
                .status("wifi")
                .ok()
                .and_then(|wifi| wifi.get("sta_ip").and_then(|v| v.as_str()).map(str::to_string))
        } else {
            None
        };

        Self::build(&info, sta_ip.as_deref(), config)
    }

    pub fn build(info: &DeviceInfo, sta_ip: Option<&str>, config: &DiscoveryConfig) -> Self {
        let mac = normalize_mac(
            config
                .fake_mac_address
                .as_deref()
                .filter(|m| !m.is_empty())
                .unwrap_or(&info.mac),
        );

        let name = match &info.name {
            Some(n) if config.custom_names.device && !n.is_empty() => n.clone(),
            _ => format!("{}-{}", mac, info.app),
        };

        let gen = match &info.gen {
            Value::String(s) => s.clone(),
            Value::Null => "?".to_string(),
            other => other.to_string(),
        };

        Self {
            name,
            identifiers: vec![mac.clone()],
            connections: vec![["mac".to_string(), mac]],
            manufacturer: "Shelly".to_string(),
            model: format!("Shelly {}", info.app),
            model_id: info.model.clone(),
            sw_version: info.ver.clone(),
            hw_version: format!("gen {}", gen),
            configuration_url: sta_ip.filter(|ip| !ip.is_empty()).map(|ip| format!("http://{}", ip)),
        }
    }
}

/// MQTT topic prefix the device publishes under: the configured
/// `mqtt.topic_prefix`, else the device id (the firmware's own default).
pub fn topic_prefix(device: &dyn DeviceApi) -> String {
    let configured = device
        .config("mqtt")
        .get("topic_prefix")
        .and_then(|v| v.as_str())
        .filter(|p| !p.is_empty())
        .map(str::to_string);
    configured
        .or_else(|| {
            device
                .device_info()
                .get("id")
                .and_then(|v| v.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "shelly".to_string())
}

/// Lower-case MAC without `:` or `-` separators.
pub fn normalize_mac(address: &str) -> String {
    address
        .chars()
        .filter(|c| *c != ':' && *c != '-')
        .collect::<String>()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::fakes::FakeDevice;

    #[test]
    fn test_normalize_mac() {
        assert_eq!(normalize_mac("B8:D6:1A:0B:CC:DD"), "b8d61a0bccdd");
        assert_eq!(normalize_mac("b8-d6-1a-0b-cc-dd"), "b8d61a0bccdd");
        assert_eq!(normalize_mac("B8D61A0BCCDD"), "b8d61a0bccdd");
    }

    #[test]
    fn test_topic_prefix() {
        let device = FakeDevice::new();
        assert_eq!(topic_prefix(&device), "shellyplus1pm-aabbccddeeff");

        let device = FakeDevice::new().with_config("mqtt", serde_json::json!({"enable": true, "topic_prefix": "garage/plug"}));
        assert_eq!(topic_prefix(&device), "garage/plug");
    }

    #[test]
    fn test_identity_without_custom_name() {
        let device = FakeDevice::new().with_status("wifi", serde_json::json!({"sta_ip": "192.168.1.40", "rssi": -60}));
        let identity = DeviceIdentity::from_device(&device, &DiscoveryConfig::default());

        assert_eq!(identity.mac(), "aabbccddeeff");
        assert_eq!(identity.name, "aabbccddeeff-Plus1PM");
        assert_eq!(identity.model, "Shelly Plus1PM");
        assert_eq!(identity.model_id, "SNSW-001P16EU");
        assert_eq!(identity.hw_version, "gen 2");
        assert_eq!(identity.configuration_url.as_deref(), Some("http://192.168.1.40"));
        assert_eq!(identity.connections, vec![["mac".to_string(), "aabbccddeeff".to_string()]]);
    }

    #[test]
    fn test_identity_custom_name_and_fake_mac() {
        let mut device = FakeDevice::new();
        device.info["name"] = serde_json::json!("Garage");
        let mut config = DiscoveryConfig::default();
        config.fake_mac_address = Some("11:22:33:44:55:66".to_string());

        let identity = DeviceIdentity::from_device(&device, &config);
        assert_eq!(identity.name, "Garage");
        assert_eq!(identity.mac(), "112233445566");
        // no wifi status, no URL
        assert_eq!(identity.configuration_url, None);

        config.custom_names.device = false;
        let identity = DeviceIdentity::from_device(&device, &config);
        assert_eq!(identity.name, "112233445566-Plus1PM");
    }

    #[test]
    fn test_empty_fake_mac_is_ignored() {
        let config = crate::config::parse_config("discovery:\n  fake_mac_address: \"\"\n").unwrap();
        let identity = DeviceIdentity::from_device(&FakeDevice::new(), &config.discovery);

        assert_eq!(identity.mac(), "aabbccddeeff");
        assert_eq!(identity.name, "aabbccddeeff-Plus1PM");
        assert_eq!(identity.connections, vec![["mac".to_string(), "aabbccddeeff".to_string()]]);
    }

    #[test]
    fn test_identity_serializes_without_url() {
        let mut config = DiscoveryConfig::default();
        config.report_ip = false;
        let device = FakeDevice::new().with_status("wifi", serde_json::json!({"sta_ip": "10.0.0.2"}));
        let identity = DeviceIdentity::from_device(&device, &config);

        let json = serde_json::to_value(&identity).unwrap();
        assert!(json.get("configuration_url").is_none());
        assert_eq!(json["identifiers"], serde_json::json!(["aabbccddeeff"]));
        assert_eq!(json["connections"], serde_json::json!([["mac", "aabbccddeeff"]]));
        assert_eq!(json["manufacturer"], "Shelly");
    }
}
