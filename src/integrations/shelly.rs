//! Shelly Gen2+ local RPC client.
//!
//! Fetches the device documents the discovery core needs over
//! `GET /rpc/<Method>` and holds them in a [`DeviceSnapshot`], which answers
//! the core's synchronous [`DeviceApi`] queries.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::config::DeviceConfig;
use crate::error::{Absent, BridgeError};
use crate::host::DeviceApi;

/// HTTP client for one device.
pub struct ShellyRpc {
    host: String,
    client: reqwest::Client,
    scripts: bool,
}

impl ShellyRpc {
    pub fn new(config: &DeviceConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            host: config.host.clone(),
            client,
            scripts: false,
        }
    }

    /// Also fetch `Script.List` with every snapshot.
    pub fn with_scripts(mut self, enabled: bool) -> Self {
        self.scripts = enabled;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Invoke a parameterless RPC method.
    pub async fn call(&self, method: &str) -> Result<Value, BridgeError> {
        let url = format!("http://{}/rpc/{}", self.host, method);
        let resp = self.client.get(&url).send().await.map_err(|source| BridgeError::Rpc {
            host: self.host.clone(),
            source,
        })?;

        if !resp.status().is_success() {
            return Err(BridgeError::RpcStatus {
                method: method.to_string(),
                status: resp.status().as_u16(),
            });
        }

        let body = resp.text().await.map_err(|source| BridgeError::Rpc {
            host: self.host.clone(),
            source,
        })?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Fetch device info, full status and full config in one go.
    /// Devices without a sensor add-on report no peripherals.
    pub async fn fetch_snapshot(&self) -> Result<DeviceSnapshot, BridgeError> {
        let info = self.call("Shelly.GetDeviceInfo").await?;
        let status = self.call("Shelly.GetStatus").await?;
        let config = self.call("Shelly.GetConfig").await?;

        let peripherals = match self.call("SensorAddon.GetPeripherals").await {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!(host = %self.host, "No sensor add-on: {}", e);
                Value::Object(Map::new())
            }
        };

        let scripts = if self.scripts {
            match self.call("Script.List").await {
                Ok(list) => Some(list),
                Err(e) => {
                    tracing::warn!(host = %self.host, "Script list unavailable: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let snapshot = DeviceSnapshot::new(info, status, config, peripherals).with_scripts(scripts);
        tracing::debug!(
            host = %self.host,
            components = snapshot.status.len(),
            fetched_at = %snapshot.fetched_at.to_rfc3339(),
            "Fetched device snapshot",
        );
        Ok(snapshot)
    }

    /// Fetch only the full status document.
    pub async fn fetch_status(&self) -> Result<Map<String, Value>, BridgeError> {
        Ok(into_map(self.call("Shelly.GetStatus").await?))
    }
}

/// Point-in-time copy of a device's RPC documents.
#[derive(Debug, Clone)]
pub struct DeviceSnapshot {
    pub info: Value,
    pub status: Map<String, Value>,
    pub config: Map<String, Value>,
    pub peripherals: Value,
    /// `Script.List` result, when the script monitor is enabled.
    pub scripts: Option<Value>,
    pub fetched_at: DateTime<Utc>,
}

impl DeviceSnapshot {
    pub fn new(info: Value, status: Value, config: Value, peripherals: Value) -> Self {
        Self {
            info,
            status: into_map(status),
            config: into_map(config),
            peripherals,
            scripts: None,
            fetched_at: Utc::now(),
        }
    }

    pub fn with_scripts(mut self, scripts: Option<Value>) -> Self {
        self.scripts = scripts;
        self
    }

    /// Replace the status document, keeping configuration as the baseline
    /// for change detection.
    pub fn replace_status(&mut self, status: Map<String, Value>) {
        self.status = status;
        self.fetched_at = Utc::now();
    }

    /// Whether any component configuration differs from `other`. Channel
    /// names and consumption types live here, so a change calls for a new
    /// discovery run.
    pub fn config_changed(&self, other: &DeviceSnapshot) -> bool {
        self.config != other.config || self.peripherals != other.peripherals
    }
}

fn into_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

impl DeviceApi for DeviceSnapshot {
    fn device_info(&self) -> Value {
        self.info.clone()
    }

    fn status(&self, key: &str) -> Result<Value, Absent> {
        self.status.get(key).cloned().ok_or(Absent)
    }

    fn config(&self, key: &str) -> Value {
        self.config.get(key).cloned().unwrap_or(Value::Null)
    }

    fn peripherals(&self) -> Value {
        self.peripherals.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiscoveryConfig;
    use crate::enumerate;
    use serde_json::json;

    fn plus_1pm() -> DeviceSnapshot {
        DeviceSnapshot::new(
            json!({
                "name": "Boiler",
                "id": "shellyplus1pm-c4d8d5500aa0",
                "mac": "C4D8D5500AA0",
                "model": "SNSW-001P16EU",
                "gen": 2,
                "fw_id": "20241011-114455/1.4.4-g6d2a586",
                "ver": "1.4.4",
                "app": "Plus1PM",
                "auth_en": false
            }),
            json!({
                "ble": {},
                "input:0": {"id": 0, "state": false},
                "mqtt": {"connected": true},
                "switch:0": {
                    "id": 0, "source": "init", "output": false, "apower": 0.0, "voltage": 231.4,
                    "freq": 50.0, "current": 0.0,
                    "aenergy": {"total": 0.0, "by_minute": [0.0, 0.0, 0.0], "minute_ts": 1729245600},
                    "temperature": {"tC": 41.3, "tF": 106.4}
                },
                "sys": {"mac": "C4D8D5500AA0", "uptime": 3600},
                "temperature:100": {"id": 100, "tC": 19.6, "tF": 67.3},
                "wifi": {"sta_ip": "192.168.1.52", "status": "got ip", "ssid": "home", "rssi": -57}
            }),
            json!({
                "input:0": {"id": 0, "name": null, "type": "switch"},
                "mqtt": {"enable": true, "server": "10.0.0.5:1883", "topic_prefix": "boiler"},
                "switch:0": {"id": 0, "name": "Heater", "in_mode": "follow"},
                "sys": {"device": {"name": "Boiler"}, "ui_data": {}},
                "temperature:100": {"id": 100, "name": "Tank", "report_thr_C": 0.5}
            }),
            json!({"ds18b20": {"temperature:100": {"addr": "40:255:100:6:199:204:149:177"}}, "dht22": {}}),
        )
    }

    #[test]
    fn test_snapshot_answers_status_queries() {
        let snapshot = plus_1pm();
        assert!(snapshot.status("switch:0").is_ok());
        assert_eq!(snapshot.status("switch:1"), Err(Absent));
        assert_eq!(snapshot.status("wifi").unwrap()["rssi"], -57);
        assert_eq!(snapshot.config("switch:0")["name"], "Heater");
        assert_eq!(snapshot.config("cover:0"), Value::Null);
    }

    #[test]
    fn test_snapshot_precollection() {
        let snapshot = plus_1pm();
        let result = enumerate::precollect(&snapshot, &DiscoveryConfig::default());

        let items: Vec<(String, String, bool)> = result
            .queue
            .iter()
            .map(|w| (w.instance.topic.clone(), w.raw_attribute.clone(), w.is_addon))
            .collect();
        assert_eq!(
            items,
            vec![
                ("switch:0".into(), "output".into(), false),
                ("switch:0".into(), "apower".into(), false),
                ("switch:0".into(), "voltage".into(), false),
                ("switch:0".into(), "freq".into(), false),
                ("switch:0".into(), "current".into(), false),
                ("switch:0".into(), "aenergy".into(), false),
                ("switch:0".into(), "temperature".into(), false),
                ("wifi".into(), "rssi".into(), false),
                ("input:0".into(), "state".into(), false),
                ("temperature:100".into(), "tC".into(), true),
            ]
        );
        assert_eq!(crate::device::topic_prefix(&snapshot), "boiler");
    }

    #[test]
    fn test_non_object_documents_are_empty() {
        let snapshot = DeviceSnapshot::new(json!({}), json!(null), json!([1, 2]), json!({}));
        assert!(snapshot.status.is_empty());
        assert!(snapshot.config.is_empty());
    }

    #[test]
    fn test_config_change_detection() {
        let a = plus_1pm();
        let mut b = plus_1pm();
        b.status.insert("wifi".to_string(), json!({"rssi": -80}));
        assert!(!a.config_changed(&b));

        b.config.insert(
            "sys".to_string(),
            json!({"ui_data": {"consumption_types": ["light"]}}),
        );
        assert!(a.config_changed(&b));
    }

    #[test]
    fn test_replace_status_keeps_config() {
        let mut snapshot = plus_1pm();
        let before = snapshot.clone();
        let mut status = Map::new();
        status.insert("switch:0".to_string(), json!({"id": 0, "output": true, "apower": 812.5}));

        snapshot.replace_status(status);

        assert_eq!(snapshot.status("switch:0").unwrap()["apower"], 812.5);
        assert_eq!(snapshot.status("wifi"), Err(Absent));
        assert!(!snapshot.config_changed(&before));
        assert!(snapshot.fetched_at >= before.fetched_at);
    }

    #[test]
    fn test_client_targets_configured_host() {
        let rpc = ShellyRpc::new(&DeviceConfig {
            host: "10.0.0.7".to_string(),
            http_timeout_secs: 1,
        });
        assert_eq!(rpc.host(), "10.0.0.7");
        assert!(!rpc.scripts);
        assert!(rpc.with_scripts(true).scripts);
    }
}
