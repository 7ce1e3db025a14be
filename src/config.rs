//! Bridge configuration.
//!
//! Loaded from a YAML file (`SHELLY_DISCOVERY_CONFIG`, default
//! `shelly-discovery.yaml`). Every field has a default, so an empty file or
//! a missing one yields a working setup for a device at `192.168.33.1`
//! and a broker on `localhost:1883`.

use std::path::Path;

use serde::Deserialize;

use crate::error::BridgeError;

/// Temperature unit preference. Selects which of the `tC` / `tF` variants
/// is enumerated and which nested field templates read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
pub enum TemperatureUnit {
    #[default]
    C,
    F,
}

impl TemperatureUnit {
    /// Unit letter used in Shelly field names (`tC`, `tF`).
    pub fn letter(self) -> char {
        match self {
            TemperatureUnit::C => 'C',
            TemperatureUnit::F => 'F',
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            TemperatureUnit::C => "\u{00B0}C",
            TemperatureUnit::F => "\u{00B0}F",
        }
    }

    /// Name of the raw status field carrying this unit.
    pub fn field(self) -> &'static str {
        match self {
            TemperatureUnit::C => "tC",
            TemperatureUnit::F => "tF",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomNames {
    #[serde(default = "default_true")]
    pub device: bool,
    #[serde(default = "default_true")]
    pub channels: bool,
    #[serde(default = "default_true")]
    pub addons: bool,
}

impl Default for CustomNames {
    fn default() -> Self {
        Self {
            device: true,
            channels: true,
            addons: true,
        }
    }
}

/// Settings consumed by the discovery core.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default)]
    pub temperature_unit: TemperatureUnit,
    /// Minor entities (voltage, frequency, ...) are published disabled.
    #[serde(default = "default_true")]
    pub disable_minor_entities: bool,
    #[serde(default)]
    pub custom_names: CustomNames,
    /// Adds a configuration URL pointing at the device web UI.
    #[serde(default = "default_true")]
    pub report_ip: bool,
    /// Replaces the device MAC in identities and topics (testing only).
    #[serde(default)]
    pub fake_mac_address: Option<String>,
    /// Republish status of every touched topic once discovery is done.
    #[serde(default = "default_true")]
    pub publish_init_data: bool,
    #[serde(default = "default_discovery_prefix")]
    pub discovery_prefix: String,
    /// Pause between scheduler ticks.
    #[serde(default = "default_publish_pause_ms")]
    pub publish_pause_ms: u64,
    #[serde(default = "default_components_refresh")]
    pub components_refresh: Vec<String>,
    #[serde(default = "default_components_refresh_period")]
    pub components_refresh_period_secs: u64,
    /// Publish a diagnostic sensor reporting the device's scripts.
    #[serde(default)]
    pub scripts_monitor: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            temperature_unit: TemperatureUnit::C,
            disable_minor_entities: true,
            custom_names: CustomNames::default(),
            report_ip: true,
            fake_mac_address: None,
            publish_init_data: true,
            discovery_prefix: default_discovery_prefix(),
            publish_pause_ms: default_publish_pause_ms(),
            components_refresh: default_components_refresh(),
            components_refresh_period_secs: default_components_refresh_period(),
            scripts_monitor: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    #[serde(default = "default_device_host")]
    pub host: String,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: default_device_host(),
            http_timeout_secs: default_http_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            client_id: None,
            username: None,
            password: None,
            keep_alive_secs: default_keep_alive(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

impl BridgeConfig {
    /// Apply `SHELLY_HOST`, `MQTT_HOST` and `MQTT_PORT` overrides.
    pub fn apply_env(&mut self) {
        if let Ok(host) = std::env::var("SHELLY_HOST") {
            self.device.host = host;
        }
        if let Ok(host) = std::env::var("MQTT_HOST") {
            self.mqtt.host = host;
        }
        if let Some(port) = std::env::var("MQTT_PORT").ok().and_then(|p| p.parse().ok()) {
            self.mqtt.port = port;
        }
    }
}

pub fn parse_config(contents: &str) -> Result<BridgeConfig, BridgeError> {
    // serde_yaml rejects an empty document for a struct; treat it as defaults
    if contents.trim().is_empty() {
        return Ok(BridgeConfig::default());
    }
    Ok(serde_yaml::from_str(contents)?)
}

pub fn load_config(path: &Path) -> anyhow::Result<BridgeConfig> {
    let contents = std::fs::read_to_string(path)?;
    Ok(parse_config(&contents)?)
}

fn default_true() -> bool {
    true
}

fn default_discovery_prefix() -> String {
    "homeassistant".to_string()
}

fn default_publish_pause_ms() -> u64 {
    500
}

fn default_components_refresh() -> Vec<String> {
    vec!["wifi".to_string(), "temperature:0".to_string()]
}

fn default_components_refresh_period() -> u64 {
    60
}

fn default_device_host() -> String {
    "192.168.33.1".to_string()
}

fn default_http_timeout() -> u64 {
    2
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_keep_alive() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.discovery.temperature_unit, TemperatureUnit::C);
        assert!(config.discovery.disable_minor_entities);
        assert!(config.discovery.publish_init_data);
        assert_eq!(config.discovery.discovery_prefix, "homeassistant");
        assert_eq!(config.discovery.publish_pause_ms, 500);
        assert_eq!(config.discovery.components_refresh, vec!["wifi", "temperature:0"]);
        assert!(!config.discovery.scripts_monitor);
        assert_eq!(config.mqtt.port, 1883);
    }

    #[test]
    fn test_partial_discovery_section() {
        let yaml = r#"
discovery:
  temperature_unit: F
  custom_names:
    addons: false
  fake_mac_address: "AA:BB:CC:DD:EE:FF"
  scripts_monitor: true
mqtt:
  host: broker.lan
"#;
        let config = parse_config(yaml).unwrap();
        assert_eq!(config.discovery.temperature_unit, TemperatureUnit::F);
        assert!(config.discovery.custom_names.device);
        assert!(!config.discovery.custom_names.addons);
        assert_eq!(
            config.discovery.fake_mac_address.as_deref(),
            Some("AA:BB:CC:DD:EE:FF")
        );
        assert!(config.discovery.scripts_monitor);
        assert_eq!(config.mqtt.host, "broker.lan");
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.device.host, "192.168.33.1");
    }

    #[test]
    fn test_unknown_temperature_unit_rejected() {
        let yaml = "discovery:\n  temperature_unit: K\n";
        assert!(parse_config(yaml).is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shelly-discovery.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "device:\n  host: 10.0.0.7\ndiscovery:\n  publish_init_data: false").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.device.host, "10.0.0.7");
        assert!(!config.discovery.publish_init_data);
    }

    #[test]
    fn test_load_config_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(&dir.path().join("nope.yaml")).is_err());
    }

    #[test]
    fn test_temperature_unit_fields() {
        assert_eq!(TemperatureUnit::C.field(), "tC");
        assert_eq!(TemperatureUnit::F.field(), "tF");
        assert_eq!(TemperatureUnit::F.letter(), 'F');
        assert_eq!(TemperatureUnit::C.symbol(), "°C");
    }
}
