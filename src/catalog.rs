//! Attribute catalog: what each canonical Shelly status attribute becomes in
//! Home Assistant.
//!
//! Pure data. Anything not listed in [`ATTRIBUTES`] is unsupported and never
//! enumerated. [`PRESENTATION`] holds keys that only appear after domain
//! resolution (`switch`, `light` for outputs, `cover.state` for covers).

/// Home Assistant entity domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    Sensor,
    Switch,
    Light,
    BinarySensor,
    Cover,
}

impl Domain {
    pub fn as_str(self) -> &'static str {
        match self {
            Domain::Sensor => "sensor",
            Domain::Switch => "switch",
            Domain::Light => "light",
            Domain::BinarySensor => "binary_sensor",
            Domain::Cover => "cover",
        }
    }

    pub fn parse(s: &str) -> Option<Domain> {
        match s {
            "sensor" => Some(Domain::Sensor),
            "switch" => Some(Domain::Switch),
            "light" => Some(Domain::Light),
            "binary_sensor" => Some(Domain::BinarySensor),
            "cover" => Some(Domain::Cover),
            _ => None,
        }
    }

    /// Domains that accept commands and share one physical output.
    pub fn is_controllable(self) -> bool {
        matches!(self, Domain::Switch | Domain::Light | Domain::Cover)
    }
}

/// Controllable domains in the order their stale configs are cleared.
pub const CONTROLLABLE: [Domain; 3] = [Domain::Switch, Domain::Light, Domain::Cover];

/// Where a sensor's unit of measurement comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitSource {
    None,
    Fixed(&'static str),
    /// Symbol of the configured temperature unit.
    Temperature,
    /// `unit` field of the named block in the instance config (`xvoltage.unit`).
    InstanceConfig(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDescriptor {
    pub key: &'static str,
    pub device_class: Option<&'static str>,
    pub display_name: &'static str,
    pub unit: UnitSource,
    pub domain: Domain,
    pub is_diagnostic: bool,
    pub is_disabled_by_default: bool,
}

const fn attr(
    key: &'static str,
    device_class: Option<&'static str>,
    display_name: &'static str,
    unit: UnitSource,
    domain: Domain,
    is_diagnostic: bool,
    is_disabled_by_default: bool,
) -> AttributeDescriptor {
    AttributeDescriptor {
        key,
        device_class,
        display_name,
        unit,
        domain,
        is_diagnostic,
        is_disabled_by_default,
    }
}

use Domain::*;
use UnitSource::{Fixed, InstanceConfig, Temperature};

/// Canonical attributes that are enumerated.
pub static ATTRIBUTES: &[AttributeDescriptor] = &[
    attr("apower", Some("power"), "Active Power", Fixed("W"), Sensor, false, false),
    attr("aprt_power", Some("apparent_power"), "Apparent Power", Fixed("VA"), Sensor, false, false),
    attr("voltage", Some("voltage"), "Voltage", Fixed("V"), Sensor, false, true),
    attr("xvoltage", None, "X-Voltage", InstanceConfig("xvoltage"), Sensor, false, true),
    attr("freq", Some("frequency"), "Frequency", Fixed("Hz"), Sensor, false, true),
    attr("current", Some("current"), "Current", Fixed("A"), Sensor, false, true),
    attr("pf", Some("power_factor"), "Power Factor", UnitSource::None, Sensor, false, true),
    attr("aenergy", Some("energy"), "Active Energy", Fixed("Wh"), Sensor, false, false),
    attr("ret_aenergy", Some("energy"), "Returned Active Energy", Fixed("Wh"), Sensor, false, true),
    attr("output", Some("switch"), "Switch", UnitSource::None, Switch, false, false),
    attr("rssi", Some("signal_strength"), "RSSI", Fixed("dBm"), Sensor, true, false),
    attr("temperature", Some("temperature"), "Temperature", Temperature, Sensor, true, false),
    attr("state", None, "BinaryIn", UnitSource::None, BinarySensor, false, true),
    attr("rh", Some("humidity"), "Humidity", Fixed("%"), Sensor, false, false),
    attr("percent", None, "AnalogIn", Fixed("%"), Sensor, false, false),
    attr("xpercent", None, "X-AnalogIn", InstanceConfig("xpercent"), Sensor, false, false),
];

/// Keys reached only through domain resolution.
pub static PRESENTATION: &[AttributeDescriptor] = &[
    attr("switch", Some("switch"), "Switch", UnitSource::None, Switch, false, false),
    attr("light", Some("light"), "Light", UnitSource::None, Light, false, false),
    attr("cover.state", None, "Cover", UnitSource::None, Cover, false, false),
];

/// Whether a canonical attribute is enumerated at all.
pub fn is_supported(canonical: &str) -> bool {
    ATTRIBUTES.iter().any(|d| d.key == canonical)
}

/// Descriptor for a canonical attribute or presentation key.
pub fn resolve(key: &str) -> Option<&'static AttributeDescriptor> {
    ATTRIBUTES
        .iter()
        .chain(PRESENTATION.iter())
        .find(|d| d.key == key)
}
