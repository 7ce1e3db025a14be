//! Entity payload builder.
//!
//! Turns one [`WorkItem`] plus live instance configuration into a Home
//! Assistant MQTT discovery payload. The builder itself is pure; everything
//! it needs from the device is gathered up front by
//! [`LiveInstanceConfig::read`].

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use crate::alias;
use crate::catalog::{self, AttributeDescriptor, Domain, UnitSource};
use crate::config::DiscoveryConfig;
use crate::device::DeviceIdentity;
use crate::enumerate::WorkItem;
use crate::host::DeviceApi;

/// Values shared by every entity of one discovery run.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub identity: DeviceIdentity,
    /// MQTT topic prefix the device publishes status under.
    pub base_prefix: String,
    pub instance_counts: HashMap<String, usize>,
}

impl RunContext {
    fn count(&self, component_type: &str) -> usize {
        self.instance_counts.get(component_type).copied().unwrap_or(0)
    }

    pub fn state_topic(&self, topic: &str) -> String {
        format!("{}/status/{}", self.base_prefix, topic)
    }

    pub fn command_topic(&self, topic: &str) -> String {
        format!("{}/command/{}", self.base_prefix, topic)
    }

    pub fn availability_topic(&self) -> String {
        format!("{}/online", self.base_prefix)
    }
}

/// Instance configuration read from the device right before building.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveInstanceConfig {
    /// User-assigned channel name, when custom names apply to this item.
    pub custom_name: Option<String>,
    /// Per-index `sys.ui_data.consumption_types` entry.
    pub consumption_type: Option<String>,
    /// The channel value is computed by a user expression (`xpercent.expr`).
    pub expression_override: bool,
    /// Unit from the instance config for `xvoltage` / `xpercent`.
    pub unit: Option<String>,
    pub position_control: bool,
    pub slat_control: bool,
}

impl LiveInstanceConfig {
    pub fn read(device: &dyn DeviceApi, item: &WorkItem, config: &DiscoveryConfig) -> Self {
        let topic = &item.instance.topic;
        let instance_config = device.config(topic);
        let canonical = alias::canonicalize(&item.instance.component_type, &item.raw_attribute);

        let names_enabled = if item.is_addon {
            config.custom_names.addons
        } else {
            config.custom_names.channels
        };
        let custom_name = instance_config
            .get("name")
            .and_then(|v| v.as_str())
            .filter(|n| names_enabled && !n.is_empty())
            .map(str::to_string);

        let consumption_type = item.instance.index.and_then(|ix| {
            device
                .config("sys")
                .pointer("/ui_data/consumption_types")
                .and_then(|types| types.get(ix as usize))
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        });

        let expression_override = matches!(canonical, "percent" | "voltage")
            && instance_config
                .get(format!("x{}", canonical))
                .and_then(|block| block.get("expr"))
                .is_some_and(is_truthy);

        let unit = match catalog::resolve(canonical).map(|d| d.unit) {
            Some(UnitSource::InstanceConfig(block)) => instance_config
                .get(block)
                .and_then(|b| b.get("unit"))
                .and_then(|v| v.as_str())
                .map(str::to_string),
            _ => None,
        };

        let (position_control, slat_control) = if item.instance.component_type == "cover" {
            let pos = device
                .status(topic)
                .ok()
                .and_then(|s| s.get("pos_control").and_then(|v| v.as_bool()))
                .unwrap_or(false);
            let slat = instance_config
                .pointer("/slat/enable")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            (pos, slat)
        } else {
            (false, false)
        };

        Self {
            custom_name,
            consumption_type,
            expression_override,
            unit,
            position_control,
            slat_control,
        }
    }
}

fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => true,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Availability {
    pub topic: String,
    pub payload_available: &'static str,
    pub payload_not_available: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverPosition {
    pub position_topic: String,
    pub position_template: &'static str,
    pub set_position_topic: String,
    pub set_position_template: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverTilt {
    pub tilt_command_topic: String,
    pub tilt_command_template: &'static str,
    pub tilt_status_topic: String,
    pub tilt_status_template: &'static str,
    pub payload_stop_tilt: &'static str,
    pub tilt_optimistic: bool,
}

/// Domain-specific part of a payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DomainFields {
    Sensor {
        #[serde(skip_serializing_if = "Option::is_none")]
        unit_of_measurement: Option<String>,
        state_class: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        suggested_display_precision: Option<u8>,
    },
    Switch {
        command_topic: String,
        payload_on: &'static str,
        payload_off: &'static str,
    },
    Light {
        command_topic: String,
        payload_on: &'static str,
        payload_off: &'static str,
    },
    BinarySensor {
        payload_on: bool,
        payload_off: bool,
    },
    Cover {
        command_topic: String,
        payload_open: &'static str,
        payload_stop: &'static str,
        payload_close: &'static str,
        optimistic: bool,
        #[serde(flatten)]
        position: Option<CoverPosition>,
        #[serde(flatten)]
        tilt: Option<CoverTilt>,
    },
}

fn is_true(b: &bool) -> bool {
    *b
}

/// JSON body of a discovery config message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityPayload {
    pub name: String,
    pub unique_id: String,
    pub state_topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_value_template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_category: Option<&'static str>,
    #[serde(skip_serializing_if = "is_true")]
    pub enabled_by_default: bool,
    pub availability: Vec<Availability>,
    #[serde(flatten)]
    pub fields: DomainFields,
    pub device: DeviceIdentity,
}

impl EntityPayload {
    /// Template that extracts the entity state, whichever key carries it.
    pub fn template(&self) -> Option<&str> {
        self.value_template
            .as_deref()
            .or(self.state_value_template.as_deref())
    }
}

/// A resolved entity, ready to publish.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub domain: Domain,
    /// `{topic without ':'}-{raw attribute}`
    pub object_id: String,
    pub payload: EntityPayload,
}

impl Entity {
    pub fn config_topic(&self, discovery_prefix: &str, mac: &str) -> String {
        config_topic(discovery_prefix, self.domain, mac, &self.object_id)
    }
}

pub fn config_topic(discovery_prefix: &str, domain: Domain, mac: &str, object_id: &str) -> String {
    format!("{}/{}/{}/{}/config", discovery_prefix, domain.as_str(), mac, object_id)
}

/// Stable identity of an entity. Depends on the raw attribute only, so a
/// switch reconfigured as a light keeps its unique id.
pub fn unique_id(mac: &str, topic: &str, raw_attribute: &str) -> String {
    format!("{}_{}_{}", mac, topic.replace(':', ""), raw_attribute)
}

/// Everything derived from a work item before the payload is assembled.
struct Resolved<'a> {
    item: &'a WorkItem,
    domain: Domain,
    descriptor: &'static AttributeDescriptor,
    is_single: bool,
    force_enabled: bool,
}

fn resolve<'a>(item: &'a WorkItem, run: &RunContext, live: &LiveInstanceConfig) -> Option<Resolved<'a>> {
    let component_type = item.instance.component_type.as_str();
    let canonical = alias::canonicalize(component_type, &item.raw_attribute);

    let key = if canonical == "output" {
        output_domain(component_type, live.consumption_type.as_deref()).as_str()
    } else {
        alias::catalog_key(component_type, canonical)
    };
    let descriptor = catalog::resolve(key)?;

    // Input-only devices: the inputs are the point of the device
    let force_enabled = component_type == "input"
        && run.count("switch") == 0
        && run.count("light") == 0
        && run.count("cover") == 0;

    Some(Resolved {
        item,
        domain: descriptor.domain,
        descriptor,
        is_single: run.count(component_type) == 1,
        force_enabled,
    })
}

/// Effective domain of an `output` attribute.
fn output_domain(component_type: &str, consumption_type: Option<&str>) -> Domain {
    let overridden = consumption_type
        .and_then(Domain::parse)
        .filter(|d| matches!(d, Domain::Switch | Domain::Light));
    if let Some(domain) = overridden {
        return domain;
    }
    if let Some(other) = consumption_type {
        tracing::debug!("Ignoring consumption type {:?} for {}", other, component_type);
    }
    match Domain::parse(component_type) {
        Some(d @ (Domain::Switch | Domain::Light)) => d,
        _ => Domain::Switch,
    }
}

fn display_name(r: &Resolved<'_>, live: &LiveInstanceConfig) -> String {
    let item = r.item;
    let base = r.descriptor.display_name;

    let mut name = if let Some(custom) = &live.custom_name {
        format!("{} {}", custom, base)
    } else if item.is_addon {
        // add-on instances are numbered from 100
        let ix = item.instance.index.map(|i| i as i64 - 99).unwrap_or(0);
        format!("Addon {} {}", base, ix)
    } else {
        match item.instance.index {
            Some(ix) if !r.is_single => format!("{} {}", base, ix + 1),
            _ => base.to_string(),
        }
    };

    let component_type = item.instance.component_type.as_str();
    let canonical = alias::canonicalize(component_type, &item.raw_attribute);
    if canonical != item.raw_attribute && matches!(component_type, "em" | "emdata") {
        if let Some(phase) = item.raw_attribute.split('_').next() {
            name.push(' ');
            name.push_str(&phase.to_uppercase());
        }
    }

    name
}

fn value_template(raw: &str, config: &DiscoveryConfig) -> String {
    match raw {
        "aenergy" | "ret_aenergy" => format!("{{{{ value_json.{}.total }}}}", raw),
        "output" => "{{ 'on' if value_json.output else 'off' }}".to_string(),
        "temperature" => format!(
            "{{{{ value_json.temperature.t{} }}}}",
            config.temperature_unit.letter()
        ),
        "state" => "{{ value_json.state if value_json.state else false }}".to_string(),
        _ => format!("{{{{ value_json.{} }}}}", raw),
    }
}

fn sensor_unit(descriptor: &AttributeDescriptor, live: &LiveInstanceConfig, config: &DiscoveryConfig) -> Option<String> {
    match descriptor.unit {
        UnitSource::None => None,
        UnitSource::Fixed(unit) => Some(unit.to_string()),
        UnitSource::Temperature => Some(config.temperature_unit.symbol().to_string()),
        UnitSource::InstanceConfig(_) => live.unit.clone(),
    }
}

fn domain_fields(r: &Resolved<'_>, run: &RunContext, live: &LiveInstanceConfig, config: &DiscoveryConfig) -> DomainFields {
    let topic = &r.item.instance.topic;
    match r.domain {
        Domain::Sensor => DomainFields::Sensor {
            unit_of_measurement: sensor_unit(r.descriptor, live, config),
            state_class: if r.descriptor.device_class == Some("energy") {
                "total_increasing"
            } else {
                "measurement"
            },
            suggested_display_precision: r.item.is_addon.then_some(2),
        },
        Domain::Switch => DomainFields::Switch {
            command_topic: run.command_topic(topic),
            payload_on: "on",
            payload_off: "off",
        },
        Domain::Light => DomainFields::Light {
            command_topic: run.command_topic(topic),
            payload_on: "on",
            payload_off: "off",
        },
        Domain::BinarySensor => DomainFields::BinarySensor {
            payload_on: true,
            payload_off: false,
        },
        Domain::Cover => {
            let command_topic = run.command_topic(topic);
            let state_topic = run.state_topic(topic);
            let position = live.position_control.then(|| CoverPosition {
                position_topic: state_topic.clone(),
                position_template: "{{ value_json.current_pos }}",
                set_position_topic: command_topic.clone(),
                set_position_template: "pos,{{ position }}",
            });
            let tilt = (live.position_control && live.slat_control).then(|| CoverTilt {
                tilt_command_topic: command_topic.clone(),
                tilt_command_template: "slat_pos,{{ tilt_position }}",
                tilt_status_topic: state_topic,
                tilt_status_template: "{{ value_json.slat_pos }}",
                payload_stop_tilt: "stop",
                tilt_optimistic: false,
            });
            DomainFields::Cover {
                command_topic,
                payload_open: "open",
                payload_stop: "stop",
                payload_close: "close",
                optimistic: false,
                position,
                tilt,
            }
        }
    }
}

/// Build the discovery entity for one work item. `None` when the attribute
/// has no catalog entry.
pub fn build(item: &WorkItem, run: &RunContext, live: &LiveInstanceConfig, config: &DiscoveryConfig) -> Option<Entity> {
    let r = resolve(item, run, live)?;
    let topic = &item.instance.topic;

    let diagnostic = live.expression_override || (!item.is_addon && r.descriptor.is_diagnostic);
    let disabled = (live.expression_override
        || (!item.is_addon && config.disable_minor_entities && r.descriptor.is_disabled_by_default))
        && !r.force_enabled;

    let template = value_template(&item.raw_attribute, config);
    let (value_template, state_value_template) = if r.domain == Domain::Light {
        (None, Some(template))
    } else {
        (Some(template), None)
    };

    let payload = EntityPayload {
        name: display_name(&r, live),
        unique_id: unique_id(run.identity.mac(), topic, &item.raw_attribute),
        state_topic: run.state_topic(topic),
        value_template,
        state_value_template,
        device_class: r.descriptor.device_class,
        entity_category: diagnostic.then_some("diagnostic"),
        enabled_by_default: !disabled,
        availability: vec![Availability {
            topic: run.availability_topic(),
            payload_available: "true",
            payload_not_available: "false",
        }],
        fields: domain_fields(&r, run, live, config),
        device: run.identity.clone(),
    };

    Some(Entity {
        domain: r.domain,
        object_id: format!("{}-{}", item.instance.object_id(), item.raw_attribute),
        payload,
    })
}
