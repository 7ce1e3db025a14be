//! Raw attribute spellings → canonical catalog keys.
//!
//! Energy meters report per-phase (`a_current`, `b_current`, ...) and total
//! variants of the same quantity; temperature sensors report one field per
//! unit. All of them collapse onto a single catalog entry here.

static ALIASES: &[(&str, &str)] = &[
    ("a_current", "current"),
    ("b_current", "current"),
    ("c_current", "current"),
    ("a_voltage", "voltage"),
    ("b_voltage", "voltage"),
    ("c_voltage", "voltage"),
    ("a_freq", "freq"),
    ("b_freq", "freq"),
    ("c_freq", "freq"),
    ("a_pf", "pf"),
    ("b_pf", "pf"),
    ("c_pf", "pf"),
    ("act_power", "apower"),
    ("a_act_power", "apower"),
    ("b_act_power", "apower"),
    ("c_act_power", "apower"),
    ("total_act_power", "apower"),
    ("a_aprt_power", "aprt_power"),
    ("b_aprt_power", "aprt_power"),
    ("c_aprt_power", "aprt_power"),
    ("total_aprt_power", "aprt_power"),
    ("total_act_energy", "aenergy"),
    ("total_act_ret_energy", "ret_aenergy"),
    ("a_total_act_energy", "aenergy"),
    ("b_total_act_energy", "aenergy"),
    ("c_total_act_energy", "aenergy"),
    ("a_total_act_ret_energy", "ret_aenergy"),
    ("b_total_act_ret_energy", "ret_aenergy"),
    ("c_total_act_ret_energy", "ret_aenergy"),
    ("total_act", "aenergy"),
    ("total_act_ret", "ret_aenergy"),
    ("tC", "temperature"),
    ("tF", "temperature"),
];

/// Canonical name of a raw attribute. Unknown spellings come back unchanged;
/// the catalog membership check filters them later.
pub fn canonicalize<'a>(_component_type: &str, raw: &'a str) -> &'a str {
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == raw)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(raw)
}

/// Catalog key used for presentation lookups. A cover's `state` is not a
/// binary input and gets its own key.
pub fn catalog_key<'a>(component_type: &str, canonical: &'a str) -> &'a str {
    if component_type == "cover" && canonical == "state" {
        "cover.state"
    } else {
        canonical
    }
}

/// Whether the raw name is one of the per-unit temperature fields.
pub fn is_temperature_variant(raw: &str) -> bool {
    raw == "tC" || raw == "tF"
}
