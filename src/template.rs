//! Value template preview powered by minijinja.
//!
//! Home Assistant evaluates the templates we publish against the JSON status
//! documents the device sends. Rendering them locally against the status we
//! already have shows what the entity's first value will be, and catches
//! templates that point at fields the status does not contain.
//!
//! Context variables:
//!   value      raw status payload string
//!   value_json parsed status document

use minijinja::{Environment, UndefinedBehavior};
use serde_json::Value;
use std::sync::OnceLock;

static ENV: OnceLock<Environment<'static>> = OnceLock::new();

fn env() -> &'static Environment<'static> {
    ENV.get_or_init(|| {
        let mut env = Environment::new();
        // A missing field is a broken template, not an empty value
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env
    })
}

/// Render a value template against a status document.
pub fn render_value(template: &str, status: &Value) -> Result<String, String> {
    let tmpl = env()
        .template_from_str(template)
        .map_err(|e| format!("template parse error: {}", e))?;

    let raw = status.to_string();
    tmpl.render(minijinja::context! { value => raw, value_json => status })
        .map(|s| s.trim().to_string())
        .map_err(|e| format!("template render error: {}", e))
}
