//! Schema validation helpers for Duet JSON5 configuration.

use super::SchemaMode;
use crate::ConfigError;
use serde_json::{Map, Value};

/// Validate a single config layer against the schema.
pub(super) fn validate_layer_schema(
    value: &Value,
    _mode: SchemaMode,
    layer: &str,
) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, "")?;
    ensure_allowed_keys(
        map,
        &[
            "$schema",
            "mode",
            "remote",
            "local",
            "sessions",
            "generation",
            "connectivity",
        ],
        layer,
        "",
    )?;

    if let Some(value) = map.get("$schema") {
        expect_string(value, layer, "$schema")?;
    }
    if let Some(value) = map.get("mode") {
        validate_mode(value, layer, "mode")?;
    }
    if let Some(value) = map.get("remote") {
        validate_string_section(
            value,
            layer,
            "remote",
            &["model", "base_url", "api_key_env", "system_instruction"],
        )?;
    }
    if let Some(value) = map.get("local") {
        validate_string_section(
            value,
            layer,
            "local",
            &["endpoint", "model", "system_prompt", "preamble"],
        )?;
    }
    if let Some(value) = map.get("sessions") {
        validate_sessions(value, layer, "sessions")?;
    }
    if let Some(value) = map.get("generation") {
        validate_generation(value, layer, "generation")?;
    }
    if let Some(value) = map.get("connectivity") {
        validate_connectivity(value, layer, "connectivity")?;
    }

    Ok(())
}

fn validate_mode(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    match value.as_str() {
        Some("cloud" | "local" | "auto") => Ok(()),
        Some(_) => Err(invalid_field(
            layer,
            path,
            "expected one of cloud, local, auto",
        )),
        None => Err(invalid_field(layer, path, "expected string")),
    }
}

/// Validate a block whose keys are all plain strings.
fn validate_string_section(
    value: &Value,
    layer: &str,
    path: &str,
    keys: &[&str],
) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, keys, layer, path)?;
    for key in keys {
        if let Some(value) = map.get(*key) {
            expect_string(value, layer, &join_path(path, key))?;
        }
    }
    Ok(())
}

fn validate_sessions(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, &["path", "key"], layer, path)?;

    if let Some(value) = map.get("path")
        && !value.is_null()
    {
        expect_string(value, layer, &join_path(path, "path"))?;
    }
    if let Some(value) = map.get("key") {
        expect_string(value, layer, &join_path(path, "key"))?;
    }
    Ok(())
}

fn validate_generation(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, &["idle_timeout_secs"], layer, path)?;

    if let Some(value) = map.get("idle_timeout_secs")
        && !value.is_null()
    {
        expect_u64(value, layer, &join_path(path, "idle_timeout_secs"))?;
    }
    Ok(())
}

fn validate_connectivity(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(
        map,
        &["probe_addr", "interval_secs", "timeout_ms"],
        layer,
        path,
    )?;

    if let Some(value) = map.get("probe_addr") {
        expect_string(value, layer, &join_path(path, "probe_addr"))?;
    }
    for key in ["interval_secs", "timeout_ms"] {
        if let Some(value) = map.get(key) {
            expect_u64(value, layer, &join_path(path, key))?;
        }
    }
    Ok(())
}

fn expect_object<'a>(
    value: &'a Value,
    layer: &str,
    path: &str,
) -> Result<&'a Map<String, Value>, ConfigError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(invalid_field(layer, path, "expected object")),
    }
}

fn expect_string(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.as_str().is_some() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected string"))
    }
}

fn expect_u64(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.is_u64() || value.as_i64().is_some_and(|number| number >= 0) {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected non-negative integer"))
    }
}

/// Ensure an object contains only allowed keys.
fn ensure_allowed_keys(
    map: &Map<String, Value>,
    allowed: &[&str],
    layer: &str,
    path: &str,
) -> Result<(), ConfigError> {
    for key in map.keys() {
        if !allowed.contains(&key.as_str()) {
            return Err(invalid_field(layer, &join_path(path, key), "unknown key"));
        }
    }
    Ok(())
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn invalid_field(layer: &str, path: &str, message: &str) -> ConfigError {
    let normalized_path = if path.is_empty() { "root" } else { path };
    ConfigError::field(format!("{layer}:{normalized_path}"), message)
}
