// src/workers/schema.rs
// A minimal JSON Schema validator covering the subset the Worker Runtime
// needs: type, properties/required, enum, minimum/maximum constraints.

use serde_json::Value;

pub fn validate(value: &Value, schema: &Value) -> Result<(), String> {
    validate_at(value, schema, "$")
}

fn validate_at(value: &Value, schema: &Value, path: &str) -> Result<(), String> {
    if let Some(expected_type) = schema.get("type").and_then(|t| t.as_str()) {
        if !type_matches(value, expected_type) {
            return Err(format!(
                "{path}: expected type '{expected_type}', got {}",
                type_name(value)
            ));
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(|e| e.as_array()) {
        if !allowed.contains(value) {
            return Err(format!("{path}: value {value} not in enum {allowed:?}"));
        }
    }

    if let Some(min) = schema.get("minimum").and_then(|m| m.as_f64()) {
        if let Some(n) = value.as_f64() {
            if n < min {
                return Err(format!("{path}: {n} is below minimum {min}"));
            }
        }
    }

    if let Some(max) = schema.get("maximum").and_then(|m| m.as_f64()) {
        if let Some(n) = value.as_f64() {
            if n > max {
                return Err(format!("{path}: {n} is above maximum {max}"));
            }
        }
    }

    if let Some(obj) = value.as_object() {
        if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
            for field in required {
                if let Some(name) = field.as_str() {
                    if !obj.contains_key(name) {
                        return Err(format!("{path}: missing required field '{name}'"));
                    }
                }
            }
        }
        if let Some(props) = schema.get("properties").and_then(|p| p.as_object()) {
            for (name, sub_schema) in props {
                if let Some(sub_value) = obj.get(name) {
                    validate_at(sub_value, sub_schema, &format!("{path}.{name}"))?;
                }
            }
        }
    }

    if let Some(arr) = value.as_array() {
        if let Some(items_schema) = schema.get("items") {
            for (i, item) in arr.iter().enumerate() {
                validate_at(item, items_schema, &format!("{path}[{i}]"))?;
            }
        }
    }

    Ok(())
}

fn type_matches(value: &Value, expected: &str) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
