//! Schema generation for OpenAI structured outputs.
//!
//! Uses the `schemars` crate to generate JSON schemas from Rust types, then
//! adjusts them for OpenAI strict mode: `additionalProperties: false` on
//! every object, all properties required, no `$ref` indirection.

use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Trait for types usable as OpenAI structured output.
///
/// Blanket-implemented for any `JsonSchema + DeserializeOwned` type.
pub trait StructuredOutput: JsonSchema + DeserializeOwned {
    /// Generate an OpenAI-strict-mode-compatible JSON schema for this type.
    fn openai_schema() -> Value {
        let schema = schema_for!(Self);
        let mut value = serde_json::to_value(schema).unwrap_or_default();

        let definitions = match &value {
            Value::Object(map) => map.get("definitions").cloned(),
            _ => None,
        };

        inline_refs(&mut value, definitions.as_ref());
        fix_object_schemas(&mut value);

        if let Value::Object(map) = &mut value {
            map.remove("definitions");
            map.remove("$schema");
        }

        value
    }

    /// Schema name for this type.
    fn type_name() -> String {
        <Self as JsonSchema>::schema_name()
    }
}

impl<T: JsonSchema + DeserializeOwned> StructuredOutput for T {}

/// Replace `$ref` nodes with the referenced definition, recursively.
fn inline_refs(value: &mut Value, definitions: Option<&Value>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(reference)) = map.get("$ref") {
                let name = reference.rsplit('/').next().unwrap_or_default().to_string();
                if let Some(mut resolved) = definitions
                    .and_then(|d| d.get(&name))
                    .cloned()
                {
                    inline_refs(&mut resolved, definitions);
                    *value = resolved;
                    return;
                }
            }
            for child in map.values_mut() {
                inline_refs(child, definitions);
            }
        }
        Value::Array(items) => {
            for item in items {
                inline_refs(item, definitions);
            }
        }
        _ => {}
    }
}

/// OpenAI strict mode requires `additionalProperties: false` and every
/// property listed in `required`, nullable or not.
fn fix_object_schemas(value: &mut Value) {
    if let Value::Object(map) = value {
        if map.get("type") == Some(&Value::String("object".to_string())) {
            map.insert("additionalProperties".to_string(), Value::Bool(false));

            if let Some(Value::Object(props)) = map.get("properties") {
                let all_keys: Vec<Value> =
                    props.keys().map(|k| Value::String(k.clone())).collect();
                map.insert("required".to_string(), Value::Array(all_keys));
            }
        }

        for child in map.values_mut() {
            fix_object_schemas(child);
        }
    } else if let Value::Array(items) = value {
        for item in items {
            fix_object_schemas(item);
        }
    }
}
