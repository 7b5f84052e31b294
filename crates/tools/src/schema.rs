//! JSON-Schema validation for tool inputs and outputs.
//!
//! Schemas are compiled once at registration. Input validation is a
//! hard gate; output validation is best-effort — a mismatch is logged
//! and the result still flows.

use jsonschema::JSONSchema;
use serde_json::Value;

use rv_domain::{Error, Result};

/// A compiled validator paired with its source schema.
pub struct CompiledSchema {
    compiled: JSONSchema,
}

impl CompiledSchema {
    pub fn compile(schema: &Value) -> Result<Self> {
        let compiled = JSONSchema::compile(schema)
            .map_err(|e| Error::SchemaMismatch(format!("schema does not compile: {e}")))?;
        Ok(Self { compiled })
    }

    /// Validate, collecting every violation into one message.
    pub fn validate(&self, instance: &Value) -> std::result::Result<(), String> {
        let result = self.compiled.validate(instance);
        match result {
            Ok(()) => Ok(()),
            Err(errors) => {
                let details: Vec<String> = errors
                    .map(|e| {
                        let path = e.instance_path.to_string();
                        if path.is_empty() {
                            e.to_string()
                        } else {
                            format!("{path}: {e}")
                        }
                    })
                    .collect();
                Err(details.join("; "))
            }
        }
    }

    pub fn is_valid(&self, instance: &Value) -> bool {
        self.compiled.is_valid(instance)
    }
}

/// Canonical JSON: keys sorted recursively, no whitespace. Used for
/// cache-key digests so argument ordering never splits the cache.
pub fn canonical_json(value: &Value) -> String {
    fn write(value: &Value, out: &mut String) {
        match value {
            Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                out.push('{');
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(&serde_json::to_string(key).unwrap_or_default());
                    out.push(':');
                    write(&map[*key], out);
                }
                out.push('}');
            }
            Value::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    write(item, out);
                }
                out.push(']');
            }
            other => out.push_str(&other.to_string()),
        }
    }
    let mut out = String::new();
    write(value, &mut out);
    out
}
