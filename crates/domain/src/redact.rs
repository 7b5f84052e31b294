//! Deterministic PII redaction for logs and audit trails.
//!
//! Anything that leaves the process boundary in a log line — tool
//! arguments, audit details — passes through here first. Redaction is
//! pattern-based and deterministic: emails, phone numbers, and long
//! digit runs (cards, AWBs) are masked in place.

use regex::Regex;
use serde_json::Value;

/// Precompiled redaction patterns. Build once at startup and share.
pub struct Redactor {
    email: Regex,
    phone: Regex,
    digits: Regex,
}

impl Redactor {
    pub fn new() -> Self {
        Self {
            email: Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}")
                .expect("email redaction pattern"),
            phone: Regex::new(r"(?:\+91[\s-]?)?[6-9]\d{9}").expect("phone redaction pattern"),
            digits: Regex::new(r"\b\d{10,18}\b").expect("digit-run redaction pattern"),
        }
    }

    /// Mask PII in free text.
    pub fn redact_text(&self, text: &str) -> String {
        let text = self.email.replace_all(text, "[email]");
        let text = self.phone.replace_all(&text, "[phone]");
        self.digits.replace_all(&text, "[number]").into_owned()
    }

    /// Mask PII in every string of a JSON value, recursively. Keys are
    /// left intact so the shape stays diagnosable.
    pub fn redact_json(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.redact_text(s)),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.redact_json(v)).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.redact_json(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new()
    }
}
