// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Form schema discovered on the current page

use serde_json::{Map, Value};
use std::fmt;

/// Field names required by the page at the session cursor.
///
/// The whole set is swapped on every navigation step and `version` moves
/// forward each time, so a schema never mixes fields from two pages. An
/// empty schema means no action is pending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSchema {
    version: u64,
    fields: Vec<String>,
}

impl FieldSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Whether the current page waits for a submission.
    pub fn is_pending(&self) -> bool {
        !self.fields.is_empty()
    }

    pub fn replace(&mut self, fields: Vec<String>) {
        self.version += 1;
        self.fields = fields;
    }

    pub fn clear(&mut self) {
        self.replace(Vec::new());
    }

    /// Check `values` against the schema and form-encode them in field order.
    pub fn encode(&self, values: &Map<String, Value>) -> Result<Vec<(String, String)>, SchemaViolation> {
        let mut violation = SchemaViolation::default();
        let mut pairs = Vec::with_capacity(self.fields.len());

        for field in &self.fields {
            match values.get(field) {
                None => violation.missing.push(field.clone()),
                Some(value) => match form_value(value) {
                    Some(encoded) => pairs.push((field.clone(), encoded)),
                    None => violation.invalid.push(field.clone()),
                },
            }
        }

        violation.unexpected = values
            .keys()
            .filter(|key| !self.fields.contains(key))
            .cloned()
            .collect();

        if violation.is_empty() {
            Ok(pairs)
        } else {
            Err(violation)
        }
    }
}

/// Form text of a JSON value; booleans use the application's `True`/`False`.
fn form_value(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(true) => Some("True".to_string()),
        Value::Bool(false) => Some("False".to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Mismatch between submitted values and the discovered schema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaViolation {
    pub missing: Vec<String>,
    pub unexpected: Vec<String>,
    /// Fields whose value is null, an array or an object
    pub invalid: Vec<String>,
}

impl SchemaViolation {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty() && self.invalid.is_empty()
    }
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if !self.missing.is_empty() {
            parts.push(format!("missing {}", self.missing.join(", ")));
        }
        if !self.unexpected.is_empty() {
            parts.push(format!("unexpected {}", self.unexpected.join(", ")));
        }
        if !self.invalid.is_empty() {
            parts.push(format!("invalid value for {}", self.invalid.join(", ")));
        }
        if parts.is_empty() {
            f.write_str("no mismatch")
        } else {
            f.write_str(&parts.join("; "))
        }
    }
}
