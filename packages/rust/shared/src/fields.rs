//! Declarative field mapping from nested API responses to flat records.
//!
//! Each payload is described as a table of [`FieldSpec`]s: an output key, a
//! JSON pointer into the source document, and a [`Transform`]. Missing keys
//! at any depth map to `null`.

use serde_json::Value;

use crate::types::{LIST_DELIMITER, Record, RefineryRequest};

/// How a source value is turned into an output value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// Copy verbatim.
    Copy,
    /// Replace carriage returns with spaces (strings only).
    StripCr,
    /// Lowercase (strings only).
    Lower,
    /// Join an array of strings with [`LIST_DELIMITER`].
    Join,
    /// Collect one key from each object of an array and join the results.
    Pluck(&'static str),
}

/// One output column of a flattened payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Output key.
    pub key: &'static str,
    /// JSON pointer into the source (`/geo/city`).
    pub source: &'static str,
    pub transform: Transform,
}

impl FieldSpec {
    pub const fn copy(key: &'static str, source: &'static str) -> Self {
        Self {
            key,
            source,
            transform: Transform::Copy,
        }
    }

    pub const fn strip_cr(key: &'static str, source: &'static str) -> Self {
        Self {
            key,
            source,
            transform: Transform::StripCr,
        }
    }

    pub const fn join(key: &'static str, source: &'static str) -> Self {
        Self {
            key,
            source,
            transform: Transform::Join,
        }
    }

    pub const fn pluck(key: &'static str, source: &'static str, item_key: &'static str) -> Self {
        Self {
            key,
            source,
            transform: Transform::Pluck(item_key),
        }
    }

    /// Resolve this field against `source`.
    pub fn apply(&self, source: &Value) -> Value {
        let found = source.pointer(self.source).filter(|v| !v.is_null());
        match self.transform {
            Transform::Copy => found.cloned().unwrap_or(Value::Null),
            Transform::StripCr => match found {
                Some(Value::String(s)) => Value::String(s.replace('\r', " ")),
                Some(other) => other.clone(),
                None => Value::Null,
            },
            Transform::Lower => match found {
                Some(Value::String(s)) => Value::String(s.to_lowercase()),
                Some(other) => other.clone(),
                None => Value::Null,
            },
            Transform::Join => {
                let items = found
                    .and_then(Value::as_array)
                    .map(|arr| arr.iter().map(value_to_text).collect::<Vec<_>>())
                    .unwrap_or_default();
                Value::String(items.join(LIST_DELIMITER))
            }
            Transform::Pluck(item_key) => {
                let items = found
                    .and_then(Value::as_array)
                    .map(|arr| {
                        arr.iter()
                            .filter_map(|item| item.get(item_key))
                            .filter(|v| !v.is_null())
                            .map(value_to_text)
                            .collect::<Vec<_>>()
                    })
                    .unwrap_or_default();
                Value::String(items.join(LIST_DELIMITER))
            }
        }
    }
}

/// Flatten `source` into a record according to `specs`, in spec order.
pub fn flatten(source: &Value, specs: &[FieldSpec]) -> Record {
    let mut record = Record::new();
    for spec in specs {
        record.insert(spec.key.to_string(), spec.apply(source));
    }
    record
}

/// Copy the named request fields (typed or extra) into `record`.
pub fn copy_request_fields(record: &mut Record, request: &RefineryRequest, keys: &[&str]) {
    let all = request.to_record();
    for key in keys {
        let value = all.get(*key).cloned().unwrap_or(Value::Null);
        record.insert((*key).to_string(), value);
    }
}

fn value_to_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
