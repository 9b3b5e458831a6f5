//! Flattened document attributes and the schema that governs them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A flattened attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    Scalar(String),
    List(Vec<String>),
    Null,
}

/// Attribute name to value, kept in key order.
pub type AttributeBag = BTreeMap<String, AttrValue>;

/// Declared multiplicity of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Multiplicity {
    Single,
    Multi,
}

/// Schema entry for one attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeRule {
    /// Never emit this attribute.
    #[serde(default)]
    pub drop: bool,
    #[serde(default)]
    pub multivalue: bool,
}

/// Known attributes with their multiplicity and drop policy.
#[derive(Debug, Clone, Default)]
pub struct AttributeSchema {
    rules: BTreeMap<String, AttributeRule>,
}

impl AttributeSchema {
    pub fn new(rules: BTreeMap<String, AttributeRule>) -> Self {
        Self { rules }
    }

    pub fn is_known(&self, key: &str) -> bool {
        self.rules.contains_key(key)
    }

    pub fn is_dropped(&self, key: &str) -> bool {
        self.rules.get(key).is_some_and(|r| r.drop)
    }

    /// Declared multiplicity; unknown keys are treated as multi-valued.
    pub fn multiplicity(&self, key: &str) -> Multiplicity {
        match self.rules.get(key) {
            Some(rule) if !rule.multivalue => Multiplicity::Single,
            _ => Multiplicity::Multi,
        }
    }
}

/// Normalize one key component: `.` becomes `__` and `-` becomes `_`.
fn clean_key(key: &str) -> String {
    key.replace('.', "__").replace('-', "_")
}

fn join_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        clean_key(key)
    } else {
        format!("{}__{}", prefix, clean_key(key))
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn push_list(bag: &mut AttributeBag, key: String, item: String) {
    let merged = match bag.remove(&key) {
        Some(AttrValue::List(mut items)) => {
            items.push(item);
            items
        }
        Some(AttrValue::Scalar(s)) => vec![s, item],
        Some(AttrValue::Null) | None => vec![item],
    };
    bag.insert(key, AttrValue::List(merged));
}

fn flatten_value(bag: &mut AttributeBag, key: String, value: &Value, in_list: bool) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                flatten_value(bag, join_key(&key, k), v, in_list);
            }
        }
        Value::Array(items) => {
            if items.is_empty() && !in_list {
                bag.entry(key.clone()).or_insert(AttrValue::List(Vec::new()));
            }
            for item in items {
                flatten_value(bag, key.clone(), item, true);
            }
        }
        Value::Null => {
            if !in_list {
                bag.entry(key).or_insert(AttrValue::Null);
            }
        }
        scalar => {
            if let Some(s) = scalar_string(scalar) {
                if in_list {
                    push_list(bag, key, s);
                } else {
                    bag.insert(key, AttrValue::Scalar(s));
                }
            }
        }
    }
}

/// Flatten nested JSON fields into an attribute bag.
///
/// Nested keys join with `__`; a list of objects becomes one list per key,
/// nested lists are concatenated.
pub fn flatten_fields(fields: &serde_json::Map<String, Value>) -> AttributeBag {
    let mut bag = AttributeBag::new();
    for (key, value) in fields {
        flatten_value(&mut bag, clean_key(key), value, false);
    }
    bag
}
