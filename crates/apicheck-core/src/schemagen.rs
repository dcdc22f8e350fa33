//! JSON Schema inference from sample documents.
//!
//! Every sample widens the schema: objects merge their properties and keep
//! only the keys present in all samples as `required`, array items merge
//! into one item schema, and scalar types accumulate.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde_json::{Map, Value, json};

use crate::collections::{Addressing, Node};

/// `$schema` written at the document root.
pub const SCHEMA_DIALECT: &str = "http://json-schema.org/schema#";

#[derive(Debug, Default, Clone)]
struct Shape {
    types: BTreeSet<&'static str>,
    properties: IndexMap<String, Shape>,
    /// `None` until the first object sample.
    required: Option<BTreeSet<String>>,
    items: Option<Box<Shape>>,
}

impl Shape {
    fn add(&mut self, value: &Value) {
        match value {
            Value::Null => {
                self.types.insert("null");
            }
            Value::Bool(_) => {
                self.types.insert("boolean");
            }
            Value::Number(n) => {
                self.types.insert(if n.is_f64() { "number" } else { "integer" });
            }
            Value::String(_) => {
                self.types.insert("string");
            }
            Value::Array(items) => {
                self.types.insert("array");
                for item in items {
                    self.items.get_or_insert_with(Box::default).add(item);
                }
            }
            Value::Object(map) => {
                self.types.insert("object");
                for (key, child) in map {
                    self.properties.entry(key.clone()).or_default().add(child);
                }
                let present: BTreeSet<String> = map.keys().cloned().collect();
                self.required = Some(match self.required.take() {
                    Some(seen) => seen.intersection(&present).cloned().collect(),
                    None => present,
                });
            }
        }
    }

    fn to_schema(&self) -> Value {
        let mut schema = Map::new();
        let mut types: Vec<&str> = self.types.iter().copied().collect();
        if self.types.contains("number") {
            types.retain(|t| *t != "integer");
        }
        match types.as_slice() {
            [] => {}
            [single] => {
                schema.insert("type".into(), json!(single));
            }
            many => {
                schema.insert("type".into(), json!(many));
            }
        }
        if self.types.contains("object") {
            let properties: Map<String, Value> = self
                .properties
                .iter()
                .map(|(k, shape)| (k.clone(), shape.to_schema()))
                .collect();
            schema.insert("properties".into(), Value::Object(properties));
            if let Some(required) = self.required.as_ref().filter(|r| !r.is_empty()) {
                schema.insert("required".into(), json!(required));
            }
        }
        if let Some(items) = &self.items {
            schema.insert("items".into(), items.to_schema());
        }
        Value::Object(schema)
    }
}

/// Infer a schema describing every sample.
#[must_use]
pub fn infer_schema_from<'a>(samples: impl IntoIterator<Item = &'a Value>) -> Value {
    let mut shape = Shape::default();
    for sample in samples {
        shape.add(sample);
    }
    let mut schema = Map::new();
    schema.insert("$schema".into(), json!(SCHEMA_DIALECT));
    if let Value::Object(body) = shape.to_schema() {
        schema.extend(body);
    }
    Value::Object(schema)
}

/// Infer a schema for one document.
#[must_use]
pub fn infer_schema<A: Addressing>(document: &Node<A>) -> Value {
    infer_schema_from([&document.to_json()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::ExtDict;

    #[test]
    fn objects_and_arrays() {
        let doc: ExtDict = serde_json::from_value(json!({
            "id": 1,
            "name": "a",
            "tags": [{"k": "x", "v": 1}, {"k": "y"}],
            "score": null
        }))
        .unwrap();
        let schema = infer_schema(&Node::Map(doc));
        assert_eq!(
            schema,
            json!({
                "$schema": SCHEMA_DIALECT,
                "type": "object",
                "properties": {
                    "id": {"type": "integer"},
                    "name": {"type": "string"},
                    "tags": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "k": {"type": "string"},
                                "v": {"type": "integer"}
                            },
                            "required": ["k"]
                        }
                    },
                    "score": {"type": "null"}
                },
                "required": ["id", "name", "score", "tags"]
            })
        );
    }

    #[test]
    fn scalar_types_accumulate() {
        let schema = infer_schema_from(&[json!([1, 2.5, "x"])]);
        assert_eq!(schema["items"]["type"], json!(["number", "string"]));
    }

    #[test]
    fn empty_array_has_no_items() {
        let schema = infer_schema_from(&[json!([])]);
        assert_eq!(schema, json!({"$schema": SCHEMA_DIALECT, "type": "array"}));
    }
}
