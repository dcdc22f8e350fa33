//! Structural difference between two payloads.

use std::fmt;

use serde::Serialize;
use serde_json::Value;

/// One change found while walking two trees side by side.
///
/// Paths use the `root['key'][0]` notation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum Difference {
    ValueChanged {
        path: String,
        left: Value,
        right: Value,
    },
    TypeChanged {
        path: String,
        left_type: &'static str,
        right_type: &'static str,
    },
    ItemAdded {
        path: String,
        value: Value,
    },
    ItemRemoved {
        path: String,
        value: Value,
    },
}

impl fmt::Display for Difference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValueChanged { path, left, right } => {
                write!(f, "{path}: {left} -> {right}")
            }
            Self::TypeChanged {
                path,
                left_type,
                right_type,
            } => write!(f, "{path}: type {left_type} -> {right_type}"),
            Self::ItemAdded { path, value } => write!(f, "{path}: added {value}"),
            Self::ItemRemoved { path, value } => write!(f, "{path}: removed {value}"),
        }
    }
}

/// Walk both values and collect every difference, left to right.
#[must_use]
pub fn diff(left: &Value, right: &Value) -> Vec<Difference> {
    let mut out = Vec::new();
    walk("root", left, right, &mut out);
    out
}

fn walk(path: &str, left: &Value, right: &Value, out: &mut Vec<Difference>) {
    match (left, right) {
        (Value::Object(l), Value::Object(r)) => {
            for (key, lv) in l {
                let child = format!("{path}['{key}']");
                match r.get(key) {
                    Some(rv) => walk(&child, lv, rv, out),
                    None => out.push(Difference::ItemRemoved {
                        path: child,
                        value: lv.clone(),
                    }),
                }
            }
            for (key, rv) in r {
                if !l.contains_key(key) {
                    out.push(Difference::ItemAdded {
                        path: format!("{path}['{key}']"),
                        value: rv.clone(),
                    });
                }
            }
        }
        (Value::Array(l), Value::Array(r)) => {
            for (i, lv) in l.iter().enumerate() {
                let child = format!("{path}[{i}]");
                match r.get(i) {
                    Some(rv) => walk(&child, lv, rv, out),
                    None => out.push(Difference::ItemRemoved {
                        path: child,
                        value: lv.clone(),
                    }),
                }
            }
            for (i, rv) in r.iter().enumerate().skip(l.len()) {
                out.push(Difference::ItemAdded {
                    path: format!("{path}[{i}]"),
                    value: rv.clone(),
                });
            }
        }
        _ if kind(left) != kind(right) => out.push(Difference::TypeChanged {
            path: path.to_string(),
            left_type: kind(left),
            right_type: kind(right),
        }),
        _ if left != right => out.push(Difference::ValueChanged {
            path: path.to_string(),
            left: left.clone(),
            right: right.clone(),
        }),
        _ => {}
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
