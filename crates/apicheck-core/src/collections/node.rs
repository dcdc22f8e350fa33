//! The value tree stored inside every container.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone};
use serde::de::{self, Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_json::{Number, Value};

use super::{Addressing, Dict, Keyed, Sequence};
use crate::convert::RecursiveConverter;

/// A single value in a nested payload.
///
/// Mappings and sequences are always the crate's own containers, so a
/// `Node` reached through any path can be queried with the same API as the
/// root it came from.
#[derive(Debug, Clone, PartialEq)]
pub enum Node<A: Addressing = Keyed> {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Seq(Sequence<A>),
    Map(Dict<A>),
}

impl<A: Addressing> Node<A> {
    /// Short type label used in error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Seq(seq) => seq.kind().as_str(),
            Self::Map(_) => A::NAME,
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Number(n) => n.as_u64(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_seq(&self) -> Option<&Sequence<A>> {
        match self {
            Self::Seq(seq) => Some(seq),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_dict(&self) -> Option<&Dict<A>> {
        match self {
            Self::Map(dict) => Some(dict),
            _ => None,
        }
    }

    pub fn as_dict_mut(&mut self) -> Option<&mut Dict<A>> {
        match self {
            Self::Map(dict) => Some(dict),
            _ => None,
        }
    }

    /// Truthiness in the sense test assertions expect: empty strings,
    /// empty containers, zero, `false` and null are all falsy.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
            Self::String(s) => !s.is_empty(),
            Self::Seq(seq) => !seq.is_empty(),
            Self::Map(dict) => !dict.is_empty(),
        }
    }

    /// Plain JSON view of the tree. Tuples and sets become arrays.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => Value::Number(n.clone()),
            Self::String(s) => Value::String(s.clone()),
            Self::Seq(seq) => Value::Array(seq.iter().map(Node::to_json).collect()),
            Self::Map(dict) => dict.to_json(),
        }
    }

    /// Re-tag the tree with another addressing mode, keeping sequence kinds.
    #[must_use]
    pub fn readdress<B: Addressing>(&self) -> Node<B> {
        match self {
            Self::Null => Node::Null,
            Self::Bool(b) => Node::Bool(*b),
            Self::Number(n) => Node::Number(n.clone()),
            Self::String(s) => Node::String(s.clone()),
            Self::Seq(seq) => Node::Seq(seq.readdress()),
            Self::Map(dict) => Node::Map(dict.readdress()),
        }
    }

    /// Equality against a JSON scalar. Containers never match.
    #[must_use]
    pub fn eq_scalar(&self, marker: &Value) -> bool {
        match (self, marker) {
            (Self::Null, Value::Null) => true,
            (Self::Bool(a), Value::Bool(b)) => a == b,
            (Self::String(a), Value::String(b)) => a == b,
            (Self::Number(a), Value::Number(b)) => numbers_equal(a, b),
            _ => false,
        }
    }

    /// Text rendering used for headers, query strings and form fields.
    /// Strings are emitted raw, containers as compact JSON, null as empty.
    #[must_use]
    pub fn scalar_text(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => n.to_string(),
            Self::String(s) => s.clone(),
            Self::Seq(_) | Self::Map(_) => self.to_string(),
        }
    }

    pub(crate) fn numeric(&self) -> Option<f64> {
        match self {
            Self::Bool(b) => Some(f64::from(u8::from(*b))),
            Self::Number(n) => n.as_f64(),
            _ => None,
        }
    }
}

fn numbers_equal(a: &Number, b: &Number) -> bool {
    match (a.as_i64(), b.as_i64()) {
        (Some(x), Some(y)) => x == y,
        _ => match (a.as_u64(), b.as_u64()) {
            (Some(x), Some(y)) => x == y,
            _ => a.as_f64() == b.as_f64(),
        },
    }
}

impl<A: Addressing> Default for Node<A> {
    fn default() -> Self {
        Self::Null
    }
}

impl<A: Addressing> fmt::Display for Node<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

impl<A: Addressing> Serialize for Node<A> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Number(n) => n.serialize(serializer),
            Self::String(s) => serializer.serialize_str(s),
            Self::Seq(seq) => {
                let mut out = serializer.serialize_seq(Some(seq.len()))?;
                for item in seq {
                    out.serialize_element(item)?;
                }
                out.end()
            }
            Self::Map(dict) => {
                let mut out = serializer.serialize_map(Some(dict.len()))?;
                for (key, value) in dict {
                    out.serialize_entry(key, value)?;
                }
                out.end()
            }
        }
    }
}

impl<'de, A: Addressing> Deserialize<'de> for Node<A> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        RecursiveConverter::default()
            .convert(&value)
            .map_err(de::Error::custom)
    }
}

impl<A: Addressing> TryFrom<Value> for Node<A> {
    type Error = crate::convert::ConvertError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        RecursiveConverter::default().convert(&value)
    }
}

// ── scalar conversions ──

impl<A: Addressing> From<bool> for Node<A> {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

macro_rules! from_integer {
    ($($t:ty),*) => {
        $(impl<A: Addressing> From<$t> for Node<A> {
            fn from(value: $t) -> Self {
                Self::Number(Number::from(value))
            }
        })*
    };
}

from_integer!(i8, i16, i32, i64, u8, u16, u32, u64, usize);

impl<A: Addressing> From<f64> for Node<A> {
    /// Non-finite floats have no JSON form and become null.
    fn from(value: f64) -> Self {
        Number::from_f64(value).map_or(Self::Null, Self::Number)
    }
}

impl<A: Addressing> From<&str> for Node<A> {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl<A: Addressing> From<String> for Node<A> {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl<A: Addressing> From<&String> for Node<A> {
    fn from(value: &String) -> Self {
        Self::String(value.clone())
    }
}

impl<A: Addressing> From<Dict<A>> for Node<A> {
    fn from(value: Dict<A>) -> Self {
        Self::Map(value)
    }
}

impl<A: Addressing> From<Sequence<A>> for Node<A> {
    fn from(value: Sequence<A>) -> Self {
        Self::Seq(value)
    }
}

impl<A: Addressing> From<Vec<Node<A>>> for Node<A> {
    fn from(value: Vec<Node<A>>) -> Self {
        Self::Seq(Sequence::list(value))
    }
}

impl<A: Addressing, T: Into<Node<A>>> From<Option<T>> for Node<A> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

// Date-time values are stored as ISO-8601 text so they survive any later
// JSON encoding unchanged.

impl<A: Addressing, Tz: TimeZone> From<DateTime<Tz>> for Node<A>
where
    Tz::Offset: fmt::Display,
{
    fn from(value: DateTime<Tz>) -> Self {
        Self::String(value.to_rfc3339())
    }
}

impl<A: Addressing> From<NaiveDateTime> for Node<A> {
    fn from(value: NaiveDateTime) -> Self {
        Self::String(value.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
    }
}

impl<A: Addressing> From<NaiveDate> for Node<A> {
    fn from(value: NaiveDate) -> Self {
        Self::String(value.format("%Y-%m-%d").to_string())
    }
}
