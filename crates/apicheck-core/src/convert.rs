//! Recursive conversion of plain JSON trees into the crate's containers.
//!
//! Parsed payloads (HTTP bodies, fixture files, database rows) arrive as
//! `serde_json::Value`. The converter walks them once and produces a
//! [`Node`] tree where every mapping is a [`Dict`] and every array a
//! [`Sequence`]. Depth is bounded so a hostile document fails with an
//! error instead of exhausting the stack.

use serde_json::Value;
use thiserror::Error;

use crate::collections::{Addressing, Dict, Node, Sequence};

/// Nesting depth accepted by [`RecursiveConverter::default`].
pub const DEFAULT_MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConvertError {
    #[error("nesting deeper than {max_depth} levels")]
    DepthExceeded { max_depth: usize },

    #[error("expected a mapping at the top level, found {found}")]
    NotAMapping { found: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecursiveConverter {
    max_depth: usize,
}

impl Default for RecursiveConverter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

impl RecursiveConverter {
    #[must_use]
    pub const fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Convert any JSON value. Scalars pass through unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::DepthExceeded`] past the configured depth.
    pub fn convert<A: Addressing>(&self, value: &Value) -> Result<Node<A>, ConvertError> {
        self.node(value, 0)
    }

    /// Convert a JSON object into a top-level container.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::NotAMapping`] for anything but an object, or
    /// [`ConvertError::DepthExceeded`] past the configured depth.
    pub fn to_dict<A: Addressing>(&self, value: &Value) -> Result<Dict<A>, ConvertError> {
        match self.node(value, 0)? {
            Node::Map(dict) => Ok(dict),
            _ => Err(ConvertError::NotAMapping {
                found: json_kind(value),
            }),
        }
    }

    /// Re-tag an existing tree under another addressing mode. Sequence
    /// kinds are kept.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::DepthExceeded`] past the configured depth.
    pub fn readdress<A: Addressing, B: Addressing>(
        &self,
        node: &Node<A>,
    ) -> Result<Node<B>, ConvertError> {
        let depth = depth_of(node);
        if depth > self.max_depth {
            return Err(ConvertError::DepthExceeded {
                max_depth: self.max_depth,
            });
        }
        Ok(node.readdress())
    }

    fn node<A: Addressing>(&self, value: &Value, depth: usize) -> Result<Node<A>, ConvertError> {
        if depth > self.max_depth {
            return Err(ConvertError::DepthExceeded {
                max_depth: self.max_depth,
            });
        }
        Ok(match value {
            Value::Null => Node::Null,
            Value::Bool(b) => Node::Bool(*b),
            Value::Number(n) => Node::Number(n.clone()),
            Value::String(s) => Node::String(s.clone()),
            Value::Array(items) => Node::Seq(Sequence::list(
                items
                    .iter()
                    .map(|item| self.node(item, depth + 1))
                    .collect::<Result<_, _>>()?,
            )),
            Value::Object(map) => {
                let mut dict = Dict::new();
                for (key, item) in map {
                    dict.insert(key.clone(), self.node(item, depth + 1)?);
                }
                Node::Map(dict)
            }
        })
    }
}

fn depth_of<A: Addressing>(node: &Node<A>) -> usize {
    match node {
        Node::Seq(seq) => 1 + seq.iter().map(depth_of).max().unwrap_or(0),
        Node::Map(dict) => 1 + dict.values().map(depth_of).max().unwrap_or(0),
        _ => 0,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::{ExtDict, Indexed, Keyed, SeqKind, TupleDict};
    use proptest::prelude::*;
    use serde_json::json;

    fn nested(depth: usize) -> Value {
        (0..depth).fold(json!(1), |inner, _| json!({ "n": inner }))
    }

    #[test]
    fn every_nested_mapping_becomes_a_container() {
        let dict: ExtDict = RecursiveConverter::default()
            .to_dict(&json!({"a": [{"b": {"c": 1}}]}))
            .unwrap();
        let inner = dict.path("a.0.b").unwrap();
        assert!(inner.as_dict().is_some());
        assert_eq!(dict.path("a.0.b.c").unwrap().as_i64(), Some(1));
    }

    #[test]
    fn scalars_pass_through() {
        let conv = RecursiveConverter::default();
        let node: Node = conv.convert(&json!("text")).unwrap();
        assert_eq!(node, Node::String("text".into()));
        let node: Node = conv.convert(&json!(null)).unwrap();
        assert!(node.is_null());
    }

    #[test]
    fn depth_guard_rejects_deep_documents() {
        let conv = RecursiveConverter::new(8);
        assert!(conv.convert::<Keyed>(&nested(8)).is_ok());
        assert_eq!(
            conv.convert::<Keyed>(&nested(9)).unwrap_err(),
            ConvertError::DepthExceeded { max_depth: 8 }
        );
    }

    #[test]
    fn readdress_keeps_sequence_kinds() {
        let mut source = ExtDict::new();
        source.insert("pair", Sequence::tuple(vec![Node::from(1), Node::from(2)]));
        source.insert("tags", Sequence::set(vec![Node::from("x")]));
        let node: Node<Indexed> = RecursiveConverter::default()
            .readdress(&Node::Map(source))
            .unwrap();
        let dict: &TupleDict = node.as_dict().unwrap();
        assert_eq!(dict.attr("pair").unwrap().as_seq().unwrap().kind(), SeqKind::Tuple);
        assert_eq!(dict.attr("tags").unwrap().as_seq().unwrap().kind(), SeqKind::Set);
        assert_eq!(dict.at(0).unwrap().as_seq().unwrap().len(), 2);
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            "[a-z]{0,6}".prop_map(Value::String),
        ];
        leaf.prop_recursive(4, 32, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::vec(("[a-z]{1,4}", inner), 0..4).prop_map(|pairs| {
                    Value::Object(pairs.into_iter().collect())
                }),
            ]
        })
    }

    proptest! {
        #[test]
        fn conversion_preserves_the_json_view(value in arb_json()) {
            let node: Node = RecursiveConverter::default().convert(&value).unwrap();
            prop_assert_eq!(node.to_json(), value);
        }

        #[test]
        fn reconverting_is_a_no_op(value in arb_json()) {
            let conv = RecursiveConverter::default();
            let once: Node = conv.convert(&value).unwrap();
            let twice: Node = conv.convert(&once.to_json()).unwrap();
            prop_assert_eq!(once, twice);
        }
    }
}
