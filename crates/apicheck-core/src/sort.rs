//! Deterministic recursive ordering with exclusion rules.
//!
//! Mapping keys are ordered at every depth and sequences of mutually
//! comparable items are sorted. Exclusion rules keep selected containers in
//! their original order while their contents are still sorted.

use std::cell::Cell;
use std::cmp::Ordering;

use serde_json::Value;
use thiserror::Error;

use crate::collections::{Addressing, Dict, Node, SeqKind, Sequence};

/// How exclusion markers combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchPolicy {
    /// One matching marker is enough.
    #[default]
    Any,
    /// Every configured marker must match.
    All,
}

/// Which containers stay in their original order.
///
/// `items` are scalars: a mapping holding one of them as a key, or a
/// sequence holding one of them as an element, is excluded. `pairs` are
/// key/value markers checked against mappings only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SortRules {
    pub items: Vec<Value>,
    pub pairs: Vec<(String, Value)>,
    pub policy: MatchPolicy,
    pub reverse: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SortRuleError {
    #[error("pair marker '{0}' is not of the form key:value")]
    MalformedPair(String),
}

impl SortRules {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_items(mut self, items: impl IntoIterator<Item = Value>) -> Self {
        self.items.extend(items);
        self
    }

    #[must_use]
    pub fn with_pairs<K: Into<String>>(mut self, pairs: impl IntoIterator<Item = (K, Value)>) -> Self {
        self.pairs.extend(pairs.into_iter().map(|(k, v)| (k.into(), v)));
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: MatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn reversed(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    /// Parse a comma separated list of item markers.
    #[must_use]
    pub fn parse_items(text: &str) -> Vec<Value> {
        text.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(parse_scalar)
            .collect()
    }

    /// Parse `key:value` markers separated by commas.
    ///
    /// # Errors
    ///
    /// Returns [`SortRuleError::MalformedPair`] for an entry without a colon.
    pub fn parse_pairs(text: &str) -> Result<Vec<(String, Value)>, SortRuleError> {
        text.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|entry| {
                entry
                    .split_once(':')
                    .map(|(k, v)| (k.trim().to_string(), parse_scalar(v.trim())))
                    .ok_or_else(|| SortRuleError::MalformedPair(entry.to_string()))
            })
            .collect()
    }

    fn configured(&self) -> bool {
        !self.items.is_empty() || !self.pairs.is_empty()
    }
}

/// Interpret command-line text as the scalar it spells: booleans, null and
/// numbers are recognised, anything else stays a string.
#[must_use]
pub fn parse_scalar(text: &str) -> Value {
    match text {
        "true" | "True" => Value::Bool(true),
        "false" | "False" => Value::Bool(false),
        "null" | "None" => Value::Null,
        _ => text
            .parse::<i64>()
            .map(Value::from)
            .ok()
            .or_else(|| {
                text.parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
            })
            .unwrap_or_else(|| Value::String(text.to_string())),
    }
}

pub struct RecursiveSort<'a> {
    rules: &'a SortRules,
}

impl<'a> RecursiveSort<'a> {
    #[must_use]
    pub fn new(rules: &'a SortRules) -> Self {
        Self { rules }
    }

    #[must_use]
    pub fn sort<A: Addressing>(&self, node: &Node<A>) -> Node<A> {
        match node {
            Node::Map(dict) => Node::Map(self.sort_dict(dict)),
            Node::Seq(seq) => Node::Seq(self.sort_seq(seq)),
            scalar => scalar.clone(),
        }
    }

    #[must_use]
    pub fn sort_dict<A: Addressing>(&self, dict: &Dict<A>) -> Dict<A> {
        let mut entries: Vec<(String, Node<A>)> = dict
            .iter()
            .map(|(k, v)| (k.clone(), self.sort(v)))
            .collect();
        if !self.dict_excluded(dict) {
            if self.rules.reverse {
                entries.sort_by(|a, b| b.0.cmp(&a.0));
            } else {
                entries.sort_by(|a, b| a.0.cmp(&b.0));
            }
        }
        entries.into_iter().collect()
    }

    #[must_use]
    pub fn sort_seq<A: Addressing>(&self, seq: &Sequence<A>) -> Sequence<A> {
        let items: Vec<Node<A>> = seq.iter().map(|item| self.sort(item)).collect();
        if self.seq_excluded(seq) {
            return Sequence::from_parts(seq.kind(), items);
        }
        let Some(order) = sorted_order(&items, self.rules.reverse) else {
            return Sequence::from_parts(seq.kind(), items);
        };
        let mut slots: Vec<Option<Node<A>>> = items.into_iter().map(Some).collect();
        let sorted = order.into_iter().filter_map(|i| slots[i].take()).collect();
        Sequence::from_parts(seq.kind(), sorted)
    }

    fn dict_excluded<A: Addressing>(&self, dict: &Dict<A>) -> bool {
        let rules = self.rules;
        let item_hits = rules
            .items
            .iter()
            .filter(|m| m.as_str().is_some_and(|key| dict.contains_key(key)))
            .count();
        let pair_hits = rules
            .pairs
            .iter()
            .filter(|(key, marker)| dict.lookup(key).is_some_and(|v| v.eq_scalar(marker)))
            .count();
        match rules.policy {
            MatchPolicy::Any => item_hits + pair_hits > 0,
            MatchPolicy::All => {
                rules.configured()
                    && item_hits == rules.items.len()
                    && pair_hits == rules.pairs.len()
            }
        }
    }

    fn seq_excluded<A: Addressing>(&self, seq: &Sequence<A>) -> bool {
        let rules = self.rules;
        let hits = rules
            .items
            .iter()
            .filter(|marker| seq.iter().any(|item| item.eq_scalar(marker)))
            .count();
        match rules.policy {
            MatchPolicy::Any => hits > 0,
            MatchPolicy::All => !rules.items.is_empty() && hits == rules.items.len(),
        }
    }
}

/// Key for one sequence element.
#[derive(Debug, Clone)]
enum SortKey {
    Int(i128),
    Float(f64),
    Text(String),
    Seq(SeqKind, Vec<SortKey>),
}

impl SortKey {
    fn of<A: Addressing>(node: &Node<A>) -> Option<Self> {
        match node {
            Node::Bool(b) => Some(Self::Int(i128::from(*b))),
            Node::Number(n) => n
                .as_i64()
                .map(|i| Self::Int(i128::from(i)))
                .or_else(|| n.as_u64().map(|u| Self::Int(i128::from(u))))
                .or_else(|| n.as_f64().map(Self::Float)),
            Node::String(s) => Some(Self::Text(s.clone())),
            Node::Seq(seq) if seq.kind() != SeqKind::Set => seq
                .iter()
                .map(Self::of)
                .collect::<Option<Vec<_>>>()
                .map(|keys| Self::Seq(seq.kind(), keys)),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Int(_) | Self::Float(_) => 0,
            Self::Text(_) => 1,
            Self::Seq(..) => 2,
        }
    }

    /// Total order over keys. Pairs that have no natural order (text
    /// against a number, a list against a tuple) still get one so sorting
    /// stays consistent, but `incomparable` is raised.
    fn compare(&self, other: &Self, incomparable: &Cell<bool>) -> Ordering {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b),
            (Self::Int(a), Self::Float(b)) => int_float_cmp(*a, *b),
            (Self::Float(a), Self::Int(b)) => int_float_cmp(*b, *a).reverse(),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Seq(ka, a), Self::Seq(kb, b)) => {
                if ka != kb {
                    incomparable.set(true);
                    return (*ka as u8).cmp(&(*kb as u8));
                }
                for (x, y) in a.iter().zip(b) {
                    let ord = x.compare(y, incomparable);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            _ => {
                incomparable.set(true);
                self.rank().cmp(&other.rank())
            }
        }
    }
}

/// Exact comparison of an integer with a float.
fn int_float_cmp(int: i128, float: f64) -> Ordering {
    if float.is_nan() {
        return Ordering::Less;
    }
    let whole = float.trunc();
    // 2^127 is exact as f64; anything at or beyond it is out of i128 range
    if whole >= 170_141_183_460_469_231_731_687_303_715_884_105_728.0 {
        return Ordering::Less;
    }
    if whole < -170_141_183_460_469_231_731_687_303_715_884_105_728.0 {
        return Ordering::Greater;
    }
    #[allow(clippy::cast_possible_truncation)]
    let truncated = whole as i128;
    match int.cmp(&truncated) {
        Ordering::Equal if float > whole => Ordering::Less,
        Ordering::Equal if float < whole => Ordering::Greater,
        ord => ord,
    }
}

/// Sorted order of `items`, or `None` when they are not mutually
/// comparable: any mapping, set or null, or a pair of mismatched kinds met
/// while sorting.
fn sorted_order<A: Addressing>(items: &[Node<A>], reverse: bool) -> Option<Vec<usize>> {
    let keys = items.iter().map(SortKey::of).collect::<Option<Vec<_>>>()?;
    let incomparable = Cell::new(false);
    let mut order: Vec<usize> = (0..items.len()).collect();
    if reverse {
        order.sort_by(|&a, &b| keys[b].compare(&keys[a], &incomparable));
    } else {
        order.sort_by(|&a, &b| keys[a].compare(&keys[b], &incomparable));
    }
    (!incomparable.get()).then_some(order)
}
