//! Loose comparison helpers for asserting on response payloads.
//!
//! A [`Pattern`] mirrors the shape of an expected payload, with
//! [`Matcher`]s standing in for the parts a test does not want to compare
//! exactly (generated ids, timestamps, unordered collections).

use std::fmt;

use indexmap::IndexMap;

use crate::collections::{ExtDict, Node};

/// A single loose comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Matcher {
    /// Matches anything.
    Ignore,
    /// Same items as `expected`, in any order.
    IgnoreOrder(Vec<Node>),
    /// A string ending with the given suffix.
    EndsWith(String),
    /// Same content as `expected` regardless of key order.
    CanonicalEq(Node),
}

impl Matcher {
    #[must_use]
    pub fn matches(&self, actual: &Node) -> bool {
        match self {
            Self::Ignore => true,
            Self::IgnoreOrder(expected) => actual
                .as_seq()
                .is_some_and(|seq| same_items(expected, seq.items())),
            Self::EndsWith(suffix) => actual.as_str().is_some_and(|s| s.ends_with(suffix.as_str())),
            Self::CanonicalEq(expected) => expected.to_json() == actual.to_json(),
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ignore => f.write_str("<any>"),
            Self::IgnoreOrder(items) => {
                write!(f, "<any order of {}>", Node::from(items.clone()))
            }
            Self::EndsWith(suffix) => write!(f, "<ends with {suffix:?}>"),
            Self::CanonicalEq(node) => write!(f, "<canonical {node}>"),
        }
    }
}

/// Multiset equality: each expected item consumes one equal actual item.
fn same_items(expected: &[Node], actual: &[Node]) -> bool {
    if expected.len() != actual.len() {
        return false;
    }
    let mut used = vec![false; actual.len()];
    expected.iter().all(|want| {
        let hit = actual
            .iter()
            .enumerate()
            .find(|(i, got)| !used[*i] && got.to_json() == want.to_json());
        match hit {
            Some((i, _)) => {
                used[i] = true;
                true
            }
            None => false,
        }
    })
}

/// Expected shape of a payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Exact(Node),
    Match(Matcher),
    Map(IndexMap<String, Pattern>),
    List(Vec<Pattern>),
}

/// One place where the actual payload differs from the pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct Mismatch {
    pub path: String,
    pub expected: String,
    pub actual: String,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: expected {}, got {}",
            self.path, self.expected, self.actual
        )
    }
}

impl Pattern {
    /// A mapping pattern built from `(key, pattern)` pairs.
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Pattern)>) -> Self {
        Self::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    #[must_use]
    pub fn ignore() -> Self {
        Self::Match(Matcher::Ignore)
    }

    #[must_use]
    pub fn ends_with(suffix: impl Into<String>) -> Self {
        Self::Match(Matcher::EndsWith(suffix.into()))
    }

    #[must_use]
    pub fn any_order(items: Vec<Node>) -> Self {
        Self::Match(Matcher::IgnoreOrder(items))
    }

    /// Compare `actual` against the pattern.
    ///
    /// # Errors
    ///
    /// Returns every mismatch found, each with its path from `root`.
    pub fn check(&self, actual: &Node) -> Result<(), Vec<Mismatch>> {
        let mut found = Vec::new();
        self.walk("root", actual, &mut found);
        if found.is_empty() { Ok(()) } else { Err(found) }
    }

    /// Shorthand for checking a top-level mapping.
    ///
    /// # Errors
    ///
    /// See [`Pattern::check`].
    pub fn check_dict(&self, actual: &ExtDict) -> Result<(), Vec<Mismatch>> {
        self.check(&Node::Map(actual.clone()))
    }

    fn walk(&self, path: &str, actual: &Node, found: &mut Vec<Mismatch>) {
        match self {
            Self::Exact(expected) => {
                if expected.to_json() != actual.to_json() {
                    found.push(mismatch(path, expected.to_string(), actual));
                }
            }
            Self::Match(matcher) => {
                if !matcher.matches(actual) {
                    found.push(mismatch(path, matcher.to_string(), actual));
                }
            }
            Self::Map(expected) => {
                let Some(dict) = actual.as_dict() else {
                    found.push(mismatch(path, "a mapping".into(), actual));
                    return;
                };
                for (key, pattern) in expected {
                    let child = format!("{path}['{key}']");
                    match dict.lookup(key) {
                        Some(value) => pattern.walk(&child, value, found),
                        None => found.push(Mismatch {
                            path: child,
                            expected: "a value".into(),
                            actual: "<missing>".into(),
                        }),
                    }
                }
                for key in dict.keys().filter(|k| !expected.contains_key(*k)) {
                    found.push(Mismatch {
                        path: format!("{path}['{key}']"),
                        expected: "<absent>".into(),
                        actual: dict[key].to_string(),
                    });
                }
            }
            Self::List(expected) => {
                let Some(seq) = actual.as_seq() else {
                    found.push(mismatch(path, "a sequence".into(), actual));
                    return;
                };
                if seq.len() != expected.len() {
                    found.push(Mismatch {
                        path: path.to_string(),
                        expected: format!("{} item(s)", expected.len()),
                        actual: format!("{} item(s)", seq.len()),
                    });
                    return;
                }
                for (i, (pattern, item)) in expected.iter().zip(seq.iter()).enumerate() {
                    pattern.walk(&format!("{path}[{i}]"), item, found);
                }
            }
        }
    }
}

fn mismatch(path: &str, expected: String, actual: &Node) -> Mismatch {
    Mismatch {
        path: path.to_string(),
        expected,
        actual: actual.to_string(),
    }
}

impl From<Node> for Pattern {
    fn from(node: Node) -> Self {
        Self::Exact(node)
    }
}

impl From<Matcher> for Pattern {
    fn from(matcher: Matcher) -> Self {
        Self::Match(matcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(value: serde_json::Value) -> Node {
        Node::try_from(value).unwrap()
    }

    #[test]
    fn ignore_matches_anything() {
        assert!(Matcher::Ignore.matches(&node(json!({"x": [1]}))));
        assert!(Matcher::Ignore.matches(&Node::Null));
    }

    #[test]
    fn ignore_order_compares_as_multisets() {
        let m = Matcher::IgnoreOrder(vec![node(json!({"id": 1})), node(json!({"id": 2}))]);
        assert!(m.matches(&node(json!([{"id": 2}, {"id": 1}]))));
        assert!(!m.matches(&node(json!([{"id": 1}, {"id": 1}]))));
        assert!(!m.matches(&node(json!([{"id": 1}]))));
        assert!(!m.matches(&node(json!("not a list"))));
    }

    #[test]
    fn ends_with_checks_suffix() {
        let m = Matcher::EndsWith(".png".into());
        assert!(m.matches(&node(json!("https://cdn/x/avatar.png"))));
        assert!(!m.matches(&node(json!("avatar.jpg"))));
        assert!(!m.matches(&node(json!(3))));
    }

    #[test]
    fn canonical_eq_ignores_key_order() {
        let m = Matcher::CanonicalEq(node(json!({"a": 1, "b": {"c": 2, "d": 3}})));
        assert!(m.matches(&node(json!({"b": {"d": 3, "c": 2}, "a": 1}))));
        assert!(!m.matches(&node(json!({"a": 1}))));
    }

    #[test]
    fn pattern_reports_each_mismatch_with_path() {
        let pattern = Pattern::map([
            ("id", Pattern::ignore()),
            ("name", Pattern::Exact(node(json!("alice")))),
            ("avatar", Pattern::ends_with(".png")),
            (
                "tags",
                Pattern::any_order(vec![node(json!("a")), node(json!("b"))]),
            ),
        ]);
        let good = node(json!({
            "id": 99, "name": "alice", "avatar": "/a.png", "tags": ["b", "a"]
        }));
        assert!(pattern.check(&good).is_ok());

        let bad = node(json!({
            "id": 1, "name": "bob", "avatar": "/a.gif", "tags": ["a", "b"], "extra": true
        }));
        let paths: Vec<String> = pattern
            .check(&bad)
            .unwrap_err()
            .into_iter()
            .map(|m| m.path)
            .collect();
        assert_eq!(paths, vec!["root['name']", "root['avatar']", "root['extra']"]);
    }

    #[test]
    fn list_patterns_check_length_first() {
        let pattern = Pattern::List(vec![Pattern::ignore(), Pattern::ignore()]);
        let err = pattern.check(&node(json!([1]))).unwrap_err();
        assert_eq!(err[0].to_string(), "root: expected 2 item(s), got 1 item(s)");
    }
}
