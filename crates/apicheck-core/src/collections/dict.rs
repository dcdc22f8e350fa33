use std::marker::PhantomData;
use std::ops::{Bound, Index, RangeBounds};

use indexmap::IndexMap;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use super::sequence::resolve_index;
use super::{Addressing, DictError, Indexed, Key, Keyed, Node, Sequence, diff};
use crate::convert::{ConvertError, RecursiveConverter};
use crate::sort::{RecursiveSort, SortRules};

/// Insertion-ordered mapping from string keys to [`Node`] values.
///
/// Cloning is a deep copy. Every derived operation (`crop`, `add`,
/// `replace`, `multiply`, `sort`) returns a fresh container and leaves
/// `self` untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct Dict<A: Addressing = Keyed> {
    entries: IndexMap<String, Node<A>>,
    mode: PhantomData<A>,
}

/// Mapping with attribute-style access.
pub type ExtDict = Dict<Keyed>;

/// Mapping that also answers positional queries over its values.
pub type TupleDict = Dict<Indexed>;

impl<A: Addressing> Default for Dict<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Addressing> Dict<A> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
            mode: PhantomData,
        }
    }

    /// Build from key/value pairs, routing every key through the
    /// container's key policy.
    ///
    /// # Errors
    ///
    /// Returns [`DictError::IntegerKey`] when a [`TupleDict`] receives an
    /// integer key.
    pub fn from_pairs<K, V, I>(pairs: I) -> Result<Self, DictError>
    where
        K: Into<Key>,
        V: Into<Node<A>>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut dict = Self::new();
        for (key, value) in pairs {
            dict.set(key, value)?;
        }
        Ok(dict)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = &Node<A>> {
        self.entries.values()
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, String, Node<A>> {
        self.entries.iter()
    }

    /// Plain lookup without an error value.
    #[must_use]
    pub fn lookup(&self, key: &str) -> Option<&Node<A>> {
        self.entries.get(key)
    }

    /// Key-style lookup.
    ///
    /// # Errors
    ///
    /// Returns [`DictError::KeyNotFound`] for a missing key.
    pub fn get(&self, key: &str) -> Result<&Node<A>, DictError> {
        self.entries
            .get(key)
            .ok_or_else(|| DictError::KeyNotFound(key.to_string()))
    }

    /// # Errors
    ///
    /// Returns [`DictError::KeyNotFound`] for a missing key.
    pub fn get_mut(&mut self, key: &str) -> Result<&mut Node<A>, DictError> {
        self.entries
            .get_mut(key)
            .ok_or_else(|| DictError::KeyNotFound(key.to_string()))
    }

    /// Attribute-style lookup. Same data as [`Dict::get`], but a miss is
    /// reported as a missing attribute.
    ///
    /// # Errors
    ///
    /// Returns [`DictError::AttributeNotFound`] for a missing key.
    pub fn attr(&self, name: &str) -> Result<&Node<A>, DictError> {
        self.entries
            .get(name)
            .ok_or_else(|| DictError::AttributeNotFound {
                container: A::NAME,
                name: name.to_string(),
            })
    }

    /// Walk a dotted path such as `data.items.0.id`. Numeric segments index
    /// into sequences and may be negative.
    ///
    /// # Errors
    ///
    /// Fails on the first segment that does not resolve.
    pub fn path(&self, dotted: &str) -> Result<&Node<A>, DictError> {
        let mut segments = dotted.split('.');
        let first = segments.next().unwrap_or_default();
        let mut current = self.attr(first)?;
        for segment in segments {
            current = match current {
                Node::Map(dict) => dict.attr(segment)?,
                Node::Seq(seq) => {
                    let index: isize =
                        segment
                            .parse()
                            .map_err(|_| DictError::PathNotTraversable {
                                path: dotted.to_string(),
                                segment: segment.to_string(),
                            })?;
                    seq.at(index)?
                }
                _ => {
                    return Err(DictError::PathNotTraversable {
                        path: dotted.to_string(),
                        segment: segment.to_string(),
                    });
                }
            };
        }
        Ok(current)
    }

    /// Store a value under a string key. Always succeeds; returns the
    /// displaced value, if any.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Node<A>>) -> Option<Node<A>> {
        self.entries.insert(key.into(), value.into())
    }

    /// Store a value under any key form the container accepts.
    ///
    /// # Errors
    ///
    /// Returns [`DictError::IntegerKey`] when the key policy rejects the key.
    pub fn set(
        &mut self,
        key: impl Into<Key>,
        value: impl Into<Node<A>>,
    ) -> Result<Option<Node<A>>, DictError> {
        let key = A::admit_key(key.into())?;
        Ok(self.entries.insert(key, value.into()))
    }

    /// Delete a key, preserving the order of the rest.
    ///
    /// # Errors
    ///
    /// Returns [`DictError::KeyNotFound`] for a missing key.
    pub fn remove(&mut self, key: &str) -> Result<Node<A>, DictError> {
        self.entries
            .shift_remove(key)
            .ok_or_else(|| DictError::KeyNotFound(key.to_string()))
    }

    /// Merge entries from another container. Existing keys keep their
    /// position; new keys are appended.
    pub fn update<B: Addressing>(&mut self, other: &Dict<B>) {
        for (key, value) in other {
            self.entries.insert(key.clone(), value.readdress());
        }
    }

    /// Copy without the given keys.
    ///
    /// # Errors
    ///
    /// Returns [`DictError::KeyNotFound`] if any key is absent.
    pub fn crop<S: AsRef<str>>(&self, keys: &[S]) -> Result<Self, DictError> {
        let mut copy = self.clone();
        for key in keys {
            copy.remove(key.as_ref())?;
        }
        Ok(copy)
    }

    /// Copy merged with `other`.
    #[must_use]
    pub fn add<B: Addressing>(&self, other: &Dict<B>) -> Self {
        let mut copy = self.clone();
        copy.update(other);
        copy
    }

    /// Copy with one key set.
    ///
    /// # Errors
    ///
    /// Returns [`DictError::IntegerKey`] when the key policy rejects the key.
    pub fn replace(
        &self,
        key: impl Into<Key>,
        value: impl Into<Node<A>>,
    ) -> Result<Self, DictError> {
        let mut copy = self.clone();
        copy.set(key, value)?;
        Ok(copy)
    }

    /// Copy with every top-level value multiplied by `factor`.
    ///
    /// Numbers multiply arithmetically (booleans count as 0 and 1). Strings
    /// and sequences repeat when the factor is an integer.
    ///
    /// # Errors
    ///
    /// Returns [`DictError::Multiply`] naming the first key whose value does
    /// not support the operation.
    pub fn multiply(&self, factor: impl Into<Node<A>>) -> Result<Self, DictError> {
        let factor = factor.into();
        let mut product = Self::new();
        for (key, value) in &self.entries {
            let scaled = multiply_node(value, &factor).ok_or_else(|| DictError::Multiply {
                key: key.clone(),
                value_type: value.type_name(),
                factor_type: factor.type_name(),
            })?;
            product.entries.insert(key.clone(), scaled);
        }
        Ok(product)
    }

    /// Copy with keys ordered at every depth and scalar sequences sorted.
    #[must_use]
    pub fn sort(&self, reverse: bool) -> Self {
        self.sort_with(&SortRules::new().reversed(reverse))
    }

    /// [`Dict::sort`] with exclusion rules.
    #[must_use]
    pub fn sort_with(&self, rules: &SortRules) -> Self {
        RecursiveSort::new(rules).sort_dict(self)
    }

    /// Structural differences from `self` to `other`.
    #[must_use]
    pub fn diff<B: Addressing>(&self, other: &Dict<B>) -> Vec<diff::Difference> {
        diff::diff(&self.to_json(), &other.to_json())
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        Value::Object(map)
    }

    #[must_use]
    pub fn readdress<B: Addressing>(&self) -> Dict<B> {
        self.entries
            .iter()
            .map(|(k, v)| (k.clone(), v.readdress()))
            .collect()
    }
}

impl Dict<Indexed> {
    /// Value at a position in insertion order; negative positions count
    /// from the end.
    ///
    /// # Errors
    ///
    /// Returns [`DictError::IndexOutOfRange`] past either end.
    pub fn at(&self, index: isize) -> Result<&Node<Indexed>, DictError> {
        let position = resolve_index(index, self.len())?;
        self.entries
            .get_index(position)
            .map(|(_, v)| v)
            .ok_or(DictError::IndexOutOfRange {
                index,
                len: self.len(),
            })
    }

    /// Values in a positional range, as a tuple. Bounds past the end are
    /// clamped.
    #[must_use]
    pub fn slice<R: RangeBounds<usize>>(&self, range: R) -> Sequence<Indexed> {
        let len = self.len();
        let start = match range.start_bound() {
            Bound::Included(&s) => s,
            Bound::Excluded(&s) => s.saturating_add(1),
            Bound::Unbounded => 0,
        }
        .min(len);
        let end = match range.end_bound() {
            Bound::Included(&e) => e.saturating_add(1),
            Bound::Excluded(&e) => e,
            Bound::Unbounded => len,
        }
        .clamp(start, len);
        let items = self.entries[start..end].values().cloned().collect();
        Sequence::tuple(items)
    }

    /// All values as a tuple.
    #[must_use]
    pub fn values_tuple(&self) -> Sequence<Indexed> {
        self.slice(..)
    }

    /// Remaining values after cropping `keys`, as a tuple.
    ///
    /// # Errors
    ///
    /// Returns [`DictError::KeyNotFound`] if any key is absent.
    pub fn crop_astuple<S: AsRef<str>>(&self, keys: &[S]) -> Result<Sequence<Indexed>, DictError> {
        Ok(self.crop(keys)?.values_tuple())
    }
}

fn multiply_node<A: Addressing>(value: &Node<A>, factor: &Node<A>) -> Option<Node<A>> {
    let int_factor = match factor {
        Node::Bool(b) => Some(i64::from(*b)),
        Node::Number(n) => n.as_i64(),
        _ => None,
    };
    match value {
        Node::Number(_) | Node::Bool(_) => {
            let lhs = match value {
                Node::Bool(b) => Some(i64::from(*b)),
                Node::Number(n) => n.as_i64(),
                _ => None,
            };
            if let (Some(a), Some(b)) = (lhs, int_factor) {
                if let Some(product) = a.checked_mul(b) {
                    return Some(Node::from(product));
                }
            }
            let a = value.numeric()?;
            let b = factor.numeric()?;
            serde_json::Number::from_f64(a * b).map(Node::Number)
        }
        Node::String(s) => {
            let times = usize::try_from(int_factor?.max(0)).ok()?;
            Some(Node::String(s.repeat(times)))
        }
        Node::Seq(seq) if seq.kind() != super::SeqKind::Set => {
            let times = usize::try_from(int_factor?.max(0)).ok()?;
            let items = seq
                .items()
                .iter()
                .cycle()
                .take(seq.len() * times)
                .cloned()
                .collect();
            Some(Node::Seq(Sequence::from_parts(seq.kind(), items)))
        }
        _ => None,
    }
}

impl<A: Addressing> Index<&str> for Dict<A> {
    type Output = Node<A>;

    /// # Panics
    ///
    /// Panics when the key is missing. Use [`Dict::get`] for a fallible
    /// lookup.
    fn index(&self, key: &str) -> &Node<A> {
        match self.entries.get(key) {
            Some(value) => value,
            None => panic!("key '{key}' not found in {}", A::NAME),
        }
    }
}

impl<'a, A: Addressing> IntoIterator for &'a Dict<A> {
    type Item = (&'a String, &'a Node<A>);
    type IntoIter = indexmap::map::Iter<'a, String, Node<A>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl<A: Addressing> IntoIterator for Dict<A> {
    type Item = (String, Node<A>);
    type IntoIter = indexmap::map::IntoIter<String, Node<A>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<A: Addressing> FromIterator<(String, Node<A>)> for Dict<A> {
    fn from_iter<I: IntoIterator<Item = (String, Node<A>)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
            mode: PhantomData,
        }
    }
}

impl<A: Addressing> Extend<(String, Node<A>)> for Dict<A> {
    fn extend<I: IntoIterator<Item = (String, Node<A>)>>(&mut self, iter: I) {
        self.entries.extend(iter);
    }
}

impl<A: Addressing> Serialize for Dict<A> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.entries.serialize(serializer)
    }
}

impl<'de, A: Addressing> Deserialize<'de> for Dict<A> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        RecursiveConverter::default()
            .to_dict(&value)
            .map_err(de::Error::custom)
    }
}

impl<A: Addressing> TryFrom<Value> for Dict<A> {
    type Error = ConvertError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        RecursiveConverter::default().to_dict(&value)
    }
}

impl<A: Addressing> std::fmt::Display for Dict<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = serde_json::to_string(self).map_err(|_| std::fmt::Error)?;
        f.write_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ext(value: Value) -> ExtDict {
        ExtDict::try_from(value).unwrap()
    }

    fn tup(value: Value) -> TupleDict {
        TupleDict::try_from(value).unwrap()
    }

    // ── lookup ──

    #[test]
    fn key_and_attribute_lookups_agree() {
        let d = ext(json!({"name": "alice", "nested": {"id": 7}}));
        assert_eq!(d.get("name").unwrap(), d.attr("name").unwrap());
        assert_eq!(d["nested"].as_dict().unwrap().attr("id").unwrap().as_i64(), Some(7));
    }

    #[test]
    fn misses_are_reported_by_access_style() {
        let d = ext(json!({"a": 1}));
        assert_eq!(d.get("b").unwrap_err(), DictError::KeyNotFound("b".into()));
        assert_eq!(
            d.attr("b").unwrap_err(),
            DictError::AttributeNotFound {
                container: "ExtDict",
                name: "b".into()
            }
        );
    }

    #[test]
    fn dotted_paths_walk_maps_and_sequences() {
        let d = ext(json!({"data": {"items": [{"id": 1}, {"id": 2}]}}));
        assert_eq!(d.path("data.items.1.id").unwrap().as_i64(), Some(2));
        assert_eq!(d.path("data.items.-1.id").unwrap().as_i64(), Some(2));
        assert!(matches!(
            d.path("data.items.x"),
            Err(DictError::PathNotTraversable { .. })
        ));
        assert!(d.path("data.missing").is_err());
    }

    #[test]
    fn nested_values_are_containers() {
        let d = ext(json!({"outer": {"inner": [{"leaf": true}]}}));
        let leaf = d
            .attr("outer")
            .and_then(|n| n.as_dict().unwrap().attr("inner"))
            .map(|n| n.as_seq().unwrap()[0].as_dict().unwrap().attr("leaf").unwrap())
            .unwrap();
        assert_eq!(leaf.as_bool(), Some(true));
    }

    // ── mutation ──

    #[test]
    fn set_stringifies_integer_keys_on_ext_dict() {
        let mut d = ExtDict::new();
        d.set(5, "five").unwrap();
        assert_eq!(d.get("5").unwrap().as_str(), Some("five"));
    }

    #[test]
    fn tuple_dict_rejects_integer_keys() {
        let mut d = TupleDict::new();
        let err = d.set(1, "x").unwrap_err();
        assert_eq!(
            err,
            DictError::IntegerKey {
                container: "TupleDict",
                key: 1
            }
        );
        assert!(err.to_string().contains("Integers cannot be added as TupleDict keys"));
        assert!(d.is_empty());
    }

    #[test]
    fn update_keeps_existing_positions() {
        let mut d = ext(json!({"a": 1, "b": 2}));
        d.update(&ext(json!({"c": 3, "a": 10})));
        assert_eq!(d.keys().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(d["a"].as_i64(), Some(10));
    }

    // ── derived copies ──

    #[test]
    fn crop_returns_copy_without_keys() {
        let d = ext(json!({"a": 1, "b": 2, "c": 3}));
        let cropped = d.crop(&["b"]).unwrap();
        assert_eq!(cropped, ext(json!({"a": 1, "c": 3})));
        assert_eq!(d.len(), 3);
    }

    #[test]
    fn crop_missing_key_fails() {
        let d = ext(json!({"a": 1}));
        assert_eq!(
            d.crop(&["a", "zzz"]).unwrap_err(),
            DictError::KeyNotFound("zzz".into())
        );
    }

    #[test]
    fn add_and_replace_leave_source_untouched() {
        let d = ext(json!({"a": 1}));
        let added = d.add(&ext(json!({"b": 2})));
        let replaced = d.replace("a", 9).unwrap();
        assert_eq!(added, ext(json!({"a": 1, "b": 2})));
        assert_eq!(replaced["a"].as_i64(), Some(9));
        assert_eq!(d, ext(json!({"a": 1})));
    }

    #[test]
    fn clone_is_deep() {
        let d = ext(json!({"inner": {"x": 1}}));
        let mut copy = d.clone();
        copy.get_mut("inner")
            .unwrap()
            .as_dict_mut()
            .unwrap()
            .insert("x", 2);
        assert_eq!(d.path("inner.x").unwrap().as_i64(), Some(1));
    }

    #[test]
    fn multiply_scales_numbers_and_repeats_text() {
        let d = ext(json!({"n": 3, "f": 1.5, "s": "ab", "l": [1], "flag": true}));
        let product = d.multiply(2).unwrap();
        assert_eq!(
            product,
            ext(json!({"n": 6, "f": 3.0, "s": "abab", "l": [1, 1], "flag": 2}))
        );
    }

    #[test]
    fn multiply_reports_offending_key() {
        let d = ext(json!({"n": 1, "m": {"x": 1}}));
        let err = d.multiply(2).unwrap_err();
        assert_eq!(
            err,
            DictError::Multiply {
                key: "m".into(),
                value_type: "ExtDict",
                factor_type: "number"
            }
        );
        assert!(ext(json!({"s": "a"})).multiply(1.5).is_err());
    }

    #[test]
    fn equality_ignores_insertion_order() {
        assert_eq!(ext(json!({"a": 1, "b": 2})), ext(json!({"b": 2, "a": 1})));
    }

    // ── positional access ──

    #[test]
    fn tuple_dict_positions_follow_insertion_order() {
        let d = tup(json!({"x": 1, "y": 2, "z": 3}));
        assert_eq!(d.at(0).unwrap().as_i64(), Some(1));
        assert_eq!(d.at(-1).unwrap().as_i64(), Some(3));
        assert_eq!(
            d.at(3).unwrap_err(),
            DictError::IndexOutOfRange { index: 3, len: 3 }
        );
        let middle: Vec<_> = d.slice(1..).iter().filter_map(Node::as_i64).collect();
        assert_eq!(middle, vec![2, 3]);
        assert_eq!(d.slice(5..9).len(), 0);
    }

    #[test]
    fn crop_astuple_returns_remaining_values() {
        let d = tup(json!({"token": "t", "user": "u", "extra": 0}));
        let (token, user) = match d.crop_astuple(&["extra"]).unwrap().items() {
            [token, user] => (token.clone(), user.clone()),
            other => panic!("unexpected shape: {other:?}"),
        };
        assert_eq!(token.as_str(), Some("t"));
        assert_eq!(user.as_str(), Some("u"));
        assert_eq!(d.values_tuple().kind(), super::super::SeqKind::Tuple);
    }

    #[test]
    fn serde_keeps_insertion_order() {
        let d = ext(json!({"z": 1, "a": {"m": 2, "b": 3}}));
        let text = serde_json::to_string(&d).unwrap();
        assert_eq!(text, r#"{"z":1,"a":{"m":2,"b":3}}"#);
        let back: ExtDict = serde_json::from_str(&text).unwrap();
        assert_eq!(back.keys().collect::<Vec<_>>(), vec!["z", "a"]);
    }

    #[test]
    fn non_mapping_input_is_rejected() {
        assert!(matches!(
            ExtDict::try_from(json!([1, 2])),
            Err(ConvertError::NotAMapping { .. })
        ));
    }
}
