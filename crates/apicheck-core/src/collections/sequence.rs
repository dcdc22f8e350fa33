use std::ops::Index;

use serde::{Deserialize, Serialize};

use super::{Addressing, DictError, Keyed, Node};

/// Which kind of sequence a payload held before conversion.
///
/// JSON only knows lists; tuples and sets appear when trees are built in
/// code, and conversion keeps the kind so a round trip never changes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeqKind {
    #[default]
    List,
    Tuple,
    Set,
}

impl SeqKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Tuple => "tuple",
            Self::Set => "set",
        }
    }
}

/// An ordered run of nodes with list-like helpers.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sequence<A: Addressing = Keyed> {
    kind: SeqKind,
    items: Vec<Node<A>>,
}

impl<A: Addressing> Sequence<A> {
    /// Sets drop repeated members, keeping the first occurrence.
    #[must_use]
    pub fn new(kind: SeqKind, items: Vec<Node<A>>) -> Self {
        let items = if kind == SeqKind::Set {
            let mut unique: Vec<Node<A>> = Vec::with_capacity(items.len());
            for item in items {
                if !unique.contains(&item) {
                    unique.push(item);
                }
            }
            unique
        } else {
            items
        };
        Self { kind, items }
    }

    #[must_use]
    pub fn list(items: Vec<Node<A>>) -> Self {
        Self::new(SeqKind::List, items)
    }

    #[must_use]
    pub fn tuple(items: Vec<Node<A>>) -> Self {
        Self::new(SeqKind::Tuple, items)
    }

    #[must_use]
    pub fn set(items: Vec<Node<A>>) -> Self {
        Self::new(SeqKind::Set, items)
    }

    #[must_use]
    pub fn kind(&self) -> SeqKind {
        self.kind
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Node<A>> {
        self.items.iter()
    }

    #[must_use]
    pub fn items(&self) -> &[Node<A>] {
        &self.items
    }

    #[must_use]
    pub fn into_items(self) -> Vec<Node<A>> {
        self.items
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Node<A>> {
        self.items.get(index)
    }

    /// Positional access; negative indices count from the end.
    ///
    /// # Errors
    ///
    /// Returns [`DictError::IndexOutOfRange`] when the index falls outside
    /// the sequence.
    pub fn at(&self, index: isize) -> Result<&Node<A>, DictError> {
        resolve_index(index, self.len()).map(|i| &self.items[i])
    }

    /// Appends an item. Sets ignore members they already hold.
    pub fn push(&mut self, item: Node<A>) {
        if self.kind == SeqKind::Set && self.items.contains(&item) {
            return;
        }
        self.items.push(item);
    }

    /// Copy without the item at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`DictError::IndexOutOfRange`] for an index past either end.
    pub fn crop(&self, index: isize) -> Result<Self, DictError> {
        let position = resolve_index(index, self.len())?;
        let mut copy = self.clone();
        copy.items.remove(position);
        Ok(copy)
    }

    /// Copy with `item` appended.
    #[must_use]
    pub fn add(&self, item: impl Into<Node<A>>) -> Self {
        let mut copy = self.clone();
        copy.push(item.into());
        copy
    }

    #[must_use]
    pub fn readdress<B: Addressing>(&self) -> Sequence<B> {
        Sequence {
            kind: self.kind,
            items: self.items.iter().map(Node::readdress).collect(),
        }
    }

    pub(crate) fn from_parts(kind: SeqKind, items: Vec<Node<A>>) -> Self {
        Self { kind, items }
    }
}

pub(crate) fn resolve_index(index: isize, len: usize) -> Result<usize, DictError> {
    let resolved = if index < 0 {
        len.checked_sub(index.unsigned_abs())
    } else {
        Some(index.unsigned_abs())
    };
    resolved
        .filter(|&i| i < len)
        .ok_or(DictError::IndexOutOfRange { index, len })
}

impl<A: Addressing> Index<usize> for Sequence<A> {
    type Output = Node<A>;

    fn index(&self, index: usize) -> &Node<A> {
        &self.items[index]
    }
}

impl<'a, A: Addressing> IntoIterator for &'a Sequence<A> {
    type Item = &'a Node<A>;
    type IntoIter = std::slice::Iter<'a, Node<A>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<A: Addressing> IntoIterator for Sequence<A> {
    type Item = Node<A>;
    type IntoIter = std::vec::IntoIter<Node<A>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<A: Addressing> FromIterator<Node<A>> for Sequence<A> {
    fn from_iter<I: IntoIterator<Item = Node<A>>>(iter: I) -> Self {
        Self::list(iter.into_iter().collect())
    }
}
