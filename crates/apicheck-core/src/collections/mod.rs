//! Ordered, recursively wrapped containers for test payloads.
//!
//! Every mapping reached through a container is itself a [`Dict`], and every
//! sequence a [`Sequence`], so nested response data can be queried with the
//! same API at any depth. Two addressing modes exist:
//!
//! - [`ExtDict`]: key and attribute style access. Integer keys are stored
//!   as their decimal text.
//! - [`TupleDict`]: additionally answers positional queries over its values
//!   and refuses integer keys, so a position can never be mistaken for a key.

mod dict;
pub mod diff;
mod node;
mod sequence;

use std::fmt;

use thiserror::Error;

pub use dict::{Dict, ExtDict, TupleDict};
pub use node::Node;
pub use sequence::{SeqKind, Sequence};

/// Key policy for a container family.
pub trait Addressing: Clone + fmt::Debug + Default + PartialEq + Send + Sync + 'static {
    /// Container name used in error messages.
    const NAME: &'static str;

    /// Turn a requested key into the stored string key.
    ///
    /// # Errors
    ///
    /// Returns [`DictError::IntegerKey`] if the policy refuses the key.
    fn admit_key(key: Key) -> Result<String, DictError>;
}

/// Key and attribute addressing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Keyed;

/// Key addressing plus positional access over values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Indexed;

impl Addressing for Keyed {
    const NAME: &'static str = "ExtDict";

    fn admit_key(key: Key) -> Result<String, DictError> {
        Ok(match key {
            Key::Name(name) => name,
            Key::Index(i) => i.to_string(),
        })
    }
}

impl Addressing for Indexed {
    const NAME: &'static str = "TupleDict";

    fn admit_key(key: Key) -> Result<String, DictError> {
        match key {
            Key::Name(name) => Ok(name),
            Key::Index(key) => Err(DictError::IntegerKey {
                container: Self::NAME,
                key,
            }),
        }
    }
}

/// A key as requested by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Name(String),
    Index(i64),
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Self::Name(value.to_string())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Self::Name(value)
    }
}

impl From<&String> for Key {
    fn from(value: &String) -> Self {
        Self::Name(value.clone())
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Self::Index(value)
    }
}

impl From<i32> for Key {
    fn from(value: i32) -> Self {
        Self::Index(i64::from(value))
    }
}

/// Errors from container access and derived operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DictError {
    #[error("key '{0}' not found")]
    KeyNotFound(String),

    #[error("'{container}' object has no attribute '{name}'")]
    AttributeNotFound {
        container: &'static str,
        name: String,
    },

    #[error("Integers cannot be added as {container} keys (got {key})")]
    IntegerKey { container: &'static str, key: i64 },

    #[error("index {index} out of range for {len} item(s)")]
    IndexOutOfRange { index: isize, len: usize },

    #[error(
        "can't multiply value of key '{key}' of type '{value_type}' by non-int of type '{factor_type}'"
    )]
    Multiply {
        key: String,
        value_type: &'static str,
        factor_type: &'static str,
    },

    #[error("path '{path}' cannot descend into segment '{segment}'")]
    PathNotTraversable { path: String, segment: String },
}
