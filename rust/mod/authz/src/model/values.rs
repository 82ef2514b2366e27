use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The token meaning "all values permitted" for a field.
pub const WILDCARD: &str = "*";

/// An ordered set of permitted value tokens for one field.
///
/// Serialized as a plain JSON array, e.g. `["01", "02"]` or `["*"]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValueSet(BTreeSet<String>);

impl ValueSet {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// `{*}`.
    pub fn wildcard() -> Self {
        Self::from_iter([WILDCARD])
    }

    pub fn contains(&self, value: &str) -> bool {
        self.0.contains(value)
    }

    pub fn has_wildcard(&self) -> bool {
        self.0.contains(WILDCARD)
    }

    /// Whether `value` is permitted: listed explicitly, or covered by `*`.
    pub fn permits(&self, value: &str) -> bool {
        self.has_wildcard() || self.0.contains(value)
    }

    pub fn insert(&mut self, value: impl Into<String>) -> bool {
        self.0.insert(value.into())
    }

    pub fn remove(&mut self, value: &str) -> bool {
        self.0.remove(value)
    }

    /// Add `value` if absent, remove it if present. Returns whether it is now present.
    pub fn toggle(&mut self, value: &str) -> bool {
        if self.0.remove(value) {
            false
        } else {
            self.0.insert(value.to_string());
            true
        }
    }

    /// This set with `*` added.
    pub fn with_wildcard(mut self) -> Self {
        self.0.insert(WILDCARD.to_string());
        self
    }

    /// Keep only tokens present in `domain`.
    pub fn intersect(&self, domain: &ValueSet) -> ValueSet {
        Self(self.0.intersection(&domain.0).cloned().collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for ValueSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for ValueSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str(v)?;
        }
        f.write_str("}")
    }
}
