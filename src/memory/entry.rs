//! Memory entries: immutable sets of possible values.
//!
//! A [`MemoryEntry`] is the disjunctive abstraction of one storage location —
//! the set of values the location may hold on some execution path. Entries are
//! immutable; every operation returns a new entry, and the backing
//! `imbl::HashSet` shares structure between versions so copies are cheap.
//!
//! # Distinct States
//!
//! - An **empty** entry means "no information gathered" (only ever transient).
//! - `{Undefined}` means the location is provably unset.
//! - An entry containing [`Value::Any`] means "no information" (top).

use std::fmt;

use imbl::HashSet as ImHashSet;

use crate::memory::value::Value;

/// An immutable, order-irrelevant set of abstract values at one location.
///
/// # Examples
///
/// ```rust
/// use phpscope::{MemoryEntry, Value};
///
/// let e = MemoryEntry::from_value(Value::Int(1));
/// let merged = e.union(&MemoryEntry::from_value(Value::Int(2)));
/// assert_eq!(merged.len(), 2);
/// assert!(merged.is_superset_of(&e));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MemoryEntry {
    values: ImHashSet<Value>,
}

impl MemoryEntry {
    /// Creates an empty entry.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates the entry of a provably unset location: `{Undefined}`.
    #[must_use]
    pub fn undefined() -> Self {
        Self::from_value(Value::Undefined)
    }

    /// Creates the top entry: `{Any}`.
    #[must_use]
    pub fn any() -> Self {
        Self::from_value(Value::Any)
    }

    /// Creates an entry holding a single value.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        let mut values = ImHashSet::new();
        values.insert(value);
        MemoryEntry { values }
    }

    /// Creates an entry from an iterator of values.
    #[must_use]
    pub fn from_values<I: IntoIterator<Item = Value>>(values: I) -> Self {
        MemoryEntry {
            values: values.into_iter().collect(),
        }
    }

    /// Number of distinct values in the entry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the entry holds no values at all.
    ///
    /// Note that this is different from holding `{Undefined}`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns `true` if the entry is exactly `{Undefined}`.
    #[must_use]
    pub fn is_undefined_only(&self) -> bool {
        self.values.len() == 1 && self.values.contains(&Value::Undefined)
    }

    /// Returns `true` if the entry contains the given value.
    #[must_use]
    pub fn contains(&self, value: &Value) -> bool {
        self.values.contains(value)
    }

    /// Returns `true` if every value of `other` is also in `self`.
    #[must_use]
    pub fn is_superset_of(&self, other: &MemoryEntry) -> bool {
        other.values.iter().all(|v| self.values.contains(v))
    }

    /// Returns a new entry additionally containing `value`.
    #[must_use]
    pub fn with_value(&self, value: Value) -> Self {
        MemoryEntry {
            values: self.values.update(value),
        }
    }

    /// Returns a new entry without `value`.
    #[must_use]
    pub fn without_value(&self, value: &Value) -> Self {
        MemoryEntry {
            values: self.values.without(value),
        }
    }

    /// Returns the set union of two entries.
    #[must_use]
    pub fn union(&self, other: &MemoryEntry) -> Self {
        MemoryEntry {
            values: self.values.clone().union(other.values.clone()),
        }
    }

    /// Iterates over the values of the entry in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.values.iter()
    }
}

impl FromIterator<Value> for MemoryEntry {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self::from_values(iter)
    }
}

impl fmt::Display for MemoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Sort the rendering so dumps are stable across runs.
        let mut rendered: Vec<String> = self.values.iter().map(ToString::to_string).collect();
        rendered.sort();
        write!(f, "{{ {} }}", rendered.join(", "))
    }
}
