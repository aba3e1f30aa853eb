//! Value storage of a snapshot.
//!
//! The [`DataContainer`] maps every [`MemoryIndex`] with a known value set to
//! its [`MemoryEntry`]. It is the "what" half of a snapshot; the "where" half
//! lives in the [`StructureContainer`](crate::snapshot::structure::StructureContainer).
//!
//! The same container type also backs the snapshot's *info level*, which
//! stores auxiliary per-location data of secondary analyses without touching
//! the memory level.
//!
//! Backed by an `imbl` persistent map: clones are O(1) and diverge
//! copy-on-write, and whole-container equality short-circuits over shared
//! structure, which is what makes commit-time change detection cheap.

use imbl::HashMap as ImHashMap;

use crate::memory::{entry::MemoryEntry, index::MemoryIndex};

/// Per-snapshot mapping from [`MemoryIndex`] to its possible values.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DataContainer {
    entries: ImHashMap<MemoryIndex, MemoryEntry>,
}

impl DataContainer {
    /// Creates an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The entry stored at `index`, if any.
    ///
    /// An absent entry means the location is undefined; readers substitute
    /// `{Undefined}`.
    #[must_use]
    pub fn get(&self, index: &MemoryIndex) -> Option<&MemoryEntry> {
        self.entries.get(index)
    }

    /// Stores `entry` at `index`, replacing any previous entry.
    pub fn set(&mut self, index: MemoryIndex, entry: MemoryEntry) {
        self.entries.insert(index, entry);
    }

    /// Unions `entry` into the entry stored at `index` (weak update).
    pub fn union_into(&mut self, index: MemoryIndex, entry: &MemoryEntry) {
        let merged = match self.entries.get(&index) {
            Some(existing) => existing.union(entry),
            None => MemoryEntry::undefined().union(entry),
        };
        self.entries.insert(index, merged);
    }

    /// Removes and returns the entry stored at `index`.
    pub fn remove(&mut self, index: &MemoryIndex) -> Option<MemoryEntry> {
        self.entries.remove(index)
    }

    /// Returns `true` if `index` has a stored entry.
    #[must_use]
    pub fn contains(&self, index: &MemoryIndex) -> bool {
        self.entries.contains_key(index)
    }

    /// Iterates over all `(index, entry)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&MemoryIndex, &MemoryEntry)> {
        self.entries.iter()
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::value::Value;

    #[test]
    fn test_get_set_remove() {
        let mut data = DataContainer::new();
        let index = MemoryIndex::variable("x", 0);

        assert!(data.get(&index).is_none());
        data.set(index.clone(), MemoryEntry::from_value(Value::Int(1)));
        assert_eq!(data.get(&index), Some(&MemoryEntry::from_value(Value::Int(1))));

        let removed = data.remove(&index);
        assert_eq!(removed, Some(MemoryEntry::from_value(Value::Int(1))));
        assert!(data.is_empty());
    }

    #[test]
    fn test_union_into_weak_update() {
        let mut data = DataContainer::new();
        let index = MemoryIndex::variable("x", 0);

        // Weak update on an undefined location keeps the undefined member
        data.union_into(index.clone(), &MemoryEntry::from_value(Value::Int(1)));
        let entry = data.get(&index).unwrap();
        assert!(entry.contains(&Value::Int(1)));
        assert!(entry.contains(&Value::Undefined));

        data.set(index.clone(), MemoryEntry::from_value(Value::Int(1)));
        data.union_into(index.clone(), &MemoryEntry::from_value(Value::Int(2)));
        let entry = data.get(&index).unwrap();
        assert_eq!(entry.len(), 2);
    }

    #[test]
    fn test_cow_clone_isolation() {
        let mut original = DataContainer::new();
        let index = MemoryIndex::variable("x", 0);
        original.set(index.clone(), MemoryEntry::from_value(Value::Int(1)));

        let mut copy = original.clone();
        copy.set(index.clone(), MemoryEntry::from_value(Value::Int(2)));

        assert_eq!(original.get(&index), Some(&MemoryEntry::from_value(Value::Int(1))));
        assert_eq!(copy.get(&index), Some(&MemoryEntry::from_value(Value::Int(2))));
    }
}
