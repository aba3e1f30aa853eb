//! Structural facts of a snapshot: descriptors and aliases.
//!
//! The [`StructureContainer`] maps every tracked [`MemoryIndex`] to its
//! structural descriptors — which array instances may be stored there, what
//! keys/fields those instances have, and which other locations alias it. It
//! deliberately holds no values; "what is stored" lives in the
//! [`DataContainer`](crate::snapshot::data::DataContainer), so algorithms can
//! reason about *where* and *what* independently.
//!
//! # Copy-on-Write
//!
//! All maps are `imbl` persistent structures. Cloning a container is O(1) and
//! shares structure with the original; the first write to either side copies
//! only the touched spine. This is what makes deriving snapshots at every
//! program point affordable.
//!
//! # Invariants
//!
//! - Every key in an array/object descriptor has a corresponding child index
//!   reachable through the data container, or is legitimately undefined.
//! - An alias record's `may` and `must` sets are disjoint; must-aliasing
//!   implies may-aliasing implicitly.

use std::sync::Arc;

use imbl::{HashMap as ImHashMap, HashSet as ImHashSet};

use crate::memory::{
    index::MemoryIndex,
    value::{ArrayHandle, ObjectHandle},
};

/// May/must alias sets of one location.
///
/// `must` is only non-empty when all listed indices are provably the same
/// storage cell on every path; `may` lists indices that coincide on at least
/// one path. The sets hold *peer* indices only, never the owning index itself.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AliasRecord {
    may: ImHashSet<MemoryIndex>,
    must: ImHashSet<MemoryIndex>,
}

impl AliasRecord {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The may-alias peers.
    pub fn may(&self) -> impl Iterator<Item = &MemoryIndex> {
        self.may.iter()
    }

    /// The must-alias peers.
    pub fn must(&self) -> impl Iterator<Item = &MemoryIndex> {
        self.must.iter()
    }

    /// Returns `true` if the record carries no aliasing information.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.may.is_empty() && self.must.is_empty()
    }

    /// Returns `true` if `index` is a must-alias peer.
    #[must_use]
    pub fn is_must(&self, index: &MemoryIndex) -> bool {
        self.must.contains(index)
    }

    /// Returns `true` if `index` is a may- or must-alias peer.
    #[must_use]
    pub fn is_may(&self, index: &MemoryIndex) -> bool {
        self.may.contains(index) || self.must.contains(index)
    }

    /// Records a must-alias peer. Removes it from the may set to keep the
    /// sets disjoint.
    pub fn add_must(&mut self, index: MemoryIndex) {
        self.may.remove(&index);
        self.must.insert(index);
    }

    /// Records a may-alias peer, unless it is already a must peer.
    pub fn add_may(&mut self, index: MemoryIndex) {
        if !self.must.contains(&index) {
            self.may.insert(index);
        }
    }

    /// Demotes a must peer to a may peer. Used by merge, which may only
    /// weaken alias strength.
    pub fn demote_to_may(&mut self, index: &MemoryIndex) {
        if self.must.remove(index).is_some() {
            self.may.insert(index.clone());
        }
    }
}

/// Structural descriptor of one abstract array instance.
///
/// A descriptor starts *detached* (created by a value factory, not yet stored
/// anywhere) and becomes *anchored* when the array is written into a location;
/// only anchored descriptors have child indices, because element identities
/// are derived from the holding location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayDescriptor {
    handle: ArrayHandle,
    parent: Option<MemoryIndex>,
    keys: ImHashMap<Arc<str>, MemoryIndex>,
    any_index: Option<MemoryIndex>,
}

impl ArrayDescriptor {
    /// Creates a detached descriptor for a freshly allocated array.
    #[must_use]
    pub fn detached(handle: ArrayHandle) -> Self {
        ArrayDescriptor {
            handle,
            parent: None,
            keys: ImHashMap::new(),
            any_index: None,
        }
    }

    /// Creates a descriptor anchored at `parent`, with its summary child.
    #[must_use]
    pub fn anchored(handle: ArrayHandle, parent: MemoryIndex) -> Self {
        let any_index = parent.any_index_child();
        ArrayDescriptor {
            handle,
            parent: Some(parent),
            keys: ImHashMap::new(),
            any_index: Some(any_index),
        }
    }

    /// The array instance this descriptor describes.
    #[must_use]
    pub fn handle(&self) -> ArrayHandle {
        self.handle
    }

    /// The location holding this array, if anchored.
    #[must_use]
    pub fn parent(&self) -> Option<&MemoryIndex> {
        self.parent.as_ref()
    }

    /// The summary child index, if anchored.
    #[must_use]
    pub fn any_index(&self) -> Option<&MemoryIndex> {
        self.any_index.as_ref()
    }

    /// Returns `true` once the array is stored at a location.
    #[must_use]
    pub fn is_anchored(&self) -> bool {
        self.parent.is_some()
    }

    /// Anchors a detached descriptor at `parent`. Re-anchoring an already
    /// anchored descriptor is a no-op; arrays are copied, not moved.
    pub fn anchor(&mut self, parent: MemoryIndex) {
        if self.parent.is_none() {
            self.any_index = Some(parent.any_index_child());
            self.parent = Some(parent);
        }
    }

    /// The child index registered for `key`, if any.
    #[must_use]
    pub fn key(&self, key: &str) -> Option<&MemoryIndex> {
        self.keys.get(key)
    }

    /// Registers the child index for `key`.
    pub fn add_key(&mut self, key: Arc<str>, index: MemoryIndex) {
        self.keys.insert(key, index);
    }

    /// Iterates over the known `(key, child index)` pairs.
    pub fn keys(&self) -> impl Iterator<Item = (&Arc<str>, &MemoryIndex)> {
        self.keys.iter()
    }

    /// Number of known keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns `true` if no keys are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Structural descriptor of one abstract object instance.
///
/// Object fields are rooted at the object handle rather than at a holding
/// location, so object descriptors are always complete: the summary field
/// exists from creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectDescriptor {
    handle: ObjectHandle,
    types: ImHashSet<Arc<str>>,
    fields: ImHashMap<Arc<str>, MemoryIndex>,
    any_field: MemoryIndex,
}

impl ObjectDescriptor {
    /// Creates a descriptor for a freshly allocated object of the given types.
    #[must_use]
    pub fn new<'a, I: IntoIterator<Item = &'a str>>(handle: ObjectHandle, types: I) -> Self {
        ObjectDescriptor {
            handle,
            types: types.into_iter().map(Arc::from).collect(),
            fields: ImHashMap::new(),
            any_field: MemoryIndex::any_field(handle),
        }
    }

    /// The object instance this descriptor describes.
    #[must_use]
    pub fn handle(&self) -> ObjectHandle {
        self.handle
    }

    /// The resolved type names of the object.
    pub fn types(&self) -> impl Iterator<Item = &Arc<str>> {
        self.types.iter()
    }

    /// Adds a resolved type name.
    pub fn add_type(&mut self, name: Arc<str>) {
        self.types.insert(name);
    }

    /// The summary field index.
    #[must_use]
    pub fn any_field(&self) -> &MemoryIndex {
        &self.any_field
    }

    /// The field index registered for `name`, if any.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&MemoryIndex> {
        self.fields.get(name)
    }

    /// Registers the field index for `name`.
    pub fn add_field(&mut self, name: Arc<str>, index: MemoryIndex) {
        self.fields.insert(name, index);
    }

    /// Iterates over the known `(field name, index)` pairs.
    pub fn fields(&self) -> impl Iterator<Item = (&Arc<str>, &MemoryIndex)> {
        self.fields.iter()
    }
}

/// Structural record of one tracked index.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IndexRecord {
    aliases: Option<AliasRecord>,
    arrays: ImHashSet<ArrayHandle>,
}

impl IndexRecord {
    /// The alias record, if any aliasing was established.
    #[must_use]
    pub fn aliases(&self) -> Option<&AliasRecord> {
        self.aliases.as_ref()
    }

    /// The array instances possibly stored at this index.
    pub fn arrays(&self) -> impl Iterator<Item = &ArrayHandle> {
        self.arrays.iter()
    }

    /// Returns `true` if no array instance is stored here.
    #[must_use]
    pub fn has_no_array(&self) -> bool {
        self.arrays.is_empty()
    }
}

/// Per-snapshot mapping from [`MemoryIndex`] to structural descriptors.
///
/// See the [module documentation](self) for the container's role and
/// invariants.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StructureContainer {
    indexes: ImHashMap<MemoryIndex, IndexRecord>,
    arrays: ImHashMap<ArrayHandle, ArrayDescriptor>,
    objects: ImHashMap<ObjectHandle, ObjectDescriptor>,
}

impl StructureContainer {
    /// Creates an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `index` tracked (idempotent).
    pub fn ensure_index(&mut self, index: MemoryIndex) {
        if !self.indexes.contains_key(&index) {
            self.indexes.insert(index, IndexRecord::default());
        }
    }

    /// Returns `true` if `index` is tracked.
    #[must_use]
    pub fn is_tracked(&self, index: &MemoryIndex) -> bool {
        self.indexes.contains_key(index)
    }

    /// Forgets `index` and its structural record.
    pub fn remove_index(&mut self, index: &MemoryIndex) {
        self.indexes.remove(index);
    }

    /// Iterates over all tracked indices.
    pub fn indexes(&self) -> impl Iterator<Item = (&MemoryIndex, &IndexRecord)> {
        self.indexes.iter()
    }

    /// Number of tracked indices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    /// Returns `true` if nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }

    /// The structural record of `index`, if tracked.
    #[must_use]
    pub fn record(&self, index: &MemoryIndex) -> Option<&IndexRecord> {
        self.indexes.get(index)
    }

    /// The alias record of `index`, if any.
    #[must_use]
    pub fn aliases(&self, index: &MemoryIndex) -> Option<&AliasRecord> {
        self.indexes.get(index).and_then(IndexRecord::aliases)
    }

    /// Replaces the alias record of `index`; empty records erase it.
    pub fn set_aliases(&mut self, index: MemoryIndex, aliases: AliasRecord) {
        let mut record = self.indexes.get(&index).cloned().unwrap_or_default();
        record.aliases = if aliases.is_empty() {
            None
        } else {
            Some(aliases)
        };
        self.indexes.insert(index, record);
    }

    /// Applies `f` to a copy of the alias record of `index` (creating an
    /// empty one if absent) and stores the result.
    pub fn update_aliases<F: FnOnce(&mut AliasRecord)>(&mut self, index: &MemoryIndex, f: F) {
        let mut aliases = self.aliases(index).cloned().unwrap_or_default();
        f(&mut aliases);
        self.set_aliases(index.clone(), aliases);
    }

    /// Records that array `handle` is possibly stored at `index`.
    pub fn add_array_at(&mut self, index: MemoryIndex, handle: ArrayHandle) {
        let mut record = self.indexes.get(&index).cloned().unwrap_or_default();
        record.arrays.insert(handle);
        self.indexes.insert(index, record);
    }

    /// Removes the association of array `handle` with `index`.
    pub fn remove_array_at(&mut self, index: &MemoryIndex, handle: ArrayHandle) {
        if let Some(mut record) = self.indexes.get(index).cloned() {
            record.arrays.remove(&handle);
            self.indexes.insert(index.clone(), record);
        }
    }

    /// The array instances possibly stored at `index`.
    #[must_use]
    pub fn arrays_at(&self, index: &MemoryIndex) -> Vec<ArrayHandle> {
        self.indexes
            .get(index)
            .map(|r| r.arrays.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Registers an array descriptor.
    pub fn insert_array(&mut self, descriptor: ArrayDescriptor) {
        self.arrays.insert(descriptor.handle(), descriptor);
    }

    /// The descriptor of array `handle`, if registered.
    #[must_use]
    pub fn array(&self, handle: ArrayHandle) -> Option<&ArrayDescriptor> {
        self.arrays.get(&handle)
    }

    /// Applies `f` to a copy of the descriptor of array `handle` and stores
    /// the result. Returns `false` if the descriptor is not registered.
    pub fn update_array<F: FnOnce(&mut ArrayDescriptor)>(
        &mut self,
        handle: ArrayHandle,
        f: F,
    ) -> bool {
        match self.arrays.get(&handle).cloned() {
            Some(mut descriptor) => {
                f(&mut descriptor);
                self.arrays.insert(handle, descriptor);
                true
            }
            None => false,
        }
    }

    /// Unregisters the descriptor of array `handle`.
    pub fn remove_array(&mut self, handle: ArrayHandle) -> Option<ArrayDescriptor> {
        self.arrays.remove(&handle)
    }

    /// Iterates over all registered array descriptors.
    pub fn array_descriptors(&self) -> impl Iterator<Item = (&ArrayHandle, &ArrayDescriptor)> {
        self.arrays.iter()
    }

    /// Registers an object descriptor.
    pub fn insert_object(&mut self, descriptor: ObjectDescriptor) {
        self.objects.insert(descriptor.handle(), descriptor);
    }

    /// The descriptor of object `handle`, if registered.
    #[must_use]
    pub fn object(&self, handle: ObjectHandle) -> Option<&ObjectDescriptor> {
        self.objects.get(&handle)
    }

    /// Applies `f` to a copy of the descriptor of object `handle` and stores
    /// the result. Returns `false` if the descriptor is not registered.
    pub fn update_object<F: FnOnce(&mut ObjectDescriptor)>(
        &mut self,
        handle: ObjectHandle,
        f: F,
    ) -> bool {
        match self.objects.get(&handle).cloned() {
            Some(mut descriptor) => {
                f(&mut descriptor);
                self.objects.insert(handle, descriptor);
                true
            }
            None => false,
        }
    }

    /// Iterates over all registered object descriptors.
    pub fn object_descriptors(&self) -> impl Iterator<Item = (&ObjectHandle, &ObjectDescriptor)> {
        self.objects.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_record_disjoint_sets() {
        let mut record = AliasRecord::new();
        let peer = MemoryIndex::variable("y", 0);

        record.add_may(peer.clone());
        assert!(record.is_may(&peer));
        assert!(!record.is_must(&peer));

        record.add_must(peer.clone());
        assert!(record.is_must(&peer));
        // must implies may, but the raw may set no longer holds the peer
        assert_eq!(record.may().count(), 0);

        record.demote_to_may(&peer);
        assert!(!record.is_must(&peer));
        assert!(record.is_may(&peer));
    }

    #[test]
    fn test_array_descriptor_anchoring() {
        let handle = ArrayHandle::new(1);
        let mut descriptor = ArrayDescriptor::detached(handle);
        assert!(!descriptor.is_anchored());
        assert!(descriptor.any_index().is_none());

        let parent = MemoryIndex::variable("arr", 0);
        descriptor.anchor(parent.clone());
        assert!(descriptor.is_anchored());
        assert_eq!(descriptor.any_index(), Some(&parent.any_index_child()));

        // Re-anchoring does not move the array
        descriptor.anchor(MemoryIndex::variable("other", 0));
        assert_eq!(descriptor.parent(), Some(&parent));
    }

    #[test]
    fn test_structure_cow_clone_isolation() {
        let mut original = StructureContainer::new();
        let index = MemoryIndex::variable("x", 0);
        original.ensure_index(index.clone());

        let mut copy = original.clone();
        copy.add_array_at(index.clone(), ArrayHandle::new(9));

        assert!(original.arrays_at(&index).is_empty());
        assert_eq!(copy.arrays_at(&index), vec![ArrayHandle::new(9)]);
    }

    #[test]
    fn test_update_array_descriptor() {
        let mut structure = StructureContainer::new();
        let handle = ArrayHandle::new(4);
        let parent = MemoryIndex::variable("a", 0);
        structure.insert_array(ArrayDescriptor::anchored(handle, parent.clone()));

        let child = parent.index_child("k");
        assert!(structure.update_array(handle, |d| d.add_key(Arc::from("k"), child.clone())));
        assert_eq!(structure.array(handle).unwrap().key("k"), Some(&child));

        assert!(!structure.update_array(ArrayHandle::new(99), |_| {}));
    }

    #[test]
    fn test_object_descriptor_fields() {
        let handle = ObjectHandle::new(2);
        let mut structure = StructureContainer::new();
        structure.insert_object(ObjectDescriptor::new(handle, ["Foo"]));

        let field = MemoryIndex::field(handle, "prop");
        structure.update_object(handle, |d| d.add_field(Arc::from("prop"), field.clone()));

        let descriptor = structure.object(handle).unwrap();
        assert_eq!(descriptor.field("prop"), Some(&field));
        assert_eq!(descriptor.types().count(), 1);
        assert_eq!(descriptor.any_field(), &MemoryIndex::any_field(handle));
    }
}
