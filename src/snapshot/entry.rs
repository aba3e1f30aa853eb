//! Snapshot entries: the path-building access API.
//!
//! A [`SnapshotEntry`] is a lightweight handle for one symbolic location —
//! it carries an [`AccessPath`] and nothing else. Entries are created by the
//! accessor methods on [`Snapshot`](crate::Snapshot) (`variable`,
//! `control_variable`, `create_temporary`, ...), extended with
//! [`field`](SnapshotEntry::field) and [`index`](SnapshotEntry::index), and
//! then applied to a snapshot to read, write or alias the location.
//!
//! Because an entry holds no snapshot reference, the same entry can be
//! applied to many snapshots (typically: every snapshot of the same program
//! point across fixpoint iterations).

use std::{fmt, sync::Arc};

use crate::{
    algorithms::collect::collect_read,
    memory::{
        entry::MemoryEntry,
        path::{AccessPath, MemberIdentifier},
    },
    snapshot::Snapshot,
    Result,
};

/// A symbolic handle to one (possibly uncertain) memory location.
///
/// # Examples
///
/// ```rust
/// use phpscope::{MemberIdentifier, MemoryEntry, MemoryModel, Value, VariableIdentifier};
///
/// let model = MemoryModel::builder().build();
/// let mut snapshot = model.create_snapshot();
///
/// snapshot.start_transaction()?;
/// let element = snapshot
///     .variable(VariableIdentifier::direct("arr"))
///     .index(MemberIdentifier::direct("key"));
/// element.write(&mut snapshot, &MemoryEntry::from_value(Value::Int(1)), false)?;
/// snapshot.commit_transaction()?;
///
/// assert_eq!(element.read(&snapshot)?, MemoryEntry::from_value(Value::Int(1)));
/// # Ok::<(), phpscope::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    path: AccessPath,
}

impl SnapshotEntry {
    pub(crate) fn new(path: AccessPath) -> Self {
        SnapshotEntry { path }
    }

    /// The symbolic path of this entry.
    #[must_use]
    pub fn path(&self) -> &AccessPath {
        &self.path
    }

    /// Extends the entry into an object field.
    #[must_use]
    pub fn field(&self, identifier: MemberIdentifier) -> SnapshotEntry {
        SnapshotEntry::new(self.path.with_field(identifier))
    }

    /// Extends the entry into an array element.
    #[must_use]
    pub fn index(&self, identifier: MemberIdentifier) -> SnapshotEntry {
        SnapshotEntry::new(self.path.with_index(identifier))
    }

    /// Reads the union of the possible values at this entry's location(s).
    pub fn read(&self, snapshot: &Snapshot) -> Result<MemoryEntry> {
        snapshot.read_path(&self.path)
    }

    /// Writes `entry` to this entry's location(s).
    ///
    /// Unambiguous locations receive a strong update, ambiguous ones a weak
    /// update; `force_strong` upgrades every update. Requires an open
    /// transaction.
    pub fn write(
        &self,
        snapshot: &mut Snapshot,
        entry: &MemoryEntry,
        force_strong: bool,
    ) -> Result<()> {
        snapshot.write_path(&self.path, entry, force_strong)
    }

    /// Establishes by-reference aliasing between this entry and `source`
    /// (`$this =& $source`). Requires an open transaction.
    pub fn set_alias(&self, snapshot: &mut Snapshot, source: &SnapshotEntry) -> Result<()> {
        snapshot.alias_path(&self.path, &source.path)
    }

    /// Returns `true` if at least one resolved location has a stored value.
    pub fn is_defined(&self, snapshot: &Snapshot) -> Result<bool> {
        let resolution = collect_read(&snapshot.state, snapshot.assistant.as_ref(), &self.path)?;
        Ok(resolution
            .locations
            .iter()
            .any(|loc| snapshot.state.data.contains(&loc.index)))
    }

    /// Enumerates the known array keys stored at this entry, sorted.
    pub fn iterate_indices(&self, snapshot: &Snapshot) -> Result<Vec<Arc<str>>> {
        snapshot.index_names_at(&self.path)
    }

    /// Enumerates the known object field names stored at this entry, sorted.
    pub fn iterate_fields(&self, snapshot: &Snapshot) -> Result<Vec<Arc<str>>> {
        snapshot.field_names_at(&self.path)
    }

    /// Resolves the possible types of the objects stored at this entry.
    pub fn resolve_types(&self, snapshot: &Snapshot) -> Result<Vec<Arc<str>>> {
        snapshot.object_types_at(&self.path)
    }
}

impl fmt::Display for SnapshotEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        memory::{path::VariableIdentifier, value::Value},
        snapshot::MemoryModel,
    };

    #[test]
    fn test_entry_extension_builds_paths() {
        let model = MemoryModel::builder().build();
        let snapshot = model.create_snapshot();

        let entry = snapshot
            .variable(VariableIdentifier::direct("obj"))
            .field(MemberIdentifier::direct("list"))
            .index(MemberIdentifier::direct("0"));
        assert_eq!(entry.to_string(), "$obj->list[0]");
    }

    #[test]
    fn test_is_defined() {
        let model = MemoryModel::builder().build();
        let mut snapshot = model.create_snapshot();

        let x = snapshot.variable(VariableIdentifier::direct("x"));
        assert!(!x.is_defined(&snapshot).unwrap());

        snapshot.start_transaction().unwrap();
        x.write(&mut snapshot, &MemoryEntry::from_value(Value::Int(1)), false)
            .unwrap();
        snapshot.commit_transaction().unwrap();

        assert!(x.is_defined(&snapshot).unwrap());
    }

    #[test]
    fn test_field_iteration() {
        let model = MemoryModel::builder().build();
        let mut snapshot = model.create_snapshot();

        snapshot.start_transaction().unwrap();
        let object = snapshot.create_object(["Point"]).unwrap();
        let p = snapshot.variable(VariableIdentifier::direct("p"));
        p.write(&mut snapshot, &MemoryEntry::from_value(object), false)
            .unwrap();
        for name in ["y", "x"] {
            p.field(MemberIdentifier::direct(name))
                .write(&mut snapshot, &MemoryEntry::from_value(Value::Int(0)), false)
                .unwrap();
        }
        snapshot.commit_transaction().unwrap();

        let fields = p.iterate_fields(&snapshot).unwrap();
        let fields: Vec<&str> = fields.iter().map(AsRef::as_ref).collect();
        assert_eq!(fields, vec!["x", "y"]);

        let types = p.resolve_types(&snapshot).unwrap();
        assert_eq!(types.len(), 1);
        assert_eq!(types[0].as_ref(), "Point");
    }
}
