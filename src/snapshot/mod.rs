//! Snapshots: the per-program-point abstract memory.
//!
//! A [`Snapshot`] bundles the three containers describing memory at one
//! program point — structure, memory-level data and info-level data — behind
//! a transactional mutation protocol:
//!
//! ```text
//! snapshot.start_transaction()?;
//! // ... assignments, alias assignments, extends ...
//! let changed = snapshot.commit_transaction()?;
//! ```
//!
//! [`start_transaction`](Snapshot::start_transaction) saves the current
//! containers (an O(1) operation thanks to persistent maps), every mutation
//! happens inside the bracket, and commit reports whether the snapshot
//! actually changed — the signal the analysis driver's fixpoint iteration
//! runs on. At loop heads the driver commits with
//! [`widen_and_commit_transaction`](Snapshot::widen_and_commit_transaction),
//! which additionally applies the assistant's widening operator so iteration
//! terminates.
//!
//! Snapshots are created by a [`MemoryModel`], which fixes the assistant, the
//! algorithm family and the handle source shared by every snapshot of one
//! analysis run.

use std::{fmt, sync::Arc};

use crate::{
    algorithms::{collect::collect_read, AlgorithmFamily},
    assistant::{IntervalAssistant, MemoryAssistant},
    memory::{
        entry::MemoryEntry,
        index::{CallLevel, MemoryIndex, GLOBAL_CALL_LEVEL},
        path::{AccessPath, VariableIdentifier},
        value::{HandleSource, Value},
    },
    stats::Statistics,
    Error, Result,
};

pub mod data;
pub mod entry;
pub mod structure;

pub use data::DataContainer;
pub use entry::SnapshotEntry;
pub use structure::{
    AliasRecord, ArrayDescriptor, IndexRecord, ObjectDescriptor, StructureContainer,
};

/// Name of the control variable receiving a function's return value.
pub const RETURN_VARIABLE: &str = "return";

/// Name of the control variable holding the callee's `$this` binding.
pub const THIS_VARIABLE: &str = "this";

/// Name prefix of the control variables holding call arguments
/// (`arg0`, `arg1`, ...).
pub const ARGUMENT_PREFIX: &str = "arg";

/// Default value-set size above which commit asks the assistant to simplify.
pub const DEFAULT_SIMPLIFY_LIMIT: usize = 32;

/// Which level of a snapshot mutations apply to.
///
/// The analysis runs its main phase in [`Memory`](SnapshotMode::Memory) mode;
/// secondary phases (e.g. taint propagation) re-walk the program in
/// [`Info`](SnapshotMode::Info) mode, annotating the locations the memory
/// phase established without growing any structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnapshotMode {
    /// Mutations target structure and the memory level.
    #[default]
    Memory,
    /// Mutations target the info level only.
    Info,
}

/// The mutable core of a snapshot, handed to the algorithm strategies.
///
/// Kept separate from [`Snapshot`] so strategies receive exactly the state
/// they operate on, without the transaction bookkeeping around it.
#[derive(Debug, Clone)]
pub struct SnapshotState {
    /// Call depth this snapshot lives at.
    pub call_level: CallLevel,
    /// The level mutations currently apply to.
    pub mode: SnapshotMode,
    /// Structural facts: descriptors and aliases.
    pub structure: StructureContainer,
    /// Memory-level value sets.
    pub data: DataContainer,
    /// Info-level value sets of secondary analyses.
    pub info: DataContainer,
    /// The run-wide allocator of array/object/temporary identities.
    pub handles: Arc<HandleSource>,
    /// Operation and precision-loss counters.
    pub stats: Statistics,
}

impl SnapshotState {
    /// Creates the empty state of a global-level snapshot.
    #[must_use]
    pub fn new(handles: Arc<HandleSource>) -> Self {
        SnapshotState {
            call_level: GLOBAL_CALL_LEVEL,
            mode: SnapshotMode::Memory,
            structure: StructureContainer::new(),
            data: DataContainer::new(),
            info: DataContainer::new(),
            handles,
            stats: Statistics::new(),
        }
    }

    /// The memory-level entry at `index`; absent locations read as
    /// `{Undefined}`.
    #[must_use]
    pub fn memory_entry(&self, index: &MemoryIndex) -> MemoryEntry {
        self.data
            .get(index)
            .cloned()
            .unwrap_or_else(MemoryEntry::undefined)
    }
}

/// The containers saved at transaction start, for commit-time comparison.
#[derive(Debug, Clone)]
pub struct SavedState {
    /// Structure container as of transaction start.
    pub structure: StructureContainer,
    /// Memory-level data as of transaction start.
    pub data: DataContainer,
    /// Info-level data as of transaction start.
    pub info: DataContainer,
}

/// Abstract memory at one program point.
///
/// Created by [`MemoryModel::create_snapshot`]; see the
/// [module documentation](self) for the transaction protocol.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub(crate) state: SnapshotState,
    saved: Option<SavedState>,
    pub(crate) assistant: Arc<dyn MemoryAssistant>,
    algorithms: AlgorithmFamily,
    simplify_limit: usize,
}

impl Snapshot {
    fn new(model: &MemoryModel) -> Self {
        Snapshot {
            state: SnapshotState::new(model.handles.clone()),
            saved: None,
            assistant: model.assistant.clone(),
            algorithms: model.algorithms.clone(),
            simplify_limit: model.simplify_limit,
        }
    }

    /// The call depth this snapshot lives at.
    #[must_use]
    pub fn call_level(&self) -> CallLevel {
        self.state.call_level
    }

    /// The level mutations currently apply to.
    #[must_use]
    pub fn mode(&self) -> SnapshotMode {
        self.state.mode
    }

    /// Switches between memory-level and info-level mutation.
    pub fn set_mode(&mut self, mode: SnapshotMode) {
        self.state.mode = mode;
    }

    /// The cumulative operation counters of this snapshot.
    #[must_use]
    pub fn statistics(&self) -> Statistics {
        self.state.stats.clone()
    }

    fn require_transaction(&self) -> Result<()> {
        if self.saved.is_none() {
            return Err(Error::NoTransaction);
        }
        Ok(())
    }

    /// Opens a transaction, saving the current containers for commit-time
    /// change detection.
    pub fn start_transaction(&mut self) -> Result<()> {
        if self.saved.is_some() {
            return Err(Error::TransactionActive);
        }
        self.saved = Some(SavedState {
            structure: self.state.structure.clone(),
            data: self.state.data.clone(),
            info: self.state.info.clone(),
        });
        Ok(())
    }

    /// Closes the transaction; returns `true` if the snapshot changed.
    pub fn commit_transaction(&mut self) -> Result<bool> {
        self.finish_transaction(false)
    }

    /// Closes the transaction with widening applied to changed entries;
    /// returns `true` if the snapshot changed.
    ///
    /// Used at loop heads, where plain commits could chase ever-growing
    /// value sets forever.
    pub fn widen_and_commit_transaction(&mut self) -> Result<bool> {
        self.finish_transaction(true)
    }

    fn finish_transaction(&mut self, widen: bool) -> Result<bool> {
        let saved = self.saved.take().ok_or(Error::NoTransaction)?;
        let algorithms = self.algorithms.clone();
        let changed = algorithms.commit.commit(
            &mut self.state,
            &saved,
            self.assistant.as_ref(),
            self.simplify_limit,
            widen,
        )?;
        log::trace!(
            "committed transaction at level {}: changed={changed}",
            self.state.call_level
        );
        Ok(changed)
    }

    /// Entry accessor for local variables of this snapshot's call level.
    #[must_use]
    pub fn variable(&self, identifier: VariableIdentifier) -> SnapshotEntry {
        SnapshotEntry::new(AccessPath::variable(identifier, self.state.call_level))
    }

    /// Entry accessor for global variables.
    #[must_use]
    pub fn global_variable(&self, identifier: VariableIdentifier) -> SnapshotEntry {
        SnapshotEntry::new(AccessPath::global_variable(identifier))
    }

    /// Entry accessor for control variables of this snapshot's call level.
    #[must_use]
    pub fn control_variable(&self, identifier: VariableIdentifier) -> SnapshotEntry {
        SnapshotEntry::new(AccessPath::control(identifier, self.state.call_level))
    }

    /// Entry accessor for global control variables.
    #[must_use]
    pub fn global_control_variable(&self, identifier: VariableIdentifier) -> SnapshotEntry {
        SnapshotEntry::new(AccessPath::global_control(identifier))
    }

    /// Allocates a fresh temporary location and returns its accessor.
    #[must_use]
    pub fn create_temporary(&self) -> SnapshotEntry {
        let id = self.state.handles.next_temporary();
        SnapshotEntry::new(AccessPath::temporary(id, self.state.call_level))
    }

    /// Drops the data and structural record of a temporary.
    pub fn release_temporary(&mut self, temporary: &SnapshotEntry) -> Result<()> {
        self.require_transaction()?;
        let resolution = collect_read(&self.state, self.assistant.as_ref(), temporary.path())?;
        for loc in resolution.locations {
            if matches!(loc.index, MemoryIndex::Temporary { .. }) {
                self.state.data.remove(&loc.index);
                self.state.info.remove(&loc.index);
                self.state.structure.remove_index(&loc.index);
            }
        }
        Ok(())
    }

    /// Allocates a fresh, detached abstract array.
    ///
    /// The array becomes anchored (and enumerable) once the returned value is
    /// written into a location.
    pub fn create_array(&mut self) -> Result<Value> {
        self.require_transaction()?;
        let handle = self.state.handles.next_array();
        self.state
            .structure
            .insert_array(ArrayDescriptor::detached(handle));
        Ok(Value::Array(handle))
    }

    /// Allocates a fresh abstract object of the given types.
    pub fn create_object<'a, I: IntoIterator<Item = &'a str>>(
        &mut self,
        types: I,
    ) -> Result<Value> {
        self.require_transaction()?;
        let handle = self.state.handles.next_object();
        self.state
            .structure
            .insert_object(ObjectDescriptor::new(handle, types));
        Ok(Value::Object(handle))
    }

    pub(crate) fn read_path(&self, path: &AccessPath) -> Result<MemoryEntry> {
        self.algorithms
            .read
            .read(&self.state, self.assistant.as_ref(), path)
    }

    pub(crate) fn write_path(
        &mut self,
        path: &AccessPath,
        entry: &MemoryEntry,
        force_strong: bool,
    ) -> Result<()> {
        self.require_transaction()?;
        let algorithms = self.algorithms.clone();
        algorithms.assign.assign(
            &mut self.state,
            self.assistant.as_ref(),
            path,
            entry,
            force_strong,
        )
    }

    pub(crate) fn alias_path(&mut self, target: &AccessPath, source: &AccessPath) -> Result<()> {
        self.require_transaction()?;
        let algorithms = self.algorithms.clone();
        algorithms
            .assign
            .assign_alias(&mut self.state, self.assistant.as_ref(), target, source)
    }

    pub(crate) fn index_names_at(&self, path: &AccessPath) -> Result<Vec<Arc<str>>> {
        self.algorithms
            .read
            .index_names(&self.state, self.assistant.as_ref(), path)
    }

    pub(crate) fn field_names_at(&self, path: &AccessPath) -> Result<Vec<Arc<str>>> {
        self.algorithms
            .read
            .field_names(&self.state, self.assistant.as_ref(), path)
    }

    pub(crate) fn object_types_at(&self, path: &AccessPath) -> Result<Vec<Arc<str>>> {
        self.algorithms
            .read
            .object_types(&self.state, self.assistant.as_ref(), path)
    }

    /// Replaces this snapshot's state with the merge of its control-flow
    /// predecessors.
    ///
    /// All sources must share one call level; this snapshot adopts it.
    pub fn extend(&mut self, sources: &[&Snapshot]) -> Result<()> {
        self.require_transaction()?;
        let mode = self.state.mode;
        let states: Vec<&SnapshotState> = sources.iter().map(|s| &s.state).collect();
        let mut merged = self.algorithms.merge.merge(&states)?;
        merged.mode = mode;
        self.state = merged;
        Ok(())
    }

    /// Initializes this snapshot as the entry state of a called function.
    ///
    /// The caller's state is inherited one call level deeper; the `$this`
    /// binding and the arguments are copied (PHP by-value semantics) into
    /// the callee's control variables.
    pub fn extend_as_call(
        &mut self,
        caller: &Snapshot,
        this: Option<&MemoryEntry>,
        arguments: &[MemoryEntry],
    ) -> Result<()> {
        self.require_transaction()?;
        let mode = self.state.mode;
        self.state = caller.state.clone();
        self.state.call_level = caller.state.call_level + 1;
        self.state.mode = mode;

        let level = self.state.call_level;
        let algorithms = self.algorithms.clone();
        if let Some(this) = this {
            let path = AccessPath::control(VariableIdentifier::direct(THIS_VARIABLE), level);
            algorithms
                .assign
                .assign(&mut self.state, self.assistant.as_ref(), &path, this, true)?;
        }
        for (position, argument) in arguments.iter().enumerate() {
            let name = format!("{ARGUMENT_PREFIX}{position}");
            let path = AccessPath::control(VariableIdentifier::direct(&name), level);
            algorithms.assign.assign(
                &mut self.state,
                self.assistant.as_ref(),
                &path,
                argument,
                true,
            )?;
        }
        Ok(())
    }

    /// Replaces this snapshot's state with the caller's state after a call
    /// returned through the given callee exit snapshots.
    pub fn merge_with_call(&mut self, caller: &Snapshot, outputs: &[&Snapshot]) -> Result<()> {
        self.require_transaction()?;
        let states: Vec<&SnapshotState> = outputs.iter().map(|s| &s.state).collect();
        self.state = self
            .algorithms
            .merge
            .merge_with_call(&caller.state, &states)?;
        Ok(())
    }
}

impl fmt::Display for Snapshot {
    /// Renders a stable, human-readable dump of the snapshot.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "=== snapshot level={} mode={:?} ===",
            self.state.call_level, self.state.mode
        )?;

        let mut lines: Vec<String> = Vec::new();
        for (index, record) in self.state.structure.indexes() {
            let mut line = match self.state.data.get(index) {
                Some(entry) => format!("{index}: {entry}"),
                None => format!("{index}: <no value>"),
            };
            if let Some(entry) = self.state.info.get(index) {
                line.push_str(&format!(" INFO: {entry}"));
            }
            if let Some(aliases) = record.aliases() {
                let mut must: Vec<String> = aliases.must().map(ToString::to_string).collect();
                must.sort();
                let mut may: Vec<String> = aliases.may().map(ToString::to_string).collect();
                may.sort();
                if !must.is_empty() {
                    line.push_str(&format!(" MUST-ALIASES: {}", must.join(", ")));
                }
                if !may.is_empty() {
                    line.push_str(&format!(" MAY-ALIASES: {}", may.join(", ")));
                }
            }
            lines.push(line);
        }
        lines.sort();
        for line in lines {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

/// Factory for the snapshots of one analysis run.
///
/// Fixes the assistant, the algorithm family, the simplify limit and the
/// shared handle source. Cloning a model is cheap and yields a factory for
/// the same run.
///
/// # Examples
///
/// ```rust
/// use phpscope::{MemoryModel, MemoryEntry, Value, VariableIdentifier};
///
/// let model = MemoryModel::builder().build();
/// let mut snapshot = model.create_snapshot();
///
/// snapshot.start_transaction()?;
/// let x = snapshot.variable(VariableIdentifier::direct("x"));
/// x.write(&mut snapshot, &MemoryEntry::from_value(Value::Int(1)), false)?;
/// snapshot.commit_transaction()?;
///
/// assert_eq!(x.read(&snapshot)?, MemoryEntry::from_value(Value::Int(1)));
/// # Ok::<(), phpscope::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct MemoryModel {
    assistant: Arc<dyn MemoryAssistant>,
    algorithms: AlgorithmFamily,
    handles: Arc<HandleSource>,
    simplify_limit: usize,
}

impl MemoryModel {
    /// Starts building a model; unset options fall back to the copy family
    /// with the interval assistant.
    #[must_use]
    pub fn builder() -> MemoryModelBuilder {
        MemoryModelBuilder::default()
    }

    /// Creates an empty global-level snapshot of this run.
    #[must_use]
    pub fn create_snapshot(&self) -> Snapshot {
        Snapshot::new(self)
    }

    /// The run-wide handle source shared by all snapshots of this model.
    #[must_use]
    pub fn handles(&self) -> &Arc<HandleSource> {
        &self.handles
    }
}

/// Builder for [`MemoryModel`].
#[derive(Debug, Default)]
pub struct MemoryModelBuilder {
    assistant: Option<Arc<dyn MemoryAssistant>>,
    algorithms: Option<AlgorithmFamily>,
    simplify_limit: Option<usize>,
}

impl MemoryModelBuilder {
    /// Sets the assistant policies for the run.
    #[must_use]
    pub fn assistant<A: MemoryAssistant + 'static>(mut self, assistant: A) -> Self {
        self.assistant = Some(Arc::new(assistant));
        self
    }

    /// Sets the algorithm family for the run.
    #[must_use]
    pub fn algorithms(mut self, algorithms: AlgorithmFamily) -> Self {
        self.algorithms = Some(algorithms);
        self
    }

    /// Sets the value-set size above which commit simplifies entries.
    #[must_use]
    pub fn simplify_limit(mut self, limit: usize) -> Self {
        self.simplify_limit = Some(limit);
        self
    }

    /// Finalizes the model.
    #[must_use]
    pub fn build(self) -> MemoryModel {
        MemoryModel {
            assistant: self
                .assistant
                .unwrap_or_else(|| Arc::new(IntervalAssistant::new())),
            algorithms: self.algorithms.unwrap_or_default(),
            handles: Arc::new(HandleSource::new()),
            simplify_limit: self.simplify_limit.unwrap_or(DEFAULT_SIMPLIFY_LIMIT),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_protocol() {
        let model = MemoryModel::builder().build();
        let mut snapshot = model.create_snapshot();

        assert!(matches!(
            snapshot.commit_transaction(),
            Err(Error::NoTransaction)
        ));

        snapshot.start_transaction().unwrap();
        assert!(matches!(
            snapshot.start_transaction(),
            Err(Error::TransactionActive)
        ));

        // Nothing happened, so nothing changed
        assert!(!snapshot.commit_transaction().unwrap());
    }

    #[test]
    fn test_mutation_requires_transaction() {
        let model = MemoryModel::builder().build();
        let mut snapshot = model.create_snapshot();

        let x = snapshot.variable(VariableIdentifier::direct("x"));
        let result = x.write(&mut snapshot, &MemoryEntry::from_value(Value::Int(1)), false);
        assert!(matches!(result, Err(Error::NoTransaction)));
    }

    #[test]
    fn test_write_then_read_round_trip() {
        let model = MemoryModel::builder().build();
        let mut snapshot = model.create_snapshot();

        snapshot.start_transaction().unwrap();
        let x = snapshot.variable(VariableIdentifier::direct("x"));
        x.write(&mut snapshot, &MemoryEntry::from_value(Value::Int(7)), false)
            .unwrap();
        assert!(snapshot.commit_transaction().unwrap());

        assert_eq!(x.read(&snapshot).unwrap(), MemoryEntry::from_value(Value::Int(7)));

        // Re-committing the identical write reports stability
        snapshot.start_transaction().unwrap();
        x.write(&mut snapshot, &MemoryEntry::from_value(Value::Int(7)), false)
            .unwrap();
        assert!(!snapshot.commit_transaction().unwrap());
    }

    #[test]
    fn test_create_array_round_trip() {
        let model = MemoryModel::builder().build();
        let mut snapshot = model.create_snapshot();

        snapshot.start_transaction().unwrap();
        let array = snapshot.create_array().unwrap();
        let a = snapshot.variable(VariableIdentifier::direct("a"));
        a.write(&mut snapshot, &MemoryEntry::from_value(array), false)
            .unwrap();
        snapshot.commit_transaction().unwrap();

        let entry = a.read(&snapshot).unwrap();
        assert_eq!(entry.len(), 1);
        assert!(entry.iter().all(|v| matches!(v, Value::Array(_))));
    }

    #[test]
    fn test_temporaries_are_distinct_and_releasable() {
        let model = MemoryModel::builder().build();
        let mut snapshot = model.create_snapshot();

        let t1 = snapshot.create_temporary();
        let t2 = snapshot.create_temporary();
        assert_ne!(t1.path(), t2.path());

        snapshot.start_transaction().unwrap();
        t1.write(&mut snapshot, &MemoryEntry::from_value(Value::Int(1)), false)
            .unwrap();
        snapshot.release_temporary(&t1).unwrap();
        snapshot.commit_transaction().unwrap();

        assert_eq!(t1.read(&snapshot).unwrap(), MemoryEntry::undefined());
    }

    #[test]
    fn test_extend_merges_predecessors() {
        let model = MemoryModel::builder().build();
        let mut left = model.create_snapshot();
        let mut right = model.create_snapshot();

        for (snapshot, value) in [(&mut left, 1), (&mut right, 2)] {
            snapshot.start_transaction().unwrap();
            let x = snapshot.variable(VariableIdentifier::direct("x"));
            x.write(snapshot, &MemoryEntry::from_value(Value::Int(value)), false)
                .unwrap();
            snapshot.commit_transaction().unwrap();
        }

        let mut join = model.create_snapshot();
        join.start_transaction().unwrap();
        join.extend(&[&left, &right]).unwrap();
        join.commit_transaction().unwrap();

        let x = join.variable(VariableIdentifier::direct("x"));
        assert_eq!(
            x.read(&join).unwrap(),
            MemoryEntry::from_values([Value::Int(1), Value::Int(2)])
        );
    }

    #[test]
    fn test_extend_as_call_binds_arguments() {
        let model = MemoryModel::builder().build();
        let mut caller = model.create_snapshot();
        caller.start_transaction().unwrap();
        caller.commit_transaction().unwrap();

        let mut callee = model.create_snapshot();
        callee.start_transaction().unwrap();
        callee
            .extend_as_call(&caller, None, &[MemoryEntry::from_value(Value::Int(9))])
            .unwrap();
        callee.commit_transaction().unwrap();

        assert_eq!(callee.call_level(), 1);
        let arg = callee.control_variable(VariableIdentifier::direct("arg0"));
        assert_eq!(arg.read(&callee).unwrap(), MemoryEntry::from_value(Value::Int(9)));
    }

    #[test]
    fn test_dump_is_stable_and_readable() {
        let model = MemoryModel::builder().build();
        let mut snapshot = model.create_snapshot();

        snapshot.start_transaction().unwrap();
        let x = snapshot.variable(VariableIdentifier::direct("x"));
        x.write(&mut snapshot, &MemoryEntry::from_value(Value::Int(1)), false)
            .unwrap();
        snapshot.commit_transaction().unwrap();

        let dump = snapshot.to_string();
        assert!(dump.contains("$x: { 1 }"));
    }
}
