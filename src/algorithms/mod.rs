//! Pluggable algorithm strategies of the memory model.
//!
//! Every snapshot operation is carried out by one of four strategy objects —
//! assign, read, merge and commit — bundled into an [`AlgorithmFamily`]. The
//! snapshot itself only manages the transaction protocol and delegates the
//! actual semantics here, so alternative families (e.g. a tracking family
//! that records change sets) can be swapped in without touching the snapshot.
//!
//! The shipped *copy family* implements PHP value semantics: plain assignment
//! deep-copies arrays, aliasing shares them, merge is the disjunctive union
//! of the inputs, and commit detects changes by comparing the persistent
//! containers against the state saved at transaction start.
//!
//! All strategies operate on a [`SnapshotState`], the bundled containers of
//! one snapshot, and receive the run's [`MemoryAssistant`] for the policy
//! decisions they delegate.

use std::{fmt::Debug, sync::Arc};

use crate::{
    assistant::MemoryAssistant,
    memory::{entry::MemoryEntry, path::AccessPath},
    snapshot::{SavedState, SnapshotState},
    Result,
};

pub mod assign;
pub mod collect;
pub mod commit;
pub mod merge;
pub mod read;

pub use assign::CopyAssignAlgorithm;
pub use collect::{collect_assign, collect_read, ReadResolution, ResolvedLocation, MAX_PATH_DEPTH};
pub use commit::CopyCommitAlgorithm;
pub use merge::CopyMergeAlgorithm;
pub use read::CopyReadAlgorithm;

/// Strategy executing assignments and alias assignments.
pub trait AssignAlgorithm: Debug + Send + Sync {
    /// Writes `entry` to every location `path` resolves to.
    ///
    /// Resolution materializes missing locations (auto-vivification). Each
    /// unambiguous location receives a strong update, ambiguous ones a weak
    /// update; `force_strong` upgrades every update to a strong one.
    fn assign(
        &self,
        state: &mut SnapshotState,
        assistant: &dyn MemoryAssistant,
        path: &AccessPath,
        entry: &MemoryEntry,
        force_strong: bool,
    ) -> Result<()>;

    /// Establishes PHP by-reference aliasing (`$a =& $b`) between the
    /// locations of `target` and `source`, and propagates the source value.
    fn assign_alias(
        &self,
        state: &mut SnapshotState,
        assistant: &dyn MemoryAssistant,
        target: &AccessPath,
        source: &AccessPath,
    ) -> Result<()>;
}

/// Strategy resolving paths and producing value sets without mutating the
/// snapshot.
pub trait ReadAlgorithm: Debug + Send + Sync {
    /// The union of the value sets of every location `path` resolves to.
    fn read(
        &self,
        state: &SnapshotState,
        assistant: &dyn MemoryAssistant,
        path: &AccessPath,
    ) -> Result<MemoryEntry>;

    /// The known array keys readable under `path`, sorted and deduplicated.
    fn index_names(
        &self,
        state: &SnapshotState,
        assistant: &dyn MemoryAssistant,
        path: &AccessPath,
    ) -> Result<Vec<Arc<str>>>;

    /// The known object field names readable under `path`, sorted and
    /// deduplicated.
    fn field_names(
        &self,
        state: &SnapshotState,
        assistant: &dyn MemoryAssistant,
        path: &AccessPath,
    ) -> Result<Vec<Arc<str>>>;

    /// The possible object types of the objects stored under `path`.
    fn object_types(
        &self,
        state: &SnapshotState,
        assistant: &dyn MemoryAssistant,
        path: &AccessPath,
    ) -> Result<Vec<Arc<str>>>;
}

/// Strategy combining the states of several control-flow predecessors.
pub trait MergeAlgorithm: Debug + Send + Sync {
    /// Merges sibling states (same call level) into their disjunctive union.
    fn merge(&self, sources: &[&SnapshotState]) -> Result<SnapshotState>;

    /// Merges callee exit states back into the caller after a call returns.
    fn merge_with_call(
        &self,
        caller: &SnapshotState,
        outputs: &[&SnapshotState],
    ) -> Result<SnapshotState>;
}

/// Strategy closing a transaction: simplification, optional widening, and
/// change detection against the state saved at transaction start.
pub trait CommitAlgorithm: Debug + Send + Sync {
    /// Finalizes the transaction on `state`.
    ///
    /// Returns `true` if the snapshot differs from `saved`, which is what
    /// drives the analysis fixpoint.
    fn commit(
        &self,
        state: &mut SnapshotState,
        saved: &SavedState,
        assistant: &dyn MemoryAssistant,
        simplify_limit: usize,
        widen: bool,
    ) -> Result<bool>;
}

/// The four strategies a memory model runs with.
///
/// Cloning a family is cheap; the strategies are shared behind [`Arc`]s.
#[derive(Debug, Clone)]
pub struct AlgorithmFamily {
    /// Assignment strategy.
    pub assign: Arc<dyn AssignAlgorithm>,
    /// Read strategy.
    pub read: Arc<dyn ReadAlgorithm>,
    /// Merge strategy.
    pub merge: Arc<dyn MergeAlgorithm>,
    /// Commit strategy.
    pub commit: Arc<dyn CommitAlgorithm>,
}

impl AlgorithmFamily {
    /// The copy family: PHP value semantics with deep array copies on
    /// assignment.
    #[must_use]
    pub fn copy_family() -> Self {
        AlgorithmFamily {
            assign: Arc::new(CopyAssignAlgorithm),
            read: Arc::new(CopyReadAlgorithm),
            merge: Arc::new(CopyMergeAlgorithm),
            commit: Arc::new(CopyCommitAlgorithm),
        }
    }
}

impl Default for AlgorithmFamily {
    fn default() -> Self {
        Self::copy_family()
    }
}
