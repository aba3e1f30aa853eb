//! # phpscope Prelude
//!
//! This module provides a convenient prelude for the most commonly used types
//! and traits of the phpscope library. Import it to get quick access to the
//! essentials of driving the memory model.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all phpscope operations
pub use crate::Error;

/// The result type used throughout phpscope
pub use crate::Result;

/// Operation and precision-loss counters carried by every snapshot
pub use crate::Statistics;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// Factory for the snapshots of one analysis run
pub use crate::MemoryModel;

/// Abstract memory at one program point
pub use crate::Snapshot;

/// Path-building accessor for one symbolic location
pub use crate::SnapshotEntry;

/// Which level of a snapshot mutations apply to
pub use crate::SnapshotMode;

// ================================================================================================
// Memory Vocabulary
// ================================================================================================

/// Abstract PHP values
pub use crate::{Value, ValueClass};

/// Immutable sets of possible values at one location
pub use crate::MemoryEntry;

/// The identity of one abstract storage location
pub use crate::MemoryIndex;

/// Symbolic paths and the identifiers naming their segments
pub use crate::{AccessPath, MemberIdentifier, VariableIdentifier};

/// Container instance identities and their allocator
pub use crate::{ArrayHandle, HandleSource, ObjectHandle};

/// Call depth vocabulary
pub use crate::{CallLevel, GLOBAL_CALL_LEVEL};

/// Control-variable names of the call protocol
pub use crate::{ARGUMENT_PREFIX, RETURN_VARIABLE, THIS_VARIABLE};

// ================================================================================================
// Extension Points
// ================================================================================================

/// The pluggable strategy bundle and its traits
pub use crate::algorithms::{
    AlgorithmFamily, AssignAlgorithm, CommitAlgorithm, MergeAlgorithm, ReadAlgorithm,
};

/// Stateless helper policies
pub use crate::assistant::{IntervalAssistant, MemoryAssistant};
