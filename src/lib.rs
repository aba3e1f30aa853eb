// Copyright 2026 the phpscope contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]

//! # phpscope
//!
//! An abstract memory model for static analysis of PHP programs.
//!
//! `phpscope` implements the heap abstraction an abstract interpreter runs
//! on: per-program-point **snapshots** of memory that track variables,
//! associative arrays, objects, by-reference aliasing and analyzer-internal
//! locations, all under *may/must* precision so the analysis stays sound in
//! the face of PHP's dynamic features (variable variables, computed keys,
//! value-semantics arrays).
//!
//! ## Features
//!
//! - **Snapshot-per-program-point** - Persistent (`imbl`) containers make
//!   deriving and comparing thousands of snapshots cheap
//! - **Transactional mutation** - `start_transaction` / `commit_transaction`
//!   brackets with change detection driving the analysis fixpoint
//! - **Strong and weak updates** - Unambiguously resolved locations are
//!   overwritten, ambiguous ones only accumulate
//! - **May/must aliasing** - PHP `=&` references with sound merge semantics
//! - **Widening** - Loop-head commits extrapolate changed entries so
//!   fixpoint iteration terminates
//! - **Pluggable policies** - Algorithm families and assistant policies are
//!   trait objects, swappable per analysis run
//!
//! ## Quick Start
//!
//! ```rust
//! use phpscope::prelude::*;
//!
//! let model = MemoryModel::builder().build();
//! let mut snapshot = model.create_snapshot();
//!
//! // $arr['key'] = 42;
//! snapshot.start_transaction()?;
//! let element = snapshot
//!     .variable(VariableIdentifier::direct("arr"))
//!     .index(MemberIdentifier::direct("key"));
//! element.write(&mut snapshot, &MemoryEntry::from_value(Value::Int(42)), false)?;
//! snapshot.commit_transaction()?;
//!
//! assert_eq!(element.read(&snapshot)?, MemoryEntry::from_value(Value::Int(42)));
//! # Ok::<(), phpscope::Error>(())
//! ```
//!
//! ## Architecture
//!
//! The crate is layered bottom-up:
//!
//! - [`memory`] - The vocabulary: location identities ([`MemoryIndex`]),
//!   abstract values ([`Value`]), value sets ([`MemoryEntry`]) and symbolic
//!   paths ([`AccessPath`])
//! - [`snapshot`] - The per-program-point state: structure and data
//!   containers, the transaction protocol, the entry API and the
//!   [`MemoryModel`] factory
//! - [`algorithms`] - The pluggable strategies executing assignments,
//!   reads, merges and commits; the shipped *copy family* implements PHP
//!   value semantics
//! - [`assistant`] - Stateless policies: simplification, widening and the
//!   semantics of member access on non-container values
//!
//! ## Precision Losses Are Not Errors
//!
//! Resolving a dynamically computed name the analysis cannot bound degrades
//! to a *summary* location; degenerate nesting hits a depth cap; loop heads
//! widen. All of these are counted in [`Statistics`] and logged via the
//! [`log`] facade rather than reported as errors — they are the abstraction
//! doing its job. [`Error`] is reserved for protocol misuse and internal
//! invariant violations.

#[macro_use]
pub(crate) mod error;
pub(crate) mod stats;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use phpscope::prelude::*;
///
/// let model = MemoryModel::builder().build();
/// let snapshot = model.create_snapshot();
/// # let _ = snapshot;
/// ```
pub mod prelude;

/// Core vocabulary: location identities, abstract values, value sets and
/// symbolic access paths.
pub mod memory;

/// Snapshots, their containers, the transaction protocol and the
/// [`MemoryModel`] factory.
pub mod snapshot;

/// Pluggable algorithm strategies: assign, read, merge and commit.
pub mod algorithms;

/// Stateless helper policies: simplification, widening and virtual members.
pub mod assistant;

pub use error::Error;
pub use stats::Statistics;

pub use memory::{
    AccessPath, ArrayHandle, CallLevel, FloatValue, HandleSource, MemberIdentifier, MemoryEntry,
    MemoryIndex, ObjectHandle, PathSegment, RootContext, Value, ValueClass, VariableIdentifier,
    GLOBAL_CALL_LEVEL,
};
pub use snapshot::{
    MemoryModel, MemoryModelBuilder, Snapshot, SnapshotEntry, SnapshotMode, ARGUMENT_PREFIX,
    DEFAULT_SIMPLIFY_LIMIT, RETURN_VARIABLE, THIS_VARIABLE,
};

/// The result type used throughout phpscope.
pub type Result<T> = std::result::Result<T, Error>;
