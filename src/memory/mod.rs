//! Core memory model vocabulary.
//!
//! This module defines the identity and value layer everything else is built on:
//!
//! - [`MemoryIndex`] - The immutable identity of one abstract storage location,
//!   forming a path through nested containers
//! - [`Value`] - The closed sum type of abstract PHP values
//! - [`MemoryEntry`] - An immutable set of possible values at one location
//!   (the disjunctive abstraction)
//! - [`AccessPath`] - A symbolic location expression with possibly several
//!   simultaneously-possible names per segment
//!
//! # Identity vs. Data
//!
//! A [`MemoryIndex`] says *where* something is stored, never *what* is stored
//! there. All facts about a location are looked up by index in the snapshot's
//! structure and data containers, which keeps copy-on-write sharing and
//! structural snapshot comparison explicit.

pub(crate) mod entry;
pub(crate) mod index;
pub(crate) mod path;
pub(crate) mod value;

pub use entry::MemoryEntry;
pub use index::{CallLevel, MemoryIndex, GLOBAL_CALL_LEVEL};
pub use path::{AccessPath, MemberIdentifier, PathSegment, RootContext, VariableIdentifier};
pub use value::{ArrayHandle, FloatValue, HandleSource, ObjectHandle, Value, ValueClass};
