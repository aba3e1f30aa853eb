//! Storage location identities.
//!
//! A [`MemoryIndex`] is the immutable, hashable identity of one abstract
//! storage location: a variable, a control variable, a temporary, an object
//! field, an array element, or the summary ("any") representative of a
//! container's not-explicitly-tracked members.
//!
//! # Summary Indices
//!
//! Every container implicitly owns exactly one summary slot (`AnyVariable`,
//! `AnyField`, `AnyIndex`, ...). Resolving a dynamically computed name that the
//! analysis cannot bound degrades to the summary slot instead of failing; this
//! is the model's controlled precision loss.
//!
//! # Parent Chains
//!
//! Array element indices point to their parent index through an `Arc`, so the
//! parent chain is acyclic by construction and two structurally equal paths
//! compare and hash equal regardless of how they were built.
//!
//! # Examples
//!
//! ```rust
//! use phpscope::MemoryIndex;
//!
//! let x = MemoryIndex::variable("x", 0);
//! let elem = x.index_child("key");
//! assert_eq!(elem.root_call_level(), 0);
//! assert_eq!(elem.to_string(), "$x[key]");
//! assert_eq!(elem, MemoryIndex::variable("x", 0).index_child("key"));
//! ```

use std::{fmt, sync::Arc};

use crate::memory::value::ObjectHandle;

/// Call depth of a storage location; `0` is the global level.
pub type CallLevel = u32;

/// The call level of the global context.
pub const GLOBAL_CALL_LEVEL: CallLevel = 0;

/// The identity of one abstract storage location.
///
/// Equality and hashing are structural over the variant and its components.
/// See the [module documentation](self) for the role of summary variants.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MemoryIndex {
    /// A named PHP variable at a call level.
    Variable {
        /// Variable name, without the `$` sigil.
        name: Arc<str>,
        /// Call level the variable lives at.
        call_level: CallLevel,
    },
    /// The summary slot for all not-explicitly-tracked variables of a level.
    AnyVariable {
        /// Call level of the summarized variables.
        call_level: CallLevel,
    },
    /// An analyzer-internal control variable (e.g. the `return` slot).
    ///
    /// Control variables live in a namespace separate from PHP variables so
    /// analyzed code can never collide with them.
    Control {
        /// Control variable name.
        name: Arc<str>,
        /// Call level the control variable lives at.
        call_level: CallLevel,
    },
    /// The summary slot for control variables of a level.
    AnyControl {
        /// Call level of the summarized control variables.
        call_level: CallLevel,
    },
    /// An anonymous temporary location used while evaluating expressions.
    Temporary {
        /// Unique id from the run's [`HandleSource`](crate::HandleSource).
        id: u64,
        /// Call level the temporary belongs to.
        call_level: CallLevel,
    },
    /// A named field of an abstract object.
    Field {
        /// The object owning the field.
        object: ObjectHandle,
        /// Field name.
        name: Arc<str>,
    },
    /// The summary slot for all not-explicitly-tracked fields of an object.
    AnyField {
        /// The object owning the fields.
        object: ObjectHandle,
    },
    /// A keyed element of an abstract array, identified through its parent.
    Index {
        /// Index of the location holding the array.
        parent: Arc<MemoryIndex>,
        /// Element key.
        key: Arc<str>,
    },
    /// The summary slot for all not-explicitly-tracked elements of an array.
    AnyIndex {
        /// Index of the location holding the array.
        parent: Arc<MemoryIndex>,
    },
}

impl MemoryIndex {
    /// Creates a variable index.
    #[must_use]
    pub fn variable(name: &str, call_level: CallLevel) -> Self {
        MemoryIndex::Variable {
            name: Arc::from(name),
            call_level,
        }
    }

    /// Creates the variable summary index of a level.
    #[must_use]
    pub fn any_variable(call_level: CallLevel) -> Self {
        MemoryIndex::AnyVariable { call_level }
    }

    /// Creates a control variable index.
    #[must_use]
    pub fn control(name: &str, call_level: CallLevel) -> Self {
        MemoryIndex::Control {
            name: Arc::from(name),
            call_level,
        }
    }

    /// Creates the control variable summary index of a level.
    #[must_use]
    pub fn any_control(call_level: CallLevel) -> Self {
        MemoryIndex::AnyControl { call_level }
    }

    /// Creates a temporary index.
    #[must_use]
    pub fn temporary(id: u64, call_level: CallLevel) -> Self {
        MemoryIndex::Temporary { id, call_level }
    }

    /// Creates an object field index.
    #[must_use]
    pub fn field(object: ObjectHandle, name: &str) -> Self {
        MemoryIndex::Field {
            object,
            name: Arc::from(name),
        }
    }

    /// Creates the field summary index of an object.
    #[must_use]
    pub fn any_field(object: ObjectHandle) -> Self {
        MemoryIndex::AnyField { object }
    }

    /// Creates the element index for `key` under an array stored at `self`.
    #[must_use]
    pub fn index_child(&self, key: &str) -> Self {
        MemoryIndex::Index {
            parent: Arc::new(self.clone()),
            key: Arc::from(key),
        }
    }

    /// Creates the element summary index under an array stored at `self`.
    #[must_use]
    pub fn any_index_child(&self) -> Self {
        MemoryIndex::AnyIndex {
            parent: Arc::new(self.clone()),
        }
    }

    /// Returns `true` if this is a summary ("any") slot.
    #[must_use]
    pub fn is_summary(&self) -> bool {
        matches!(
            self,
            MemoryIndex::AnyVariable { .. }
                | MemoryIndex::AnyControl { .. }
                | MemoryIndex::AnyField { .. }
                | MemoryIndex::AnyIndex { .. }
        )
    }

    /// The call level of the root of this index's parent chain.
    ///
    /// Fields live on the heap and report the global level; array elements
    /// report the level of the location holding the array.
    #[must_use]
    pub fn root_call_level(&self) -> CallLevel {
        match self {
            MemoryIndex::Variable { call_level, .. }
            | MemoryIndex::AnyVariable { call_level }
            | MemoryIndex::Control { call_level, .. }
            | MemoryIndex::AnyControl { call_level }
            | MemoryIndex::Temporary { call_level, .. } => *call_level,
            MemoryIndex::Field { .. } | MemoryIndex::AnyField { .. } => GLOBAL_CALL_LEVEL,
            MemoryIndex::Index { parent, .. } | MemoryIndex::AnyIndex { parent } => {
                parent.root_call_level()
            }
        }
    }

    /// Nesting depth of this index (roots have depth 1).
    ///
    /// Used by the collectors to bound resolution through degenerate deeply
    /// nested or self-referential container structure.
    #[must_use]
    pub fn depth(&self) -> usize {
        match self {
            MemoryIndex::Index { parent, .. } | MemoryIndex::AnyIndex { parent } => {
                parent.depth() + 1
            }
            _ => 1,
        }
    }

    /// The parent index of an array element, if any.
    #[must_use]
    pub fn parent(&self) -> Option<&MemoryIndex> {
        match self {
            MemoryIndex::Index { parent, .. } | MemoryIndex::AnyIndex { parent } => Some(parent),
            _ => None,
        }
    }
}

impl fmt::Display for MemoryIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn level_prefix(f: &mut fmt::Formatter<'_>, level: CallLevel) -> fmt::Result {
            if level > GLOBAL_CALL_LEVEL {
                write!(f, "{level}::")?;
            }
            Ok(())
        }

        match self {
            MemoryIndex::Variable { name, call_level } => {
                level_prefix(f, *call_level)?;
                write!(f, "${name}")
            }
            MemoryIndex::AnyVariable { call_level } => {
                level_prefix(f, *call_level)?;
                write!(f, "$?")
            }
            MemoryIndex::Control { name, call_level } => {
                level_prefix(f, *call_level)?;
                write!(f, "CTRL${name}")
            }
            MemoryIndex::AnyControl { call_level } => {
                level_prefix(f, *call_level)?;
                write!(f, "CTRL$?")
            }
            MemoryIndex::Temporary { id, call_level } => {
                level_prefix(f, *call_level)?;
                write!(f, "TMP#{id}")
            }
            MemoryIndex::Field { object, name } => write!(f, "{object}->{name}"),
            MemoryIndex::AnyField { object } => write!(f, "{object}->?"),
            MemoryIndex::Index { parent, key } => write!(f, "{parent}[{key}]"),
            MemoryIndex::AnyIndex { parent } => write!(f, "{parent}[?]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_equality() {
        let a = MemoryIndex::variable("x", 1).index_child("a");
        let b = MemoryIndex::variable("x", 1).index_child("a");
        assert_eq!(a, b);

        let c = MemoryIndex::variable("x", 2).index_child("a");
        assert_ne!(a, c);

        let d = MemoryIndex::variable("x", 1).index_child("b");
        assert_ne!(a, d);
    }

    #[test]
    fn test_summary_slots() {
        let x = MemoryIndex::variable("x", 0);
        assert!(!x.is_summary());
        assert!(x.any_index_child().is_summary());
        assert!(MemoryIndex::any_variable(0).is_summary());
        assert!(MemoryIndex::any_field(ObjectHandle::new(3)).is_summary());
    }

    #[test]
    fn test_depth_and_parent() {
        let x = MemoryIndex::variable("x", 0);
        assert_eq!(x.depth(), 1);
        assert!(x.parent().is_none());

        let nested = x.index_child("a").index_child("b");
        assert_eq!(nested.depth(), 3);
        assert_eq!(nested.parent().unwrap(), &x.index_child("a"));
    }

    #[test]
    fn test_root_call_level() {
        assert_eq!(MemoryIndex::variable("x", 2).root_call_level(), 2);
        assert_eq!(
            MemoryIndex::variable("x", 2).index_child("a").root_call_level(),
            2
        );
        assert_eq!(
            MemoryIndex::field(ObjectHandle::new(1), "f").root_call_level(),
            GLOBAL_CALL_LEVEL
        );
    }

    #[test]
    fn test_display_dump_syntax() {
        let x = MemoryIndex::variable("x", 0);
        assert_eq!(x.to_string(), "$x");
        assert_eq!(x.index_child("k").to_string(), "$x[k]");
        assert_eq!(x.any_index_child().to_string(), "$x[?]");
        assert_eq!(MemoryIndex::variable("y", 3).to_string(), "3::$y");
        assert_eq!(MemoryIndex::control("return", 0).to_string(), "CTRL$return");
        assert_eq!(
            MemoryIndex::field(ObjectHandle::new(7), "f").to_string(),
            "obj#7->f"
        );
    }
}
