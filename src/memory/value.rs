//! Abstract value representation.
//!
//! This module provides [`Value`], the closed sum type of abstract PHP values
//! tracked by the memory model, plus the opaque [`ArrayHandle`] / [`ObjectHandle`]
//! identities and the [`HandleSource`] arena that allocates them.
//!
//! # Value Lattice
//!
//! Values form a flat lattice per type class with dedicated top elements:
//!
//! | Concrete | Interval | Top |
//! |----------|----------|-----|
//! | `Bool` | - | `AnyBool` |
//! | `Int` | `IntInterval` | `AnyInt` |
//! | `Float` | `FloatInterval` | `AnyFloat` |
//! | `String` | - | `AnyString` |
//! | `Array` | - | `AnyArray` |
//! | `Object` | - | `AnyObject` |
//!
//! [`Value::Any`] is the top of everything and [`Value::Undefined`] is the
//! explicit "no value" member PHP produces for unset locations. `Undefined` is
//! a normal set member, distinct from an empty entry.
//!
//! # Handles
//!
//! Array and object instances are identified by opaque `u64` handles. The
//! handle itself carries no data; every structural or value fact about the
//! instance lives in the snapshot containers, keyed by handle or by a
//! [`MemoryIndex`](crate::MemoryIndex) rooted at the handle. Handles are
//! allocated by an explicit [`HandleSource`] owned by the analysis run, so
//! there is no process-global counter state.

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

/// Opaque identity of one abstract associative array instance.
///
/// Multiple variables may hold the same handle (aliasing into shared
/// structure), and one entry may hold several handles (disjunction).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArrayHandle(u64);

impl ArrayHandle {
    /// Creates a handle from a raw id. Only the [`HandleSource`] and tests
    /// should need this.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        ArrayHandle(id)
    }

    /// The raw id of this handle.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ArrayHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "arr#{}", self.0)
    }
}

/// Opaque identity of one abstract object instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectHandle(u64);

impl ObjectHandle {
    /// Creates a handle from a raw id. Only the [`HandleSource`] and tests
    /// should need this.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        ObjectHandle(id)
    }

    /// The raw id of this handle.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj#{}", self.0)
    }
}

/// Allocator for unique array/object/temporary identities.
///
/// One `HandleSource` is owned by the top-level analysis run and threaded
/// through snapshot creation via `Arc`, so ids stay unique across every
/// snapshot derived from the same run without any global mutable state.
#[derive(Debug, Default)]
pub struct HandleSource {
    next_array: AtomicU64,
    next_object: AtomicU64,
    next_temporary: AtomicU64,
}

impl HandleSource {
    /// Creates a fresh arena with all counters at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a new unique array handle.
    pub fn next_array(&self) -> ArrayHandle {
        ArrayHandle(self.next_array.fetch_add(1, Ordering::Relaxed))
    }

    /// Allocates a new unique object handle.
    pub fn next_object(&self) -> ObjectHandle {
        ObjectHandle(self.next_object.fetch_add(1, Ordering::Relaxed))
    }

    /// Allocates a new unique temporary-location id.
    pub fn next_temporary(&self) -> u64 {
        self.next_temporary.fetch_add(1, Ordering::Relaxed)
    }
}

/// An `f64` with bitwise equality and hashing.
///
/// Value sets require `Eq + Hash`; comparing floats by bit pattern keeps NaN
/// payloads and signed zeroes distinct, which is acceptable for an abstract
/// domain (two bit-different NaNs are simply two set members).
#[derive(Debug, Clone, Copy)]
pub struct FloatValue(f64);

impl FloatValue {
    /// Wraps a raw float.
    #[must_use]
    pub const fn new(value: f64) -> Self {
        FloatValue(value)
    }

    /// The wrapped float.
    #[must_use]
    pub const fn get(&self) -> f64 {
        self.0
    }
}

impl PartialEq for FloatValue {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for FloatValue {}

impl std::hash::Hash for FloatValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl From<f64> for FloatValue {
    fn from(value: f64) -> Self {
        FloatValue(value)
    }
}

impl fmt::Display for FloatValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The type class of a [`Value`], used to group set members during
/// simplification and widening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueClass {
    /// `Undefined`.
    Undefined,
    /// `Bool` and `AnyBool`.
    Bool,
    /// `Int`, `IntInterval` and `AnyInt`.
    Int,
    /// `Float`, `FloatInterval` and `AnyFloat`.
    Float,
    /// `String` and `AnyString`.
    String,
    /// `Array` and `AnyArray`.
    Array,
    /// `Object` and `AnyObject`.
    Object,
    /// The universal top element `Any`.
    Top,
}

/// One abstract PHP value.
///
/// This is a closed tagged union; every algorithm matches on it exhaustively,
/// so adding a variant is a compile-visible event across the whole crate.
///
/// # Examples
///
/// ```rust
/// use phpscope::Value;
///
/// let v = Value::Int(42);
/// assert!(!v.is_container());
/// assert!(Value::AnyArray.is_any());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    /// The value of an unset location (`NULL`-like).
    Undefined,
    /// A concrete boolean.
    Bool(bool),
    /// A concrete integer.
    Int(i64),
    /// A concrete float.
    Float(FloatValue),
    /// A concrete string.
    String(Arc<str>),
    /// A closed integer interval `[min, max]`.
    IntInterval {
        /// Inclusive lower bound.
        min: i64,
        /// Inclusive upper bound.
        max: i64,
    },
    /// A closed float interval `[min, max]`.
    FloatInterval {
        /// Inclusive lower bound.
        min: FloatValue,
        /// Inclusive upper bound.
        max: FloatValue,
    },
    /// A handle to an abstract associative array instance.
    Array(ArrayHandle),
    /// A handle to an abstract object instance.
    Object(ObjectHandle),
    /// Any boolean.
    AnyBool,
    /// Any integer.
    AnyInt,
    /// Any float.
    AnyFloat,
    /// Any string.
    AnyString,
    /// Any array, with no tracked structure.
    AnyArray,
    /// Any object, with no tracked structure.
    AnyObject,
    /// Any value at all; the top element of the whole domain.
    Any,
}

impl Value {
    /// Wraps a string slice.
    #[must_use]
    pub fn string(s: &str) -> Self {
        Value::String(Arc::from(s))
    }

    /// Wraps a float.
    #[must_use]
    pub fn float(f: f64) -> Self {
        Value::Float(FloatValue::new(f))
    }

    /// Returns the [`ValueClass`] this value belongs to.
    #[must_use]
    pub fn class(&self) -> ValueClass {
        match self {
            Value::Undefined => ValueClass::Undefined,
            Value::Bool(_) | Value::AnyBool => ValueClass::Bool,
            Value::Int(_) | Value::IntInterval { .. } | Value::AnyInt => ValueClass::Int,
            Value::Float(_) | Value::FloatInterval { .. } | Value::AnyFloat => ValueClass::Float,
            Value::String(_) | Value::AnyString => ValueClass::String,
            Value::Array(_) | Value::AnyArray => ValueClass::Array,
            Value::Object(_) | Value::AnyObject => ValueClass::Object,
            Value::Any => ValueClass::Top,
        }
    }

    /// Returns `true` for values carrying tracked container structure.
    ///
    /// Only handle values are containers; `AnyArray`/`AnyObject` have no
    /// tracked structure and behave like scalars to the collectors.
    #[must_use]
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Array(_) | Value::Object(_))
    }

    /// Returns `true` for the top elements (`Any*` and `Any`).
    #[must_use]
    pub fn is_any(&self) -> bool {
        matches!(
            self,
            Value::AnyBool
                | Value::AnyInt
                | Value::AnyFloat
                | Value::AnyString
                | Value::AnyArray
                | Value::AnyObject
                | Value::Any
        )
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "UNDEF"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(s) => write!(f, "'{s}'"),
            Value::IntInterval { min, max } => write!(f, "int({min}..{max})"),
            Value::FloatInterval { min, max } => write!(f, "float({min}..{max})"),
            Value::Array(h) => write!(f, "{h}"),
            Value::Object(h) => write!(f, "{h}"),
            Value::AnyBool => write!(f, "AnyBool"),
            Value::AnyInt => write!(f, "AnyInt"),
            Value::AnyFloat => write!(f, "AnyFloat"),
            Value::AnyString => write!(f, "AnyString"),
            Value::AnyArray => write!(f, "AnyArray"),
            Value::AnyObject => write!(f, "AnyObject"),
            Value::Any => write!(f, "Any"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_source_unique_ids() {
        let source = HandleSource::new();
        let a = source.next_array();
        let b = source.next_array();
        assert_ne!(a, b);

        let o = source.next_object();
        let p = source.next_object();
        assert_ne!(o, p);

        // Array and object counters are independent
        assert_eq!(a.id(), 0);
        assert_eq!(o.id(), 0);
    }

    #[test]
    fn test_float_value_bitwise_equality() {
        assert_eq!(FloatValue::new(1.5), FloatValue::new(1.5));
        assert_ne!(FloatValue::new(0.0), FloatValue::new(-0.0));
        // NaN equals itself bit-for-bit
        assert_eq!(FloatValue::new(f64::NAN), FloatValue::new(f64::NAN));
    }

    #[test]
    fn test_value_classes() {
        assert_eq!(Value::Int(1).class(), ValueClass::Int);
        assert_eq!(
            Value::IntInterval { min: 0, max: 9 }.class(),
            ValueClass::Int
        );
        assert_eq!(Value::AnyString.class(), ValueClass::String);
        assert_eq!(Value::Any.class(), ValueClass::Top);
    }

    #[test]
    fn test_container_predicate() {
        assert!(Value::Array(ArrayHandle::new(1)).is_container());
        assert!(Value::Object(ObjectHandle::new(1)).is_container());
        assert!(!Value::AnyArray.is_container());
        assert!(!Value::Int(0).is_container());
    }
}
