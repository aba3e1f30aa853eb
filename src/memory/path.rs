//! Symbolic access paths.
//!
//! An [`AccessPath`] describes *where* a snapshot operation should look,
//! before any resolution against a concrete snapshot: a root segment
//! (variable, control variable or temporary) followed by any number of field
//! and array-index segments.
//!
//! Because PHP names can be computed at runtime, each segment carries a
//! [`MemberIdentifier`] with **zero or more** possible names: one name is a
//! direct access, several names are an uncertain access, and zero names is the
//! fully unknown "any" access that resolves to a summary index.
//!
//! Paths are immutable; extending a path clones the segment list. They are
//! resolved into sets of [`MemoryIndex`](crate::MemoryIndex) locations by the
//! collector algorithms.

use std::{fmt, sync::Arc};

use crate::memory::index::{CallLevel, GLOBAL_CALL_LEVEL};

/// One-or-more possible names of a variable, as produced by the analyzed
/// program (e.g. `$$name` has every string value of `$name` as a possible
/// name). An empty name set means the name is completely unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableIdentifier {
    names: Vec<Arc<str>>,
}

impl VariableIdentifier {
    /// A single, statically known variable name.
    #[must_use]
    pub fn direct(name: &str) -> Self {
        VariableIdentifier {
            names: vec![Arc::from(name)],
        }
    }

    /// Several simultaneously possible names.
    #[must_use]
    pub fn uncertain<'a, I: IntoIterator<Item = &'a str>>(names: I) -> Self {
        VariableIdentifier {
            names: names.into_iter().map(Arc::from).collect(),
        }
    }

    /// A completely unknown name.
    #[must_use]
    pub fn any() -> Self {
        VariableIdentifier { names: Vec::new() }
    }

    /// The possible names; empty means unknown.
    #[must_use]
    pub fn names(&self) -> &[Arc<str>] {
        &self.names
    }

    /// Returns `true` if the name is completely unknown.
    #[must_use]
    pub fn is_any(&self) -> bool {
        self.names.is_empty()
    }

    /// Returns `true` if exactly one name is possible.
    #[must_use]
    pub fn is_direct(&self) -> bool {
        self.names.len() == 1
    }
}

/// One-or-more possible member names (array key or object field).
///
/// Structurally identical to [`VariableIdentifier`]; kept as a separate type
/// because the driver produces them from different AST constructs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberIdentifier {
    names: Vec<Arc<str>>,
}

impl MemberIdentifier {
    /// A single, statically known member name.
    #[must_use]
    pub fn direct(name: &str) -> Self {
        MemberIdentifier {
            names: vec![Arc::from(name)],
        }
    }

    /// Several simultaneously possible names.
    #[must_use]
    pub fn uncertain<'a, I: IntoIterator<Item = &'a str>>(names: I) -> Self {
        MemberIdentifier {
            names: names.into_iter().map(Arc::from).collect(),
        }
    }

    /// A completely unknown member name.
    #[must_use]
    pub fn any() -> Self {
        MemberIdentifier { names: Vec::new() }
    }

    /// The possible names; empty means unknown.
    #[must_use]
    pub fn names(&self) -> &[Arc<str>] {
        &self.names
    }

    /// Returns `true` if the name is completely unknown.
    #[must_use]
    pub fn is_any(&self) -> bool {
        self.names.is_empty()
    }

    /// Returns `true` if exactly one name is possible.
    #[must_use]
    pub fn is_direct(&self) -> bool {
        self.names.len() == 1
    }
}

impl From<VariableIdentifier> for MemberIdentifier {
    fn from(v: VariableIdentifier) -> Self {
        MemberIdentifier { names: v.names }
    }
}

/// Which root namespace a path starts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootContext {
    /// Roots resolve at the path's call level.
    Local,
    /// Roots resolve at the global level, regardless of call depth.
    Global,
}

/// One segment of an access path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Root segment naming PHP variables.
    Variable(MemberIdentifier),
    /// Root segment naming analyzer control variables.
    Control(MemberIdentifier),
    /// Root segment addressing one temporary location.
    Temporary {
        /// Id of the temporary.
        id: u64,
    },
    /// Traversal into object fields.
    Field(MemberIdentifier),
    /// Traversal into array elements.
    Index(MemberIdentifier),
}

impl PathSegment {
    /// Returns `true` if this segment denotes exactly one name.
    #[must_use]
    pub fn is_direct(&self) -> bool {
        match self {
            PathSegment::Variable(m)
            | PathSegment::Control(m)
            | PathSegment::Field(m)
            | PathSegment::Index(m) => m.is_direct(),
            PathSegment::Temporary { .. } => true,
        }
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn names(m: &MemberIdentifier) -> String {
            match m.names() {
                [] => "?".to_string(),
                [one] => one.to_string(),
                many => {
                    let joined: Vec<&str> = many.iter().map(AsRef::as_ref).collect();
                    format!("{{{}}}", joined.join("|"))
                }
            }
        }

        match self {
            PathSegment::Variable(m) => write!(f, "${}", names(m)),
            PathSegment::Control(m) => write!(f, "CTRL${}", names(m)),
            PathSegment::Temporary { id } => write!(f, "TMP#{id}"),
            PathSegment::Field(m) => write!(f, "->{}", names(m)),
            PathSegment::Index(m) => write!(f, "[{}]", names(m)),
        }
    }
}

/// A symbolic path to one or many memory locations.
///
/// Built by the snapshot entry API, consumed by the collector algorithms.
///
/// # Examples
///
/// ```rust
/// use phpscope::{AccessPath, MemberIdentifier, VariableIdentifier};
///
/// let p = AccessPath::variable(VariableIdentifier::direct("arr"), 1)
///     .with_index(MemberIdentifier::direct("k"));
/// assert!(p.is_direct());
/// assert_eq!(p.to_string(), "1::$arr[k]");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPath {
    segments: Vec<PathSegment>,
    context: RootContext,
    call_level: CallLevel,
}

impl AccessPath {
    /// A path rooted at PHP variables of the given call level.
    #[must_use]
    pub fn variable(identifier: VariableIdentifier, call_level: CallLevel) -> Self {
        AccessPath {
            segments: vec![PathSegment::Variable(identifier.into())],
            context: RootContext::Local,
            call_level,
        }
    }

    /// A path rooted at global PHP variables.
    #[must_use]
    pub fn global_variable(identifier: VariableIdentifier) -> Self {
        AccessPath {
            segments: vec![PathSegment::Variable(identifier.into())],
            context: RootContext::Global,
            call_level: GLOBAL_CALL_LEVEL,
        }
    }

    /// A path rooted at control variables of the given call level.
    #[must_use]
    pub fn control(identifier: VariableIdentifier, call_level: CallLevel) -> Self {
        AccessPath {
            segments: vec![PathSegment::Control(identifier.into())],
            context: RootContext::Local,
            call_level,
        }
    }

    /// A path rooted at global control variables.
    #[must_use]
    pub fn global_control(identifier: VariableIdentifier) -> Self {
        AccessPath {
            segments: vec![PathSegment::Control(identifier.into())],
            context: RootContext::Global,
            call_level: GLOBAL_CALL_LEVEL,
        }
    }

    /// A path addressing one temporary location.
    #[must_use]
    pub fn temporary(id: u64, call_level: CallLevel) -> Self {
        AccessPath {
            segments: vec![PathSegment::Temporary { id }],
            context: RootContext::Local,
            call_level,
        }
    }

    /// Extends the path by an object field access.
    #[must_use]
    pub fn with_field(&self, identifier: MemberIdentifier) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment::Field(identifier));
        AccessPath {
            segments,
            context: self.context,
            call_level: self.call_level,
        }
    }

    /// Extends the path by an array index access.
    #[must_use]
    pub fn with_index(&self, identifier: MemberIdentifier) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment::Index(identifier));
        AccessPath {
            segments,
            context: self.context,
            call_level: self.call_level,
        }
    }

    /// The segments of the path, root first.
    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// The root namespace of the path.
    #[must_use]
    pub fn context(&self) -> RootContext {
        self.context
    }

    /// The call level the path's roots resolve at (global context paths
    /// always report the global level).
    #[must_use]
    pub fn call_level(&self) -> CallLevel {
        match self.context {
            RootContext::Local => self.call_level,
            RootContext::Global => GLOBAL_CALL_LEVEL,
        }
    }

    /// Returns `true` if every segment denotes exactly one name.
    ///
    /// Direct paths are the precondition for strong (must) updates; any
    /// uncertain segment demotes the whole access to a weak update.
    #[must_use]
    pub fn is_direct(&self) -> bool {
        self.segments.iter().all(PathSegment::is_direct)
    }
}

impl fmt::Display for AccessPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.call_level() > GLOBAL_CALL_LEVEL {
            write!(f, "{}::", self.call_level())?;
        }
        for segment in &self.segments {
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directness() {
        let direct = AccessPath::variable(VariableIdentifier::direct("x"), 0)
            .with_index(MemberIdentifier::direct("a"));
        assert!(direct.is_direct());

        let uncertain = AccessPath::variable(VariableIdentifier::direct("x"), 0)
            .with_index(MemberIdentifier::uncertain(["a", "b"]));
        assert!(!uncertain.is_direct());

        let any = AccessPath::variable(VariableIdentifier::any(), 0);
        assert!(!any.is_direct());
    }

    #[test]
    fn test_global_context_call_level() {
        let p = AccessPath::global_variable(VariableIdentifier::direct("g"));
        assert_eq!(p.call_level(), GLOBAL_CALL_LEVEL);
        assert_eq!(p.context(), RootContext::Global);
    }

    #[test]
    fn test_display() {
        let p = AccessPath::variable(VariableIdentifier::direct("x"), 0)
            .with_field(MemberIdentifier::direct("f"))
            .with_index(MemberIdentifier::uncertain(["a", "b"]));
        assert_eq!(p.to_string(), "$x->f[{a|b}]");

        let q = AccessPath::variable(VariableIdentifier::any(), 2);
        assert_eq!(q.to_string(), "2::$?");
    }

    #[test]
    fn test_extension_does_not_mutate() {
        let base = AccessPath::variable(VariableIdentifier::direct("x"), 0);
        let extended = base.with_index(MemberIdentifier::direct("k"));
        assert_eq!(base.segments().len(), 1);
        assert_eq!(extended.segments().len(), 2);
    }
}
