use thiserror::Error;

macro_rules! invariant_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Invariant {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Invariant {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Every variant here signals an *internal invariant violation* or a misuse of the
/// transaction protocol. Precision losses (resolution to a summary index, depth caps,
/// widening) are deliberately **not** errors — they are counted in
/// [`Statistics`](crate::Statistics) and logged, because they are the abstraction doing
/// its job. The analysis driver is expected to catch an `Error`, record a diagnostic
/// against the offending program point and continue with other points where possible.
///
/// # Error Categories
///
/// ## Transaction Protocol
/// - [`Error::NoTransaction`] - Mutation attempted outside a begin/commit bracket
/// - [`Error::TransactionActive`] - `start_transaction` called twice
///
/// ## Internal Invariants
/// - [`Error::Invariant`] - A structural invariant of the memory model was broken
/// - [`Error::CallLevelMismatch`] - Snapshots of different call depths were merged
/// - [`Error::NoMergeInputs`] - A merge was requested with an empty input set
///
/// # Examples
///
/// ```rust
/// use phpscope::{Error, MemoryModel};
///
/// let model = MemoryModel::builder().build();
/// let mut snapshot = model.create_snapshot();
///
/// // Committing without an open transaction is a protocol violation.
/// match snapshot.commit_transaction() {
///     Err(Error::NoTransaction) => {}
///     other => panic!("expected NoTransaction, got {:?}", other),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// A mutating operation was attempted outside a transaction bracket.
    ///
    /// Snapshots may only be mutated between `start_transaction` and
    /// `commit_transaction` / `widen_and_commit_transaction`.
    #[error("No transaction is open on this snapshot")]
    NoTransaction,

    /// `start_transaction` was called while a transaction was already open.
    #[error("A transaction is already open on this snapshot")]
    TransactionActive,

    /// An internal invariant of the memory model was violated.
    ///
    /// This indicates a defect, such as writing through a destroyed structural
    /// descriptor or a descriptor key with no reachable child index. The error
    /// records the source location where the violation was detected.
    ///
    /// # Fields
    ///
    /// * `message` - Description of the broken invariant
    /// * `file` - Source file where the violation was detected
    /// * `line` - Source line where the violation was detected
    #[error("Invariant violation - {file}:{line}: {message}")]
    Invariant {
        /// Description of the broken invariant
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// Snapshots with different call levels were passed to a plain merge.
    ///
    /// Joining program points always happens within one call context; only
    /// `merge_with_call` is allowed to cross call boundaries.
    #[error("Call level mismatch on merge - expected {expected}, found {found}")]
    CallLevelMismatch {
        /// Call level of the first input
        expected: u32,
        /// Call level of the offending input
        found: u32,
    },

    /// A merge was requested with no input snapshots.
    #[error("Cannot merge an empty set of snapshots")]
    NoMergeInputs,
}
