//! Operation counters for snapshots.
//!
//! Every snapshot carries a [`Statistics`] record counting the operations
//! performed on it and, more importantly, the *precision losses* it absorbed.
//! Precision losses (summary-index fallbacks, depth caps, simplification and
//! widening) are not errors; counting them lets the analysis driver report
//! where the abstraction became coarse.
//!
//! Counters live in [`Cell`]s: reads never mutate a snapshot, but they still
//! degrade to summary slots and must be able to record that through the
//! shared references the read path works with.

use std::cell::Cell;

/// Counters for memory model operations and precision losses.
///
/// Cheap to clone; snapshots propagate the counters of the snapshot they were
/// derived from, so the numbers are cumulative along an analysis path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Statistics {
    assigns: Cell<u64>,
    alias_assigns: Cell<u64>,
    merges: Cell<u64>,
    commits: Cell<u64>,
    simplifications: Cell<u64>,
    widenings: Cell<u64>,
    precision_losses: Cell<u64>,
}

impl Statistics {
    /// Creates a zeroed counter record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of assignments executed.
    #[must_use]
    pub fn assigns(&self) -> u64 {
        self.assigns.get()
    }

    /// Number of alias assignments executed.
    #[must_use]
    pub fn alias_assigns(&self) -> u64 {
        self.alias_assigns.get()
    }

    /// Number of merge operations this snapshot resulted from.
    #[must_use]
    pub fn merges(&self) -> u64 {
        self.merges.get()
    }

    /// Number of committed transactions.
    #[must_use]
    pub fn commits(&self) -> u64 {
        self.commits.get()
    }

    /// Entries collapsed by the assistant because they exceeded the simplify
    /// limit.
    #[must_use]
    pub fn simplifications(&self) -> u64 {
        self.simplifications.get()
    }

    /// Entries widened during a widening commit.
    #[must_use]
    pub fn widenings(&self) -> u64 {
        self.widenings.get()
    }

    /// Resolutions that degraded to a summary index or hit the depth cap.
    #[must_use]
    pub fn precision_losses(&self) -> u64 {
        self.precision_losses.get()
    }

    pub(crate) fn record_assign(&self) {
        bump(&self.assigns);
    }

    pub(crate) fn record_alias_assign(&self) {
        bump(&self.alias_assigns);
    }

    pub(crate) fn record_merge(&self) {
        bump(&self.merges);
    }

    pub(crate) fn record_commit(&self) {
        bump(&self.commits);
    }

    pub(crate) fn record_simplification(&self) {
        bump(&self.simplifications);
    }

    pub(crate) fn record_widening(&self) {
        bump(&self.widenings);
    }

    pub(crate) fn record_precision_loss(&self) {
        bump(&self.precision_losses);
    }

    /// Accumulates the counters of `other` into `self`.
    ///
    /// Used when a snapshot is produced from several inputs, so the result
    /// reflects the work done on every incoming path.
    pub fn absorb(&self, other: &Statistics) {
        self.assigns.set(self.assigns.get() + other.assigns());
        self.alias_assigns
            .set(self.alias_assigns.get() + other.alias_assigns());
        self.merges.set(self.merges.get() + other.merges());
        self.commits.set(self.commits.get() + other.commits());
        self.simplifications
            .set(self.simplifications.get() + other.simplifications());
        self.widenings.set(self.widenings.get() + other.widenings());
        self.precision_losses
            .set(self.precision_losses.get() + other.precision_losses());
    }
}

fn bump(counter: &Cell<u64>) {
    counter.set(counter.get() + 1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absorb_accumulates() {
        let a = Statistics::new();
        a.record_assign();
        a.record_assign();
        a.record_precision_loss();

        let b = Statistics::new();
        for _ in 0..3 {
            b.record_assign();
        }
        for _ in 0..4 {
            b.record_widening();
        }

        a.absorb(&b);
        assert_eq!(a.assigns(), 5);
        assert_eq!(a.widenings(), 4);
        assert_eq!(a.precision_losses(), 1);
    }

    #[test]
    fn test_recording_through_shared_reference() {
        let stats = Statistics::new();
        let shared: &Statistics = &stats;
        shared.record_precision_loss();
        assert_eq!(stats.precision_losses(), 1);
    }
}
