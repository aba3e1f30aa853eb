//! The copy family's commit strategy.
//!
//! Committing a transaction does three things, in order:
//!
//! 1. **Simplification** - every entry whose value set outgrew the configured
//!    limit is collapsed by the assistant, bounding per-location work.
//! 2. **Widening** (widening commits only) - entries that changed since the
//!    transaction started are extrapolated by the assistant's widening
//!    operator, forcing loop fixpoints to terminate.
//! 3. **Change detection** - the containers are compared against the state
//!    saved at transaction start. Thanks to the persistent maps this
//!    comparison short-circuits over shared structure.
//!
//! The returned flag is the analysis driver's sole fixpoint signal: `false`
//! means the program point stabilized.

use crate::{
    algorithms::CommitAlgorithm,
    assistant::MemoryAssistant,
    memory::{entry::MemoryEntry, index::MemoryIndex},
    snapshot::{SavedState, SnapshotState},
    Result,
};

/// Simplify-widen-compare commit for the copy family.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyCommitAlgorithm;

impl CommitAlgorithm for CopyCommitAlgorithm {
    fn commit(
        &self,
        state: &mut SnapshotState,
        saved: &SavedState,
        assistant: &dyn MemoryAssistant,
        simplify_limit: usize,
        widen: bool,
    ) -> Result<bool> {
        let oversized: Vec<(MemoryIndex, MemoryEntry)> = state
            .data
            .iter()
            .filter(|(_, entry)| entry.len() > simplify_limit)
            .map(|(index, entry)| (index.clone(), entry.clone()))
            .collect();
        for (index, entry) in oversized {
            let simplified = assistant.simplify(&entry);
            log::debug!(
                "simplified {index}: {} values down to {}",
                entry.len(),
                simplified.len()
            );
            state.stats.record_simplification();
            state.data.set(index, simplified);
        }

        if widen {
            let changed: Vec<(MemoryIndex, MemoryEntry, MemoryEntry)> = state
                .data
                .iter()
                .filter_map(|(index, new)| {
                    saved
                        .data
                        .get(index)
                        .filter(|old| *old != new)
                        .map(|old| (index.clone(), old.clone(), new.clone()))
                })
                .collect();
            for (index, old, new) in changed {
                let widened = assistant.widen(&old, &new);
                if widened != new {
                    log::debug!("widened {index} to {widened}");
                    state.stats.record_widening();
                    state.data.set(index, widened);
                }
            }
        }

        state.stats.record_commit();
        let changed = state.structure != saved.structure
            || state.data != saved.data
            || state.info != saved.info;
        Ok(changed)
    }
}
