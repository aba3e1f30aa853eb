//! The copy family's merge strategy.
//!
//! Merging combines the states of several control-flow predecessors into the
//! state of their join point:
//!
//! - **Data** entries are unioned per location, over the sources that define
//!   the location. A source that never tracked a location contributes
//!   nothing; possible undefinedness is already explicit as an `Undefined`
//!   member where it matters.
//! - **Structure** is unioned: descriptor keys, fields, types and the set of
//!   array instances per location all accumulate.
//! - **Aliases** can only get weaker: must-aliases survive only when present
//!   in *every* source, everything else degrades to may-aliases.
//!
//! All inputs must share one call level; crossing a call boundary goes
//! through [`merge_with_call`](crate::algorithms::MergeAlgorithm::merge_with_call),
//! which folds callee exit states back into the caller.

use imbl::HashSet as ImHashSet;

use crate::{
    algorithms::MergeAlgorithm,
    memory::index::MemoryIndex,
    snapshot::{
        data::DataContainer,
        structure::{AliasRecord, StructureContainer},
        SnapshotState, RETURN_VARIABLE,
    },
    Error, Result, Statistics,
};

/// Disjunctive-union merge for the copy family.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyMergeAlgorithm;

impl MergeAlgorithm for CopyMergeAlgorithm {
    fn merge(&self, sources: &[&SnapshotState]) -> Result<SnapshotState> {
        let first = *sources.first().ok_or(Error::NoMergeInputs)?;
        for source in &sources[1..] {
            if source.call_level != first.call_level {
                return Err(Error::CallLevelMismatch {
                    expected: first.call_level,
                    found: source.call_level,
                });
            }
        }

        let stats = Statistics::new();
        for source in sources {
            stats.absorb(&source.stats);
        }
        stats.record_merge();

        Ok(SnapshotState {
            call_level: first.call_level,
            mode: first.mode,
            structure: merge_structure(sources),
            data: merge_data(sources, |s| &s.data),
            info: merge_data(sources, |s| &s.info),
            handles: first.handles.clone(),
            stats,
        })
    }

    fn merge_with_call(
        &self,
        caller: &SnapshotState,
        outputs: &[&SnapshotState],
    ) -> Result<SnapshotState> {
        let callee_level = caller.call_level + 1;
        for output in outputs {
            if output.call_level != callee_level {
                return Err(Error::CallLevelMismatch {
                    expected: callee_level,
                    found: output.call_level,
                });
            }
        }
        let merged = self.merge(outputs)?;

        let mut result = caller.clone();
        result.stats = merged.stats;

        // Everything rooted at or below the caller's level (globals, heap
        // fields, caller-visible arrays) reflects the callee's view after the
        // call returns.
        for (index, entry) in merged.data.iter() {
            if index.root_call_level() <= caller.call_level {
                result.data.set(index.clone(), entry.clone());
            }
        }
        for (index, entry) in merged.info.iter() {
            if index.root_call_level() <= caller.call_level {
                result.info.set(index.clone(), entry.clone());
            }
        }
        for (index, record) in merged.structure.indexes() {
            if index.root_call_level() <= caller.call_level {
                result.structure.ensure_index(index.clone());
                for handle in record.arrays() {
                    result.structure.add_array_at(index.clone(), *handle);
                }
                result
                    .structure
                    .set_aliases(index.clone(), record.aliases().cloned().unwrap_or_default());
            }
        }
        // Handles are unique per run, so the callee's descriptors are simply
        // the newer versions of whatever the caller already knew.
        for (_, descriptor) in merged.structure.array_descriptors() {
            result.structure.insert_array(descriptor.clone());
        }
        for (_, descriptor) in merged.structure.object_descriptors() {
            result.structure.insert_object(descriptor.clone());
        }

        // The callee's return slot becomes the caller's.
        let callee_return = MemoryIndex::control(RETURN_VARIABLE, callee_level);
        if let Some(entry) = merged.data.get(&callee_return) {
            let caller_return = MemoryIndex::control(RETURN_VARIABLE, caller.call_level);
            result.structure.ensure_index(caller_return.clone());
            result.data.set(caller_return, entry.clone());
        }

        Ok(result)
    }
}

fn merge_data<'a, F>(sources: &'a [&SnapshotState], select: F) -> DataContainer
where
    F: Fn(&'a SnapshotState) -> &'a DataContainer,
{
    let mut result = DataContainer::new();
    for source in sources {
        for (index, entry) in select(source).iter() {
            let merged = match result.get(index) {
                Some(existing) => existing.union(entry),
                None => entry.clone(),
            };
            result.set(index.clone(), merged);
        }
    }
    result
}

fn merge_structure(sources: &[&SnapshotState]) -> StructureContainer {
    let mut result = StructureContainer::new();

    for source in sources {
        for (handle, descriptor) in source.structure.array_descriptors() {
            if result.array(*handle).is_none() {
                result.insert_array(descriptor.clone());
            } else {
                result.update_array(*handle, |merged| {
                    for (key, child) in descriptor.keys() {
                        if merged.key(key).is_none() {
                            merged.add_key(key.clone(), child.clone());
                        }
                    }
                });
            }
        }
        for (handle, descriptor) in source.structure.object_descriptors() {
            if result.object(*handle).is_none() {
                result.insert_object(descriptor.clone());
            } else {
                result.update_object(*handle, |merged| {
                    for (name, child) in descriptor.fields() {
                        if merged.field(name).is_none() {
                            merged.add_field(name.clone(), child.clone());
                        }
                    }
                    for name in descriptor.types() {
                        merged.add_type(name.clone());
                    }
                });
            }
        }
        for (index, record) in source.structure.indexes() {
            result.ensure_index(index.clone());
            for handle in record.arrays() {
                result.add_array_at(index.clone(), *handle);
            }
        }
    }

    merge_aliases(sources, &mut result);
    result
}

/// Merges alias records: must survives only unanimously, the rest is may.
fn merge_aliases(sources: &[&SnapshotState], result: &mut StructureContainer) {
    let mut aliased: Vec<MemoryIndex> = Vec::new();
    for source in sources {
        for (index, record) in source.structure.indexes() {
            if record.aliases().is_some() && !aliased.contains(index) {
                aliased.push(index.clone());
            }
        }
    }

    for index in aliased {
        let mut must: Option<ImHashSet<MemoryIndex>> = None;
        let mut seen: ImHashSet<MemoryIndex> = ImHashSet::new();

        for source in sources {
            let record = source.structure.aliases(&index);
            let source_must: ImHashSet<MemoryIndex> = record
                .map(|r| r.must().cloned().collect())
                .unwrap_or_default();
            if let Some(record) = record {
                for peer in record.may().chain(record.must()) {
                    seen.insert(peer.clone());
                }
            }
            must = Some(match must {
                Some(acc) => acc.intersection(source_must),
                None => source_must,
            });
        }

        let must = must.unwrap_or_default();
        let mut merged = AliasRecord::new();
        for peer in must.iter() {
            merged.add_must(peer.clone());
        }
        for peer in seen.iter() {
            if !must.contains(peer) && *peer != index {
                merged.add_may(peer.clone());
            }
        }
        result.set_aliases(index, merged);
    }
}
