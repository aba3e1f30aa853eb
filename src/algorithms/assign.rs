//! The copy family's assignment strategy.
//!
//! Implements PHP value semantics: a plain assignment stores a *copy* of the
//! assigned value, so arrays reachable from the source entry are deep-copied
//! into fresh instances anchored at the target location. By-reference
//! assignment (`$a =& $b`) instead shares the stored containers and links the
//! two locations' alias records.
//!
//! Update strength follows the collector's resolution: an unambiguously
//! resolved location is overwritten (strong update, destroying the structure
//! of the replaced value), an ambiguous one only accumulates the new values
//! (weak update). Strong writes additionally propagate to must-alias peers,
//! weak writes to may-alias peers, at the final targets as well as at every
//! holder the collector traverses through.

use std::sync::Arc;

use crate::{
    algorithms::{
        collect::{collect_assign, collect_read, ResolvedLocation, MAX_PATH_DEPTH},
        AssignAlgorithm,
    },
    assistant::MemoryAssistant,
    memory::{entry::MemoryEntry, index::MemoryIndex, path::AccessPath, value::Value},
    snapshot::{structure::ArrayDescriptor, SnapshotMode, SnapshotState},
    ArrayHandle, Result,
};

/// Assignment with PHP value semantics and deep array copies.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyAssignAlgorithm;

impl AssignAlgorithm for CopyAssignAlgorithm {
    fn assign(
        &self,
        state: &mut SnapshotState,
        assistant: &dyn MemoryAssistant,
        path: &AccessPath,
        entry: &MemoryEntry,
        force_strong: bool,
    ) -> Result<()> {
        state.stats.record_assign();

        // The info level never grows structure; it annotates the locations
        // the memory level already has.
        if state.mode == SnapshotMode::Info {
            let resolution = collect_read(state, assistant, path)?;
            for loc in resolution.locations {
                if force_strong || loc.is_must {
                    state.info.set(loc.index, entry.clone());
                } else {
                    state.info.union_into(loc.index, entry);
                }
            }
            return Ok(());
        }

        let resolved = collect_assign(state, assistant, path)?;
        let targets = expand_aliases(state, resolved);
        for target in targets {
            let strong = force_strong || target.is_must;
            write_at(state, &target.index, entry, strong)?;
        }
        Ok(())
    }

    fn assign_alias(
        &self,
        state: &mut SnapshotState,
        assistant: &dyn MemoryAssistant,
        target: &AccessPath,
        source: &AccessPath,
    ) -> Result<()> {
        state.stats.record_alias_assign();

        if state.mode == SnapshotMode::Info {
            log::warn!("alias assignment ignored in info mode: {target} =& {source}");
            return Ok(());
        }

        // Both sides materialize: `$a =& $b['k']` vivifies $b['k'].
        let source_locs = collect_assign(state, assistant, source)?;
        let target_locs = collect_assign(state, assistant, target)?;

        // The shared value: union over every possible source location.
        let mut shared = MemoryEntry::empty();
        for loc in &source_locs {
            shared = shared.union(&state.memory_entry(&loc.index));
        }
        if shared.is_empty() {
            shared = MemoryEntry::undefined();
        }

        // Aliased locations share containers instead of copying them.
        for loc in &target_locs {
            share_at(state, &loc.index, &shared, loc.is_must);
        }

        // Must-aliasing only when both endpoints are a single definite
        // location; anything weaker degrades to may-aliasing.
        let definite = target_locs.len() == 1
            && source_locs.len() == 1
            && target_locs[0].is_must
            && source_locs[0].is_must;

        if definite {
            link_must(state, &target_locs[0].index, &source_locs[0].index);
        } else {
            for t in &target_locs {
                for s in &source_locs {
                    if t.index == s.index {
                        continue;
                    }
                    state
                        .structure
                        .update_aliases(&t.index, |r| r.add_may(s.index.clone()));
                    state
                        .structure
                        .update_aliases(&s.index, |r| r.add_may(t.index.clone()));
                }
            }
        }
        Ok(())
    }
}

/// Expands resolved targets through their alias records.
///
/// Must peers inherit the target's strength, may peers always receive a weak
/// update.
fn expand_aliases(
    state: &SnapshotState,
    targets: Vec<ResolvedLocation>,
) -> Vec<ResolvedLocation> {
    let mut expanded = Vec::with_capacity(targets.len());
    for target in targets {
        if let Some(record) = state.structure.aliases(&target.index) {
            for peer in record.must() {
                expanded.push(ResolvedLocation {
                    index: peer.clone(),
                    is_must: target.is_must,
                });
            }
            for peer in record.may() {
                expanded.push(ResolvedLocation {
                    index: peer.clone(),
                    is_must: false,
                });
            }
        }
        expanded.push(target);
    }
    // Keep the strongest certainty when a location shows up twice.
    let mut result: Vec<ResolvedLocation> = Vec::with_capacity(expanded.len());
    for loc in expanded {
        match result.iter_mut().find(|r| r.index == loc.index) {
            Some(existing) => existing.is_must |= loc.is_must,
            None => result.push(loc),
        }
    }
    result
}

/// Writes a copy of `entry` at `index`.
fn write_at(
    state: &mut SnapshotState,
    index: &MemoryIndex,
    entry: &MemoryEntry,
    strong: bool,
) -> Result<()> {
    let prepared = copy_entry_into(state, entry, index, index.depth())?;

    state.structure.ensure_index(index.clone());
    if strong {
        // A strong update destroys the structure of the replaced value.
        clear_replaced_arrays(state, index, &prepared);
        state.data.set(index.clone(), prepared);
    } else {
        state.data.union_into(index.clone(), &prepared);
    }
    Ok(())
}

/// Writes `entry` at `index` without copying containers (reference sharing).
fn share_at(state: &mut SnapshotState, index: &MemoryIndex, entry: &MemoryEntry, strong: bool) {
    state.structure.ensure_index(index.clone());
    if strong {
        clear_replaced_arrays(state, index, entry);
    }
    for value in entry.iter() {
        if let Value::Array(handle) = value {
            state.structure.add_array_at(index.clone(), *handle);
        }
    }
    if strong {
        state.data.set(index.clone(), entry.clone());
    } else {
        state.data.union_into(index.clone(), entry);
    }
}

/// Unregisters arrays stored at `index` that `replacement` no longer holds,
/// tearing down the instances anchored there.
fn clear_replaced_arrays(state: &mut SnapshotState, index: &MemoryIndex, replacement: &MemoryEntry) {
    for handle in state.structure.arrays_at(index) {
        if !replacement.contains(&Value::Array(handle)) {
            state.structure.remove_array_at(index, handle);
            let anchored_here = state
                .structure
                .array(handle)
                .is_some_and(|d| d.parent() == Some(index));
            if anchored_here {
                destroy_array(state, handle);
            }
        }
    }
}

/// Joins two locations (and their existing must groups) into one must-alias
/// group. Alias groups are kept transitively closed.
fn link_must(state: &mut SnapshotState, a: &MemoryIndex, b: &MemoryIndex) {
    let mut group = vec![a.clone(), b.clone()];
    for seed in [a, b] {
        if let Some(record) = state.structure.aliases(seed) {
            for peer in record.must() {
                if !group.contains(peer) {
                    group.push(peer.clone());
                }
            }
        }
    }
    for member in &group {
        let peers: Vec<MemoryIndex> = group.iter().filter(|p| *p != member).cloned().collect();
        state.structure.update_aliases(member, |record| {
            for peer in peers {
                record.add_must(peer);
            }
        });
    }
}

/// Returns `entry` with every array value replaced by a copy anchored under
/// `target`, registering the copies in the structure container.
///
/// Detached arrays (fresh from a value factory) are anchored in place rather
/// than copied; an array already anchored at `target` is a self-assignment
/// and kept as is.
pub(crate) fn copy_entry_into(
    state: &mut SnapshotState,
    entry: &MemoryEntry,
    target: &MemoryIndex,
    depth: usize,
) -> Result<MemoryEntry> {
    if depth > MAX_PATH_DEPTH {
        log::warn!("array copy depth cap hit at {target}");
        state.stats.record_precision_loss();
        return Ok(entry
            .iter()
            .map(|v| match v {
                Value::Array(_) => Value::AnyArray,
                other => other.clone(),
            })
            .collect());
    }

    let mut values = Vec::with_capacity(entry.len());
    for value in entry.iter() {
        match value {
            Value::Array(handle) => {
                let descriptor = state
                    .structure
                    .array(*handle)
                    .cloned()
                    .ok_or_else(|| invariant_error!("unregistered array {} assigned", handle))?;
                match descriptor.parent() {
                    None => {
                        state
                            .structure
                            .update_array(*handle, |d| d.anchor(target.clone()));
                        state.structure.add_array_at(target.clone(), *handle);
                        values.push(Value::Array(*handle));
                    }
                    Some(parent) if parent == target => {
                        state.structure.add_array_at(target.clone(), *handle);
                        values.push(Value::Array(*handle));
                    }
                    Some(_) => {
                        let copy = copy_array(state, &descriptor, target, depth)?;
                        values.push(Value::Array(copy));
                    }
                }
            }
            other => values.push(other.clone()),
        }
    }
    Ok(MemoryEntry::from_values(values))
}

/// Deep-copies the array behind `descriptor` into a fresh instance anchored
/// at `target`.
fn copy_array(
    state: &mut SnapshotState,
    descriptor: &ArrayDescriptor,
    target: &MemoryIndex,
    depth: usize,
) -> Result<ArrayHandle> {
    let copy = state.handles.next_array();
    state
        .structure
        .insert_array(ArrayDescriptor::anchored(copy, target.clone()));
    state.structure.add_array_at(target.clone(), copy);

    for (key, source_child) in descriptor.keys() {
        let target_child = target.index_child(key);
        let source_entry = state.memory_entry(source_child);
        let copied = copy_entry_into(state, &source_entry, &target_child, depth + 1)?;

        let key: Arc<str> = key.clone();
        state
            .structure
            .update_array(copy, |d| d.add_key(key, target_child.clone()));
        state.structure.ensure_index(target_child.clone());
        state.data.set(target_child, copied);
    }

    if let Some(source_any) = descriptor.any_index() {
        if let Some(entry) = state.data.get(source_any).cloned() {
            let target_any = target.any_index_child();
            let copied = copy_entry_into(state, &entry, &target_any, depth + 1)?;
            state.structure.ensure_index(target_any.clone());
            state.data.set(target_any, copied);
        }
    }

    Ok(copy)
}

/// Tears down an array instance: descriptor, child locations and everything
/// anchored below them.
fn destroy_array(state: &mut SnapshotState, handle: ArrayHandle) {
    if let Some(descriptor) = state.structure.remove_array(handle) {
        for (_, child) in descriptor.keys() {
            destroy_location(state, child);
        }
        if let Some(any) = descriptor.any_index() {
            destroy_location(state, any);
        }
    }
}

/// Drops the data and structural record of `index`, recursing into arrays
/// anchored at it.
fn destroy_location(state: &mut SnapshotState, index: &MemoryIndex) {
    if let Some(entry) = state.data.remove(index) {
        for value in entry.iter() {
            if let Value::Array(handle) = value {
                let anchored_here = state
                    .structure
                    .array(*handle)
                    .is_some_and(|d| d.parent() == Some(index));
                if anchored_here {
                    destroy_array(state, *handle);
                }
            }
        }
    }
    state.info.remove(index);
    state.structure.remove_index(index);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assistant::IntervalAssistant,
        memory::path::{MemberIdentifier, VariableIdentifier},
        HandleSource,
    };
    use std::sync::Arc as StdArc;

    fn fresh_state() -> SnapshotState {
        SnapshotState::new(StdArc::new(HandleSource::new()))
    }

    fn var(name: &str) -> AccessPath {
        AccessPath::variable(VariableIdentifier::direct(name), 0)
    }

    #[test]
    fn test_strong_write_replaces() {
        let mut state = fresh_state();
        let assistant = IntervalAssistant::new();
        let algorithm = CopyAssignAlgorithm;

        algorithm
            .assign(&mut state, &assistant, &var("x"), &MemoryEntry::from_value(Value::Int(1)), false)
            .unwrap();
        algorithm
            .assign(&mut state, &assistant, &var("x"), &MemoryEntry::from_value(Value::Int(2)), false)
            .unwrap();

        let entry = state.memory_entry(&MemoryIndex::variable("x", 0));
        assert_eq!(entry, MemoryEntry::from_value(Value::Int(2)));
    }

    #[test]
    fn test_weak_write_accumulates() {
        let mut state = fresh_state();
        let assistant = IntervalAssistant::new();
        let algorithm = CopyAssignAlgorithm;

        let uncertain = AccessPath::variable(VariableIdentifier::uncertain(["a", "b"]), 0);
        algorithm
            .assign(&mut state, &assistant, &uncertain, &MemoryEntry::from_value(Value::Int(1)), false)
            .unwrap();

        // Each candidate keeps its possible undefinedness
        let entry = state.memory_entry(&MemoryIndex::variable("a", 0));
        assert!(entry.contains(&Value::Int(1)));
        assert!(entry.contains(&Value::Undefined));
    }

    #[test]
    fn test_assignment_copies_arrays() {
        let mut state = fresh_state();
        let assistant = IntervalAssistant::new();
        let algorithm = CopyAssignAlgorithm;

        // $a['k'] = 1; $b = $a; $b['k'] = 2  must leave $a['k'] == 1
        let a_k = var("a").with_index(MemberIdentifier::direct("k"));
        algorithm
            .assign(&mut state, &assistant, &a_k, &MemoryEntry::from_value(Value::Int(1)), false)
            .unwrap();

        let a_value = state.memory_entry(&MemoryIndex::variable("a", 0));
        algorithm
            .assign(&mut state, &assistant, &var("b"), &a_value, false)
            .unwrap();

        let b_k = var("b").with_index(MemberIdentifier::direct("k"));
        algorithm
            .assign(&mut state, &assistant, &b_k, &MemoryEntry::from_value(Value::Int(2)), false)
            .unwrap();

        let a_child = state.memory_entry(&MemoryIndex::variable("a", 0).index_child("k"));
        let b_child = state.memory_entry(&MemoryIndex::variable("b", 0).index_child("k"));
        assert_eq!(a_child, MemoryEntry::from_value(Value::Int(1)));
        assert_eq!(b_child, MemoryEntry::from_value(Value::Int(2)));
    }

    #[test]
    fn test_alias_assignment_shares() {
        let mut state = fresh_state();
        let assistant = IntervalAssistant::new();
        let algorithm = CopyAssignAlgorithm;

        algorithm
            .assign(&mut state, &assistant, &var("x"), &MemoryEntry::from_value(Value::Int(1)), false)
            .unwrap();
        algorithm
            .assign_alias(&mut state, &assistant, &var("y"), &var("x"))
            .unwrap();

        // $y sees the value, and writing $y reaches $x
        let y = MemoryIndex::variable("y", 0);
        let x = MemoryIndex::variable("x", 0);
        assert_eq!(state.memory_entry(&y), MemoryEntry::from_value(Value::Int(1)));
        assert!(state.structure.aliases(&y).unwrap().is_must(&x));
        assert!(state.structure.aliases(&x).unwrap().is_must(&y));

        algorithm
            .assign(&mut state, &assistant, &var("y"), &MemoryEntry::from_value(Value::Int(2)), false)
            .unwrap();
        assert_eq!(state.memory_entry(&x), MemoryEntry::from_value(Value::Int(2)));
    }

    #[test]
    fn test_alias_write_into_fresh_array_reaches_peer() {
        let mut state = fresh_state();
        let assistant = IntervalAssistant::new();
        let algorithm = CopyAssignAlgorithm;

        // $y =& $x; $y = array(); $y['k'] = 2  must be readable as $x['k']
        algorithm
            .assign_alias(&mut state, &assistant, &var("y"), &var("x"))
            .unwrap();

        let handle = state.handles.next_array();
        state.structure.insert_array(ArrayDescriptor::detached(handle));
        algorithm
            .assign(
                &mut state,
                &assistant,
                &var("y"),
                &MemoryEntry::from_value(Value::Array(handle)),
                false,
            )
            .unwrap();

        let y_k = var("y").with_index(MemberIdentifier::direct("k"));
        algorithm
            .assign(&mut state, &assistant, &y_k, &MemoryEntry::from_value(Value::Int(2)), false)
            .unwrap();

        let x_k = state.memory_entry(&MemoryIndex::variable("x", 0).index_child("k"));
        assert_eq!(x_k, MemoryEntry::from_value(Value::Int(2)));
    }

    #[test]
    fn test_alias_assignment_tears_down_replaced_array() {
        let mut state = fresh_state();
        let assistant = IntervalAssistant::new();
        let algorithm = CopyAssignAlgorithm;

        // $x['k'] = 1; $y = 2; $x =& $y  drops $x's old array wholesale
        let x_k = var("x").with_index(MemberIdentifier::direct("k"));
        algorithm
            .assign(&mut state, &assistant, &x_k, &MemoryEntry::from_value(Value::Int(1)), false)
            .unwrap();
        algorithm
            .assign(&mut state, &assistant, &var("y"), &MemoryEntry::from_value(Value::Int(2)), false)
            .unwrap();

        let x = MemoryIndex::variable("x", 0);
        let handle = state.structure.arrays_at(&x)[0];

        algorithm
            .assign_alias(&mut state, &assistant, &var("x"), &var("y"))
            .unwrap();

        assert!(state.structure.array(handle).is_none());
        assert!(state.data.get(&x.index_child("k")).is_none());
        assert!(state.structure.arrays_at(&x).is_empty());
        assert_eq!(state.memory_entry(&x), MemoryEntry::from_value(Value::Int(2)));
    }

    #[test]
    fn test_must_alias_group_is_closed() {
        let mut state = fresh_state();
        let assistant = IntervalAssistant::new();
        let algorithm = CopyAssignAlgorithm;

        algorithm
            .assign_alias(&mut state, &assistant, &var("b"), &var("a"))
            .unwrap();
        algorithm
            .assign_alias(&mut state, &assistant, &var("c"), &var("b"))
            .unwrap();

        let a = MemoryIndex::variable("a", 0);
        let c = MemoryIndex::variable("c", 0);
        assert!(state.structure.aliases(&a).unwrap().is_must(&c));
        assert!(state.structure.aliases(&c).unwrap().is_must(&a));
    }

    #[test]
    fn test_strong_write_destroys_replaced_array() {
        let mut state = fresh_state();
        let assistant = IntervalAssistant::new();
        let algorithm = CopyAssignAlgorithm;

        let x_k = var("x").with_index(MemberIdentifier::direct("k"));
        algorithm
            .assign(&mut state, &assistant, &x_k, &MemoryEntry::from_value(Value::Int(1)), false)
            .unwrap();

        let x = MemoryIndex::variable("x", 0);
        let handle = state.structure.arrays_at(&x)[0];

        algorithm
            .assign(&mut state, &assistant, &var("x"), &MemoryEntry::from_value(Value::Int(7)), false)
            .unwrap();

        assert!(state.structure.array(handle).is_none());
        assert!(state.data.get(&x.index_child("k")).is_none());
        assert!(state.structure.arrays_at(&x).is_empty());
    }

    #[test]
    fn test_info_mode_writes_only_info_level() {
        let mut state = fresh_state();
        let assistant = IntervalAssistant::new();
        let algorithm = CopyAssignAlgorithm;

        // Materialize $x at the memory level first
        algorithm
            .assign(&mut state, &assistant, &var("x"), &MemoryEntry::from_value(Value::Int(1)), false)
            .unwrap();

        state.mode = SnapshotMode::Info;
        let note = MemoryEntry::from_value(Value::string("tainted"));
        algorithm
            .assign(&mut state, &assistant, &var("x"), &note, false)
            .unwrap();

        let x = MemoryIndex::variable("x", 0);
        assert_eq!(state.memory_entry(&x), MemoryEntry::from_value(Value::Int(1)));
        assert_eq!(state.info.get(&x), Some(&note));
    }
}
