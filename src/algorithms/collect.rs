//! Path collectors: resolving symbolic paths to sets of memory locations.
//!
//! A collector walks an [`AccessPath`] segment by segment against a snapshot
//! state, tracking at every step the set of locations the path may denote and
//! whether each of them is denoted on *every* execution path (must) or only on
//! some (may). The must/may distinction is what later decides between strong
//! and weak updates.
//!
//! Two collectors exist:
//!
//! - [`collect_read`] never mutates the snapshot. Unknown names degrade to
//!   summary slots, and traversal into non-container values is answered by
//!   the assistant's virtual-member policy.
//! - [`collect_assign`] materializes the path: missing containers are
//!   auto-vivified and missing child locations created, mirroring PHP's
//!   behavior on the left side of an assignment.
//!
//! Resolution depth is capped at [`MAX_PATH_DEPTH`]; paths that run past the
//! cap (degenerate deeply nested structure) degrade to the holder's summary
//! element, counted as a precision loss, instead of diverging or dropping the
//! access.

use crate::{
    assistant::MemoryAssistant,
    memory::{
        index::MemoryIndex,
        path::{AccessPath, MemberIdentifier, PathSegment},
        value::Value,
    },
    snapshot::SnapshotState,
    Result,
};

/// Maximum nesting depth a collector resolves through.
pub const MAX_PATH_DEPTH: usize = 64;

/// One location a path resolved to, with its update strength.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLocation {
    /// The resolved memory location.
    pub index: MemoryIndex,
    /// `true` if the path denotes this location on every execution path.
    pub is_must: bool,
}

impl ResolvedLocation {
    fn must(index: MemoryIndex) -> Self {
        ResolvedLocation {
            index,
            is_must: true,
        }
    }

    fn may(index: MemoryIndex) -> Self {
        ResolvedLocation {
            index,
            is_must: false,
        }
    }
}

/// The outcome of a read-side resolution.
#[derive(Debug, Default)]
pub struct ReadResolution {
    /// The locations the path resolves to.
    pub locations: Vec<ResolvedLocation>,
    /// Values produced by traversing *into* non-container values (e.g.
    /// indexing a string), as decided by the assistant.
    pub virtual_values: Vec<Value>,
}

/// Merges duplicate locations, keeping the stronger certainty.
fn dedup(locations: Vec<ResolvedLocation>) -> Vec<ResolvedLocation> {
    let mut result: Vec<ResolvedLocation> = Vec::with_capacity(locations.len());
    for loc in locations {
        match result.iter_mut().find(|r| r.index == loc.index) {
            Some(existing) => existing.is_must |= loc.is_must,
            None => result.push(loc),
        }
    }
    result
}

/// Expands a location set through the alias records of its members.
///
/// Must peers inherit the member's certainty, may peers join weakly. The
/// assign collector expands the holder set at every traversal step, so a
/// write through one name of a reference group materializes and targets the
/// structure of every peer.
fn expand_through_aliases(
    state: &SnapshotState,
    locations: Vec<ResolvedLocation>,
) -> Vec<ResolvedLocation> {
    let mut expanded = Vec::with_capacity(locations.len());
    for loc in locations {
        if let Some(record) = state.structure.aliases(&loc.index) {
            for peer in record.must() {
                expanded.push(ResolvedLocation {
                    index: peer.clone(),
                    is_must: loc.is_must,
                });
            }
            for peer in record.may() {
                expanded.push(ResolvedLocation::may(peer.clone()));
            }
        }
        expanded.push(loc);
    }
    dedup(expanded)
}

/// Resolves the root segment without materializing anything.
fn root_locations(state: &SnapshotState, path: &AccessPath) -> Result<Vec<ResolvedLocation>> {
    let level = path.call_level();
    let root = path
        .segments()
        .first()
        .ok_or_else(|| invariant_error!("empty access path"))?;

    let locations = match root {
        PathSegment::Variable(m) => {
            if m.is_any() {
                let mut all = vec![ResolvedLocation::may(MemoryIndex::any_variable(level))];
                for (index, _) in state.structure.indexes() {
                    if matches!(index, MemoryIndex::Variable { call_level, .. } if *call_level == level)
                    {
                        all.push(ResolvedLocation::may(index.clone()));
                    }
                }
                all
            } else {
                m.names()
                    .iter()
                    .map(|name| ResolvedLocation {
                        index: MemoryIndex::variable(name, level),
                        is_must: m.is_direct(),
                    })
                    .collect()
            }
        }
        PathSegment::Control(m) => {
            if m.is_any() {
                let mut all = vec![ResolvedLocation::may(MemoryIndex::any_control(level))];
                for (index, _) in state.structure.indexes() {
                    if matches!(index, MemoryIndex::Control { call_level, .. } if *call_level == level)
                    {
                        all.push(ResolvedLocation::may(index.clone()));
                    }
                }
                all
            } else {
                m.names()
                    .iter()
                    .map(|name| ResolvedLocation {
                        index: MemoryIndex::control(name, level),
                        is_must: m.is_direct(),
                    })
                    .collect()
            }
        }
        PathSegment::Temporary { id } => {
            vec![ResolvedLocation::must(MemoryIndex::temporary(*id, level))]
        }
        PathSegment::Field(_) | PathSegment::Index(_) => {
            return Err(invariant_error!(
                "access path starts with a traversal segment"
            ))
        }
    };
    Ok(locations)
}

/// Resolves `path` against `state` without mutating it.
///
/// Locations the path may denote are returned together with any virtual
/// values produced by traversing into non-container values.
pub fn collect_read(
    state: &SnapshotState,
    assistant: &dyn MemoryAssistant,
    path: &AccessPath,
) -> Result<ReadResolution> {
    let mut current = root_locations(state, path)?;
    let mut virtual_values = Vec::new();

    for segment in &path.segments()[1..] {
        let mut next = Vec::new();

        for loc in &current {
            if loc.index.depth() >= MAX_PATH_DEPTH {
                if let PathSegment::Index(_) = segment {
                    log::warn!("read resolution depth cap hit at {}", loc.index);
                    state.stats.record_precision_loss();
                    next.push(ResolvedLocation::may(loc.index.any_index_child()));
                    continue;
                }
            }
            let entry = state.memory_entry(&loc.index);

            match segment {
                PathSegment::Index(m) => {
                    for value in entry.iter() {
                        match value {
                            Value::Array(handle) => resolve_array_read(
                                state, *handle, &loc.index, loc.is_must, m, &mut next,
                            )?,
                            other => {
                                virtual_values.extend(assistant.read_value_index(other, m));
                            }
                        }
                    }
                }
                PathSegment::Field(m) => {
                    for value in entry.iter() {
                        match value {
                            Value::Object(handle) => resolve_object_read(
                                state, *handle, &loc.index, loc.is_must, m, &mut next,
                            )?,
                            other => {
                                virtual_values.extend(assistant.read_value_field(other, m));
                            }
                        }
                    }
                }
                PathSegment::Variable(_)
                | PathSegment::Control(_)
                | PathSegment::Temporary { .. } => {
                    return Err(invariant_error!(
                        "root segment in the middle of an access path"
                    ))
                }
            }
        }
        current = dedup(next);
    }

    Ok(ReadResolution {
        locations: current,
        virtual_values,
    })
}

fn resolve_array_read(
    state: &SnapshotState,
    handle: crate::ArrayHandle,
    holder: &MemoryIndex,
    holder_must: bool,
    member: &MemberIdentifier,
    next: &mut Vec<ResolvedLocation>,
) -> Result<()> {
    let descriptor = state
        .structure
        .array(handle)
        .ok_or_else(|| invariant_error!("unregistered array {} at {}", handle, holder))?;
    let parent = descriptor
        .parent()
        .ok_or_else(|| invariant_error!("detached array {} reached through {}", handle, holder))?;

    if member.is_any() {
        log::debug!("read of unknown key on {parent} degrades to the summary slot");
        if let Some(any) = descriptor.any_index() {
            next.push(ResolvedLocation::may(any.clone()));
        }
        for (_, child) in descriptor.keys() {
            next.push(ResolvedLocation::may(child.clone()));
        }
        return Ok(());
    }

    for name in member.names() {
        match descriptor.key(name) {
            Some(child) => next.push(ResolvedLocation {
                index: child.clone(),
                is_must: holder_must && member.is_direct(),
            }),
            None => {
                // Untracked key: reads as undefined, plus whatever weak
                // writes through the summary slot may have placed there.
                next.push(ResolvedLocation {
                    index: parent.index_child(name),
                    is_must: holder_must && member.is_direct(),
                });
                if let Some(any) = descriptor.any_index() {
                    if state.data.contains(any) {
                        next.push(ResolvedLocation::may(any.clone()));
                    }
                }
            }
        }
    }
    Ok(())
}

fn resolve_object_read(
    state: &SnapshotState,
    handle: crate::ObjectHandle,
    holder: &MemoryIndex,
    holder_must: bool,
    member: &MemberIdentifier,
    next: &mut Vec<ResolvedLocation>,
) -> Result<()> {
    let descriptor = state
        .structure
        .object(handle)
        .ok_or_else(|| invariant_error!("unregistered object {} at {}", handle, holder))?;

    if member.is_any() {
        next.push(ResolvedLocation::may(descriptor.any_field().clone()));
        for (_, child) in descriptor.fields() {
            next.push(ResolvedLocation::may(child.clone()));
        }
        return Ok(());
    }

    for name in member.names() {
        match descriptor.field(name) {
            Some(child) => next.push(ResolvedLocation {
                index: child.clone(),
                is_must: holder_must && member.is_direct(),
            }),
            None => {
                next.push(ResolvedLocation {
                    index: MemoryIndex::field(handle, name),
                    is_must: holder_must && member.is_direct(),
                });
                if state.data.contains(descriptor.any_field()) {
                    next.push(ResolvedLocation::may(descriptor.any_field().clone()));
                }
            }
        }
    }
    Ok(())
}

/// Resolves `path` for assignment, materializing missing structure.
///
/// Missing containers along the path are auto-vivified: an undefined location
/// written through an index segment grows an array, an undefined location
/// written through a field segment grows a `stdClass` object. Missing child
/// locations are registered in the owning descriptor. The holder set is
/// expanded through alias records before every traversal step, so a write
/// through one name of a reference group reaches every peer.
pub fn collect_assign(
    state: &mut SnapshotState,
    assistant: &dyn MemoryAssistant,
    path: &AccessPath,
) -> Result<Vec<ResolvedLocation>> {
    let mut current = root_locations(state, path)?;
    for loc in &current {
        state.structure.ensure_index(loc.index.clone());
        if loc.index.is_summary() {
            state.stats.record_precision_loss();
        }
    }

    for segment in &path.segments()[1..] {
        let holders = expand_through_aliases(state, current);
        let mut next = Vec::new();

        for loc in &holders {
            if loc.index.depth() >= MAX_PATH_DEPTH {
                if let PathSegment::Index(_) = segment {
                    log::warn!("assign resolution depth cap hit at {}", loc.index);
                    state.stats.record_precision_loss();
                    let any = loc.index.any_index_child();
                    state.structure.ensure_index(any.clone());
                    next.push(ResolvedLocation::may(any));
                    continue;
                }
            }

            match segment {
                PathSegment::Index(m) => {
                    materialize_array_children(state, assistant, loc, m, &mut next)?;
                }
                PathSegment::Field(m) => {
                    materialize_object_children(state, loc, m, &mut next)?;
                }
                PathSegment::Variable(_)
                | PathSegment::Control(_)
                | PathSegment::Temporary { .. } => {
                    return Err(invariant_error!(
                        "root segment in the middle of an access path"
                    ))
                }
            }
        }
        current = dedup(next);
    }

    Ok(current)
}

fn materialize_array_children(
    state: &mut SnapshotState,
    assistant: &dyn MemoryAssistant,
    loc: &ResolvedLocation,
    member: &MemberIdentifier,
    next: &mut Vec<ResolvedLocation>,
) -> Result<()> {
    let entry = state.memory_entry(&loc.index);
    let mut handles: Vec<crate::ArrayHandle> = entry
        .iter()
        .filter_map(|v| match v {
            Value::Array(h) => Some(*h),
            _ => None,
        })
        .collect();

    // Scalars on the write path go through the virtual-member policy:
    // `$s[0] = 'x'` leaves some string behind instead of growing an array.
    let scalars: Vec<Value> = entry
        .iter()
        .filter(|v| !matches!(v, Value::Array(_) | Value::Undefined))
        .cloned()
        .collect();
    let entry = if scalars.is_empty() {
        entry
    } else {
        let mut adjusted = entry.clone();
        if loc.is_must {
            for value in &scalars {
                adjusted = adjusted.without_value(value);
            }
        }
        for value in &scalars {
            for replacement in assistant.write_value_index(value, member) {
                adjusted = adjusted.with_value(replacement);
            }
        }
        if adjusted != entry {
            state.structure.ensure_index(loc.index.clone());
            state.data.set(loc.index.clone(), adjusted.clone());
        }
        adjusted
    };

    if handles.is_empty() && (entry.is_empty() || entry.contains(&Value::Undefined)) {
        // Auto-vivification: grow an array in place of the undefined part.
        let handle = state.handles.next_array();
        state
            .structure
            .insert_array(crate::snapshot::structure::ArrayDescriptor::anchored(
                handle,
                loc.index.clone(),
            ));
        state.structure.add_array_at(loc.index.clone(), handle);
        state.structure.ensure_index(loc.index.clone());

        let vivified = if loc.is_must {
            entry.without_value(&Value::Undefined).with_value(Value::Array(handle))
        } else {
            entry.with_value(Value::Array(handle))
        };
        state.data.set(loc.index.clone(), vivified);
        handles.push(handle);
    } else {
        // A detached array written here directly becomes anchored in place.
        for handle in &handles {
            let anchored = state
                .structure
                .array(*handle)
                .ok_or_else(|| invariant_error!("unregistered array {} at {}", handle, loc.index))?
                .is_anchored();
            if !anchored {
                state.structure.update_array(*handle, |d| d.anchor(loc.index.clone()));
                state.structure.add_array_at(loc.index.clone(), *handle);
            }
        }
    }

    for handle in handles {
        let descriptor = state
            .structure
            .array(handle)
            .cloned()
            .ok_or_else(|| invariant_error!("unregistered array {} at {}", handle, loc.index))?;
        let parent = descriptor
            .parent()
            .cloned()
            .ok_or_else(|| invariant_error!("detached array {} at {}", handle, loc.index))?;

        if member.is_any() {
            log::debug!("write through unknown key on {parent} degrades to the summary slot");
            state.stats.record_precision_loss();
            if let Some(any) = descriptor.any_index() {
                state.structure.ensure_index(any.clone());
                next.push(ResolvedLocation::may(any.clone()));
            }
            for (_, child) in descriptor.keys() {
                next.push(ResolvedLocation::may(child.clone()));
            }
            continue;
        }

        for name in member.names() {
            let child = match descriptor.key(name) {
                Some(child) => child.clone(),
                None => {
                    let child = parent.index_child(name);
                    let key: std::sync::Arc<str> = std::sync::Arc::from(name.as_ref());
                    state
                        .structure
                        .update_array(handle, |d| d.add_key(key, child.clone()));
                    child
                }
            };
            state.structure.ensure_index(child.clone());
            next.push(ResolvedLocation {
                index: child,
                is_must: loc.is_must && member.is_direct(),
            });
        }
    }

    Ok(())
}

fn materialize_object_children(
    state: &mut SnapshotState,
    loc: &ResolvedLocation,
    member: &MemberIdentifier,
    next: &mut Vec<ResolvedLocation>,
) -> Result<()> {
    let entry = state.memory_entry(&loc.index);
    let mut handles: Vec<crate::ObjectHandle> = entry
        .iter()
        .filter_map(|v| match v {
            Value::Object(h) => Some(*h),
            _ => None,
        })
        .collect();

    if handles.is_empty() {
        // Writing a field of an undefined value grows a stdClass instance.
        let handle = state.handles.next_object();
        state
            .structure
            .insert_object(crate::snapshot::structure::ObjectDescriptor::new(
                handle,
                ["stdClass"],
            ));
        state.structure.ensure_index(loc.index.clone());

        let vivified = if loc.is_must {
            entry.without_value(&Value::Undefined).with_value(Value::Object(handle))
        } else {
            entry.with_value(Value::Object(handle))
        };
        state.data.set(loc.index.clone(), vivified);
        handles.push(handle);
    }

    for handle in handles {
        let descriptor = state
            .structure
            .object(handle)
            .cloned()
            .ok_or_else(|| invariant_error!("unregistered object {} at {}", handle, loc.index))?;

        if member.is_any() {
            state.stats.record_precision_loss();
            let any = descriptor.any_field().clone();
            state.structure.ensure_index(any.clone());
            next.push(ResolvedLocation::may(any));
            for (_, child) in descriptor.fields() {
                next.push(ResolvedLocation::may(child.clone()));
            }
            continue;
        }

        for name in member.names() {
            let child = match descriptor.field(name) {
                Some(child) => child.clone(),
                None => {
                    let child = MemoryIndex::field(handle, name);
                    let key: std::sync::Arc<str> = std::sync::Arc::from(name.as_ref());
                    state
                        .structure
                        .update_object(handle, |d| d.add_field(key, child.clone()));
                    child
                }
            };
            state.structure.ensure_index(child.clone());
            next.push(ResolvedLocation {
                index: child,
                is_must: loc.is_must && member.is_direct(),
            });
        }
    }
    Ok(())
}
