//! The copy family's read strategy.
//!
//! Reads resolve a path with the non-mutating collector and union the value
//! sets of every resolved location. A resolved location without a stored
//! entry contributes `Undefined`, matching PHP's NULL-for-unset semantics.
//! Virtual values produced by traversing into scalars are unioned in as well.
//!
//! The enumeration helpers (`index_names`, `field_names`, `object_types`)
//! back the driver's `foreach` and dynamic-dispatch handling.

use std::sync::Arc;

use crate::{
    algorithms::{collect::collect_read, ReadAlgorithm},
    assistant::MemoryAssistant,
    memory::{entry::MemoryEntry, path::AccessPath, value::Value},
    snapshot::{SnapshotMode, SnapshotState},
    Result,
};

/// Read resolution for the copy family.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyReadAlgorithm;

impl ReadAlgorithm for CopyReadAlgorithm {
    fn read(
        &self,
        state: &SnapshotState,
        assistant: &dyn MemoryAssistant,
        path: &AccessPath,
    ) -> Result<MemoryEntry> {
        let resolution = collect_read(state, assistant, path)?;

        let container = match state.mode {
            SnapshotMode::Memory => &state.data,
            SnapshotMode::Info => &state.info,
        };

        let mut result = MemoryEntry::empty();
        for loc in &resolution.locations {
            match container.get(&loc.index) {
                Some(entry) => result = result.union(entry),
                None => result = result.with_value(Value::Undefined),
            }
        }
        for value in resolution.virtual_values {
            result = result.with_value(value);
        }

        if result.is_empty() {
            result = MemoryEntry::undefined();
        }
        Ok(result)
    }

    fn index_names(
        &self,
        state: &SnapshotState,
        assistant: &dyn MemoryAssistant,
        path: &AccessPath,
    ) -> Result<Vec<Arc<str>>> {
        let resolution = collect_read(state, assistant, path)?;
        let mut names: Vec<Arc<str>> = Vec::new();
        for loc in &resolution.locations {
            for value in state.memory_entry(&loc.index).iter() {
                if let Value::Array(handle) = value {
                    let descriptor = state
                        .structure
                        .array(*handle)
                        .ok_or_else(|| invariant_error!("unregistered array {}", handle))?;
                    names.extend(descriptor.keys().map(|(key, _)| key.clone()));
                }
            }
        }
        names.sort();
        names.dedup();
        Ok(names)
    }

    fn field_names(
        &self,
        state: &SnapshotState,
        assistant: &dyn MemoryAssistant,
        path: &AccessPath,
    ) -> Result<Vec<Arc<str>>> {
        let resolution = collect_read(state, assistant, path)?;
        let mut names: Vec<Arc<str>> = Vec::new();
        for loc in &resolution.locations {
            for value in state.memory_entry(&loc.index).iter() {
                if let Value::Object(handle) = value {
                    let descriptor = state
                        .structure
                        .object(*handle)
                        .ok_or_else(|| invariant_error!("unregistered object {}", handle))?;
                    names.extend(descriptor.fields().map(|(name, _)| name.clone()));
                }
            }
        }
        names.sort();
        names.dedup();
        Ok(names)
    }

    fn object_types(
        &self,
        state: &SnapshotState,
        assistant: &dyn MemoryAssistant,
        path: &AccessPath,
    ) -> Result<Vec<Arc<str>>> {
        let resolution = collect_read(state, assistant, path)?;
        let mut types: Vec<Arc<str>> = Vec::new();
        for loc in &resolution.locations {
            for value in state.memory_entry(&loc.index).iter() {
                if let Value::Object(handle) = value {
                    let descriptor = state
                        .structure
                        .object(*handle)
                        .ok_or_else(|| invariant_error!("unregistered object {}", handle))?;
                    types.extend(descriptor.types().cloned());
                }
            }
        }
        types.sort();
        types.dedup();
        Ok(types)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        algorithms::{AssignAlgorithm, CopyAssignAlgorithm},
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
    fn test_read_of_unset_variable_is_undefined() {
        let state = fresh_state();
        let assistant = IntervalAssistant::new();
        let read = CopyReadAlgorithm;

        let entry = read.read(&state, &assistant, &var("missing")).unwrap();
        assert_eq!(entry, MemoryEntry::undefined());
    }

    #[test]
    fn test_read_known_and_missing_keys() {
        let mut state = fresh_state();
        let assistant = IntervalAssistant::new();
        let assign = CopyAssignAlgorithm;
        let read = CopyReadAlgorithm;

        let a = var("arr").with_index(MemberIdentifier::direct("a"));
        assign
            .assign(&mut state, &assistant, &a, &MemoryEntry::from_value(Value::Int(1)), false)
            .unwrap();

        let got = read.read(&state, &assistant, &a).unwrap();
        assert_eq!(got, MemoryEntry::from_value(Value::Int(1)));

        let missing = var("arr").with_index(MemberIdentifier::direct("zzz"));
        let got = read.read(&state, &assistant, &missing).unwrap();
        assert_eq!(got, MemoryEntry::undefined());
    }

    #[test]
    fn test_read_uncertain_key_unions_candidates() {
        let mut state = fresh_state();
        let assistant = IntervalAssistant::new();
        let assign = CopyAssignAlgorithm;
        let read = CopyReadAlgorithm;

        for (key, value) in [("a", 1), ("b", 2)] {
            let path = var("arr").with_index(MemberIdentifier::direct(key));
            assign
                .assign(&mut state, &assistant, &path, &MemoryEntry::from_value(Value::Int(value)), false)
                .unwrap();
        }

        let uncertain = var("arr").with_index(MemberIdentifier::uncertain(["a", "b"]));
        let got = read.read(&state, &assistant, &uncertain).unwrap();
        assert_eq!(got, MemoryEntry::from_values([Value::Int(1), Value::Int(2)]));
    }

    #[test]
    fn test_index_names_enumeration() {
        let mut state = fresh_state();
        let assistant = IntervalAssistant::new();
        let assign = CopyAssignAlgorithm;
        let read = CopyReadAlgorithm;

        for key in ["b", "a", "c"] {
            let path = var("arr").with_index(MemberIdentifier::direct(key));
            assign
                .assign(&mut state, &assistant, &path, &MemoryEntry::from_value(Value::Int(0)), false)
                .unwrap();
        }

        let names = read.index_names(&state, &assistant, &var("arr")).unwrap();
        let names: Vec<&str> = names.iter().map(AsRef::as_ref).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_string_index_read_is_virtual() {
        let mut state = fresh_state();
        let assistant = IntervalAssistant::new();
        let assign = CopyAssignAlgorithm;
        let read = CopyReadAlgorithm;

        assign
            .assign(&mut state, &assistant, &var("s"), &MemoryEntry::from_value(Value::string("hi")), false)
            .unwrap();

        let path = var("s").with_index(MemberIdentifier::direct("0"));
        let got = read.read(&state, &assistant, &path).unwrap();
        assert_eq!(got, MemoryEntry::from_value(Value::AnyString));
    }
}
