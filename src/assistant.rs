//! Pure helper policies for the memory model.
//!
//! A [`MemoryAssistant`] bundles the policies the core algorithms delegate to
//! but that hold no snapshot state:
//!
//! - **Simplification** - collapsing an oversized value set into a coarser
//!   representation, bounding entry size
//! - **Widening** - the extrapolation operator applied across loop iterations
//!   so fixpoint iteration terminates
//! - **Virtual members** - the semantics of reading/writing a field or index
//!   on a *non-container* value (e.g. indexing into a string)
//!
//! The shipped [`IntervalAssistant`] abstracts numeric sets into intervals and
//! everything else into the matching `Any*` top element. Both operators are
//! monotone (the result covers the inputs) and the widening chain per type
//! class is finite, which is exactly what the commit algorithm needs for
//! termination.

use std::fmt::Debug;

use crate::memory::{
    entry::MemoryEntry,
    path::MemberIdentifier,
    value::{FloatValue, Value, ValueClass},
};

/// Pure policy object invoked by the snapshot algorithms.
///
/// Implementations must be stateless with respect to snapshots; the same
/// assistant instance is shared by every snapshot of an analysis run.
pub trait MemoryAssistant: Debug + Send + Sync {
    /// Collapses an entry into a coarser representation.
    ///
    /// Called when an entry's value-set size exceeds the configured simplify
    /// limit. The result must cover every value of the input (soundness) and
    /// should be materially smaller (termination).
    fn simplify(&self, entry: &MemoryEntry) -> MemoryEntry;

    /// The widening operator between the entry of the previous iteration
    /// (`old`) and the current one (`new`).
    ///
    /// Must cover both inputs, and repeated application on any chain must
    /// reach a fixpoint in finitely many steps.
    fn widen(&self, old: &MemoryEntry, new: &MemoryEntry) -> MemoryEntry;

    /// The values produced by reading an array index on a non-container
    /// value (e.g. `$str[0]`).
    fn read_value_index(&self, value: &Value, key: &MemberIdentifier) -> Vec<Value>;

    /// The values produced by reading an object field on a non-container
    /// value.
    fn read_value_field(&self, value: &Value, field: &MemberIdentifier) -> Vec<Value>;

    /// The replacement values of a non-container value after writing one of
    /// its indices (e.g. `$str[0] = 'a'`).
    fn write_value_index(&self, value: &Value, key: &MemberIdentifier) -> Vec<Value>;
}

/// The default assistant: numeric sets collapse to intervals, everything else
/// to its `Any*` top element.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntervalAssistant;

impl IntervalAssistant {
    /// Creates the default assistant.
    #[must_use]
    pub fn new() -> Self {
        IntervalAssistant
    }

    /// Int-class bounds of an entry: `(min, max, saw_any)`.
    fn int_bounds(entry: &MemoryEntry) -> Option<(i64, i64, bool)> {
        let mut bounds: Option<(i64, i64)> = None;
        let mut saw_any = false;
        for value in entry.iter() {
            let (lo, hi) = match value {
                Value::Int(i) => (*i, *i),
                Value::IntInterval { min, max } => (*min, *max),
                Value::AnyInt => {
                    saw_any = true;
                    continue;
                }
                _ => continue,
            };
            bounds = Some(match bounds {
                Some((min, max)) => (min.min(lo), max.max(hi)),
                None => (lo, hi),
            });
        }
        match (bounds, saw_any) {
            (Some((min, max)), any) => Some((min, max, any)),
            (None, true) => Some((0, 0, true)),
            (None, false) => None,
        }
    }

    /// Float-class bounds of an entry: `(min, max, saw_any)`.
    fn float_bounds(entry: &MemoryEntry) -> Option<(f64, f64, bool)> {
        let mut bounds: Option<(f64, f64)> = None;
        let mut saw_any = false;
        for value in entry.iter() {
            let (lo, hi) = match value {
                Value::Float(v) => (v.get(), v.get()),
                Value::FloatInterval { min, max } => (min.get(), max.get()),
                Value::AnyFloat => {
                    saw_any = true;
                    continue;
                }
                _ => continue,
            };
            bounds = Some(match bounds {
                Some((min, max)) => (min.min(lo), max.max(hi)),
                None => (lo, hi),
            });
        }
        match (bounds, saw_any) {
            (Some((min, max)), any) => Some((min, max, any)),
            (None, true) => Some((0.0, 0.0, true)),
            (None, false) => None,
        }
    }

    fn int_abstraction(min: i64, max: i64, saw_any: bool) -> Value {
        if saw_any || (min == i64::MIN && max == i64::MAX) {
            Value::AnyInt
        } else if min == max {
            Value::Int(min)
        } else {
            Value::IntInterval { min, max }
        }
    }

    fn float_abstraction(min: f64, max: f64, saw_any: bool) -> Value {
        if saw_any || (min == f64::NEG_INFINITY && max == f64::INFINITY) {
            Value::AnyFloat
        } else if min.to_bits() == max.to_bits() {
            Value::float(min)
        } else {
            Value::FloatInterval {
                min: FloatValue::new(min),
                max: FloatValue::new(max),
            }
        }
    }

    /// Collects the values of `entry` that simplification and widening leave
    /// untouched: containers, undefined, and the universal top.
    fn passthrough(entry: &MemoryEntry) -> Vec<Value> {
        entry
            .iter()
            .filter(|v| {
                matches!(
                    v.class(),
                    ValueClass::Array | ValueClass::Object | ValueClass::Undefined | ValueClass::Top
                )
            })
            .cloned()
            .collect()
    }

    /// Members of one type class, in a deterministic order so stable sets
    /// compare equal regardless of set iteration order.
    fn class_members(entry: &MemoryEntry, class: ValueClass) -> Vec<&Value> {
        let mut members: Vec<&Value> = entry.iter().filter(|v| v.class() == class).collect();
        members.sort_by_key(|v| v.to_string());
        members
    }
}

impl MemoryAssistant for IntervalAssistant {
    fn simplify(&self, entry: &MemoryEntry) -> MemoryEntry {
        let mut result = Self::passthrough(entry);

        if let Some((min, max, saw_any)) = Self::int_bounds(entry) {
            result.push(Self::int_abstraction(min, max, saw_any));
        }
        if let Some((min, max, saw_any)) = Self::float_bounds(entry) {
            result.push(Self::float_abstraction(min, max, saw_any));
        }

        let strings = Self::class_members(entry, ValueClass::String);
        match strings.as_slice() {
            [] => {}
            [one] => result.push((*one).clone()),
            _ => result.push(Value::AnyString),
        }

        let bools = Self::class_members(entry, ValueClass::Bool);
        match bools.as_slice() {
            [] => {}
            [one] => result.push((*one).clone()),
            _ => result.push(Value::AnyBool),
        }

        MemoryEntry::from_values(result)
    }

    fn widen(&self, old: &MemoryEntry, new: &MemoryEntry) -> MemoryEntry {
        if old == new {
            return new.clone();
        }

        let union = old.union(new);
        let mut result = Self::passthrough(&union);

        // Ints: keep stable bounds, jump unstable bounds to the type extreme.
        match (Self::int_bounds(old), Self::int_bounds(new)) {
            (Some((old_min, old_max, old_any)), Some((new_min, new_max, new_any))) => {
                let min = if new_min < old_min { i64::MIN } else { old_min.min(new_min) };
                let max = if new_max > old_max { i64::MAX } else { old_max.max(new_max) };
                result.push(Self::int_abstraction(min, max, old_any || new_any));
            }
            (Some((min, max, any)), None) | (None, Some((min, max, any))) => {
                result.push(Self::int_abstraction(min, max, any));
            }
            (None, None) => {}
        }

        match (Self::float_bounds(old), Self::float_bounds(new)) {
            (Some((old_min, old_max, old_any)), Some((new_min, new_max, new_any))) => {
                let min = if new_min < old_min {
                    f64::NEG_INFINITY
                } else {
                    old_min.min(new_min)
                };
                let max = if new_max > old_max {
                    f64::INFINITY
                } else {
                    old_max.max(new_max)
                };
                result.push(Self::float_abstraction(min, max, old_any || new_any));
            }
            (Some((min, max, any)), None) | (None, Some((min, max, any))) => {
                result.push(Self::float_abstraction(min, max, any));
            }
            (None, None) => {}
        }

        let old_strings = Self::class_members(old, ValueClass::String);
        let new_strings = Self::class_members(new, ValueClass::String);
        if !old_strings.is_empty() || !new_strings.is_empty() {
            if old_strings == new_strings {
                result.extend(old_strings.into_iter().cloned());
            } else {
                result.push(Value::AnyString);
            }
        }

        let old_bools = Self::class_members(old, ValueClass::Bool);
        let new_bools = Self::class_members(new, ValueClass::Bool);
        if !old_bools.is_empty() || !new_bools.is_empty() {
            if old_bools == new_bools {
                result.extend(old_bools.into_iter().cloned());
            } else {
                result.push(Value::AnyBool);
            }
        }

        MemoryEntry::from_values(result)
    }

    fn read_value_index(&self, value: &Value, _key: &MemberIdentifier) -> Vec<Value> {
        match value {
            // Indexing a string yields some string (a one-char slice)
            Value::String(_) | Value::AnyString => vec![Value::AnyString],
            // Untracked array structure or top: anything may come out
            Value::AnyArray | Value::Any => vec![Value::Any],
            // PHP yields NULL for index reads on other scalars
            _ => vec![Value::Undefined],
        }
    }

    fn read_value_field(&self, value: &Value, _field: &MemberIdentifier) -> Vec<Value> {
        match value {
            Value::AnyObject | Value::Any => vec![Value::Any],
            _ => vec![Value::Undefined],
        }
    }

    fn write_value_index(&self, value: &Value, _key: &MemberIdentifier) -> Vec<Value> {
        match value {
            // Writing into a string offset produces some string
            Value::String(_) | Value::AnyString => vec![Value::AnyString],
            Value::AnyArray => vec![Value::AnyArray],
            Value::Any => vec![Value::Any],
            // Writes into other scalars are PHP warnings; the value survives
            other => vec![other.clone()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simplify_collapses_ints_to_interval() {
        let assistant = IntervalAssistant::new();
        let entry = MemoryEntry::from_values([Value::Int(1), Value::Int(5), Value::Int(3)]);
        let simplified = assistant.simplify(&entry);
        assert_eq!(
            simplified,
            MemoryEntry::from_value(Value::IntInterval { min: 1, max: 5 })
        );
    }

    #[test]
    fn test_simplify_keeps_containers_and_undefined() {
        let assistant = IntervalAssistant::new();
        let entry = MemoryEntry::from_values([
            Value::Undefined,
            Value::Array(crate::ArrayHandle::new(1)),
            Value::string("a"),
            Value::string("b"),
        ]);
        let simplified = assistant.simplify(&entry);
        assert!(simplified.contains(&Value::Undefined));
        assert!(simplified.contains(&Value::Array(crate::ArrayHandle::new(1))));
        assert!(simplified.contains(&Value::AnyString));
        assert!(!simplified.contains(&Value::string("a")));
    }

    #[test]
    fn test_widen_is_identity_on_equal_entries() {
        let assistant = IntervalAssistant::new();
        let entry = MemoryEntry::from_value(Value::Int(7));
        assert_eq!(assistant.widen(&entry, &entry), entry);
    }

    #[test]
    fn test_widen_jumps_unstable_bound() {
        let assistant = IntervalAssistant::new();
        let old = MemoryEntry::from_value(Value::Int(1));
        let new = MemoryEntry::from_values([Value::Int(1), Value::Int(2)]);
        let widened = assistant.widen(&old, &new);
        // Upper bound grew, so it jumps to the extreme; lower bound was stable
        assert_eq!(
            widened,
            MemoryEntry::from_value(Value::IntInterval {
                min: 1,
                max: i64::MAX
            })
        );
    }

    #[test]
    fn test_widen_chain_stabilizes() {
        let assistant = IntervalAssistant::new();
        // Simulate x := x + 1 at a loop head
        let mut current = MemoryEntry::from_value(Value::Int(0));
        for step in 1..6 {
            let incremented = match current.iter().next().unwrap() {
                Value::Int(i) => MemoryEntry::from_values([current.iter().next().unwrap().clone(), Value::Int(i + 1)]),
                Value::IntInterval { min, max } => MemoryEntry::from_value(Value::IntInterval {
                    min: *min,
                    max: max.saturating_add(1),
                }),
                other => MemoryEntry::from_value(other.clone()),
            };
            let next = assistant.widen(&current, &incremented);
            if next == current {
                assert!(step <= 3, "chain should stabilize quickly");
                return;
            }
            current = next;
        }
        panic!("widening chain did not stabilize");
    }

    #[test]
    fn test_widen_strings_to_any_string() {
        let assistant = IntervalAssistant::new();
        let old = MemoryEntry::from_value(Value::string("hello"));
        let new = MemoryEntry::from_value(Value::string("world"));
        assert_eq!(
            assistant.widen(&old, &new),
            MemoryEntry::from_value(Value::AnyString)
        );
    }

    #[test]
    fn test_virtual_index_on_string() {
        let assistant = IntervalAssistant::new();
        let key = MemberIdentifier::direct("0");
        assert_eq!(
            assistant.read_value_index(&Value::string("abc"), &key),
            vec![Value::AnyString]
        );
        assert_eq!(
            assistant.read_value_index(&Value::Int(3), &key),
            vec![Value::Undefined]
        );
    }
}
