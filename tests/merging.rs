//! Properties of the merge operation observed through the public API:
//! order independence, associativity, alias weakening and structural union
//! across branches.

use phpscope::prelude::*;

fn init_logging() {
    let _ = simplelog::SimpleLogger::init(
        log::LevelFilter::Debug,
        simplelog::Config::default(),
    );
}

fn int_entry(value: i64) -> MemoryEntry {
    MemoryEntry::from_value(Value::Int(value))
}

fn snapshot_with(model: &MemoryModel, assignments: &[(&str, i64)]) -> Result<Snapshot> {
    let mut snapshot = model.create_snapshot();
    snapshot.start_transaction()?;
    for (name, value) in assignments {
        snapshot
            .variable(VariableIdentifier::direct(name))
            .write(&mut snapshot, &int_entry(*value), false)?;
    }
    snapshot.commit_transaction()?;
    Ok(snapshot)
}

fn join(model: &MemoryModel, sources: &[&Snapshot]) -> Result<Snapshot> {
    let mut joined = model.create_snapshot();
    joined.start_transaction()?;
    joined.extend(sources)?;
    joined.commit_transaction()?;
    Ok(joined)
}

fn read_var(snapshot: &Snapshot, name: &str) -> Result<MemoryEntry> {
    snapshot
        .variable(VariableIdentifier::direct(name))
        .read(snapshot)
}

#[test]
fn merge_is_order_independent() -> Result<()> {
    init_logging();
    let model = MemoryModel::builder().build();
    let a = snapshot_with(&model, &[("x", 1), ("y", 10)])?;
    let b = snapshot_with(&model, &[("x", 2)])?;

    let ab = join(&model, &[&a, &b])?;
    let ba = join(&model, &[&b, &a])?;

    for name in ["x", "y"] {
        assert_eq!(read_var(&ab, name)?, read_var(&ba, name)?);
    }
    Ok(())
}

#[test]
fn merge_is_associative() -> Result<()> {
    init_logging();
    let model = MemoryModel::builder().build();
    let a = snapshot_with(&model, &[("x", 1)])?;
    let b = snapshot_with(&model, &[("x", 2)])?;
    let c = snapshot_with(&model, &[("x", 3), ("z", 0)])?;

    let left_first = join(&model, &[&join(&model, &[&a, &b])?, &c])?;
    let all_at_once = join(&model, &[&a, &b, &c])?;

    for name in ["x", "z"] {
        assert_eq!(read_var(&left_first, name)?, read_var(&all_at_once, name)?);
    }
    assert_eq!(
        read_var(&all_at_once, "x")?,
        MemoryEntry::from_values([Value::Int(1), Value::Int(2), Value::Int(3)])
    );
    Ok(())
}

/// An alias established on only one branch survives the join, weakened to a
/// may-alias: writes through it still reach the peer, but only weakly.
#[test]
fn one_sided_alias_weakens_to_may() -> Result<()> {
    init_logging();
    let model = MemoryModel::builder().build();

    let with_alias = {
        let mut snapshot = model.create_snapshot();
        snapshot.start_transaction()?;
        let x = snapshot.variable(VariableIdentifier::direct("x"));
        x.write(&mut snapshot, &int_entry(1), false)?;
        let y = snapshot.variable(VariableIdentifier::direct("y"));
        y.set_alias(&mut snapshot, &x)?;
        snapshot.commit_transaction()?;
        snapshot
    };
    let without_alias = snapshot_with(&model, &[("x", 1), ("y", 5)])?;

    let mut joined = join(&model, &[&with_alias, &without_alias])?;

    // Writing $y now reaches $x only weakly
    joined.start_transaction()?;
    joined
        .variable(VariableIdentifier::direct("y"))
        .write(&mut joined, &int_entry(9), false)?;
    joined.commit_transaction()?;

    let x = read_var(&joined, "x")?;
    assert!(x.contains(&Value::Int(1)));
    assert!(x.contains(&Value::Int(9)));
    Ok(())
}

/// An alias present on every branch stays a must-alias after the join.
#[test]
fn unanimous_alias_stays_must() -> Result<()> {
    init_logging();
    let model = MemoryModel::builder().build();

    let mut branches = Vec::new();
    for value in [1, 2] {
        let mut snapshot = model.create_snapshot();
        snapshot.start_transaction()?;
        let x = snapshot.variable(VariableIdentifier::direct("x"));
        x.write(&mut snapshot, &int_entry(value), false)?;
        let y = snapshot.variable(VariableIdentifier::direct("y"));
        y.set_alias(&mut snapshot, &x)?;
        snapshot.commit_transaction()?;
        branches.push(snapshot);
    }

    let mut joined = join(&model, &[&branches[0], &branches[1]])?;

    joined.start_transaction()?;
    joined
        .variable(VariableIdentifier::direct("y"))
        .write(&mut joined, &int_entry(9), false)?;
    joined.commit_transaction()?;

    // The strong write through the surviving must-alias replaced $x entirely
    assert_eq!(read_var(&joined, "x")?, int_entry(9));
    Ok(())
}

/// Arrays grown on different branches union their keys at the join.
#[test]
fn branch_arrays_union_keys() -> Result<()> {
    init_logging();
    let model = MemoryModel::builder().build();

    let mut entry_point = model.create_snapshot();
    entry_point.start_transaction()?;
    let arr = entry_point.variable(VariableIdentifier::direct("arr"));
    let array = entry_point.create_array()?;
    arr.write(&mut entry_point, &MemoryEntry::from_value(array), false)?;
    entry_point.commit_transaction()?;

    let mut branches = Vec::new();
    for key in ["left", "right"] {
        let mut branch = model.create_snapshot();
        branch.start_transaction()?;
        branch.extend(&[&entry_point])?;
        branch
            .variable(VariableIdentifier::direct("arr"))
            .index(MemberIdentifier::direct(key))
            .write(&mut branch, &int_entry(1), false)?;
        branch.commit_transaction()?;
        branches.push(branch);
    }

    let joined = join(&model, &[&branches[0], &branches[1]])?;
    let keys = joined
        .variable(VariableIdentifier::direct("arr"))
        .iterate_indices(&joined)?;
    let keys: Vec<&str> = keys.iter().map(AsRef::as_ref).collect();
    assert_eq!(keys, vec!["left", "right"]);

    // Each element is present on one branch only, so it may be undefined
    let left = joined
        .variable(VariableIdentifier::direct("arr"))
        .index(MemberIdentifier::direct("left"))
        .read(&joined)?;
    assert!(left.contains(&Value::Int(1)));
    Ok(())
}

#[test]
fn mismatched_call_levels_cannot_merge() -> Result<()> {
    init_logging();
    let model = MemoryModel::builder().build();

    let level0 = snapshot_with(&model, &[("x", 1)])?;
    let mut level1 = model.create_snapshot();
    level1.start_transaction()?;
    level1.extend_as_call(&level0, None, &[])?;
    level1.commit_transaction()?;

    let mut joined = model.create_snapshot();
    joined.start_transaction()?;
    let result = joined.extend(&[&level0, &level1]);
    assert!(matches!(result, Err(Error::CallLevelMismatch { .. })));
    Ok(())
}
