//! Snapshots that hold persistent collections.
//!
//! A field backed by `im` keeps its identity across commits that leave it
//! alone, so selections over it stay quiet without comparing elements.

use draftstate_core::persistent::{OrdMap, Vector};
use draftstate_core::{Result, Same};
use draftstate_harness::{Recorder, init_tracing};
use draftstate_runtime::{Store, define};

#[derive(Debug, Clone, PartialEq, Default)]
struct Board {
    rows: Vector<i32>,
    tags: OrdMap<String, u32>,
    cursor: u32,
}

fn ready() -> Store<Board> {
    init_tracing();
    let store = define::<Board>();
    store
        .setup(Board {
            rows: (0..100).collect(),
            ..Board::default()
        })
        .unwrap();
    store
}

#[test]
fn untouched_vector_field_keeps_identity_and_stays_quiet() -> Result<()> {
    let store = ready();
    let rows = store.select(|s| s.rows.clone())?;
    let rec = Recorder::follow(&rows);
    let before = store.get_with(|s| s.rows.clone())?;

    let _ = store.update(|tx| tx.write(|s| s.cursor = 7))?;

    let after = store.get_with(|s| s.rows.clone())?;
    assert!(before.same(&after));
    assert_eq!(rec.len(), 1);
    assert_eq!(rows.version(), 0);
    Ok(())
}

#[test]
fn pushing_to_vector_field_notifies_once() -> Result<()> {
    let store = ready();
    let rows = store.select(|s| s.rows.clone())?;
    let rec = Recorder::follow(&rows);

    let _ = store.update(|tx| tx.write(|s| s.rows.push_back(100)))?;

    assert_eq!(rows.version(), 1);
    assert_eq!(rec.len(), 2);
    assert_eq!(rows.get().len(), 101);
    assert_eq!(rows.get().back(), Some(&100));
    Ok(())
}

#[test]
fn selection_over_a_map_entry() -> Result<()> {
    let store = ready();
    let urgent = store.select(|s| s.tags.get("urgent").copied())?;
    let rec = Recorder::follow(&urgent);

    let _ = store.update(|tx| {
        tx.write(|s| {
            s.tags.insert("later".into(), 1);
        })
    })?;
    let _ = store.update(|tx| {
        tx.write(|s| {
            s.tags.insert("urgent".into(), 3);
        })
    })?;

    assert_eq!(rec.values(), vec![None, Some(3)]);
    Ok(())
}
