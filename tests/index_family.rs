//! # Index Family Test Suite
//!
//! Exercises the shared index contract across the tree, hash and range
//! variants: uniqueness under sequential and concurrent inserts, range
//! scan correctness, extremal lookup, and the planner cost ordering.

use opaldb::error::db_error;
use opaldb::index::{
    Cursor, Index, IndexColumn, IndexType, SortOrder, MASK_EQUALITY, MASK_RANGE_START,
};
use opaldb::session::{Session, SessionKind, User};
use opaldb::table::{Column, Table};
use opaldb::{DbError, Row, Value};
use std::sync::Arc;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn session() -> Session {
    Session::new(1, SessionKind::User, User::new("tester", true))
}

fn people_table() -> Arc<Table> {
    Table::new(
        1,
        "people",
        vec![
            Column::new("id", opaldb::types::DataType::Int, false),
            Column::new("name", opaldb::types::DataType::Text, true),
        ],
        false,
    )
}

fn mapped_columns(table: &Arc<Table>, names: &[&str]) -> Vec<IndexColumn> {
    let mut cols: Vec<IndexColumn> = names.iter().map(|n| IndexColumn::new(*n)).collect();
    IndexColumn::map_columns(&mut cols, table).unwrap();
    cols
}

fn int_row(pos: u64, id: i64, name: &str) -> Row {
    Row::with_pos(pos, vec![Value::Int(id), Value::Text(name.into())])
}

fn collect_ids(mut cursor: Box<dyn opaldb::index::Cursor>) -> Vec<i64> {
    let mut out = Vec::new();
    while cursor.next().unwrap() {
        match cursor.row().unwrap().value(0) {
            Some(Value::Int(v)) => out.push(*v),
            other => panic!("expected Int key, got {:?}", other),
        }
    }
    out
}

// ============================================================================
// UNIQUENESS
// ============================================================================

mod uniqueness {
    use super::*;

    #[test]
    fn no_two_stored_rows_share_a_key() {
        let table = people_table();
        let s = session();
        let idx = table
            .add_index(
                &s,
                "UX",
                10,
                mapped_columns(&table, &["id"]),
                IndexType::unique(false, false),
            )
            .unwrap();
        let mut stored = 0;
        for (pos, id) in [(1u64, 1i64), (2, 2), (3, 1), (4, 3), (5, 2)] {
            match idx.add(&s, &int_row(pos, id, "x")) {
                Ok(()) => stored += 1,
                Err(e) => assert!(matches!(
                    db_error(&e),
                    Some(DbError::DuplicateKey { .. })
                )),
            }
        }
        assert_eq!(stored, 3);
        assert_eq!(idx.row_count(&s), 3);
    }

    #[test]
    fn concurrent_equal_key_inserts_admit_exactly_one() {
        let table = people_table();
        let s = session();
        let idx = table
            .add_index(
                &s,
                "UX",
                10,
                mapped_columns(&table, &["id"]),
                IndexType::unique(false, false),
            )
            .unwrap();

        let successes = std::sync::atomic::AtomicUsize::new(0);
        std::thread::scope(|scope| {
            for t in 0..8u64 {
                let idx = idx.clone();
                let successes = &successes;
                scope.spawn(move || {
                    let s = Session::new(10 + t as u32, SessionKind::User, User::new("w", true));
                    let row = int_row(100 + t, 42, "contender");
                    if idx.add(&s, &row).is_ok() {
                        successes.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    }
                });
            }
        });
        assert_eq!(successes.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(idx.row_count(&s), 1);
    }
}

// ============================================================================
// RANGE GENERATOR INDEX
// ============================================================================

mod range_generator {
    use super::*;
    use opaldb::index::RangeIndex;

    fn range_index() -> (Arc<Table>, RangeIndex) {
        let table = Table::new(
            90,
            "system_range",
            vec![Column::new("x", opaldb::types::DataType::Int, false)],
            false,
        );
        let cols = mapped_columns(&table, &["x"]);
        let idx = RangeIndex::new(91, "RANGE_INDEX", &table, cols, 1, 10, 1).unwrap();
        (table, idx)
    }

    #[test]
    fn closed_range_inside_bounds() {
        let (_t, idx) = range_index();
        let s = session();
        let lo = Row::new(vec![Value::Int(3)]);
        let hi = Row::new(vec![Value::Int(7)]);
        let cursor = idx.find(&s, Some(&lo), Some(&hi)).unwrap();
        assert_eq!(collect_ids(cursor), vec![3, 4, 5, 6, 7]);
    }

    #[test]
    fn unbounded_scan_yields_full_sequence() {
        let (_t, idx) = range_index();
        let s = session();
        let cursor = idx.find(&s, None, None).unwrap();
        assert_eq!(collect_ids(cursor), (1..=10).collect::<Vec<_>>());
    }

    #[test]
    fn out_of_range_bounds_clamp() {
        let (_t, idx) = range_index();
        let s = session();
        let lo = Row::new(vec![Value::Int(-5)]);
        let hi = Row::new(vec![Value::Int(3)]);
        let cursor = idx.find(&s, Some(&lo), Some(&hi)).unwrap();
        assert_eq!(collect_ids(cursor), vec![1, 2, 3]);
    }

    #[test]
    fn generator_cost_is_always_one() {
        let (_t, idx) = range_index();
        let s = session();
        assert_eq!(idx.cost(&s, &[MASK_EQUALITY], None), 1.0);
        assert_eq!(idx.cost(&s, &[], None), 1.0);
    }

    #[test]
    fn extremal_lookup_returns_min_and_max() {
        let (_t, idx) = range_index();
        let s = session();
        let min = collect_ids(idx.find_first_or_last(&s, true).unwrap());
        let max = collect_ids(idx.find_first_or_last(&s, false).unwrap());
        assert_eq!(min, vec![1]);
        assert_eq!(max, vec![10]);
    }
}

// ============================================================================
// COST ORDERING
// ============================================================================

mod cost_ordering {
    use super::*;

    #[test]
    fn sort_matching_index_ranks_strictly_cheaper() {
        let table = people_table();
        let s = session();
        let asc = table
            .add_index(
                &s,
                "IX_ASC",
                11,
                mapped_columns(&table, &["id"]),
                IndexType::non_unique(false, false),
            )
            .unwrap();
        let mut desc_cols = vec![IndexColumn::new("id").descending()];
        IndexColumn::map_columns(&mut desc_cols, &table).unwrap();
        let desc = table
            .add_index(&s, "IX_DESC", 12, desc_cols, IndexType::non_unique(false, false))
            .unwrap();
        for i in 0..100 {
            table
                .add_row(&s, Row::new(vec![Value::Int(i), Value::Null]))
                .unwrap();
        }

        let id_ordinal = 0;
        let ascending_order = SortOrder::new(vec![(id_ordinal, false)]);
        let masks = [MASK_RANGE_START, 0];
        let matching = asc.cost(&s, &masks, Some(&ascending_order));
        let non_matching = desc.cost(&s, &masks, Some(&ascending_order));
        assert!(
            matching < non_matching,
            "order-matching index must be strictly cheaper: {} vs {}",
            matching,
            non_matching
        );

        let best = table.best_index(&s, &masks, Some(&ascending_order));
        assert_eq!(best.name(), "IX_ASC");
    }
}

// ============================================================================
// ROW COUNTS
// ============================================================================

#[test]
fn exact_and_approximate_row_counts_agree_after_quiesce() {
    let table = people_table();
    let s = session();
    let idx = table
        .add_index(
            &s,
            "IX",
            13,
            mapped_columns(&table, &["id"]),
            IndexType::non_unique(false, false),
        )
        .unwrap();
    for i in 0..64 {
        idx.add(&s, &int_row(i, i as i64, "r")).unwrap();
    }
    assert_eq!(idx.row_count(&s), 64);
    assert_eq!(idx.row_count_approximation(), 64);
    idx.remove(&s, &int_row(5, 5, "r")).unwrap();
    assert_eq!(idx.row_count(&s), 63);
}
