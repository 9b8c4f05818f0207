//! # Range Generator Index
//!
//! A virtual index over an arithmetic sequence `min, min+step, ..` up to
//! `max`. It stores nothing and never touches disk, so its planner cost is
//! a flat 1 — the cheapest possible access path. Search bounds are clamped
//! into the generator's range; a bound value that cannot be read as an
//! integer silently falls back to the generator's own bound. That
//! permissive coercion is long-standing behavior that callers rely on, so
//! it is kept, but each fallback is surfaced with a `warn!` so caller bugs
//! are no longer invisible.
//!
//! All mutating operations are unsupported and say so; a pseudo-index that
//! silently ignored `add` would hide real corruption.

use super::{Cursor, Index, IndexColumn, IndexType, SortOrder};
use crate::error::DbError;
use crate::rows::Row;
use crate::session::Session;
use crate::table::Table;
use eyre::{ensure, Result};
use std::sync::{Arc, Weak};

#[derive(Debug)]
pub struct RangeIndex {
    id: u32,
    name: String,
    index_type: IndexType,
    columns: Vec<IndexColumn>,
    table: Weak<Table>,
    min: i64,
    max: i64,
    step: i64,
}

impl RangeIndex {
    pub fn new(
        id: u32,
        name: impl Into<String>,
        table: &Arc<Table>,
        columns: Vec<IndexColumn>,
        min: i64,
        max: i64,
        step: i64,
    ) -> Result<Self> {
        ensure!(step != 0, "range generator step must not be zero");
        ensure!(step > 0, "descending range generators are not supported");
        Ok(Self {
            id,
            name: name.into(),
            index_type: IndexType::non_unique(false, false),
            columns,
            table: Arc::downgrade(table),
            min,
            max,
            step,
        })
    }

    pub fn min(&self) -> i64 {
        self.min
    }

    pub fn max(&self) -> i64 {
        self.max
    }

    pub fn step(&self) -> i64 {
        self.step
    }

    /// Last value the generator actually produces (`max` rounded down onto
    /// the step grid).
    fn last_value(&self) -> i64 {
        if self.max < self.min {
            return self.max;
        }
        self.min + ((self.max - self.min) / self.step) * self.step
    }

    /// Reads an integer bound from a search row, falling back to `default`
    /// when the bound is absent or unreadable.
    fn bound_value(&self, bound: Option<&Row>, default: i64) -> i64 {
        match bound.and_then(|r| r.value(0)) {
            None => default,
            Some(value) => match value.as_int() {
                Some(v) => v,
                None => {
                    log::warn!(
                        "range index '{}': unreadable bound {} replaced by generator bound {}",
                        self.name,
                        value,
                        default
                    );
                    default
                }
            },
        }
    }

    fn unsupported(&self) -> eyre::Report {
        DbError::unsupported(format!("mutation of range index '{}'", self.name)).into()
    }
}

impl Index for RangeIndex {
    fn id(&self) -> u32 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn index_type(&self) -> IndexType {
        self.index_type
    }

    fn columns(&self) -> &[IndexColumn] {
        &self.columns
    }

    fn table(&self) -> Option<Arc<Table>> {
        self.table.upgrade()
    }

    fn add(&self, _session: &Session, _row: &Row) -> Result<()> {
        Err(self.unsupported())
    }

    fn remove(&self, _session: &Session, _row: &Row) -> Result<()> {
        Err(self.unsupported())
    }

    fn find(
        &self,
        _session: &Session,
        first: Option<&Row>,
        last: Option<&Row>,
    ) -> Result<Box<dyn Cursor>> {
        let start = self.bound_value(first, self.min).max(self.min);
        let end = self.bound_value(last, self.max).min(self.max);
        Ok(Box::new(RangeCursor::new(start, end, self.step)))
    }

    fn can_get_first_or_last(&self) -> bool {
        true
    }

    fn find_first_or_last(&self, _session: &Session, first: bool) -> Result<Box<dyn Cursor>> {
        let value = if first { self.min } else { self.last_value() };
        Ok(Box::new(RangeCursor::new(value, value, 1)))
    }

    fn cost(&self, _session: &Session, _masks: &[u8], _sort_order: Option<&SortOrder>) -> f64 {
        1.0
    }

    fn row_count(&self, _session: &Session) -> u64 {
        self.row_count_approximation()
    }

    fn row_count_approximation(&self) -> u64 {
        if self.max < self.min {
            0
        } else {
            ((self.max - self.min) / self.step + 1) as u64
        }
    }

    fn truncate(&self, _session: &Session) -> Result<()> {
        Err(self.unsupported())
    }

    fn rebuild(&self, _session: &Session) -> Result<()> {
        // Nothing is stored, so there is nothing to rebuild.
        Ok(())
    }

    fn check_rename(&self) -> Result<()> {
        Err(self.unsupported())
    }

    fn close(&self, _session: &Session) -> Result<()> {
        Ok(())
    }
}

/// Cursor producing the generator values lazily; each step materializes
/// exactly one single-column row.
#[derive(Debug)]
struct RangeCursor {
    current: i64,
    end: i64,
    step: i64,
    started: bool,
    row: Option<Row>,
}

impl RangeCursor {
    fn new(start: i64, end: i64, step: i64) -> Self {
        Self {
            current: start,
            end,
            step,
            started: false,
            row: None,
        }
    }
}

impl Cursor for RangeCursor {
    fn next(&mut self) -> Result<bool> {
        if self.started {
            self.current = self.current.saturating_add(self.step);
        } else {
            self.started = true;
        }
        if self.current <= self.end {
            self.row = Some(Row::with_pos(
                self.current as u64,
                vec![crate::types::Value::Int(self.current)],
            ));
            Ok(true)
        } else {
            self.row = None;
            Ok(false)
        }
    }

    fn row(&self) -> Option<&Row> {
        self.row.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SessionKind, User};
    use crate::table::{Column, Table};
    use crate::types::{DataType, Value};

    fn setup() -> (Arc<Table>, RangeIndex, Session) {
        let table = Table::new(
            99,
            "system_range",
            vec![Column::new("x", DataType::Int, false)],
            false,
        );
        let mut cols = vec![IndexColumn::new("x")];
        IndexColumn::map_columns(&mut cols, &table).unwrap();
        let idx = RangeIndex::new(30, "RANGE_INDEX", &table, cols, 1, 10, 1).unwrap();
        let session = Session::new(1, SessionKind::User, User::new("t", true));
        (table, idx, session)
    }

    fn collect(mut cursor: Box<dyn Cursor>) -> Vec<i64> {
        let mut out = Vec::new();
        while cursor.next().unwrap() {
            if let Some(row) = cursor.row() {
                if let Some(Value::Int(v)) = row.value(0) {
                    out.push(*v);
                }
            }
        }
        out
    }

    #[test]
    fn full_scan_yields_whole_sequence() {
        let (_t, idx, s) = setup();
        let cursor = idx.find(&s, None, None).unwrap();
        assert_eq!(collect(cursor), (1..=10).collect::<Vec<_>>());
    }

    #[test]
    fn bounds_are_clamped_into_the_generator_range() {
        let (_t, idx, s) = setup();
        let lo = Row::new(vec![Value::Int(-5)]);
        let hi = Row::new(vec![Value::Int(3)]);
        let cursor = idx.find(&s, Some(&lo), Some(&hi)).unwrap();
        assert_eq!(collect(cursor), vec![1, 2, 3]);
    }

    #[test]
    fn inner_range_is_closed_on_both_sides() {
        let (_t, idx, s) = setup();
        let lo = Row::new(vec![Value::Int(3)]);
        let hi = Row::new(vec![Value::Int(7)]);
        let cursor = idx.find(&s, Some(&lo), Some(&hi)).unwrap();
        assert_eq!(collect(cursor), vec![3, 4, 5, 6, 7]);
    }

    #[test]
    fn unreadable_bound_falls_back_to_generator_bound() {
        let (_t, idx, s) = setup();
        let lo = Row::new(vec![Value::Text("not a number".into())]);
        let hi = Row::new(vec![Value::Int(2)]);
        let cursor = idx.find(&s, Some(&lo), Some(&hi)).unwrap();
        assert_eq!(collect(cursor), vec![1, 2]);
    }

    #[test]
    fn mutation_is_unsupported() {
        let (_t, idx, s) = setup();
        let row = Row::with_pos(1, vec![Value::Int(1)]);
        for result in [
            idx.add(&s, &row),
            idx.remove(&s, &row),
            idx.truncate(&s),
            idx.check_rename(),
        ] {
            let err = result.unwrap_err();
            assert!(matches!(
                crate::error::db_error(&err),
                Some(DbError::Unsupported(_))
            ));
        }
    }

    #[test]
    fn row_count_matches_generated_values() {
        let (_t, idx, s) = setup();
        assert_eq!(idx.row_count(&s), 10);
        assert_eq!(idx.row_count_approximation(), 10);
    }
}
