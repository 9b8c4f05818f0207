//! # Row Representation
//!
//! A `Row` is an immutable ordered sequence of values plus a stable physical
//! position. The position is assigned by the owning table when the row is
//! first stored and never changes; updates replace the whole row, passing
//! the old and new rows together through the constraint hooks.
//!
//! A search bound is an ordinary `Row` that may carry fewer values than the
//! index has columns; missing trailing values leave that part of the bound
//! open.

use crate::types::Value;

/// Sentinel for rows that have not been assigned a physical position yet.
pub const POS_UNSET: u64 = u64::MAX;

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pos: u64,
    values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self {
            pos: POS_UNSET,
            values,
        }
    }

    pub fn with_pos(pos: u64, values: Vec<Value>) -> Self {
        Self { pos, values }
    }

    pub fn pos(&self) -> u64 {
        self.pos
    }

    /// Assigns the physical position. Called once by the owning table when
    /// the row is stored.
    pub fn set_pos(&mut self, pos: u64) {
        self.pos = pos;
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn value(&self, column: usize) -> Option<&Value> {
        self.values.get(column)
    }

    pub fn column_count(&self) -> usize {
        self.values.len()
    }

    /// True when both rows refer to the same stored row. Unique indexes use
    /// this to permit re-inserting a row that is logically being replaced.
    pub fn same_physical_row(&self, other: &Row) -> bool {
        self.pos != POS_UNSET && self.pos == other.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_pos_never_matches() {
        let a = Row::new(vec![Value::Int(1)]);
        let b = Row::new(vec![Value::Int(1)]);
        assert!(!a.same_physical_row(&b));
    }

    #[test]
    fn same_pos_matches() {
        let a = Row::with_pos(7, vec![Value::Int(1)]);
        let b = Row::with_pos(7, vec![Value::Int(2)]);
        assert!(a.same_physical_row(&b));
    }
}
