//! # Tables
//!
//! A `Table` owns its columns, its constraints, and its indexes. Slot 0 of
//! the index list is always the scan index, a tree index with an empty key
//! that keeps the rows in primary storage order; every secondary index
//! holds the same rows under its own key shape. Indexes keep only a weak
//! back-reference to the table, so destruction order is always
//! constraints, then indexes, then the table itself.
//!
//! ## Row Mutation Protocol
//!
//! `add_row`, `remove_row` and `update_row` drive the constraint protocol:
//!
//! 1. fire before-constraints (CHECK and unique kinds) — a failure here
//!    prevents any index mutation for the row;
//! 2. apply the mutation to every index, undoing the indexes already
//!    touched when a later one fails (typically with `DuplicateKey`);
//! 3. fire after-constraints (referential kinds), undoing the mutation when
//!    one fails.
//!
//! ## Locking
//!
//! Individual indexes synchronize themselves, so plain row operations need
//! no table lock. Structural changes (add/drop index or constraint,
//! truncate, drop) take the exclusive table lock first; DDL commands
//! acquire it before touching the index list.

use crate::constraints::Constraint;
use crate::error::DbError;
use crate::index::{HashIndex, Index, IndexColumn, IndexType, SortOrder, TreeIndex};
use crate::rows::{Row, POS_UNSET};
use crate::session::{Session, CANCEL_CHECK_INTERVAL};
use crate::types::DataType;
use eyre::{bail, ensure, Result, WrapErr};
use parking_lot::{RwLock, RwLockWriteGuard};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    name: String,
    data_type: DataType,
    nullable: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }
}

#[derive(Debug)]
pub struct Table {
    id: u32,
    name: RwLock<String>,
    columns: Vec<Column>,
    indexes: RwLock<Vec<Arc<dyn Index>>>,
    constraints: RwLock<Vec<Arc<dyn Constraint>>>,
    next_pos: AtomicU64,
    structural_lock: RwLock<()>,
    persist_indexes: bool,
}

impl Table {
    pub fn new(
        id: u32,
        name: impl Into<String>,
        columns: Vec<Column>,
        persist_indexes: bool,
    ) -> Arc<Self> {
        let name = name.into();
        let table = Arc::new(Self {
            id,
            name: RwLock::new(name),
            columns,
            indexes: RwLock::new(Vec::new()),
            constraints: RwLock::new(Vec::new()),
            next_pos: AtomicU64::new(0),
            structural_lock: RwLock::new(()),
            persist_indexes,
        });
        let scan = TreeIndex::new_scan(
            id,
            format!("SCAN_INDEX_{}", id),
            &table,
            persist_indexes,
        );
        table.indexes.write().push(Arc::new(scan));
        table
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> String {
        self.name.read().clone()
    }

    pub fn rename(&self, new_name: impl Into<String>) {
        *self.name.write() = new_name.into();
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_ordinal(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name() == name)
    }

    pub fn column(&self, ordinal: usize) -> Option<&Column> {
        self.columns.get(ordinal)
    }

    pub fn persist_indexes(&self) -> bool {
        self.persist_indexes
    }

    /// Exclusive table lock for structural DDL. Held for the duration of
    /// the returned guard.
    pub fn lock_exclusive(&self) -> RwLockWriteGuard<'_, ()> {
        self.structural_lock.write()
    }

    pub fn scan_index(&self) -> Arc<dyn Index> {
        self.indexes.read()[0].clone()
    }

    pub fn indexes(&self) -> Vec<Arc<dyn Index>> {
        self.indexes.read().clone()
    }

    pub fn find_index(&self, name: &str) -> Option<Arc<dyn Index>> {
        self.indexes
            .read()
            .iter()
            .find(|i| i.name() == name)
            .cloned()
    }

    pub fn find_primary_key(&self) -> Option<Arc<dyn Index>> {
        self.indexes
            .read()
            .iter()
            .find(|i| i.index_type().is_primary_key())
            .cloned()
    }

    pub fn constraints(&self) -> Vec<Arc<dyn Constraint>> {
        self.constraints.read().clone()
    }

    pub fn find_constraint(&self, name: &str) -> Option<Arc<dyn Constraint>> {
        self.constraints
            .read()
            .iter()
            .find(|c| c.name() == name)
            .cloned()
    }

    pub fn add_constraint(&self, constraint: Arc<dyn Constraint>) {
        self.constraints.write().push(constraint);
    }

    pub fn remove_constraint(&self, name: &str) {
        self.constraints.write().retain(|c| c.name() != name);
    }

    pub fn row_count(&self, session: &Session) -> u64 {
        self.scan_index().row_count(session)
    }

    pub fn row_count_approximation(&self) -> u64 {
        self.scan_index().row_count_approximation()
    }

    /// Creates a secondary index, feeding it every existing row. A failure
    /// during population (typically a duplicate key for a new unique index)
    /// closes the half-built index and leaves the table unchanged.
    pub fn add_index(
        self: &Arc<Self>,
        session: &Session,
        name: impl Into<String>,
        id: u32,
        columns: Vec<IndexColumn>,
        index_type: IndexType,
    ) -> Result<Arc<dyn Index>> {
        let name = name.into();
        if index_type.is_primary_key() && self.find_primary_key().is_some() {
            return Err(DbError::ObjectAlreadyExists(format!(
                "primary key on table '{}'",
                self.name()
            ))
            .into());
        }
        let index: Arc<dyn Index> = if index_type.is_hash() {
            Arc::new(HashIndex::new(id, name, self, columns, index_type)?)
        } else {
            Arc::new(TreeIndex::new(id, name, self, columns, index_type)?)
        };
        if let Err(e) = self.populate_index(session, index.as_ref()) {
            let _ = index.close(session);
            return Err(e);
        }
        self.indexes.write().push(index.clone());
        log::debug!(
            "created index '{}' on table '{}' ({} rows)",
            index.name(),
            self.name(),
            index.row_count_approximation()
        );
        Ok(index)
    }

    fn populate_index(&self, session: &Session, index: &dyn Index) -> Result<()> {
        let mut cursor = self.scan_index().find(session, None, None)?;
        let mut scanned: u64 = 0;
        while cursor.next()? {
            scanned += 1;
            if scanned % CANCEL_CHECK_INTERVAL == 0 {
                session.check_canceled()?;
            }
            let row = cursor
                .row()
                .ok_or_else(|| eyre::eyre!("scan cursor yielded no row"))?;
            index
                .add(session, row)
                .wrap_err_with(|| format!("while building index '{}'", index.name()))?;
        }
        Ok(())
    }

    /// Drops a secondary index. An index still backing a constraint cannot
    /// be removed; drop the constraint first.
    pub fn remove_index(&self, session: &Session, name: &str) -> Result<()> {
        ensure!(
            !self
                .constraints
                .read()
                .iter()
                .any(|c| c.unique_index().map(|i| i.name() == name).unwrap_or(false)),
            "index '{}' belongs to a constraint",
            name
        );
        let mut indexes = self.indexes.write();
        let pos = indexes
            .iter()
            .position(|i| i.name() == name)
            .ok_or_else(|| DbError::ObjectNotFound(name.to_string()))?;
        ensure!(pos != 0, "cannot drop the scan index of table '{}'", self.name());
        let index = indexes.remove(pos);
        drop(indexes);
        index.close(session)
    }

    fn validate_row(&self, row: &Row) -> Result<()> {
        ensure!(
            row.column_count() == self.columns.len(),
            "row has {} values but table '{}' has {} columns",
            row.column_count(),
            self.name(),
            self.columns.len()
        );
        for (ordinal, column) in self.columns.iter().enumerate() {
            if !column.is_nullable() {
                let is_null = row.value(ordinal).map(|v| v.is_null()).unwrap_or(true);
                if is_null {
                    bail!(
                        "NULL not allowed for column '{}' in table '{}'",
                        column.name(),
                        self.name()
                    );
                }
            }
        }
        Ok(())
    }

    fn fire_constraints(
        self: &Arc<Self>,
        session: &Session,
        old_row: Option<&Row>,
        new_row: Option<&Row>,
        before: bool,
    ) -> Result<()> {
        let constraints = self.constraints.read().clone();
        for constraint in constraints {
            if constraint.is_before() == before {
                constraint.check_row(session, self, old_row, new_row)?;
            }
        }
        Ok(())
    }

    pub fn add_row(self: &Arc<Self>, session: &Session, mut row: Row) -> Result<Row> {
        self.validate_row(&row)?;
        if row.pos() == POS_UNSET {
            row.set_pos(self.next_pos.fetch_add(1, Ordering::Relaxed));
        }
        self.fire_constraints(session, None, Some(&row), true)?;
        let indexes = self.indexes();
        let mut added: Vec<Arc<dyn Index>> = Vec::new();
        for index in &indexes {
            if let Err(e) = index.add(session, &row) {
                for done in added.iter().rev() {
                    let _ = done.remove(session, &row);
                }
                return Err(e.wrap_err(format!("INSERT into table '{}'", self.name())));
            }
            added.push(index.clone());
        }
        if let Err(e) = self.fire_constraints(session, None, Some(&row), false) {
            for done in added.iter().rev() {
                let _ = done.remove(session, &row);
            }
            return Err(e);
        }
        Ok(row)
    }

    pub fn remove_row(self: &Arc<Self>, session: &Session, row: &Row) -> Result<()> {
        self.fire_constraints(session, Some(row), None, true)?;
        let indexes = self.indexes();
        let mut removed: Vec<Arc<dyn Index>> = Vec::new();
        for index in &indexes {
            if let Err(e) = index.remove(session, row) {
                for done in removed.iter().rev() {
                    let _ = done.add(session, row);
                }
                return Err(e.wrap_err(format!("DELETE from table '{}'", self.name())));
            }
            removed.push(index.clone());
        }
        if let Err(e) = self.fire_constraints(session, Some(row), None, false) {
            for done in removed.iter().rev() {
                let _ = done.add(session, row);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Replaces a stored row wholesale. The new row inherits the old row's
    /// physical position, which is what lets unique indexes accept the
    /// re-insert of an unchanged key.
    pub fn update_row(self: &Arc<Self>, session: &Session, old: &Row, mut new: Row) -> Result<Row> {
        self.validate_row(&new)?;
        new.set_pos(old.pos());
        self.fire_constraints(session, Some(old), Some(&new), true)?;
        let indexes = self.indexes();
        let mut updated: Vec<Arc<dyn Index>> = Vec::new();
        for index in &indexes {
            let result = index
                .remove(session, old)
                .and_then(|_| index.add(session, &new));
            if let Err(e) = result {
                let _ = index.remove(session, &new);
                let _ = index.add(session, old);
                for done in updated.iter().rev() {
                    let _ = done.remove(session, &new);
                    let _ = done.add(session, old);
                }
                return Err(e.wrap_err(format!("UPDATE of table '{}'", self.name())));
            }
            updated.push(index.clone());
        }
        if let Err(e) = self.fire_constraints(session, Some(old), Some(&new), false) {
            for done in updated.iter().rev() {
                let _ = done.remove(session, &new);
                let _ = done.add(session, old);
            }
            return Err(e);
        }
        Ok(new)
    }

    pub fn truncate(&self, session: &Session) -> Result<()> {
        let _guard = self.lock_exclusive();
        for index in self.indexes() {
            index.truncate(session)?;
        }
        Ok(())
    }

    /// Ranks the table's indexes by planner cost for a query shape and
    /// returns the cheapest. The scan index is the fallback of last resort.
    pub fn best_index(
        &self,
        session: &Session,
        masks: &[u8],
        sort_order: Option<&SortOrder>,
    ) -> Arc<dyn Index> {
        let indexes = self.indexes.read();
        let mut best = indexes[0].clone();
        let mut best_cost = best.cost(session, masks, sort_order);
        for index in indexes.iter().skip(1) {
            let cost = index.cost(session, masks, sort_order);
            if cost < best_cost {
                best = index.clone();
                best_cost = cost;
            }
        }
        best
    }

    /// Closes all indexes. Constraints must already be detached and the
    /// caller holds the exclusive table lock.
    pub fn close(&self, session: &Session) -> Result<()> {
        for index in self.indexes().iter().rev() {
            index.close(session)?;
        }
        self.indexes.write().clear();
        Ok(())
    }
}
