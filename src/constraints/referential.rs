//! REFERENTIAL (foreign key) constraints. The constraint is attached to
//! both ends of the relationship: mutations of the child table probe the
//! parent's unique index for the referenced key, and deletes on the parent
//! table look for dependent child rows, either refusing the delete
//! (RESTRICT) or removing the children too (CASCADE).
//!
//! Referential checks run after the triggering mutation (`is_before` is
//! false); the table undoes the mutation when the check fails. While a
//! cascade initiated by this constraint is running, the cascade's own
//! mutations are exempt from re-checking — the session carries the marker.

use super::{Constraint, ConstraintKind};
use crate::error::DbError;
use crate::index::Index;
use crate::rows::Row;
use crate::session::{Session, CANCEL_CHECK_INTERVAL};
use crate::table::Table;
use crate::types::Value;
use eyre::Result;
use hashbrown::HashSet;
use std::cmp::Ordering;
use std::sync::{Arc, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteAction {
    Restrict,
    Cascade,
}

#[derive(Debug)]
pub struct ReferentialConstraint {
    id: u32,
    name: String,
    table: Weak<Table>,
    columns: Vec<usize>,
    ref_table: Weak<Table>,
    ref_columns: Vec<usize>,
    ref_index: Weak<dyn Index>,
    delete_action: DeleteAction,
}

/// Clears the session's cascade marker even on an early error return.
struct CascadeGuard<'a>(&'a Session);

impl<'a> CascadeGuard<'a> {
    fn enter(session: &'a Session) -> Self {
        session.enter_cascade();
        Self(session)
    }
}

impl Drop for CascadeGuard<'_> {
    fn drop(&mut self) {
        self.0.leave_cascade();
    }
}

impl ReferentialConstraint {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: u32,
        name: impl Into<String>,
        table: &Arc<Table>,
        columns: Vec<usize>,
        ref_table: &Arc<Table>,
        ref_columns: Vec<usize>,
        ref_index: &Arc<dyn Index>,
        delete_action: DeleteAction,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            table: Arc::downgrade(table),
            columns,
            ref_table: Arc::downgrade(ref_table),
            ref_columns,
            ref_index: Arc::downgrade(ref_index),
            delete_action,
        }
    }

    pub fn delete_action(&self) -> DeleteAction {
        self.delete_action
    }

    fn violation(&self, detail: String) -> eyre::Report {
        DbError::ReferentialViolation {
            constraint: self.name.clone(),
            detail,
        }
        .into()
    }

    /// Builds a parent-table search row carrying the child's key values at
    /// the referenced column ordinals.
    fn parent_probe(&self, parent: &Table, child_row: &Row) -> Row {
        let mut values = vec![Value::Null; parent.columns().len()];
        for (child_ord, parent_ord) in self.columns.iter().zip(self.ref_columns.iter()) {
            if let Some(value) = child_row.value(*child_ord) {
                values[*parent_ord] = value.clone();
            }
        }
        Row::new(values)
    }

    fn key_is_null(&self, row: &Row) -> bool {
        self.columns
            .iter()
            .any(|&c| row.value(c).map(|v| v.is_null()).unwrap_or(true))
    }

    /// Child-side check: the referenced parent row must exist.
    fn check_child_row(&self, session: &Session, parent: &Table, row: &Row) -> Result<()> {
        if self.key_is_null(row) {
            // A NULL anywhere in the key exempts the row (MATCH SIMPLE).
            return Ok(());
        }
        let Some(index) = self.ref_index.upgrade() else {
            return Ok(());
        };
        let probe = self.parent_probe(parent, row);
        let mut cursor = index.find(session, Some(&probe), Some(&probe))?;
        if !cursor.next()? {
            return Err(self.violation(format!(
                "no parent row in table '{}' for key {}",
                parent.name(),
                describe_key(row, &self.columns)
            )));
        }
        Ok(())
    }

    fn child_matches(&self, child_row: &Row, parent_row: &Row) -> bool {
        self.columns
            .iter()
            .zip(self.ref_columns.iter())
            .all(|(&child_ord, &parent_ord)| {
                match (child_row.value(child_ord), parent_row.value(parent_ord)) {
                    (Some(c), Some(p)) if !c.is_null() && !p.is_null() => {
                        c.compare(p) == Ordering::Equal
                    }
                    _ => false,
                }
            })
    }

    fn dependent_children(
        &self,
        session: &Session,
        child: &Table,
        parent_row: &Row,
    ) -> Result<Vec<Row>> {
        let mut cursor = child.scan_index().find(session, None, None)?;
        let mut matches = Vec::new();
        let mut scanned: u64 = 0;
        while cursor.next()? {
            scanned += 1;
            if scanned % CANCEL_CHECK_INTERVAL == 0 {
                session.check_canceled()?;
            }
            let row = cursor
                .row()
                .ok_or_else(|| eyre::eyre!("scan cursor yielded no row"))?;
            if self.child_matches(row, parent_row) {
                matches.push(row.clone());
            }
        }
        Ok(matches)
    }

    /// Parent-side check for deletes and key-changing updates.
    fn check_parent_row(
        &self,
        session: &Session,
        child: &Arc<Table>,
        old_row: &Row,
        new_row: Option<&Row>,
    ) -> Result<()> {
        if let Some(new_row) = new_row {
            let unchanged = self.ref_columns.iter().all(|&ord| {
                match (old_row.value(ord), new_row.value(ord)) {
                    (Some(a), Some(b)) => a.compare(b) == Ordering::Equal,
                    _ => false,
                }
            });
            if unchanged {
                return Ok(());
            }
        }
        let children = self.dependent_children(session, child, old_row)?;
        if children.is_empty() {
            return Ok(());
        }
        match (self.delete_action, new_row) {
            (DeleteAction::Cascade, None) => {
                let _guard = CascadeGuard::enter(session);
                log::debug!(
                    "cascading delete of {} child rows via constraint '{}'",
                    children.len(),
                    self.name
                );
                for row in &children {
                    child.remove_row(session, row)?;
                }
                Ok(())
            }
            _ => Err(self.violation(format!(
                "{} dependent rows in table '{}'",
                children.len(),
                child.name()
            ))),
        }
    }
}

fn describe_key(row: &Row, columns: &[usize]) -> String {
    let mut out = String::from("(");
    for (i, &ord) in columns.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        match row.value(ord) {
            Some(v) => out.push_str(&v.to_string()),
            None => out.push('?'),
        }
    }
    out.push(')');
    out
}

impl Constraint for ReferentialConstraint {
    fn id(&self) -> u32 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ConstraintKind {
        ConstraintKind::Referential
    }

    fn table(&self) -> Option<Arc<Table>> {
        self.table.upgrade()
    }

    fn is_before(&self) -> bool {
        false
    }

    fn check_row(
        &self,
        session: &Session,
        table: &Arc<Table>,
        old_row: Option<&Row>,
        new_row: Option<&Row>,
    ) -> Result<()> {
        if session.in_cascade() {
            // A cascade this constraint started is doing the mutating.
            return Ok(());
        }
        let (Some(child), Some(parent)) = (self.table.upgrade(), self.ref_table.upgrade()) else {
            return Ok(());
        };
        if table.id() == child.id() {
            if let Some(row) = new_row {
                self.check_child_row(session, &parent, row)?;
            }
        }
        if table.id() == parent.id() {
            if let Some(old) = old_row {
                self.check_parent_row(session, &child, old, new_row)?;
            }
        }
        Ok(())
    }

    fn check_existing_data(&self, session: &Session) -> Result<()> {
        if session.database_is_starting() {
            return Ok(());
        }
        let (Some(child), Some(parent)) = (self.table.upgrade(), self.ref_table.upgrade()) else {
            return Ok(());
        };
        let mut cursor = child.scan_index().find(session, None, None)?;
        let mut scanned: u64 = 0;
        while cursor.next()? {
            scanned += 1;
            if scanned % CANCEL_CHECK_INTERVAL == 0 {
                session.check_canceled()?;
            }
            let row = cursor
                .row()
                .ok_or_else(|| eyre::eyre!("scan cursor yielded no row"))?;
            self.check_child_row(session, &parent, row)?;
        }
        Ok(())
    }

    fn referenced_columns(&self, table: &Table) -> HashSet<usize> {
        let mut out = HashSet::new();
        if self
            .table
            .upgrade()
            .map(|t| t.id() == table.id())
            .unwrap_or(false)
        {
            out.extend(self.columns.iter().copied());
        }
        if self
            .ref_table
            .upgrade()
            .map(|t| t.id() == table.id())
            .unwrap_or(false)
        {
            out.extend(self.ref_columns.iter().copied());
        }
        out
    }

    fn unique_index(&self) -> Option<Arc<dyn Index>> {
        self.ref_index.upgrade()
    }
}
