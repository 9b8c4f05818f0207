//! DROP TABLE command. Supports statement chaining (`DROP TABLE a, b`) the
//! way the statement layer builds it: each parsed name becomes a command
//! linked to the previous one, and the whole chain is prepared before
//! anything is executed, so a missing name aborts the statement as a unit.

use crate::constraints::{Constraint, ConstraintKind};
use crate::engine::Database;
use crate::index::Index;
use crate::error::DbError;
use crate::session::{Right, Session};
use eyre::{bail, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropAction {
    Restrict,
    Cascade,
}

pub struct DropTable {
    table_name: String,
    if_exists: bool,
    drop_action: DropAction,
    next: Option<Box<DropTable>>,
}

impl DropTable {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            if_exists: false,
            drop_action: DropAction::Restrict,
            next: None,
        }
    }

    pub fn if_exists(mut self) -> Self {
        self.if_exists = true;
        if let Some(next) = &mut self.next {
            next.set_if_exists();
        }
        self
    }

    fn set_if_exists(&mut self) {
        self.if_exists = true;
        if let Some(next) = &mut self.next {
            next.set_if_exists();
        }
    }

    pub fn cascade(mut self) -> Self {
        self.drop_action = DropAction::Cascade;
        if let Some(next) = &mut self.next {
            next.set_cascade();
        }
        self
    }

    fn set_cascade(&mut self) {
        self.drop_action = DropAction::Cascade;
        if let Some(next) = &mut self.next {
            next.set_cascade();
        }
    }

    /// Chains another drop onto this statement.
    pub fn add_next(&mut self, drop: DropTable) {
        match &mut self.next {
            Some(next) => next.add_next(drop),
            None => self.next = Some(Box::new(drop)),
        }
    }

    fn prepare(&self, session: &Session, db: &Database) -> Result<()> {
        let catalog = db.catalog();
        match catalog.find_table(&self.table_name) {
            None => {
                if !self.if_exists {
                    return Err(DbError::ObjectNotFound(self.table_name.clone()).into());
                }
            }
            Some(table) => {
                session.user().check_right(&table.name(), Right::ALL)?;
                if self.drop_action == DropAction::Restrict {
                    // Referential constraints whose child is another table
                    // block the drop.
                    for constraint in table.constraints() {
                        if constraint.kind() == ConstraintKind::Referential {
                            if let Some(child) = constraint.table() {
                                if child.id() != table.id() {
                                    bail!(
                                        "cannot drop table '{}': referenced by constraint '{}' of table '{}'",
                                        table.name(),
                                        constraint.name(),
                                        child.name()
                                    );
                                }
                            }
                        }
                    }
                }
            }
        }
        if let Some(next) = &self.next {
            next.prepare(session, db)?;
        }
        Ok(())
    }

    fn execute(&self, session: &Session, db: &Database) -> Result<()> {
        // Look the table up again: a chained statement or a dependent drop
        // may already have removed it.
        let mut catalog = db.catalog_mut();
        if let Some(table) = catalog.find_table(&self.table_name) {
            let _guard = table.lock_exclusive();
            // Constraints first (both ends), indexes second, table last.
            for constraint in table.constraints() {
                if let Some(other_end) = constraint
                    .unique_index()
                    .and_then(|i| i.table())
                    .filter(|t| t.id() != table.id())
                {
                    other_end.remove_constraint(constraint.name());
                }
                if let Some(child) = constraint.table().filter(|t| t.id() != table.id()) {
                    child.remove_constraint(constraint.name());
                }
                table.remove_constraint(constraint.name());
                let _ = catalog.remove_constraint(constraint.name());
                db.remove_meta(session, constraint.id())?;
            }
            for index in table.indexes() {
                if !index.index_type().is_scan() {
                    let _ = catalog.remove_index(index.name());
                    db.remove_meta(session, index.id())?;
                }
            }
            table.close(session)?;
            catalog.remove_table(&self.table_name)?;
            db.remove_meta(session, table.id())?;
            log::debug!("dropped table '{}'", self.table_name);
        }
        drop(catalog);
        if let Some(next) = &self.next {
            next.execute(session, db)?;
        }
        Ok(())
    }

    pub fn update(self, session: &Session, db: &Database) -> Result<u64> {
        self.prepare(session, db)?;
        self.execute(session, db)?;
        Ok(0)
    }
}
