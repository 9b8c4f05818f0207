//! ALTER TABLE commands: ADD CONSTRAINT, DROP CONSTRAINT, RENAME.

use crate::constraints::{
    CheckConstraint, Constraint, ConstraintKind, DeleteAction, ReferentialConstraint,
    UniqueConstraint,
};
use crate::engine::Database;
use crate::error::DbError;
use crate::expr::Expression;
use crate::index::{Index, IndexColumn, IndexType};
use crate::schema::PREFIX_INDEX;
use crate::session::{Right, Session};
use crate::table::Table;
use eyre::{bail, Result};
use std::sync::Arc;

pub enum AddConstraintKind {
    Check {
        expr: Box<dyn Expression>,
    },
    Unique {
        columns: Vec<String>,
    },
    PrimaryKey {
        columns: Vec<String>,
        hash: bool,
    },
    Referential {
        columns: Vec<String>,
        ref_table: String,
        ref_columns: Vec<String>,
        delete_action: DeleteAction,
    },
}

pub struct AlterTableAddConstraint {
    table_name: String,
    constraint_name: Option<String>,
    kind: AddConstraintKind,
    check_existing: bool,
}

impl AlterTableAddConstraint {
    pub fn new(table_name: impl Into<String>, kind: AddConstraintKind) -> Self {
        Self {
            table_name: table_name.into(),
            constraint_name: None,
            kind,
            check_existing: true,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.constraint_name = Some(name.into());
        self
    }

    /// NOCHECK: accept existing rows without validating them.
    pub fn no_check(mut self) -> Self {
        self.check_existing = false;
        self
    }

    fn resolve_columns(table: &Table, names: &[String]) -> Result<Vec<usize>> {
        names
            .iter()
            .map(|name| {
                table.column_ordinal(name).ok_or_else(|| {
                    DbError::ObjectNotFound(format!(
                        "column '{}' in table '{}'",
                        name,
                        table.name()
                    ))
                    .into()
                })
            })
            .collect()
    }

    /// Finds a unique index on the parent table whose key is exactly the
    /// referenced columns, in order.
    fn find_referenced_index(
        parent: &Arc<Table>,
        ref_ordinals: &[usize],
    ) -> Option<Arc<dyn Index>> {
        parent.indexes().into_iter().find(|index| {
            let columns = index.columns();
            index.index_type().is_unique()
                && columns.len() == ref_ordinals.len()
                && columns
                    .iter()
                    .zip(ref_ordinals.iter())
                    .all(|(ic, &ord)| ic.column() == Some(ord))
        })
    }

    pub fn update(self, session: &Session, db: &Database) -> Result<u64> {
        let mut catalog = db.catalog_mut();
        let Some(table) = catalog.find_table(&self.table_name) else {
            return Err(DbError::ObjectNotFound(self.table_name.clone()).into());
        };
        session.user().check_right(&table.name(), Right::ALL)?;
        let _guard = table.lock_exclusive();
        let id = db.allocate_object_id();
        let name = match &self.constraint_name {
            Some(name) => {
                if catalog.find_constraint(name).is_some() {
                    return Err(DbError::ObjectAlreadyExists(name.clone()).into());
                }
                name.clone()
            }
            None => catalog.unique_constraint_name("CONSTRAINT_"),
        };

        let constraint: Arc<dyn Constraint> = match self.kind {
            AddConstraintKind::Check { expr } => {
                let constraint = Arc::new(CheckConstraint::new(id, &name, &table, expr));
                if self.check_existing {
                    constraint.check_existing_data(session)?;
                }
                constraint
            }
            AddConstraintKind::Unique { columns } => {
                let ordinals = Self::resolve_columns(&table, &columns)?;
                let index = Self::create_backing_index(
                    session,
                    db,
                    &mut catalog,
                    &table,
                    &columns,
                    IndexType::unique(table.persist_indexes(), false),
                )?;
                Arc::new(UniqueConstraint::new(
                    id,
                    &name,
                    ConstraintKind::Unique,
                    &table,
                    &index,
                    ordinals,
                ))
            }
            AddConstraintKind::PrimaryKey { columns, hash } => {
                let ordinals = Self::resolve_columns(&table, &columns)?;
                let index = Self::create_backing_index(
                    session,
                    db,
                    &mut catalog,
                    &table,
                    &columns,
                    IndexType::primary_key(table.persist_indexes(), hash),
                )?;
                Arc::new(UniqueConstraint::new(
                    id,
                    &name,
                    ConstraintKind::PrimaryKey,
                    &table,
                    &index,
                    ordinals,
                ))
            }
            AddConstraintKind::Referential {
                columns,
                ref_table,
                ref_columns,
                delete_action,
            } => {
                let Some(parent) = catalog.find_table(&ref_table) else {
                    return Err(DbError::ObjectNotFound(ref_table.clone()).into());
                };
                session.user().check_right(&parent.name(), Right::ALL)?;
                let ordinals = Self::resolve_columns(&table, &columns)?;
                let ref_ordinals = Self::resolve_columns(&parent, &ref_columns)?;
                let Some(ref_index) = Self::find_referenced_index(&parent, &ref_ordinals) else {
                    bail!(
                        "no unique index on referenced columns {:?} of table '{}'",
                        ref_columns,
                        parent.name()
                    );
                };
                let constraint = Arc::new(ReferentialConstraint::new(
                    id,
                    &name,
                    &table,
                    ordinals,
                    &parent,
                    ref_ordinals,
                    &ref_index,
                    delete_action,
                ));
                if self.check_existing {
                    constraint.check_existing_data(session)?;
                }
                // Parent mutations must fire this constraint too.
                parent.add_constraint(constraint.clone());
                constraint
            }
        };

        table.add_constraint(constraint.clone());
        catalog.add_constraint(constraint)?;
        db.update_meta(
            session,
            id,
            format!("CONSTRAINT {} ON {}", name, table.name()),
        )?;
        log::debug!("added constraint '{}' to table '{}'", name, table.name());
        Ok(0)
    }

    fn create_backing_index(
        session: &Session,
        db: &Database,
        catalog: &mut crate::schema::Catalog,
        table: &Arc<Table>,
        columns: &[String],
        index_type: IndexType,
    ) -> Result<Arc<dyn Index>> {
        let mut index_columns: Vec<IndexColumn> =
            columns.iter().map(|c| IndexColumn::new(c.as_str())).collect();
        IndexColumn::map_columns(&mut index_columns, table)?;
        let index_id = db.allocate_object_id();
        let index_name = catalog.unique_index_name(PREFIX_INDEX);
        // Population doubles as existing-data validation: a duplicate key
        // in the stored rows fails the index build and thus the command.
        let index = table.add_index(session, &index_name, index_id, index_columns, index_type)?;
        catalog.add_index(index.clone())?;
        Ok(index)
    }
}

pub struct DropConstraint {
    constraint_name: String,
    if_exists: bool,
}

impl DropConstraint {
    pub fn new(constraint_name: impl Into<String>) -> Self {
        Self {
            constraint_name: constraint_name.into(),
            if_exists: false,
        }
    }

    pub fn if_exists(mut self) -> Self {
        self.if_exists = true;
        self
    }

    pub fn update(self, session: &Session, db: &Database) -> Result<u64> {
        let mut catalog = db.catalog_mut();
        let Some(constraint) = catalog.find_constraint(&self.constraint_name) else {
            if self.if_exists {
                return Ok(0);
            }
            return Err(DbError::ObjectNotFound(self.constraint_name.clone()).into());
        };
        let Some(table) = constraint.table() else {
            catalog.remove_constraint(&self.constraint_name)?;
            return Ok(0);
        };
        session.user().check_right(&table.name(), Right::ALL)?;
        let _guard = table.lock_exclusive();
        table.remove_constraint(&self.constraint_name);
        let backing_index = constraint.unique_index();
        match constraint.kind() {
            ConstraintKind::Unique | ConstraintKind::PrimaryKey => {
                // The backing index was created for this constraint; it goes
                // with it.
                if let Some(index) = backing_index {
                    table.remove_index(session, index.name())?;
                    catalog.remove_index(index.name())?;
                }
            }
            ConstraintKind::Referential => {
                // Detach from the parent side as well; the referenced index
                // belongs to the parent and stays.
                if let Some(parent) = backing_index.as_ref().and_then(|i| i.table()) {
                    parent.remove_constraint(&self.constraint_name);
                }
            }
            ConstraintKind::Check => {}
        }
        let id = constraint.id();
        catalog.remove_constraint(&self.constraint_name)?;
        db.remove_meta(session, id)?;
        Ok(0)
    }
}

pub struct AlterTableRename {
    old_table_name: String,
    new_table_name: String,
    if_table_exists: bool,
}

impl AlterTableRename {
    pub fn new(old_table_name: impl Into<String>, new_table_name: impl Into<String>) -> Self {
        Self {
            old_table_name: old_table_name.into(),
            new_table_name: new_table_name.into(),
            if_table_exists: false,
        }
    }

    pub fn if_table_exists(mut self) -> Self {
        self.if_table_exists = true;
        self
    }

    pub fn update(self, session: &Session, db: &Database) -> Result<u64> {
        let mut catalog = db.catalog_mut();
        let Some(table) = catalog.find_table(&self.old_table_name) else {
            if self.if_table_exists {
                return Ok(0);
            }
            return Err(DbError::ObjectNotFound(self.old_table_name.clone()).into());
        };
        session.user().check_right(&table.name(), Right::ALL)?;
        if self.new_table_name == self.old_table_name {
            return Err(DbError::ObjectAlreadyExists(self.new_table_name.clone()).into());
        }
        let _guard = table.lock_exclusive();
        catalog.rename_table(&self.old_table_name, &self.new_table_name)?;
        db.update_meta(
            session,
            table.id(),
            format!("TABLE {}", self.new_table_name),
        )?;
        Ok(0)
    }
}
