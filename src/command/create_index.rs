//! CREATE INDEX and DROP INDEX commands.

use crate::engine::Database;
use crate::error::DbError;
use crate::index::{Index, IndexColumn, IndexType};
use crate::schema::{PREFIX_INDEX, PREFIX_PRIMARY_KEY};
use crate::session::{Right, Session};
use eyre::{ensure, Result};

pub struct CreateIndex {
    table_name: String,
    index_name: Option<String>,
    columns: Vec<IndexColumn>,
    primary_key: bool,
    unique: bool,
    hash: bool,
    affinity: bool,
    if_not_exists: bool,
    if_table_exists: bool,
}

impl CreateIndex {
    pub fn new(table_name: impl Into<String>, columns: Vec<IndexColumn>) -> Self {
        Self {
            table_name: table_name.into(),
            index_name: None,
            columns,
            primary_key: false,
            unique: false,
            hash: false,
            affinity: false,
            if_not_exists: false,
            if_table_exists: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.index_name = Some(name.into());
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn hash(mut self) -> Self {
        self.hash = true;
        self
    }

    pub fn affinity(mut self) -> Self {
        self.affinity = true;
        self
    }

    pub fn if_not_exists(mut self) -> Self {
        self.if_not_exists = true;
        self
    }

    pub fn if_table_exists(mut self) -> Self {
        self.if_table_exists = true;
        self
    }

    pub fn update(self, session: &Session, db: &Database) -> Result<u64> {
        ensure!(!self.columns.is_empty(), "CREATE INDEX needs at least one column");
        let mut catalog = db.catalog_mut();
        let Some(table) = catalog.find_table(&self.table_name) else {
            if self.if_table_exists {
                return Ok(0);
            }
            return Err(DbError::ObjectNotFound(self.table_name.clone()).into());
        };
        if let Some(name) = &self.index_name {
            if catalog.find_index(name).is_some() {
                if self.if_not_exists {
                    return Ok(0);
                }
                return Err(DbError::ObjectAlreadyExists(name.clone()).into());
            }
        }
        session.user().check_right(&table.name(), Right::ALL)?;
        let _guard = table.lock_exclusive();
        let persistent = table.persist_indexes();
        let index_name = match &self.index_name {
            Some(name) => name.clone(),
            None => {
                let prefix = if self.primary_key {
                    PREFIX_PRIMARY_KEY
                } else {
                    PREFIX_INDEX
                };
                catalog.unique_index_name(prefix)
            }
        };
        let index_type = if self.primary_key {
            IndexType::primary_key(persistent, self.hash)
        } else if self.unique {
            IndexType::unique(persistent, self.hash)
        } else if self.affinity {
            IndexType::affinity()
        } else {
            IndexType::non_unique(persistent, self.hash)
        };
        let mut columns = self.columns;
        IndexColumn::map_columns(&mut columns, &table)?;
        let id = db.allocate_object_id();
        let index = table.add_index(session, &index_name, id, columns, index_type)?;
        catalog.add_index(index)?;
        db.update_meta(
            session,
            id,
            format!("INDEX {} ON {}", index_name, table.name()),
        )?;
        Ok(0)
    }
}

pub struct DropIndex {
    index_name: String,
    if_exists: bool,
}

impl DropIndex {
    pub fn new(index_name: impl Into<String>) -> Self {
        Self {
            index_name: index_name.into(),
            if_exists: false,
        }
    }

    pub fn if_exists(mut self) -> Self {
        self.if_exists = true;
        self
    }

    pub fn update(self, session: &Session, db: &Database) -> Result<u64> {
        let mut catalog = db.catalog_mut();
        let Some(index) = catalog.find_index(&self.index_name) else {
            if self.if_exists {
                return Ok(0);
            }
            return Err(DbError::ObjectNotFound(self.index_name.clone()).into());
        };
        let Some(table) = index.table() else {
            // Table already gone; just retire the catalog entry.
            catalog.remove_index(&self.index_name)?;
            return Ok(0);
        };
        session.user().check_right(&table.name(), Right::ALL)?;
        let _guard = table.lock_exclusive();
        table.remove_index(session, &self.index_name)?;
        let id = index.id();
        catalog.remove_index(&self.index_name)?;
        db.remove_meta(session, id)?;
        Ok(0)
    }
}
