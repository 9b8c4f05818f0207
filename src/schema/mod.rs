//! # Schema Catalog
//!
//! The catalog is the metadata registry: tables, indexes, sequences and
//! constraints, each under a unique name and a unique object id. DDL
//! commands go through the catalog to resolve names, claim new ones, and
//! register or retire objects; the engine persists catalog records through
//! the `MetaStore`.
//!
//! Ownership is strictly one-way: the catalog owns tables, tables own
//! their indexes and constraints, and every back-reference (index to
//! table, constraint to index) is a weak handle. Removing a table from the
//! catalog therefore tears down constraints first, indexes second, table
//! last.

mod sequence;

pub use sequence::Sequence;

use crate::constraints::Constraint;
use crate::error::DbError;
use crate::index::Index;
use crate::table::Table;
use eyre::Result;
use hashbrown::HashMap;
use std::sync::Arc;

/// Name prefixes for auto-generated index names.
pub const PREFIX_PRIMARY_KEY: &str = "PRIMARY_KEY_";
pub const PREFIX_INDEX: &str = "INDEX_";

#[derive(Default)]
pub struct Catalog {
    tables: HashMap<String, Arc<Table>>,
    indexes: HashMap<String, Arc<dyn Index>>,
    sequences: HashMap<String, Arc<Sequence>>,
    constraints: HashMap<String, Arc<dyn Constraint>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_table(&self, name: &str) -> Option<Arc<Table>> {
        self.tables.get(name).cloned()
    }

    pub fn find_index(&self, name: &str) -> Option<Arc<dyn Index>> {
        self.indexes.get(name).cloned()
    }

    pub fn find_sequence(&self, name: &str) -> Option<Arc<Sequence>> {
        self.sequences.get(name).cloned()
    }

    pub fn find_constraint(&self, name: &str) -> Option<Arc<dyn Constraint>> {
        self.constraints.get(name).cloned()
    }

    pub fn add_table(&mut self, table: Arc<Table>) -> Result<()> {
        let name = table.name();
        if self.tables.contains_key(&name) {
            return Err(DbError::ObjectAlreadyExists(name).into());
        }
        self.tables.insert(name, table);
        Ok(())
    }

    pub fn add_index(&mut self, index: Arc<dyn Index>) -> Result<()> {
        let name = index.name().to_string();
        if self.indexes.contains_key(&name) {
            return Err(DbError::ObjectAlreadyExists(name).into());
        }
        self.indexes.insert(name, index);
        Ok(())
    }

    pub fn add_sequence(&mut self, sequence: Arc<Sequence>) -> Result<()> {
        let name = sequence.name().to_string();
        if self.sequences.contains_key(&name) {
            return Err(DbError::ObjectAlreadyExists(name).into());
        }
        self.sequences.insert(name, sequence);
        Ok(())
    }

    pub fn add_constraint(&mut self, constraint: Arc<dyn Constraint>) -> Result<()> {
        let name = constraint.name().to_string();
        if self.constraints.contains_key(&name) {
            return Err(DbError::ObjectAlreadyExists(name).into());
        }
        self.constraints.insert(name, constraint);
        Ok(())
    }

    pub fn remove_table(&mut self, name: &str) -> Result<Arc<Table>> {
        self.tables
            .remove(name)
            .ok_or_else(|| DbError::ObjectNotFound(name.to_string()).into())
    }

    pub fn remove_index(&mut self, name: &str) -> Result<Arc<dyn Index>> {
        self.indexes
            .remove(name)
            .ok_or_else(|| DbError::ObjectNotFound(name.to_string()).into())
    }

    pub fn remove_sequence(&mut self, name: &str) -> Result<Arc<Sequence>> {
        self.sequences
            .remove(name)
            .ok_or_else(|| DbError::ObjectNotFound(name.to_string()).into())
    }

    pub fn remove_constraint(&mut self, name: &str) -> Result<Arc<dyn Constraint>> {
        self.constraints
            .remove(name)
            .ok_or_else(|| DbError::ObjectNotFound(name.to_string()).into())
    }

    /// Re-keys a table under a new name. The caller has already verified
    /// rights and taken the table lock.
    pub fn rename_table(&mut self, old_name: &str, new_name: &str) -> Result<()> {
        if self.tables.contains_key(new_name) {
            return Err(DbError::ObjectAlreadyExists(new_name.to_string()).into());
        }
        let table = self.remove_table(old_name)?;
        table.rename(new_name);
        self.tables.insert(new_name.to_string(), table);
        Ok(())
    }

    /// First `prefix`N not taken by any index.
    pub fn unique_index_name(&self, prefix: &str) -> String {
        let mut n = 1;
        loop {
            let candidate = format!("{}{}", prefix, n);
            if !self.indexes.contains_key(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// First `prefix`N not taken by any constraint.
    pub fn unique_constraint_name(&self, prefix: &str) -> String {
        let mut n = 1;
        loop {
            let candidate = format!("{}{}", prefix, n);
            if !self.constraints.contains_key(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    pub fn tables(&self) -> impl Iterator<Item = &Arc<Table>> {
        self.tables.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;
    use crate::types::DataType;

    fn catalog_with_table(name: &str) -> Catalog {
        let mut catalog = Catalog::new();
        let table = Table::new(
            1,
            name,
            vec![Column::new("id", DataType::Int, false)],
            false,
        );
        catalog.add_table(table).unwrap();
        catalog
    }

    #[test]
    fn duplicate_table_name_is_rejected() {
        let mut catalog = catalog_with_table("t");
        let dup = Table::new(2, "t", vec![], false);
        let err = catalog.add_table(dup).unwrap_err();
        assert!(matches!(
            crate::error::db_error(&err),
            Some(DbError::ObjectAlreadyExists(_))
        ));
    }

    #[test]
    fn remove_missing_object_is_not_found() {
        let mut catalog = Catalog::new();
        let err = catalog.remove_table("ghost").unwrap_err();
        assert!(matches!(
            crate::error::db_error(&err),
            Some(DbError::ObjectNotFound(_))
        ));
    }

    #[test]
    fn rename_checks_collisions() {
        let mut catalog = catalog_with_table("a");
        let other = Table::new(2, "b", vec![], false);
        catalog.add_table(other).unwrap();
        let err = catalog.rename_table("a", "b").unwrap_err();
        assert!(matches!(
            crate::error::db_error(&err),
            Some(DbError::ObjectAlreadyExists(_))
        ));
        catalog.rename_table("a", "c").unwrap();
        assert!(catalog.find_table("c").is_some());
        assert!(catalog.find_table("a").is_none());
        assert_eq!(catalog.find_table("c").unwrap().name(), "c");
    }

    #[test]
    fn unique_index_name_skips_taken_names() {
        let catalog = Catalog::new();
        assert_eq!(catalog.unique_index_name(PREFIX_INDEX), "INDEX_1");
    }
}
