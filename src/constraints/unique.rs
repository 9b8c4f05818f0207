//! UNIQUE / PRIMARY KEY constraints. The actual uniqueness guarantee lives
//! in the backing unique index — its `add` is atomic and raises
//! `DuplicateKey` — so `check_row` has nothing left to verify. The
//! constraint object exists so the catalog can name the rule, report the
//! key columns, and keep the index alive for as long as the rule stands.

use super::{Constraint, ConstraintKind};
use crate::index::Index;
use crate::rows::Row;
use crate::session::Session;
use crate::table::Table;
use eyre::Result;
use hashbrown::HashSet;
use std::sync::{Arc, Weak};

#[derive(Debug)]
pub struct UniqueConstraint {
    id: u32,
    name: String,
    kind: ConstraintKind,
    table: Weak<Table>,
    index: Weak<dyn Index>,
    columns: Vec<usize>,
}

impl UniqueConstraint {
    pub fn new(
        id: u32,
        name: impl Into<String>,
        kind: ConstraintKind,
        table: &Arc<Table>,
        index: &Arc<dyn Index>,
        columns: Vec<usize>,
    ) -> Self {
        debug_assert!(matches!(
            kind,
            ConstraintKind::Unique | ConstraintKind::PrimaryKey
        ));
        Self {
            id,
            name: name.into(),
            kind,
            table: Arc::downgrade(table),
            index: Arc::downgrade(index),
            columns,
        }
    }

    pub fn key_columns(&self) -> &[usize] {
        &self.columns
    }
}

impl Constraint for UniqueConstraint {
    fn id(&self) -> u32 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ConstraintKind {
        self.kind
    }

    fn table(&self) -> Option<Arc<Table>> {
        self.table.upgrade()
    }

    fn is_before(&self) -> bool {
        true
    }

    fn check_row(
        &self,
        _session: &Session,
        _table: &Arc<Table>,
        _old_row: Option<&Row>,
        _new_row: Option<&Row>,
    ) -> Result<()> {
        // Enforced by the unique index's add.
        Ok(())
    }

    fn check_existing_data(&self, _session: &Session) -> Result<()> {
        // Populating the backing index already validated every stored row.
        Ok(())
    }

    fn referenced_columns(&self, table: &Table) -> HashSet<usize> {
        let mut out = HashSet::new();
        if self
            .table
            .upgrade()
            .map(|own| own.id() == table.id())
            .unwrap_or(false)
        {
            out.extend(self.columns.iter().copied());
        }
        out
    }

    fn unique_index(&self) -> Option<Arc<dyn Index>> {
        self.index.upgrade()
    }
}
