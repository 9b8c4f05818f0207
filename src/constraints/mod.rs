//! # Constraint Enforcement
//!
//! Constraints guard every row mutation. A table fires its constraints in
//! two waves around the physical write (see `table::Table`):
//!
//! | Kind        | is_before | Enforced by                               |
//! |-------------|-----------|-------------------------------------------|
//! | CHECK       | yes       | expression evaluation, three-valued logic |
//! | UNIQUE / PK | yes       | the backing unique index's `add`          |
//! | REFERENTIAL | no        | lookup in the referenced table's index    |
//!
//! A before-constraint failure prevents any index or storage mutation for
//! the row. Referential constraints validate after the write and the table
//! undoes the write when they fail.
//!
//! ## Adding Constraints to Populated Tables
//!
//! `check_existing_data` runs when a constraint is attached to a table that
//! may already hold rows. It is skipped entirely while the database is
//! starting — persisted data is trusted on load. The scan is existential:
//! it stops at the first violating row, and polls the session's
//! cancellation flag every `CANCEL_CHECK_INTERVAL` rows.

mod check;
mod referential;
mod unique;

pub use check::CheckConstraint;
pub use referential::{DeleteAction, ReferentialConstraint};
pub use unique::UniqueConstraint;

use crate::index::Index;
use crate::rows::Row;
use crate::session::Session;
use crate::table::Table;
use eyre::Result;
use hashbrown::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Check,
    Unique,
    PrimaryKey,
    Referential,
}

pub trait Constraint: Send + Sync + std::fmt::Debug {
    fn id(&self) -> u32;
    fn name(&self) -> &str;
    fn kind(&self) -> ConstraintKind;

    /// The guarded table, while it is still alive.
    fn table(&self) -> Option<Arc<Table>>;

    /// Before-constraints run prior to the physical write; a failure there
    /// must prevent the write entirely. After-constraints validate the
    /// already-applied mutation.
    fn is_before(&self) -> bool;

    /// Validates one row mutation: insert (`old_row` = None), delete
    /// (`new_row` = None) or update (both set). `table` is the table being
    /// mutated — referential constraints are attached to both ends and
    /// dispatch on it.
    fn check_row(
        &self,
        session: &Session,
        table: &Arc<Table>,
        old_row: Option<&Row>,
        new_row: Option<&Row>,
    ) -> Result<()>;

    /// Validates all pre-existing rows when the constraint is newly added.
    fn check_existing_data(&self, session: &Session) -> Result<()>;

    /// Which columns of `table` the constraint reads. DDL uses this to
    /// block column drops that would break the constraint.
    fn referenced_columns(&self, table: &Table) -> HashSet<usize>;

    /// The unique index backing this constraint, if any. Non-owning: the
    /// table owns the index, the constraint merely relies on it.
    fn unique_index(&self) -> Option<Arc<dyn Index>> {
        None
    }
}
