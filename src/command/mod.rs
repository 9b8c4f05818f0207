//! # DDL Commands
//!
//! Command objects for schema changes. Each command is built once,
//! configured through its builder methods, and executed with
//! `update(session, database)`, returning the affected-row count the
//! statement layer reports (always 0 for DDL).
//!
//! Commands consume only the catalog, index and constraint contracts: they
//! resolve names through the catalog, check rights through the session's
//! user, take the exclusive table lock before structural changes, and
//! record every change in the meta store.

mod alter_sequence;
mod alter_table;
mod create_index;
mod drop_table;

pub use alter_sequence::AlterSequence;
pub use alter_table::{AddConstraintKind, AlterTableAddConstraint, AlterTableRename, DropConstraint};
pub use create_index::{CreateIndex, DropIndex};
pub use drop_table::DropTable;
