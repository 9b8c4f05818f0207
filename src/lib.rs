//! # opaldb — Embeddable Relational Engine Core
//!
//! opaldb is the index, constraint and storage core of an embeddable
//! relational database. SQL parsing, statement planning and the network
//! surface live above it; this crate provides the contracts they compile
//! down to:
//!
//! - find or create an index, scan it with a cursor, rank it by cost;
//! - check a row against the table's constraints before and after the
//!   physical write;
//! - read and write block-aligned pages on durable storage, optionally
//!   compressed.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │   DDL commands (CREATE INDEX, ALTER …)    │
//! ├───────────────────────────────────────────┤
//! │  Catalog │ Tables │ Constraints │ Session │
//! ├───────────────────────────────────────────┤
//! │   Index family (tree / hash / range)      │
//! ├───────────────────────────────────────────┤
//! │   Page codec + framed stream (Data, …)    │
//! ├───────────────────────────────────────────┤
//! │   Block-aligned file store                │
//! └───────────────────────────────────────────┘
//! ```
//!
//! ## Module Overview
//!
//! - [`index`]: the polymorphic index contract and its tree, hash and
//!   range-generator implementations
//! - [`constraints`]: CHECK / UNIQUE / PRIMARY KEY / REFERENTIAL
//!   enforcement
//! - [`table`], [`schema`]: tables, columns, the catalog and sequences
//! - [`command`]: DDL command objects
//! - [`storage`]: file store, page buffer codec, compressed chunk stream
//! - [`session`], [`engine`]: sessions, users and rights, the database
//!   object with its system-session metadata commit path
//! - [`expr`]: the expression collaborator interface used by CHECK
//!   constraints
//! - [`error`]: the typed error taxonomy carried inside `eyre` reports

pub mod command;
pub mod constraints;
pub mod encoding;
pub mod engine;
pub mod error;
pub mod expr;
pub mod index;
pub mod rows;
pub mod schema;
pub mod session;
pub mod storage;
pub mod table;
pub mod types;

pub use engine::Database;
pub use error::{db_error, DbError};
pub use rows::Row;
pub use types::{TriBool, Value};
