//! # Index Abstraction
//!
//! A polymorphic family of index implementations behind one `Index` trait:
//!
//! - [`TreeIndex`]: ordered in-memory index over byte-comparable encoded
//!   keys; supports range scans, extremal lookup, and doubles as the scan
//!   index that stores a table's rows in primary storage order.
//! - [`HashIndex`]: point-lookup index over hashed keys; range scans are
//!   rejected rather than simulated.
//! - [`RangeIndex`]: virtual generator index producing an arithmetic
//!   sequence without any storage; mutation is unsupported.
//!
//! ## Contract
//!
//! `add` enforces uniqueness for unique/primary-key variants: a second row
//! with an equal key fails with `DbError::DuplicateKey` unless it is the
//! same physical row being re-inserted after an update. `remove` of an
//! absent row fails with `DbError::RowNotFound` — silent no-ops would let
//! corruption spread. `find` returns a forward-only [`Cursor`] over the
//! closed range `[first, last]`; `None` bounds are unbounded.
//!
//! ## Cost Model
//!
//! `cost` feeds the planner's index ranking. The shared estimator charges a
//! selectivity-scaled row cost for equality-matched columns (equality 1%,
//! unique floor 0.1%) and divides by 3 for a range bound; when the
//! requested sort order matches the index's natural order the estimate is
//! scaled down further, so an order-matching index always ranks strictly
//! cheaper than an otherwise identical one that would need an explicit
//! sort. The range generator reports a flat cost of 1 — it never touches
//! disk.
//!
//! ## Lifecycle
//!
//! An index is *open* from construction until `close`; any operation on a
//! closed index fails. `truncate` discards contents but keeps the index
//! open. `check_rename` lets pseudo-indexes veto catalog renames.

mod hash;
mod range;
mod tree;

pub use hash::HashIndex;
pub use range::RangeIndex;
pub use tree::TreeIndex;

use crate::error::DbError;
use crate::rows::Row;
use crate::session::Session;
use crate::table::Table;
use eyre::{ensure, Result};
use std::sync::Arc;

/// Mask bit: the planner supplies an equality condition on the column.
pub const MASK_EQUALITY: u8 = 1;
/// Mask bit: the planner supplies a lower range bound on the column.
pub const MASK_RANGE_START: u8 = 2;
/// Mask bit: the planner supplies an upper range bound on the column.
pub const MASK_RANGE_END: u8 = 4;

/// Cost reported by an index that cannot serve the query shape at all.
pub const COST_UNUSABLE: f64 = f64::MAX;

const COST_ROW_OFFSET: f64 = 1000.0;
const EQUALITY_SELECTIVITY: f64 = 0.01;
const UNIQUE_SELECTIVITY: f64 = 0.001;
const SORTED_SCAN_FACTOR: f64 = 0.7;

/// Flags describing what kind of index this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexType {
    primary_key: bool,
    unique: bool,
    hash: bool,
    scan: bool,
    affinity: bool,
    persistent: bool,
}

impl IndexType {
    pub fn primary_key(persistent: bool, hash: bool) -> Self {
        Self {
            primary_key: true,
            unique: true,
            hash,
            scan: false,
            affinity: false,
            persistent,
        }
    }

    pub fn unique(persistent: bool, hash: bool) -> Self {
        Self {
            primary_key: false,
            unique: true,
            hash,
            scan: false,
            affinity: false,
            persistent,
        }
    }

    pub fn non_unique(persistent: bool, hash: bool) -> Self {
        Self {
            primary_key: false,
            unique: false,
            hash,
            scan: false,
            affinity: false,
            persistent,
        }
    }

    /// Data-affinity hint index: non-unique, never persisted, used by
    /// sharded deployments to co-locate rows.
    pub fn affinity() -> Self {
        Self {
            primary_key: false,
            unique: false,
            hash: false,
            scan: false,
            affinity: true,
            persistent: false,
        }
    }

    pub fn scan(persistent: bool) -> Self {
        Self {
            primary_key: false,
            unique: false,
            hash: false,
            scan: true,
            affinity: false,
            persistent,
        }
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn is_hash(&self) -> bool {
        self.hash
    }

    pub fn is_scan(&self) -> bool {
        self.scan
    }

    pub fn is_affinity(&self) -> bool {
        self.affinity
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }
}

/// A column reference within an index key, with its sort behavior.
///
/// The reference starts as a bare column name; `map_columns` resolves it
/// to an ordinal against the owning table before the index is usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexColumn {
    name: String,
    column: Option<usize>,
    descending: bool,
    nulls_last: bool,
}

impl IndexColumn {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column: None,
            descending: false,
            nulls_last: false,
        }
    }

    pub fn descending(mut self) -> Self {
        self.descending = true;
        self
    }

    pub fn nulls_last(mut self) -> Self {
        self.nulls_last = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolved column ordinal; `None` until `map_columns` has run.
    pub fn column(&self) -> Option<usize> {
        self.column
    }

    pub fn is_descending(&self) -> bool {
        self.descending
    }

    pub fn is_nulls_last(&self) -> bool {
        self.nulls_last
    }

    /// Resolves every column reference against the owning table. Must run
    /// before the index is constructed; an unknown name is an error, not a
    /// deferred failure.
    pub fn map_columns(columns: &mut [IndexColumn], table: &Table) -> Result<()> {
        for ic in columns.iter_mut() {
            let ordinal = table.column_ordinal(&ic.name).ok_or_else(|| {
                DbError::ObjectNotFound(format!("column '{}' in table '{}'", ic.name, table.name()))
            })?;
            ic.column = Some(ordinal);
        }
        Ok(())
    }

    pub(crate) fn resolved(&self) -> Result<usize> {
        self.column
            .ok_or_else(|| eyre::eyre!("index column '{}' used before map_columns", self.name))
    }
}

/// Requested result ordering, as (column ordinal, descending) pairs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SortOrder {
    columns: Vec<(usize, bool)>,
}

impl SortOrder {
    pub fn new(columns: Vec<(usize, bool)>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[(usize, bool)] {
        &self.columns
    }

    /// True when scanning the given index columns in order already yields
    /// this ordering, making an explicit sort step unnecessary.
    pub fn matches(&self, index_columns: &[IndexColumn]) -> bool {
        if self.columns.is_empty() || self.columns.len() > index_columns.len() {
            return false;
        }
        self.columns
            .iter()
            .zip(index_columns.iter())
            .all(|(&(ordinal, descending), ic)| {
                ic.column() == Some(ordinal) && ic.is_descending() == descending
            })
    }
}

/// Stateful, single-pass, forward-only iterator over matching rows.
///
/// `next` advances to the following row and reports whether one exists;
/// `row` exposes the current row. A cursor is not reusable after
/// exhaustion and fetches lazily — it never pre-reads past the row the
/// caller asked for.
pub trait Cursor: Send + std::fmt::Debug {
    fn next(&mut self) -> Result<bool>;
    fn row(&self) -> Option<&Row>;
}

/// Cursor over an already-materialized list of rows.
#[derive(Debug)]
pub struct VecCursor {
    rows: Vec<Row>,
    at: usize,
    started: bool,
}

impl VecCursor {
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows,
            at: 0,
            started: false,
        }
    }
}

impl Cursor for VecCursor {
    fn next(&mut self) -> Result<bool> {
        if !self.started {
            self.started = true;
        } else if self.at < self.rows.len() {
            self.at += 1;
        }
        Ok(self.at < self.rows.len())
    }

    fn row(&self) -> Option<&Row> {
        if self.started {
            self.rows.get(self.at)
        } else {
            None
        }
    }
}

/// Common contract of all index variants.
pub trait Index: Send + Sync + std::fmt::Debug {
    fn id(&self) -> u32;
    fn name(&self) -> &str;
    fn index_type(&self) -> IndexType;
    fn columns(&self) -> &[IndexColumn];

    /// The owning table, when still alive. Back-reference only — the table
    /// owns the index, never the other way around.
    fn table(&self) -> Option<Arc<Table>>;

    /// Inserts a row's key. Unique variants fail with `DuplicateKey` on an
    /// equal key belonging to a different physical row.
    fn add(&self, session: &Session, row: &Row) -> Result<()>;

    /// Removes the entry matching the row's key; absent entries are an
    /// error so index/table divergence is caught at the point of damage.
    fn remove(&self, session: &Session, row: &Row) -> Result<()>;

    /// Cursor over all rows with keys in the closed range `[first, last]`.
    fn find(
        &self,
        session: &Session,
        first: Option<&Row>,
        last: Option<&Row>,
    ) -> Result<Box<dyn Cursor>>;

    fn can_get_first_or_last(&self) -> bool {
        false
    }

    /// Extremal row retrieval for indexes that support it (MIN/MAX
    /// optimization). NULL keys are skipped.
    fn find_first_or_last(&self, _session: &Session, _first: bool) -> Result<Box<dyn Cursor>> {
        Err(DbError::unsupported(format!("findFirstOrLast on {}", self.name())).into())
    }

    /// Planner cost estimate for a query shape. `masks` is indexed by table
    /// column ordinal.
    fn cost(&self, session: &Session, masks: &[u8], sort_order: Option<&SortOrder>) -> f64;

    /// Exact, lock-protected row count as visible to the session.
    fn row_count(&self, session: &Session) -> u64;

    /// Fast, possibly stale row count for planning.
    fn row_count_approximation(&self) -> u64;

    fn truncate(&self, session: &Session) -> Result<()>;

    /// Discards and re-derives the index contents from the owning table's
    /// stored rows.
    fn rebuild(&self, session: &Session) -> Result<()>;

    /// True when the index must be rebuilt before it can be trusted (e.g.
    /// after a non-clean open of persistent storage).
    fn need_rebuild(&self) -> bool {
        false
    }

    fn check_rename(&self) -> Result<()> {
        Ok(())
    }

    fn close(&self, session: &Session) -> Result<()>;
}

/// Shared selectivity-based cost estimate for ordered and hashed indexes.
pub(crate) fn cost_range_index(
    masks: &[u8],
    row_count: u64,
    columns: &[IndexColumn],
    unique: bool,
    sort_matches: bool,
) -> f64 {
    let rows = row_count as f64 + COST_ROW_OFFSET;
    let mut cost = rows;
    let mut matched = 0i32;
    for (i, ic) in columns.iter().enumerate() {
        let Some(ordinal) = ic.column() else {
            break;
        };
        let mask = masks.get(ordinal).copied().unwrap_or(0);
        if mask & MASK_EQUALITY != 0 {
            matched += 1;
            if unique && i == columns.len() - 1 {
                cost = 3.0;
                break;
            }
            cost = 2.0
                + (rows * EQUALITY_SELECTIVITY.powi(matched)).max(rows * UNIQUE_SELECTIVITY);
        } else if mask & (MASK_RANGE_START | MASK_RANGE_END) != 0 {
            cost /= 3.0;
            break;
        } else {
            break;
        }
    }
    if sort_matches {
        cost *= SORTED_SCAN_FACTOR;
    }
    cost.max(2.0)
}

/// Builds a human-readable key description for duplicate-key errors.
pub(crate) fn key_description(columns: &[IndexColumn], row: &Row) -> String {
    let mut out = String::from("(");
    for (i, ic) in columns.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        match ic.column().and_then(|c| row.value(c)) {
            Some(v) => out.push_str(&v.to_string()),
            None => out.push('?'),
        }
    }
    out.push(')');
    out
}

pub(crate) fn ensure_open(closed: bool, name: &str) -> Result<()> {
    ensure!(!closed, "index '{}' is closed", name);
    Ok(())
}
