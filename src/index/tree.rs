//! # Ordered Tree Index
//!
//! In-memory ordered index over byte-comparable encoded keys. Every entry
//! is stored under `encoded key columns ++ big-endian row position`, so the
//! map order is exactly index order with the position as a stable tiebreak
//! for non-unique keys, and equal-key groups form a contiguous prefix
//! range.
//!
//! ## Concurrency
//!
//! The entry map lives behind a `parking_lot::RwLock`. Uniqueness checking
//! and insertion happen under one write-lock acquisition, which makes
//! `add` atomic: of two sessions inserting an equal key concurrently, the
//! second to take the lock observes the first entry and fails with
//! `DuplicateKey`.
//!
//! ## Cursors
//!
//! `TreeCursor` does not hold the lock between steps. Each `next` takes a
//! read lock, seeks strictly past the previously returned key, and releases
//! the lock again — readers never observe a torn insert and writers are
//! never blocked behind an abandoned cursor.
//!
//! ## Scan Variant
//!
//! Constructed with `IndexType::scan` and an empty column list, the same
//! structure stores a table's rows in primary storage order: the encoded
//! prefix is empty and entries order purely by position. Search bounds are
//! ignored in that configuration, matching the contract that a scan index
//! only enumerates.

use super::{
    cost_range_index, ensure_open, key_description, Cursor, Index, IndexColumn, IndexType,
    SortOrder, VecCursor,
};
use crate::encoding::encode_value;
use crate::error::DbError;
use crate::rows::Row;
use crate::session::{Session, CANCEL_CHECK_INTERVAL};
use crate::table::Table;
use eyre::Result;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

#[derive(Debug)]
pub struct TreeIndex {
    id: u32,
    name: String,
    index_type: IndexType,
    columns: Vec<IndexColumn>,
    table: Weak<Table>,
    rows: Arc<RwLock<BTreeMap<Vec<u8>, Row>>>,
    approx_rows: AtomicU64,
    closed: AtomicBool,
}

impl TreeIndex {
    pub fn new(
        id: u32,
        name: impl Into<String>,
        table: &Arc<Table>,
        columns: Vec<IndexColumn>,
        index_type: IndexType,
    ) -> Result<Self> {
        if !index_type.is_scan() {
            for ic in &columns {
                ic.resolved()?;
            }
        }
        Ok(Self {
            id,
            name: name.into(),
            index_type,
            columns,
            table: Arc::downgrade(table),
            rows: Arc::new(RwLock::new(BTreeMap::new())),
            approx_rows: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        })
    }

    /// Scan-index constructor: empty key, rows ordered purely by position.
    /// Cannot fail — there are no column references to resolve.
    pub(crate) fn new_scan(
        id: u32,
        name: impl Into<String>,
        table: &Arc<Table>,
        persistent: bool,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            index_type: IndexType::scan(persistent),
            columns: Vec::new(),
            table: Arc::downgrade(table),
            rows: Arc::new(RwLock::new(BTreeMap::new())),
            approx_rows: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Encodes the key columns of a stored row (without position suffix).
    fn encode_prefix(&self, row: &Row) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(16 * self.columns.len());
        for ic in &self.columns {
            let ordinal = ic.resolved()?;
            let value = row.value(ordinal).ok_or_else(|| {
                eyre::eyre!(
                    "row is missing indexed column '{}' (ordinal {})",
                    ic.name(),
                    ordinal
                )
            })?;
            encode_value(&mut buf, value, ic.is_descending(), ic.is_nulls_last());
        }
        Ok(buf)
    }

    /// Encodes a search bound. The bound stops at the first index column the
    /// bound row does not carry, leaving the remainder open.
    fn encode_bound(&self, bound: &Row) -> Vec<u8> {
        let mut buf = Vec::new();
        for ic in &self.columns {
            let Some(ordinal) = ic.column() else { break };
            let Some(value) = bound.value(ordinal) else {
                break;
            };
            encode_value(&mut buf, value, ic.is_descending(), ic.is_nulls_last());
        }
        buf
    }

    fn stored_key(&self, row: &Row) -> Result<Vec<u8>> {
        let mut key = self.encode_prefix(row)?;
        key.extend_from_slice(&row.pos().to_be_bytes());
        Ok(key)
    }

    fn key_has_null(&self, row: &Row) -> bool {
        self.columns.iter().any(|ic| {
            ic.column()
                .and_then(|c| row.value(c))
                .map(|v| v.is_null())
                .unwrap_or(true)
        })
    }

    fn first_column_is_null(&self, row: &Row) -> bool {
        self.columns
            .first()
            .and_then(|ic| ic.column())
            .and_then(|c| row.value(c))
            .map(|v| v.is_null())
            .unwrap_or(false)
    }
}

impl Index for TreeIndex {
    fn id(&self) -> u32 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn index_type(&self) -> IndexType {
        self.index_type
    }

    fn columns(&self) -> &[IndexColumn] {
        &self.columns
    }

    fn table(&self) -> Option<Arc<Table>> {
        self.table.upgrade()
    }

    fn add(&self, _session: &Session, row: &Row) -> Result<()> {
        ensure_open(self.is_closed(), &self.name)?;
        let prefix = self.encode_prefix(row)?;
        let mut map = self.rows.write();
        // Multiple NULLs are always allowed in a unique key.
        if self.index_type.is_unique() && !self.key_has_null(row) {
            let equal_range =
                map.range::<[u8], _>((Bound::Included(prefix.as_slice()), Bound::Unbounded));
            for (key, existing) in equal_range {
                if !key.starts_with(&prefix) {
                    break;
                }
                if !existing.same_physical_row(row) {
                    return Err(DbError::DuplicateKey {
                        index: self.name.clone(),
                        key: key_description(&self.columns, row),
                    }
                    .into());
                }
            }
        }
        let mut stored = prefix;
        stored.extend_from_slice(&row.pos().to_be_bytes());
        map.insert(stored, row.clone());
        self.approx_rows.store(map.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    fn remove(&self, _session: &Session, row: &Row) -> Result<()> {
        ensure_open(self.is_closed(), &self.name)?;
        let key = self.stored_key(row)?;
        let mut map = self.rows.write();
        if map.remove(&key).is_none() {
            return Err(DbError::RowNotFound {
                index: self.name.clone(),
            }
            .into());
        }
        self.approx_rows.store(map.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    fn find(
        &self,
        _session: &Session,
        first: Option<&Row>,
        last: Option<&Row>,
    ) -> Result<Box<dyn Cursor>> {
        ensure_open(self.is_closed(), &self.name)?;
        let (lower, upper) = if self.index_type.is_scan() {
            (None, None)
        } else {
            (
                first.map(|r| self.encode_bound(r)),
                last.map(|r| self.encode_bound(r)),
            )
        };
        Ok(Box::new(TreeCursor {
            rows: Arc::clone(&self.rows),
            from: match lower {
                Some(key) => Bound::Included(key),
                None => Bound::Unbounded,
            },
            upper,
            current: None,
            done: false,
        }))
    }

    fn can_get_first_or_last(&self) -> bool {
        !self.index_type.is_scan()
    }

    fn find_first_or_last(&self, _session: &Session, first: bool) -> Result<Box<dyn Cursor>> {
        ensure_open(self.is_closed(), &self.name)?;
        let map = self.rows.read();
        // NULL keys are skipped: MIN/MAX ignore NULL.
        let found = if first {
            map.values().find(|r| !self.first_column_is_null(r))
        } else {
            map.values().rev().find(|r| !self.first_column_is_null(r))
        };
        Ok(Box::new(VecCursor::new(
            found.cloned().into_iter().collect(),
        )))
    }

    fn cost(&self, _session: &Session, masks: &[u8], sort_order: Option<&SortOrder>) -> f64 {
        let rows = self.approx_rows.load(Ordering::Relaxed);
        if self.index_type.is_scan() {
            return rows as f64 + 1000.0;
        }
        let sort_matches = sort_order
            .map(|s| s.matches(&self.columns))
            .unwrap_or(false);
        cost_range_index(
            masks,
            rows,
            &self.columns,
            self.index_type.is_unique(),
            sort_matches,
        )
    }

    fn row_count(&self, _session: &Session) -> u64 {
        self.rows.read().len() as u64
    }

    fn row_count_approximation(&self) -> u64 {
        self.approx_rows.load(Ordering::Relaxed)
    }

    fn truncate(&self, _session: &Session) -> Result<()> {
        ensure_open(self.is_closed(), &self.name)?;
        self.rows.write().clear();
        self.approx_rows.store(0, Ordering::Relaxed);
        Ok(())
    }

    fn rebuild(&self, session: &Session) -> Result<()> {
        ensure_open(self.is_closed(), &self.name)?;
        if self.index_type.is_scan() {
            // The scan index is the source every rebuild reads from.
            return Ok(());
        }
        let Some(table) = self.table.upgrade() else {
            return Ok(());
        };
        log::debug!("rebuilding index '{}'", self.name);
        self.rows.write().clear();
        self.approx_rows.store(0, Ordering::Relaxed);
        let mut cursor = table.scan_index().find(session, None, None)?;
        let mut scanned: u64 = 0;
        while cursor.next()? {
            scanned += 1;
            if scanned % CANCEL_CHECK_INTERVAL == 0 {
                session.check_canceled()?;
            }
            let row = cursor
                .row()
                .ok_or_else(|| eyre::eyre!("scan cursor yielded no row"))?;
            self.add(session, row)?;
        }
        Ok(())
    }

    fn close(&self, _session: &Session) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            log::debug!("closing index '{}'", self.name);
            self.rows.write().clear();
        }
        Ok(())
    }
}

#[derive(Debug)]
struct TreeCursor {
    rows: Arc<RwLock<BTreeMap<Vec<u8>, Row>>>,
    from: Bound<Vec<u8>>,
    upper: Option<Vec<u8>>,
    current: Option<Row>,
    done: bool,
}

impl TreeCursor {
    fn within_upper(&self, key: &[u8]) -> bool {
        match &self.upper {
            None => true,
            Some(upper) => {
                let len = upper.len().min(key.len());
                // Equal prefix means an equal key group: the range is closed,
                // so the entry is included.
                key[..len] <= upper[..len]
            }
        }
    }
}

impl Cursor for TreeCursor {
    fn next(&mut self) -> Result<bool> {
        if self.done {
            return Ok(false);
        }
        let map = self.rows.read();
        let found = map
            .range((self.from.clone(), Bound::Unbounded))
            .next()
            .map(|(key, row)| (key.clone(), row.clone()));
        drop(map);
        match found {
            Some((key, row)) if self.within_upper(&key) => {
                self.current = Some(row);
                self.from = Bound::Excluded(key);
                Ok(true)
            }
            _ => {
                self.current = None;
                self.done = true;
                Ok(false)
            }
        }
    }

    fn row(&self) -> Option<&Row> {
        self.current.as_ref()
    }
}
