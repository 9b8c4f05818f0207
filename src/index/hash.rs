//! # Hash Index
//!
//! Point-lookup index over hashed key buckets. Equality probes are O(1);
//! everything that needs ordering (range scans, extremal lookup, sorted
//! output) is rejected with `Unsupported` instead of silently degrading to
//! a scan — the planner's cost ranking steers ordered queries to a tree
//! index.

use super::{
    ensure_open, key_description, Cursor, Index, IndexColumn, IndexType, SortOrder, VecCursor,
    COST_UNUSABLE, MASK_EQUALITY,
};
use crate::encoding::encode_value;
use crate::error::DbError;
use crate::rows::Row;
use crate::session::{Session, CANCEL_CHECK_INTERVAL};
use crate::table::Table;
use eyre::Result;
use hashbrown::HashMap;
use parking_lot::RwLock;
use smallvec::SmallVec;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

#[derive(Debug)]
pub struct HashIndex {
    id: u32,
    name: String,
    index_type: IndexType,
    columns: Vec<IndexColumn>,
    table: Weak<Table>,
    buckets: RwLock<HashMap<Vec<u8>, SmallVec<[Row; 1]>>>,
    approx_rows: AtomicU64,
    closed: AtomicBool,
}

impl HashIndex {
    pub fn new(
        id: u32,
        name: impl Into<String>,
        table: &Arc<Table>,
        columns: Vec<IndexColumn>,
        index_type: IndexType,
    ) -> Result<Self> {
        for ic in &columns {
            ic.resolved()?;
        }
        Ok(Self {
            id,
            name: name.into(),
            index_type,
            columns,
            table: Arc::downgrade(table),
            buckets: RwLock::new(HashMap::new()),
            approx_rows: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        })
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn encode_key(&self, row: &Row) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(16 * self.columns.len());
        for ic in &self.columns {
            let ordinal = ic.resolved()?;
            let value = row.value(ordinal).ok_or_else(|| {
                eyre::eyre!("row is missing indexed column '{}'", ic.name())
            })?;
            encode_value(&mut buf, value, false, false);
        }
        Ok(buf)
    }

    fn key_has_null(&self, row: &Row) -> bool {
        self.columns.iter().any(|ic| {
            ic.column()
                .and_then(|c| row.value(c))
                .map(|v| v.is_null())
                .unwrap_or(true)
        })
    }
}

impl Index for HashIndex {
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
        let key = self.encode_key(row)?;
        let mut buckets = self.buckets.write();
        let bucket = buckets.entry(key).or_default();
        if self.index_type.is_unique()
            && !self.key_has_null(row)
            && bucket.iter().any(|r| !r.same_physical_row(row))
        {
            return Err(DbError::DuplicateKey {
                index: self.name.clone(),
                key: key_description(&self.columns, row),
            }
            .into());
        }
        bucket.retain(|r| !r.same_physical_row(row));
        bucket.push(row.clone());
        let total: usize = buckets.values().map(|b| b.len()).sum();
        self.approx_rows.store(total as u64, Ordering::Relaxed);
        Ok(())
    }

    fn remove(&self, _session: &Session, row: &Row) -> Result<()> {
        ensure_open(self.is_closed(), &self.name)?;
        let key = self.encode_key(row)?;
        let mut buckets = self.buckets.write();
        let removed = match buckets.get_mut(&key) {
            Some(bucket) => {
                let before = bucket.len();
                bucket.retain(|r| r.pos() != row.pos());
                let removed = bucket.len() < before;
                if bucket.is_empty() {
                    buckets.remove(&key);
                }
                removed
            }
            None => false,
        };
        if !removed {
            return Err(DbError::RowNotFound {
                index: self.name.clone(),
            }
            .into());
        }
        let total: usize = buckets.values().map(|b| b.len()).sum();
        self.approx_rows.store(total as u64, Ordering::Relaxed);
        Ok(())
    }

    fn find(
        &self,
        _session: &Session,
        first: Option<&Row>,
        last: Option<&Row>,
    ) -> Result<Box<dyn Cursor>> {
        ensure_open(self.is_closed(), &self.name)?;
        let (first, last) = match (first, last) {
            (Some(f), Some(l)) => (f, l),
            _ => return Err(DbError::unsupported("HASH index range scan").into()),
        };
        let first_key = self.encode_key(first)?;
        let last_key = self.encode_key(last)?;
        if first_key != last_key {
            return Err(DbError::unsupported("HASH index range scan").into());
        }
        let buckets = self.buckets.read();
        let rows = buckets
            .get(&first_key)
            .map(|b| b.iter().cloned().collect())
            .unwrap_or_default();
        Ok(Box::new(VecCursor::new(rows)))
    }

    fn cost(&self, _session: &Session, masks: &[u8], _sort_order: Option<&SortOrder>) -> f64 {
        // Usable only when every key column has an equality condition.
        let all_equality = self.columns.iter().all(|ic| {
            ic.column()
                .map(|c| masks.get(c).copied().unwrap_or(0) & MASK_EQUALITY != 0)
                .unwrap_or(false)
        });
        if all_equality {
            2.0
        } else {
            COST_UNUSABLE
        }
    }

    fn row_count(&self, _session: &Session) -> u64 {
        self.buckets.read().values().map(|b| b.len() as u64).sum()
    }

    fn row_count_approximation(&self) -> u64 {
        self.approx_rows.load(Ordering::Relaxed)
    }

    fn truncate(&self, _session: &Session) -> Result<()> {
        ensure_open(self.is_closed(), &self.name)?;
        self.buckets.write().clear();
        self.approx_rows.store(0, Ordering::Relaxed);
        Ok(())
    }

    fn rebuild(&self, session: &Session) -> Result<()> {
        ensure_open(self.is_closed(), &self.name)?;
        let Some(table) = self.table.upgrade() else {
            return Ok(());
        };
        log::debug!("rebuilding index '{}'", self.name);
        self.buckets.write().clear();
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
            self.buckets.write().clear();
        }
        Ok(())
    }
}
