//! # Database Engine Object
//!
//! `Database` owns the catalog, the object-id allocator, the startup flag,
//! and the two pieces of state behind the metadata commit protocol: the
//! dedicated *system session* and the *meta store*.
//!
//! ## The System Session and Lock Order
//!
//! Some metadata must outlive the user transaction that touched it — the
//! canonical case is a sequence handing out a value: the new sequence
//! state has to be durable immediately, or a later rollback of the user's
//! statement would hand the same value to someone else. Such updates are
//! committed on the database-owned system session, never on the user
//! session.
//!
//! The lock-acquisition order is fixed and must never be reversed:
//!
//! 1. the system session lock,
//! 2. the meta store lock.
//!
//! `commit_system_meta` is the only place both are taken, in that order;
//! user-session metadata updates (`update_meta`) take only the meta lock.
//!
//! ## Meta Store
//!
//! The meta store maps object ids to serialized catalog records and
//! persists them through the framed page stream (`storage::PageWriter`)
//! when a backing file is attached, exercising the same codec and
//! alignment guarantees as any other store file.

use crate::error::DbError;
use crate::schema::Catalog;
use crate::session::{Session, SessionKind, User};
use crate::storage::{CompressionKind, FileStore, PageReader, PageWriter};
use eyre::{Result, WrapErr};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

pub struct MetaStore {
    records: BTreeMap<u32, String>,
    path: Option<PathBuf>,
    compression: CompressionKind,
}

impl MetaStore {
    fn new() -> Self {
        Self {
            records: BTreeMap::new(),
            path: None,
            compression: CompressionKind::None,
        }
    }

    /// Attaches a backing file; records are flushed to it on every update.
    pub fn attach(&mut self, path: PathBuf, compression: CompressionKind) {
        self.path = Some(path);
        self.compression = compression;
    }

    pub fn update(&mut self, object_id: u32, record: String) -> Result<()> {
        self.records.insert(object_id, record);
        self.flush()
    }

    pub fn remove(&mut self, object_id: u32) -> Result<()> {
        self.records.remove(&object_id);
        self.flush()
    }

    pub fn record(&self, object_id: u32) -> Option<&str> {
        self.records.get(&object_id).map(|s| s.as_str())
    }

    fn flush(&mut self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let store = FileStore::create(path, self.compression)
            .wrap_err("rewriting catalog meta store")?;
        let mut writer = PageWriter::new(store, self.compression);
        for (id, record) in &self.records {
            let mut chunk = Vec::with_capacity(4 + record.len());
            chunk.extend_from_slice(&id.to_be_bytes());
            chunk.extend_from_slice(record.as_bytes());
            writer.write(&chunk)?;
        }
        writer.close()
    }

    /// Reads records back from an existing meta store file.
    pub fn load(path: PathBuf) -> Result<Self> {
        let (store, compression) = FileStore::open(&path)?;
        let mut reader = PageReader::new(store, compression);
        let mut records = BTreeMap::new();
        while let Some(chunk) = reader.read_chunk()? {
            if chunk.len() < 4 {
                return Err(
                    DbError::CorruptedBuffer("meta record shorter than its id".into()).into(),
                );
            }
            let id = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            let record = String::from_utf8(chunk[4..].to_vec())
                .map_err(|e| DbError::CorruptedBuffer(format!("meta record not UTF-8: {}", e)))?;
            records.insert(id, record);
        }
        reader.close()?;
        Ok(Self {
            records,
            path: Some(path),
            compression,
        })
    }
}

pub struct Database {
    name: String,
    catalog: RwLock<Catalog>,
    meta: Mutex<MetaStore>,
    system_session: Mutex<Arc<Session>>,
    starting: Arc<AtomicBool>,
    next_object_id: AtomicU32,
    next_session_id: AtomicU32,
}

impl Database {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        let name = name.into();
        let starting = Arc::new(AtomicBool::new(false));
        let system_user = User::new("SYSTEM", true);
        let system_session = Arc::new(Session::with_starting_flag(
            0,
            SessionKind::System,
            system_user,
            Arc::clone(&starting),
        ));
        Arc::new(Self {
            name,
            catalog: RwLock::new(Catalog::new()),
            meta: Mutex::new(MetaStore::new()),
            system_session: Mutex::new(system_session),
            starting,
            next_object_id: AtomicU32::new(1),
            next_session_id: AtomicU32::new(1),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn create_session(&self, user: Arc<User>) -> Arc<Session> {
        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        Arc::new(Session::with_starting_flag(
            id,
            SessionKind::User,
            user,
            Arc::clone(&self.starting),
        ))
    }

    pub fn allocate_object_id(&self) -> u32 {
        self.next_object_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Marks the load phase; `check_existing_data` is skipped while set.
    pub fn set_starting(&self, starting: bool) {
        self.starting.store(starting, Ordering::Relaxed);
    }

    pub fn is_starting(&self) -> bool {
        self.starting.load(Ordering::Relaxed)
    }

    pub fn catalog(&self) -> parking_lot::RwLockReadGuard<'_, Catalog> {
        self.catalog.read()
    }

    pub fn catalog_mut(&self) -> parking_lot::RwLockWriteGuard<'_, Catalog> {
        self.catalog.write()
    }

    pub fn meta(&self) -> MutexGuard<'_, MetaStore> {
        self.meta.lock()
    }

    /// Metadata update on behalf of a user session: meta lock only.
    pub fn update_meta(&self, _session: &Session, object_id: u32, record: String) -> Result<()> {
        self.meta.lock().update(object_id, record)
    }

    pub fn remove_meta(&self, _session: &Session, object_id: u32) -> Result<()> {
        self.meta.lock().remove(object_id)
    }

    /// Metadata commit that must survive the user transaction, performed on
    /// the system session. Lock order is fixed: system session first, meta
    /// store second — every caller goes through here, so the order can
    /// never invert into a deadlock.
    pub fn commit_system_meta(&self, object_id: u32, record: String) -> Result<()> {
        let session = self.system_session.lock();
        let mut meta = self.meta.lock();
        log::debug!(
            "system meta commit for object {} on session {}",
            object_id,
            session.id()
        );
        meta.update(object_id, record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn object_ids_are_unique_and_increasing() {
        let db = Database::new("test");
        let a = db.allocate_object_id();
        let b = db.allocate_object_id();
        assert!(b > a);
    }

    #[test]
    fn meta_store_round_trips_through_page_stream() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.meta");
        {
            let mut meta = MetaStore::new();
            meta.attach(path.clone(), CompressionKind::Lz4);
            meta.update(7, "SEQUENCE SEQ_A START 10".into()).unwrap();
            meta.update(9, "TABLE accounts".into()).unwrap();
            meta.remove(9).unwrap();
        }
        let loaded = MetaStore::load(path).unwrap();
        assert_eq!(loaded.record(7), Some("SEQUENCE SEQ_A START 10"));
        assert_eq!(loaded.record(9), None);
    }

    #[test]
    fn system_meta_commit_is_independent_of_user_sessions() {
        let db = Database::new("test");
        let user_session = db.create_session(User::new("app", true));
        // A canceled user session must not affect the system commit path.
        user_session.cancel();
        db.commit_system_meta(3, "SEQUENCE S START 5".into()).unwrap();
        assert_eq!(db.meta().record(3), Some("SEQUENCE S START 5"));
    }

    #[test]
    fn starting_flag_reaches_sessions() {
        let db = Database::new("test");
        let session = db.create_session(User::new("app", true));
        assert!(!session.database_is_starting());
        db.set_starting(true);
        assert!(session.database_is_starting());
        db.set_starting(false);
        assert!(!session.database_is_starting());
    }
}
