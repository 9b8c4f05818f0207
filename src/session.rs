//! # Sessions, Users, and Rights
//!
//! One `Session` exists per client connection (or per worker thread in
//! embedded use). Index structures carry their own synchronization, so a
//! session is mostly a context object: identity, cancellation flag, and the
//! cascade marker the referential constraint uses to tell a user-initiated
//! mutation from one it triggered itself.
//!
//! The engine additionally keeps one dedicated *system* session (see
//! `engine::Database`) for metadata commits that must survive a later
//! rollback of the user transaction.
//!
//! ## Cancellation
//!
//! Long scans call `check_canceled` every `CANCEL_CHECK_INTERVAL` rows
//! rather than on every row; the flag is a relaxed atomic and the poll is
//! deliberately coarse. Cancellation aborts the statement with
//! `DbError::StatementCanceled`; undoing partial effects is the surrounding
//! transaction's job.

use crate::error::DbError;
use eyre::Result;
use hashbrown::HashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// How many scan iterations pass between cancellation polls.
pub const CANCEL_CHECK_INTERVAL: u64 = 128;

/// Access rights on a table, combinable as a bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Right(u8);

impl Right {
    pub const SELECT: Right = Right(1);
    pub const INSERT: Right = Right(2);
    pub const UPDATE: Right = Right(4);
    pub const DELETE: Right = Right(8);
    pub const ALL: Right = Right(15);

    pub fn contains(self, other: Right) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn union(self, other: Right) -> Right {
        Right(self.0 | other.0)
    }
}

#[derive(Debug)]
pub struct User {
    name: String,
    admin: bool,
    rights: RwLock<HashMap<String, Right>>,
}

impl User {
    pub fn new(name: impl Into<String>, admin: bool) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            admin,
            rights: RwLock::new(HashMap::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_admin(&self) -> bool {
        self.admin
    }

    pub fn grant(&self, table_name: &str, right: Right) {
        let mut rights = self.rights.write();
        let entry = rights.entry(table_name.to_string()).or_insert(Right(0));
        *entry = entry.union(right);
    }

    /// Yes/no authorization check. The engine calls this before mutating
    /// structures and trusts the answer; rights administration lives
    /// outside this core.
    pub fn check_right(&self, table_name: &str, required: Right) -> Result<()> {
        if self.admin {
            return Ok(());
        }
        let rights = self.rights.read();
        let granted = rights.get(table_name).copied().unwrap_or(Right(0));
        if granted.contains(required) {
            Ok(())
        } else {
            Err(DbError::InsufficientRights {
                user: self.name.clone(),
                object: table_name.to_string(),
            }
            .into())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    /// Ordinary client session; its effects belong to the user transaction.
    User,
    /// The database-owned session for metadata commits.
    System,
}

#[derive(Debug)]
pub struct Session {
    id: u32,
    kind: SessionKind,
    user: Arc<User>,
    canceled: AtomicBool,
    cascade_depth: AtomicU32,
    starting: Arc<AtomicBool>,
}

impl Session {
    pub fn new(id: u32, kind: SessionKind, user: Arc<User>) -> Self {
        Self::with_starting_flag(id, kind, user, Arc::new(AtomicBool::new(false)))
    }

    /// Constructor used by the engine: `starting` is the database's shared
    /// startup flag, which suppresses `check_existing_data` during load.
    pub fn with_starting_flag(
        id: u32,
        kind: SessionKind,
        user: Arc<User>,
        starting: Arc<AtomicBool>,
    ) -> Self {
        Self {
            id,
            kind,
            user,
            canceled: AtomicBool::new(false),
            cascade_depth: AtomicU32::new(0),
            starting,
        }
    }

    pub fn database_is_starting(&self) -> bool {
        self.starting.load(Ordering::Relaxed)
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    pub fn user(&self) -> &Arc<User> {
        &self.user
    }

    /// Requests cancellation of the statement running on this session.
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::Relaxed);
    }

    pub fn clear_canceled(&self) {
        self.canceled.store(false, Ordering::Relaxed);
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Relaxed)
    }

    pub fn check_canceled(&self) -> Result<()> {
        if self.is_canceled() {
            Err(DbError::StatementCanceled.into())
        } else {
            Ok(())
        }
    }

    /// Marks a referential cascade initiated by this session. While the
    /// depth is nonzero, referential checks triggered by the cascade's own
    /// mutations are suppressed.
    pub fn enter_cascade(&self) {
        self.cascade_depth.fetch_add(1, Ordering::Relaxed);
    }

    pub fn leave_cascade(&self) {
        self.cascade_depth.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn in_cascade(&self) -> bool {
        self.cascade_depth.load(Ordering::Relaxed) > 0
    }
}
