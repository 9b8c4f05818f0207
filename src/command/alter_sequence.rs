//! ALTER SEQUENCE command. The interesting part is the commit: the new
//! sequence state goes through `Database::commit_system_meta`, i.e. on the
//! system session with the fixed session-then-meta lock order, so other
//! transactions can keep drawing values immediately and a later rollback
//! of the altering transaction cannot resurrect the old state.

use crate::engine::Database;
use crate::error::DbError;
use crate::session::Session;
use eyre::Result;

#[derive(Default)]
pub struct AlterSequence {
    sequence_name: String,
    if_exists: bool,
    start: Option<i64>,
    min_value: Option<i64>,
    max_value: Option<i64>,
    increment: Option<i64>,
    cycle: Option<bool>,
}

impl AlterSequence {
    pub fn new(sequence_name: impl Into<String>) -> Self {
        Self {
            sequence_name: sequence_name.into(),
            ..Default::default()
        }
    }

    pub fn if_exists(mut self) -> Self {
        self.if_exists = true;
        self
    }

    pub fn restart_with(mut self, start: i64) -> Self {
        self.start = Some(start);
        self
    }

    pub fn min_value(mut self, min: i64) -> Self {
        self.min_value = Some(min);
        self
    }

    pub fn max_value(mut self, max: i64) -> Self {
        self.max_value = Some(max);
        self
    }

    pub fn increment_by(mut self, increment: i64) -> Self {
        self.increment = Some(increment);
        self
    }

    pub fn cycle(mut self, cycle: bool) -> Self {
        self.cycle = Some(cycle);
        self
    }

    pub fn update(self, _session: &Session, db: &Database) -> Result<u64> {
        let sequence = {
            let catalog = db.catalog();
            match catalog.find_sequence(&self.sequence_name) {
                Some(sequence) => sequence,
                None => {
                    if self.if_exists {
                        return Ok(0);
                    }
                    return Err(DbError::ObjectNotFound(self.sequence_name.clone()).into());
                }
            }
        };
        if let Some(cycle) = self.cycle {
            sequence.set_cycle(cycle);
        }
        if self.start.is_some()
            || self.min_value.is_some()
            || self.max_value.is_some()
            || self.increment.is_some()
        {
            sequence.modify(self.start, self.min_value, self.max_value, self.increment)?;
        }
        // Commit on the system session so the change is never rolled back
        // with the user transaction.
        db.commit_system_meta(sequence.id(), sequence.meta_record())?;
        Ok(0)
    }
}
