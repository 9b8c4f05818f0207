//! Sequence generator schema object. Sequence state is deliberately
//! committed on the system session (`Database::commit_system_meta`), never
//! on the user transaction — handing out a value must stick even when the
//! statement that consumed it later rolls back, otherwise concurrent
//! sessions would block on or re-observe the same value.

use eyre::{bail, ensure, Result};
use parking_lot::Mutex;

#[derive(Debug)]
struct SequenceState {
    value: i64,
    increment: i64,
    min_value: i64,
    max_value: i64,
    cycle: bool,
}

#[derive(Debug)]
pub struct Sequence {
    id: u32,
    name: String,
    state: Mutex<SequenceState>,
}

impl Sequence {
    pub fn new(id: u32, name: impl Into<String>, start: i64, increment: i64) -> Result<Self> {
        ensure!(increment != 0, "sequence increment must not be zero");
        Ok(Self {
            id,
            name: name.into(),
            state: Mutex::new(SequenceState {
                value: start,
                increment,
                min_value: i64::MIN,
                max_value: i64::MAX,
                cycle: false,
            }),
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn current_value(&self) -> i64 {
        self.state.lock().value
    }

    pub fn increment(&self) -> i64 {
        self.state.lock().increment
    }

    /// Hands out the next value, honoring bounds and the cycle flag.
    pub fn next_value(&self) -> Result<i64> {
        let mut state = self.state.lock();
        let value = state.value;
        if value > state.max_value || value < state.min_value {
            if !state.cycle {
                bail!(
                    "sequence '{}' exhausted (value {} outside [{}, {}])",
                    self.name,
                    value,
                    state.min_value,
                    state.max_value
                );
            }
            state.value = if state.increment > 0 {
                state.min_value
            } else {
                state.max_value
            };
            let restarted = state.value;
            state.value = restarted.saturating_add(state.increment);
            return Ok(restarted);
        }
        state.value = value.saturating_add(state.increment);
        Ok(value)
    }

    /// Applies ALTER SEQUENCE changes. All-or-nothing: bounds are validated
    /// against each other before anything is stored.
    pub fn modify(
        &self,
        start: Option<i64>,
        min_value: Option<i64>,
        max_value: Option<i64>,
        increment: Option<i64>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        let new_min = min_value.unwrap_or(state.min_value);
        let new_max = max_value.unwrap_or(state.max_value);
        let new_value = start.unwrap_or(state.value);
        let new_increment = increment.unwrap_or(state.increment);
        ensure!(new_min <= new_max, "sequence min {} > max {}", new_min, new_max);
        ensure!(
            new_value >= new_min && new_value <= new_max,
            "sequence value {} outside [{}, {}]",
            new_value,
            new_min,
            new_max
        );
        ensure!(new_increment != 0, "sequence increment must not be zero");
        state.min_value = new_min;
        state.max_value = new_max;
        state.value = new_value;
        state.increment = new_increment;
        Ok(())
    }

    pub fn set_cycle(&self, cycle: bool) {
        self.state.lock().cycle = cycle;
    }

    /// Serialized catalog record, persisted via the meta store.
    pub fn meta_record(&self) -> String {
        let state = self.state.lock();
        format!(
            "SEQUENCE {} START {} INCREMENT {} MIN {} MAX {} CYCLE {}",
            self.name, state.value, state.increment, state.min_value, state.max_value, state.cycle
        )
    }
}
