//! Reference-Counted Store Entries
//!
//! An entry owns one [`Value`] behind a reader-writer lock and is shared
//! by reference count: the store's map holds one `Arc<Entry>` and every
//! borrower clones it. Dropping the last clone destroys the value, so a
//! connection that borrowed an entry keeps it alive even while another
//! connection deletes or replaces the key.
//!
//! All mutation serializes through the entry's write lock; readers take
//! the shared side. Critical sections copy or update the value and
//! release immediately; reply bytes are produced after the lock is gone.

use crate::storage::value::{Value, ValueError};
use std::sync::{Arc, RwLock};

/// A borrowed, reference-counted entry handle.
pub type EntryRef = Arc<Entry>;

/// One stored value plus its lock.
#[derive(Debug)]
pub struct Entry {
    value: RwLock<Value>,
}

impl Entry {
    /// Creates an entry owning `value`. Wrapping it in the map's `Arc`
    /// establishes the store's reference.
    pub fn new(value: Value) -> Self {
        Self {
            value: RwLock::new(value),
        }
    }

    /// Copies the current value out under the shared lock.
    pub fn snapshot(&self) -> Value {
        self.value.read().unwrap().clone()
    }

    /// Reported value size in bytes.
    pub fn len_bytes(&self) -> usize {
        self.value.read().unwrap().len_bytes()
    }

    /// Replaces the value under the write lock. The old value is freed
    /// once the lock is released.
    pub fn set(&self, value: Value) {
        *self.value.write().unwrap() = value;
    }

    /// Appends bytes under the write lock, coercing an integer value to
    /// binary first. Returns the new length.
    pub fn append(&self, suffix: &[u8]) -> usize {
        self.value.write().unwrap().append(suffix)
    }

    /// Adds `delta` under the write lock with overflow and type checks.
    /// Returns the new value.
    pub fn incr_by(&self, delta: i64) -> Result<i64, ValueError> {
        self.value.write().unwrap().checked_add(delta)
    }
}
