//! Segmented Concurrent Store
//!
//! The store is a fixed, power-of-two array of segments. Each segment
//! owns an independent reader-writer lock and an independent map from
//! owned key bytes to a reference-counted entry, so operations on
//! distinct segments never contend and no global lock exists.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Store                              │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Seg 0   │ │ Seg 1   │ │ Seg 2   │ │ ...N    │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │segments │           │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │         │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Keys route to a segment by a fast non-cryptographic 64-bit hash
//! masked down to the segment count. Locks are held only long enough to
//! touch the map and clone the entry's `Arc`; the borrow is returned to
//! the caller after the lock is released.
//!
//! ## SCAN cursors
//!
//! A scan cursor packs the resume position into 48 bits: the high 16
//! carry the segment index, the low 32 the offset into that segment's
//! iteration order. Cursor `0` starts a scan and cursor `0` returned
//! means the walk is complete. Each call walks at most one segment and
//! pauses either at the requested key count or at the segment boundary.
//! Concurrent writers may cause keys to be seen twice or missed, but the
//! walk always terminates.

use crate::storage::entry::{Entry, EntryRef};
use crate::storage::glob::glob_match;
use crate::storage::value::Value;
use ahash::RandomState;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Default number of segments.
pub const DEFAULT_SEGMENTS: usize = 16;

/// Upper bound on the segment count imposed by the 16-bit cursor field.
pub const MAX_SEGMENTS: usize = 1 << 16;

const CURSOR_SEGMENT_SHIFT: u32 = 32;
const CURSOR_OFFSET_MASK: u64 = 0xFFFF_FFFF;

fn pack_cursor(segment: u64, offset: u64) -> u64 {
    (segment << CURSOR_SEGMENT_SHIFT) | offset
}

/// One shard: an independent lock around an independent map.
#[derive(Debug)]
struct Segment {
    map: RwLock<HashMap<Bytes, EntryRef, RandomState>>,
}

impl Segment {
    fn new() -> Self {
        Self {
            map: RwLock::new(HashMap::with_hasher(RandomState::new())),
        }
    }
}

/// The segmented key-value store.
#[derive(Debug)]
pub struct Store {
    segments: Box<[Segment]>,
    hasher: RandomState,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    /// Creates a store with the default segment count.
    pub fn new() -> Self {
        Self::with_segments(DEFAULT_SEGMENTS)
    }

    /// Creates a store with `count` segments. `count` must be a power of
    /// two no larger than the cursor encoding allows.
    pub fn with_segments(count: usize) -> Self {
        assert!(
            count.is_power_of_two() && count <= MAX_SEGMENTS,
            "segment count must be a power of two at most {MAX_SEGMENTS}"
        );
        let segments = (0..count).map(|_| Segment::new()).collect();
        Self {
            segments,
            hasher: RandomState::new(),
        }
    }

    /// Number of segments.
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    fn segment_for(&self, key: &[u8]) -> &Segment {
        let index = self.hasher.hash_one(key) as usize & (self.segments.len() - 1);
        &self.segments[index]
    }

    /// Borrows the entry stored at `key`. The borrow is taken under the
    /// segment's shared lock and handed out after the lock is released;
    /// it keeps the value alive until dropped.
    pub fn get(&self, key: &[u8]) -> Option<EntryRef> {
        let map = self.segment_for(key).map.read().unwrap();
        map.get(key).cloned()
    }

    /// Inserts a new entry holding a deep copy of `value` under an owned
    /// copy of `key`. A displaced entry loses the map's reference but
    /// survives as long as outstanding borrows hold it.
    pub fn put(&self, key: &[u8], value: Value) {
        let entry = Arc::new(Entry::new(value));
        let owned_key = Bytes::copy_from_slice(key);
        let mut map = self.segment_for(key).map.write().unwrap();
        map.insert(owned_key, entry);
    }

    /// Removes `key`. Returns whether it was present.
    pub fn del(&self, key: &[u8]) -> bool {
        let mut map = self.segment_for(key).map.write().unwrap();
        map.remove(key).is_some()
    }

    /// Borrows the entry at `key`, inserting one built by `init` when the
    /// key is absent. The single write-lock upsert keeps read-modify
    /// commands on an absent key atomic per key.
    pub fn get_or_insert_with<F>(&self, key: &[u8], init: F) -> EntryRef
    where
        F: FnOnce() -> Value,
    {
        let mut map = self.segment_for(key).map.write().unwrap();
        match map.get(key) {
            Some(entry) => Arc::clone(entry),
            None => {
                let entry = Arc::new(Entry::new(init()));
                map.insert(Bytes::copy_from_slice(key), Arc::clone(&entry));
                entry
            }
        }
    }

    /// Total number of keys across all segments.
    pub fn len(&self) -> usize {
        self.segments
            .iter()
            .map(|segment| segment.map.read().unwrap().len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resumes a cursor walk, emitting at most `count` keys that match
    /// `pattern`. Returns the cursor to resume from, `0` when the walk
    /// is complete. Clients treat the cursor as opaque.
    pub fn scan(&self, cursor: u64, count: usize, pattern: &[u8]) -> (u64, Vec<Bytes>) {
        let segment_index = cursor >> CURSOR_SEGMENT_SHIFT;
        let offset = (cursor & CURSOR_OFFSET_MASK) as usize;
        if segment_index >= self.segments.len() as u64 {
            return (0, Vec::new());
        }
        let count = count.max(1);

        let mut keys = Vec::new();
        {
            let map = self.segments[segment_index as usize].map.read().unwrap();
            for (position, key) in map.keys().enumerate() {
                if position < offset {
                    continue;
                }
                if keys.len() == count {
                    // Pause mid-segment; resume at this position.
                    return (pack_cursor(segment_index, position as u64), keys);
                }
                if glob_match(pattern, key) {
                    keys.push(key.clone());
                }
            }
        }

        // Segment exhausted: advance to the next one or finish.
        let next_segment = segment_index + 1;
        if next_segment >= self.segments.len() as u64 {
            (0, keys)
        } else {
            (pack_cursor(next_segment, 0), keys)
        }
    }
}
