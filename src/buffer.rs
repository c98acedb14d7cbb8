//! Bounded activity history.
//!
//! A fixed-capacity FIFO of classified records, one per session. The
//! buffer exclusively owns the backing frame files: a record leaving the
//! buffer (eviction, purge, drain) has its image deleted before anything
//! else happens. All mutation is serialized behind one lock; readers take
//! the same lock briefly and copy out `Arc`s, so a record is either fully
//! present or fully absent from a snapshot, never torn.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{Duration as ChronoDuration, Utc};

use crate::models::ActivityRecord;

pub struct RingBuffer {
    capacity: usize,
    records: Mutex<VecDeque<Arc<ActivityRecord>>>,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Arc<ActivityRecord>>> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert a record, evicting the oldest first when at capacity.
    /// Strict FIFO, no reordering.
    pub fn insert(&self, record: ActivityRecord) -> Arc<ActivityRecord> {
        let record = Arc::new(record);
        let mut records = self.lock();
        while records.len() >= self.capacity {
            if let Some(oldest) = records.pop_front() {
                delete_image(&oldest);
            }
        }
        records.push_back(Arc::clone(&record));
        record
    }

    /// Point-in-time ordered copy of the externally visible records.
    /// Blocked records are never part of the visible surface.
    pub fn snapshot(&self) -> Vec<Arc<ActivityRecord>> {
        self.lock()
            .iter()
            .filter(|record| record.privacy_state.is_allowed())
            .cloned()
            .collect()
    }

    /// Visible records newer than `window`, oldest first. This is the view
    /// commit exports consume, so the whole deque is never dumped.
    pub fn recent(&self, window: std::time::Duration) -> Vec<Arc<ActivityRecord>> {
        let window = ChronoDuration::from_std(window).unwrap_or(ChronoDuration::MAX);
        let cutoff = Utc::now() - window;
        self.lock()
            .iter()
            .filter(|record| record.privacy_state.is_allowed() && record.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    /// Remove every blocked record. Their images were deleted at the
    /// post-classification gate; this drops the transient occupancy.
    /// Returns the number of records removed.
    pub fn purge_blocked(&self) -> usize {
        let mut records = self.lock();
        let before = records.len();
        records.retain(|record| {
            if record.privacy_state.is_allowed() {
                true
            } else {
                delete_image(record);
                false
            }
        });
        before - records.len()
    }

    /// Evict and delete everything. Called on session teardown.
    pub fn drain(&self) -> usize {
        let mut records = self.lock();
        let drained = records.len();
        for record in records.drain(..) {
            delete_image(&record);
        }
        drained
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

fn delete_image(record: &ActivityRecord) {
    if let Some(image) = &record.image {
        image.delete();
    }
}
