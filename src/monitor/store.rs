//! Content hash store
//!
//! Maps a monitored URL to the digest observed by its last check. Each URL has
//! its own lock so checks on different URLs never wait on each other while
//! checks on the same URL run one at a time.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::monitor::ContentHashRecord;

type Slot = Arc<Mutex<Option<ContentHashRecord>>>;

/// Last observed digest per URL
///
/// Records are never evicted; the set of monitored URLs is expected to stay small.
#[derive(Debug, Default)]
pub struct ContentHashStore {
    slots: DashMap<String, Slot>,
}

impl ContentHashStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the record slot for `url`, creating an empty slot on first use
    ///
    /// The returned guard holds the per-URL lock until dropped.
    pub async fn lock(&self, url: &str) -> OwnedMutexGuard<Option<ContentHashRecord>> {
        // The map shard guard must be released before awaiting the slot lock.
        let slot = self
            .slots
            .entry(url.to_string())
            .or_insert_with(Slot::default)
            .clone();
        slot.lock_owned().await
    }

    /// Snapshot of the record for `url`
    pub async fn get(&self, url: &str) -> Option<ContentHashRecord> {
        let slot = self.slots.get(url).map(|s| s.value().clone())?;
        let record = slot.lock().await;
        record.clone()
    }

    /// Number of URLs that have been checked at least once
    pub async fn len(&self) -> usize {
        let slots: Vec<Slot> = self.slots.iter().map(|s| s.value().clone()).collect();
        let mut count = 0;
        for slot in slots {
            if slot.lock().await.is_some() {
                count += 1;
            }
        }
        count
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
