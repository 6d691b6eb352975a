//! # Change Monitor
//!
//! Detects content changes between checks of the same URL.
//!
//! Every check hashes the page content and compares it with the digest stored
//! by the previous check of that URL:
//!
//! - no previous record: first check, not changed, record inserted
//! - different digest: changed, record digest replaced
//! - same digest: not changed, only the check time moves forward
//!
//! The compare-and-update of one URL happens under that URL's lock, so two
//! concurrent checks can never both compare against the same stale digest.

mod schedule;
mod store;

pub use schedule::{ScheduleError, next_run_after, parse_schedule};
pub use store::ContentHashStore;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

/// SHA-256 digest of page content
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentDigest([u8; 32]);

impl ContentDigest {
    /// Digest of the given content bytes
    pub fn of(content: impl AsRef<[u8]>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content.as_ref());
        Self(hasher.finalize().into())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentDigest({})", self.to_hex())
    }
}

impl Serialize for ContentDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// Stored state of a monitored URL
#[derive(Debug, Clone, PartialEq)]
pub struct ContentHashRecord {
    pub url: String,
    pub digest: ContentDigest,
    pub last_checked_at: DateTime<Utc>,
}

/// Result of one check
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorOutcome {
    pub url: String,
    pub is_first_check: bool,
    pub has_changed: bool,
    #[serde(rename = "currentHash")]
    pub current_digest: ContentDigest,
    #[serde(rename = "previousHash")]
    pub previous_digest: Option<ContentDigest>,
}

/// Owns the content hash store and applies checks against it
#[derive(Debug, Default)]
pub struct ChangeMonitor {
    store: ContentHashStore,
}

impl ChangeMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor for sharing one monitor between requests
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Check `content` of `url` now
    pub async fn check(&self, url: &str, content: &str) -> MonitorOutcome {
        self.check_at(url, content, Utc::now()).await
    }

    /// Check `content` of `url` as of `now`
    #[instrument(skip(self, content), fields(bytes = content.len()))]
    pub async fn check_at(&self, url: &str, content: &str, now: DateTime<Utc>) -> MonitorOutcome {
        let current_digest = ContentDigest::of(content);

        let mut slot = self.store.lock(url).await;
        let previous_digest = slot.as_ref().map(|record| record.digest);
        *slot = Some(ContentHashRecord {
            url: url.to_string(),
            digest: current_digest,
            last_checked_at: now,
        });
        let outcome = MonitorOutcome {
            url: url.to_string(),
            is_first_check: previous_digest.is_none(),
            has_changed: previous_digest.is_some_and(|previous| previous != current_digest),
            current_digest,
            previous_digest,
        };
        drop(slot);

        if outcome.has_changed {
            info!(url, digest = %current_digest, "content changed");
        } else {
            debug!(url, first = outcome.is_first_check, "content unchanged");
        }
        outcome
    }

    /// Last stored record for `url`
    pub async fn record(&self, url: &str) -> Option<ContentHashRecord> {
        self.store.get(url).await
    }

    pub fn store(&self) -> &ContentHashStore {
        &self.store
    }
}
