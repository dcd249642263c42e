use chrono::{DateTime, Utc};
use shared::domain::{ActivityRecord, ProfileId};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub profile_id: ProfileId,
    pub records: Vec<ActivityRecord>,
    pub fetched_at: DateTime<Utc>,
}

/// Holds the merged records of one profile at a time.
///
/// A lookup for any other profile misses even while an entry is stored.
#[derive(Debug, Default)]
pub struct ProfileScopedCache {
    entry: Option<CacheEntry>,
}

impl ProfileScopedCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, profile_id: &ProfileId) -> Option<&[ActivityRecord]> {
        self.entry
            .as_ref()
            .filter(|entry| &entry.profile_id == profile_id)
            .map(|entry| entry.records.as_slice())
    }

    pub fn entry(&self) -> Option<&CacheEntry> {
        self.entry.as_ref()
    }

    pub fn put(&mut self, profile_id: ProfileId, records: Vec<ActivityRecord>) {
        debug!(profile_id = %profile_id, records = records.len(), "caching scoped records");
        self.entry = Some(CacheEntry {
            profile_id,
            records,
            fetched_at: Utc::now(),
        });
    }

    pub fn invalidate(&mut self) {
        if let Some(entry) = self.entry.take() {
            debug!(profile_id = %entry.profile_id, "dropping cached records");
        }
    }
}

#[cfg(test)]
#[path = "tests/cache_tests.rs"]
mod tests;
