use std::time::SystemTime;

use tracing::{debug, warn};

use super::{usage, DiskLocation, ShardLock};
use crate::error::LocationResult;

/// What an eviction pass did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EvictionStats {
    /// Entries considered.
    pub scanned: usize,
    /// Entries deleted.
    pub evicted: usize,
    /// Bytes reclaimed.
    pub reclaimed: u64,
}

impl DiskLocation {
    /// Evict least-recently-used entries until used bytes drop to the
    /// low-water mark (90% of the configured budget).
    ///
    /// Entries whose last access falls inside the grace window are never
    /// evicted, even if the budget stays exceeded. Each deletion takes
    /// the same shard lock as writers, and the pass yields between
    /// deletions so concurrent writers are not starved. A no-op when no
    /// budget is configured.
    pub fn evict_to_budget(&self) -> LocationResult<EvictionStats> {
        let Some(budget) = self.max_size() else {
            return Ok(EvictionStats::default());
        };
        let low_water = budget - budget / 10;

        let mut stats = EvictionStats::default();
        if self.used_bytes() <= low_water {
            return Ok(stats);
        }

        let mut entries = self.entries()?;
        stats.scanned = entries.len();
        // oldest first; entries with unknown last access sort first and
        // go before anything with a recorded timestamp
        entries.sort_by_key(|e| e.last_used.unwrap_or(SystemTime::UNIX_EPOCH));

        let now = SystemTime::now();
        for entry in entries {
            if self.used_bytes() <= low_water {
                break;
            }
            if let Some(last_used) = entry.last_used {
                let idle = now
                    .duration_since(last_used)
                    .unwrap_or_default();
                if idle < self.grace_window() {
                    // everything after this is newer still
                    break;
                }
            }

            let Some(shard) = entry.path.parent() else { continue };
            let _guard = match ShardLock::acquire(shard, self.lock_wait()) {
                Ok(guard) => guard,
                Err(err) => {
                    warn!(key = %entry.key.short_hex(), error = %err, "eviction skipped contended shard");
                    continue;
                }
            };
            // the entry may have been deleted while we sorted
            if !entry.path.is_file() {
                continue;
            }
            match std::fs::remove_file(&entry.path) {
                Ok(()) => {
                    usage::remove(&entry.path);
                    self.drop_used(entry.size);
                    stats.evicted += 1;
                    stats.reclaimed += entry.size;
                    debug!(key = %entry.key.short_hex(), size = entry.size, "evicted entry");
                }
                Err(err) => {
                    warn!(key = %entry.key.short_hex(), error = %err, "eviction delete failed");
                }
            }
            drop(_guard);
            std::thread::yield_now();
        }
        Ok(stats)
    }
}
