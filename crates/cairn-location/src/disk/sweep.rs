use std::path::Path;
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

use super::{DiskLocation, CONFIG_NAME, TIME_SUFFIX, TMP_DIR};
use crate::error::LocationResult;

/// What a sweep pass reclaimed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Stale in-progress files purged from `.tmp`.
    pub tmp_removed: usize,
    /// `.time` files without a payload, removed as garbage.
    pub orphans_removed: usize,
}

impl DiskLocation {
    /// Crash-recovery sweep: purge `.tmp` entries older than
    /// `tmp_max_age` and orphaned metadata files.
    ///
    /// Run once at startup and periodically afterwards. A payload file
    /// without its metadata sibling is left alone -- it is well-formed
    /// and re-initialized on the next access.
    pub fn sweep(&self, tmp_max_age: Duration) -> LocationResult<SweepStats> {
        let mut stats = SweepStats::default();
        let now = SystemTime::now();

        for entry in std::fs::read_dir(self.tmp_dir())? {
            let entry = entry?;
            let path = entry.path();
            let age = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok());
            // an unreadable mtime means the file is being written right now
            let Some(age) = age else { continue };
            if age >= tmp_max_age {
                match std::fs::remove_file(&path) {
                    Ok(()) => stats.tmp_removed += 1,
                    Err(err) => warn!(path = %path.display(), error = %err, "stale temp removal failed"),
                }
            }
        }

        stats.orphans_removed = self.remove_orphan_metadata(&self.root)?;
        if stats != SweepStats::default() {
            debug!(
                tmp_removed = stats.tmp_removed,
                orphans_removed = stats.orphans_removed,
                "sweep reclaimed garbage"
            );
        }
        Ok(stats)
    }

    fn remove_orphan_metadata(&self, dir: &Path) -> LocationResult<usize> {
        let mut removed = 0;
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if dir == self.root && (name == CONFIG_NAME || name == TMP_DIR) {
                continue;
            }
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                removed += self.remove_orphan_metadata(&entry.path())?;
            } else if let Some(stem) = name.strip_suffix(TIME_SUFFIX) {
                if !dir.join(stem).is_file() {
                    match std::fs::remove_file(entry.path()) {
                        Ok(()) => removed += 1,
                        Err(err) => {
                            warn!(path = %entry.path().display(), error = %err, "orphan metadata removal failed");
                        }
                    }
                }
            }
        }
        Ok(removed)
    }
}
