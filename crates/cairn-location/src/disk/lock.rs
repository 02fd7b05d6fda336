use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt as _;
use tracing::debug;

use crate::error::{LocationError, LocationResult};

/// Name of the advisory lock file inside each shard directory.
pub(super) const LOCK_NAME: &str = ".lock";

/// How long to sleep between lock attempts.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Exclusive advisory lock on a shard directory.
///
/// Serializes writers (and the eviction task) touching entries in the
/// same shard, across threads *and* cooperating processes: the lock is an
/// OS-level `flock` on a `.lock` file inside the shard. Readers never
/// take it -- payload files are immutable once published.
///
/// The lock is released on drop; the `.lock` file itself is left in
/// place (creating and removing it would race other lockers).
#[derive(Debug)]
pub struct ShardLock {
    file: File,
    path: PathBuf,
}

impl ShardLock {
    /// Acquire the shard lock, waiting up to `wait`. Expiry is a
    /// transient error: the caller may retry.
    pub fn acquire(shard_dir: &Path, wait: Duration) -> LocationResult<Self> {
        let path = shard_dir.join(LOCK_NAME);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&path)?;

        let started = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    debug!(lock = %path.display(), waited_ms = started.elapsed().as_millis() as u64, "shard lock acquired");
                    return Ok(Self { file, path });
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                    if started.elapsed() >= wait {
                        return Err(LocationError::Transient(format!(
                            "timed out after {:?} waiting for shard lock {}",
                            wait,
                            path.display()
                        )));
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ShardLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
