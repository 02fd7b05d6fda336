//! Content-addressed directory on a local filesystem.
//!
//! Layout under the root `R`:
//!
//! ```text
//! R/config.json          persisted algorithm descriptor and budgets
//! R/<d0d1>/<d2…dN>       payload file for hex digest d0d1…dN
//! R/<d0d1>/<d2…dN>.time  last-access timestamp (textual POSIX seconds)
//! R/<d0d1>/.lock         per-shard advisory lock file
//! R/.tmp/                in-progress writes
//! ```
//!
//! Payload files are immutable once published (rename-on-publish), so
//! readers need no coordination with writers; only writers and the
//! eviction task take the shard lock.

mod config;
mod evict;
mod lock;
mod sweep;
mod usage;

pub use config::{ByteSize, DiskConfig, HashDescriptor, CONFIG_NAME};
pub use evict::EvictionStats;
pub use lock::ShardLock;
pub use sweep::SweepStats;

use std::fs::File;
use std::io::{BufReader, Read as _, Write as _};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use tracing::debug;

use cairn_types::{HashAlgorithm, Key, PathSplit, Payload};

use crate::contract::{
    BoxReader, DeleteOutcome, EntryMeta, Location, Presence, WriteOutcome,
};
use crate::error::{LocationError, LocationResult};

use lock::LOCK_NAME;

const TMP_DIR: &str = ".tmp";
const TIME_SUFFIX: &str = ".time";
const COPY_BUF: usize = 64 * 1024;

/// Default eviction grace window: entries used within the last hour are
/// never evicted.
pub const DEFAULT_GRACE_WINDOW: Duration = Duration::from_secs(3600);

/// Default bounded wait for the shard lock.
pub const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(10);

/// A content-addressed directory on a local filesystem.
pub struct DiskLocation {
    root: PathBuf,
    tmp: PathBuf,
    algorithm: HashAlgorithm,
    split: PathSplit,
    max_size: Option<u64>,
    free_disk_reserve: u64,
    grace_window: Duration,
    lock_wait: Duration,
    used: AtomicU64,
}

pub(crate) struct DiskEntry {
    pub key: Key,
    pub path: PathBuf,
    pub size: u64,
    pub last_used: Option<SystemTime>,
}

impl DiskLocation {
    /// Initialize a fresh storage root. Fails if one already exists.
    pub fn init(root: impl Into<PathBuf>, config: DiskConfig) -> LocationResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| permission_or_io(e, &root))?;
        if root.join(CONFIG_NAME).exists() {
            return Err(LocationError::Config(format!(
                "{} is already an initialized storage root",
                root.display()
            )));
        }
        config::store(&root, &config)?;
        Self::from_config(root, config)
    }

    /// Open an existing storage root.
    pub fn open(root: impl Into<PathBuf>) -> LocationResult<Self> {
        let root = root.into();
        let config = config::load(&root)?;
        Self::from_config(root, config)
    }

    /// Open a root, initializing it with `config` on first use. An
    /// existing root must agree with the requested algorithm.
    pub fn open_or_init(root: impl Into<PathBuf>, config: DiskConfig) -> LocationResult<Self> {
        let root = root.into();
        if root.join(CONFIG_NAME).exists() {
            let existing = config::load(&root)?;
            let wanted = config.hash.resolve()?;
            let found = existing.hash.resolve()?;
            if wanted != found {
                return Err(LocationError::Config(format!(
                    "{} uses {found}, but {wanted} was requested",
                    root.display()
                )));
            }
            Self::from_config(root, existing)
        } else {
            Self::init(root, config)
        }
    }

    fn from_config(root: PathBuf, config: DiskConfig) -> LocationResult<Self> {
        let algorithm = config.hash.resolve()?;
        let split = config.split();
        if let Some(expected) = split.fixed_len() {
            if expected != algorithm.digest_len() {
                return Err(LocationError::Config(format!(
                    "path split expects {expected}-byte keys, but {algorithm} digests are {} bytes",
                    algorithm.digest_len()
                )));
            }
        }

        let tmp = root.join(TMP_DIR);
        std::fs::create_dir_all(&tmp).map_err(|e| permission_or_io(e, &tmp))?;

        let location = Self {
            root,
            tmp,
            algorithm,
            split,
            max_size: config.max_size.map(|s| s.0),
            free_disk_reserve: config.free_disk_size.0,
            grace_window: config
                .grace_window
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_GRACE_WINDOW),
            lock_wait: DEFAULT_LOCK_WAIT,
            used: AtomicU64::new(0),
        };

        let initial: u64 = location.entries()?.iter().map(|e| e.size).sum();
        location.used.store(initial, Ordering::SeqCst);
        Ok(location)
    }

    /// Replace the bounded shard-lock wait.
    pub fn with_lock_wait(mut self, wait: Duration) -> Self {
        self.lock_wait = wait;
        self
    }

    /// The storage root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Bytes currently attributed to payload files.
    pub fn used_bytes(&self) -> u64 {
        self.used.load(Ordering::SeqCst)
    }

    /// The configured byte budget, if any.
    pub fn max_size(&self) -> Option<u64> {
        self.max_size
    }

    /// The eviction grace window.
    pub fn grace_window(&self) -> Duration {
        self.grace_window
    }

    pub(crate) fn lock_wait(&self) -> Duration {
        self.lock_wait
    }

    pub(crate) fn tmp_dir(&self) -> &Path {
        &self.tmp
    }

    fn target_path(&self, key: &Key) -> LocationResult<PathBuf> {
        Ok(self.root.join(self.split.relative(key)?))
    }

    /// Whether `incoming` more bytes fit the budget and the free-disk
    /// reserve.
    fn has_capacity(&self, incoming: u64) -> LocationResult<bool> {
        if let Some(budget) = self.max_size {
            if self.used_bytes() + incoming > budget {
                return Ok(false);
            }
        }
        if self.free_disk_reserve > 0 {
            let available = fs2::available_space(&self.root)?;
            if available < self.free_disk_reserve.saturating_add(incoming) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub(crate) fn bump_used(&self, delta: u64) {
        self.used.fetch_add(delta, Ordering::SeqCst);
    }

    pub(crate) fn drop_used(&self, delta: u64) {
        // saturating: the counter is advisory and re-seeded on open
        let _ = self
            .used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |u| {
                Some(u.saturating_sub(delta))
            });
    }

    /// Every stored entry, sorted by key.
    pub(crate) fn entries(&self) -> LocationResult<Vec<DiskEntry>> {
        let mut out = Vec::new();
        let mut segments = Vec::new();
        self.walk(&self.root, &mut segments, &mut out)?;
        out.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(out)
    }

    fn walk(
        &self,
        dir: &Path,
        segments: &mut Vec<String>,
        out: &mut Vec<DiskEntry>,
    ) -> LocationResult<()> {
        let depth = self.split.levels().len();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if segments.is_empty() && (name == CONFIG_NAME || name == TMP_DIR) {
                continue;
            }
            if name == LOCK_NAME || name.ends_with(TIME_SUFFIX) {
                continue;
            }
            let file_type = entry.file_type()?;
            if file_type.is_dir() && segments.len() + 1 < depth {
                segments.push(name);
                self.walk(&entry.path(), segments, out)?;
                segments.pop();
            } else if file_type.is_file() && segments.len() + 1 == depth {
                segments.push(name);
                // non-hex names are foreign files, not entries
                if let Ok(key) = self.split.key_from_segments(segments) {
                    let path = entry.path();
                    let size = entry.metadata()?.len();
                    let last_used = usage::last_used(&path);
                    out.push(DiskEntry {
                        key,
                        path,
                        size,
                        last_used,
                    });
                }
                segments.pop();
            }
        }
        Ok(())
    }
}

impl Location for DiskLocation {
    fn algorithm(&self) -> Option<HashAlgorithm> {
        Some(self.algorithm)
    }

    fn read(&self, key: &Key) -> LocationResult<Option<BoxReader>> {
        let target = self.target_path(key)?;
        match File::open(&target) {
            Ok(file) => {
                if let Err(err) = usage::update(&target) {
                    debug!(key = %key.short_hex(), error = %err, "last-access update failed");
                }
                Ok(Some(Box::new(BufReader::new(file))))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(permission_or_io(err, &target)),
        }
    }

    fn write(&self, key: &Key, payload: &Payload) -> LocationResult<WriteOutcome> {
        let target = self.target_path(key)?;

        // Content-addressed writes are idempotent.
        if target.is_file() {
            let _ = usage::update(&target);
            return Ok(WriteOutcome::Accepted);
        }

        let incoming = payload.size()?;
        if !self.has_capacity(incoming)? {
            return Ok(WriteOutcome::RejectedFull);
        }

        // Stream into a temp file under .tmp, digesting incrementally.
        // The temp file unwinds on every early exit, including panics
        // and caller cancellation.
        let mut tmp = tempfile::NamedTempFile::new_in(&self.tmp)?;
        let verify = key.len() == self.algorithm.digest_len();
        let mut digester = verify.then(|| self.algorithm.digester());
        let mut reader = payload.open()?;
        let mut buf = vec![0u8; COPY_BUF];
        let mut written: u64 = 0;
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            tmp.write_all(&buf[..n])?;
            if let Some(digester) = digester.as_mut() {
                digester.update(&buf[..n]);
            }
            written += n as u64;
        }
        tmp.flush()?;

        if let Some(digester) = digester {
            let computed = digester.finalize();
            if computed != *key {
                return Err(LocationError::DigestMismatch {
                    key: key.clone(),
                    computed,
                });
            }
        }

        let shard = target
            .parent()
            .ok_or_else(|| LocationError::Corruption("entry path has no parent".into()))?;
        std::fs::create_dir_all(shard).map_err(|e| permission_or_io(e, shard))?;

        let _guard = ShardLock::acquire(shard, self.lock_wait)?;

        // Double-checked insertion: a concurrent writer may have
        // published the same content while we were streaming.
        if target.is_file() {
            return Ok(WriteOutcome::Accepted);
        }
        if !self.has_capacity(written)? {
            return Ok(WriteOutcome::RejectedFull);
        }

        let mut perms = tmp.as_file().metadata()?.permissions();
        perms.set_readonly(true);
        tmp.as_file().set_permissions(perms)?;

        // Atomic publish: same filesystem, so persist is a rename.
        tmp.persist(&target)
            .map_err(|e| permission_or_io(e.error, &target))?;
        if let Err(err) = usage::update(&target) {
            debug!(key = %key.short_hex(), error = %err, "metadata init failed");
        }
        self.bump_used(written);
        Ok(WriteOutcome::Accepted)
    }

    fn contains(&self, key: &Key) -> LocationResult<Presence> {
        Ok(if self.target_path(key)?.is_file() {
            Presence::Found
        } else {
            Presence::Missing
        })
    }

    fn delete(&self, key: &Key) -> LocationResult<DeleteOutcome> {
        let target = self.target_path(key)?;
        let shard = target
            .parent()
            .ok_or_else(|| LocationError::Corruption("entry path has no parent".into()))?;
        if !shard.is_dir() {
            return Ok(DeleteOutcome::Absent);
        }

        let _guard = ShardLock::acquire(shard, self.lock_wait)?;
        let size = match std::fs::metadata(&target) {
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(DeleteOutcome::Absent);
            }
            Err(err) => return Err(permission_or_io(err, &target)),
        };
        std::fs::remove_file(&target).map_err(|e| permission_or_io(e, &target))?;
        usage::remove(&target);
        self.drop_used(size);
        Ok(DeleteOutcome::Removed)
    }

    fn touch(&self, key: &Key) -> LocationResult<bool> {
        let target = self.target_path(key)?;
        if !target.is_file() {
            return Ok(false);
        }
        usage::update(&target)?;
        Ok(true)
    }

    fn contents(&self) -> LocationResult<Vec<(Key, EntryMeta)>> {
        Ok(self
            .entries()?
            .into_iter()
            .map(|e| {
                (
                    e.key,
                    EntryMeta {
                        size: e.size,
                        last_used: e.last_used,
                    },
                )
            })
            .collect())
    }
}

impl std::fmt::Debug for DiskLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskLocation")
            .field("root", &self.root)
            .field("algorithm", &self.algorithm)
            .field("max_size", &self.max_size)
            .field("used", &self.used_bytes())
            .finish()
    }
}

fn permission_or_io(err: std::io::Error, path: &Path) -> LocationError {
    if err.kind() == std::io::ErrorKind::PermissionDenied {
        LocationError::Permission(format!("{}: {err}", path.display()))
    } else {
        LocationError::Io(err)
    }
}
