use std::io::Read;
use std::sync::Arc;

use tracing::debug;

use cairn_location::{
    BoxReader, DeleteOutcome, Location, LocationResult, Presence, RetryPolicy, WriteOutcome,
};
use cairn_types::{HashAlgorithm, Key, PathSplit, Payload};

use crate::error::RemoteResult;

/// Minimal contract an SFTP/SCP-style transfer client must satisfy.
///
/// Paths are relative to the remote storage root and use `/` separators.
/// SFTP clients support `rename`; SCP-style clients that do not report
/// it via [`supports_rename`](Self::supports_rename) and get a direct
/// upload instead.
pub trait SshClient: Send + Sync {
    /// Open the remote file, or `None` if it does not exist.
    fn download(&self, path: &str) -> RemoteResult<Option<Box<dyn Read + Send>>>;

    /// Upload `body` to the remote path, creating it.
    fn upload(&self, path: &str, body: &mut dyn Read) -> RemoteResult<()>;

    /// Atomically rename a remote file.
    fn rename(&self, from: &str, to: &str) -> RemoteResult<()>;

    /// Whether [`rename`](Self::rename) is available on this transport.
    fn supports_rename(&self) -> bool {
        true
    }

    /// Remove a remote file. Returns whether it existed.
    fn remove(&self, path: &str) -> RemoteResult<bool>;

    /// Whether a remote file exists.
    fn exists(&self, path: &str) -> RemoteResult<bool>;

    /// Create remote directories, parents included.
    fn mkdirs(&self, path: &str) -> RemoteResult<()>;
}

/// A `Location` over an [`SshClient`], mirroring the local disk layout
/// under a remote root.
///
/// Writes publish with temp-then-rename (`.tmp/<hex>` then a rename into
/// the shard) when the transport supports renames, and fall back to a
/// direct upload otherwise.
pub struct SshLocation {
    client: Arc<dyn SshClient>,
    algorithm: HashAlgorithm,
    split: PathSplit,
    retry: RetryPolicy,
    writable: bool,
}

impl SshLocation {
    pub fn new(client: Arc<dyn SshClient>, algorithm: HashAlgorithm) -> Self {
        Self {
            client,
            algorithm,
            split: PathSplit::default(),
            retry: RetryPolicy::default(),
            writable: true,
        }
    }

    /// Replace the default `[1, -1]` path split.
    pub fn with_split(mut self, split: PathSplit) -> Self {
        self.split = split;
        self
    }

    /// Replace the retry policy applied to transient failures.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Mark the remote as read-only (e.g. a mirror the caller may not
    /// publish to).
    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    fn remote_path(&self, key: &Key) -> LocationResult<String> {
        Ok(self.split.segments(key)?.join("/"))
    }
}

impl Location for SshLocation {
    fn algorithm(&self) -> Option<HashAlgorithm> {
        Some(self.algorithm)
    }

    fn writable(&self) -> bool {
        self.writable
    }

    fn read(&self, key: &Key) -> LocationResult<Option<BoxReader>> {
        let path = self.remote_path(key)?;
        self.retry.run(|| {
            self.client
                .download(&path)
                .map_err(|e| e.into_location())
                .map(|body| body.map(|b| b as BoxReader))
        })
    }

    fn write(&self, key: &Key, payload: &Payload) -> LocationResult<WriteOutcome> {
        if !self.writable {
            return Ok(WriteOutcome::RejectedReadOnly);
        }
        let target = self.remote_path(key)?;
        self.retry.run(|| {
            if self.client.exists(&target).map_err(|e| e.into_location())? {
                return Ok(WriteOutcome::Accepted);
            }
            if let Some(shard) = target.rsplit_once('/').map(|(dir, _)| dir) {
                self.client.mkdirs(shard).map_err(|e| e.into_location())?;
            }

            if self.client.supports_rename() {
                // temp-then-rename: readers on the remote never observe
                // a partial file under the final name
                let staging = format!(".tmp/{}", key.to_hex());
                self.client.mkdirs(".tmp").map_err(|e| e.into_location())?;
                let mut body = payload.open()?;
                self.client
                    .upload(&staging, &mut body)
                    .map_err(|e| e.into_location())?;
                if let Err(err) = self.client.rename(&staging, &target) {
                    let _ = self.client.remove(&staging);
                    return Err(err.into_location());
                }
            } else {
                debug!(key = %key.short_hex(), "transport lacks rename; uploading directly");
                let mut body = payload.open()?;
                self.client
                    .upload(&target, &mut body)
                    .map_err(|e| e.into_location())?;
            }
            Ok(WriteOutcome::Accepted)
        })
    }

    fn contains(&self, key: &Key) -> LocationResult<Presence> {
        let path = self.remote_path(key)?;
        match self.retry.run(|| {
            self.client.exists(&path).map_err(|e| e.into_location())
        }) {
            Ok(true) => Ok(Presence::Found),
            Ok(false) => Ok(Presence::Missing),
            Err(err) if err.is_transient() => Ok(Presence::Unknown),
            Err(err) => Err(err),
        }
    }

    fn delete(&self, key: &Key) -> LocationResult<DeleteOutcome> {
        if !self.writable {
            return Ok(DeleteOutcome::RejectedReadOnly);
        }
        let path = self.remote_path(key)?;
        self.retry.run(|| {
            let existed = self.client.remove(&path).map_err(|e| e.into_location())?;
            Ok(if existed {
                DeleteOutcome::Removed
            } else {
                DeleteOutcome::Absent
            })
        })
    }
}
