use std::io::Read;
use std::sync::Arc;

use cairn_location::{
    BoxReader, DeleteOutcome, Location, LocationResult, Presence, RetryPolicy, WriteOutcome,
};
use cairn_types::{HashAlgorithm, Key, PathSplit, Payload};

use crate::error::RemoteResult;

/// Minimal contract an S3-style object store client must satisfy.
///
/// The concrete SDK (with its buckets, credentials, multipart plumbing
/// and deadlines) is an external collaborator; the adapter only needs
/// these four operations against object names like `2c/f24dba…`.
pub trait ObjectClient: Send + Sync {
    /// Open the object's body, or `None` if it does not exist.
    fn get(&self, name: &str) -> RemoteResult<Option<Box<dyn Read + Send>>>;

    /// The object's size if it exists (a HEAD request).
    fn head(&self, name: &str) -> RemoteResult<Option<u64>>;

    /// Store the object, streaming from `body`. `size` is known up
    /// front so clients needing it (single-part PUT) can use it; others
    /// stream multipart.
    fn put(&self, name: &str, body: &mut dyn Read, size: u64) -> RemoteResult<()>;

    /// Delete the object. Deleting an absent object is not an error.
    fn delete(&self, name: &str) -> RemoteResult<()>;
}

/// A `Location` over an [`ObjectClient`], laid out exactly like the
/// local disk (`<d0d1>/<d2…dN>`) so migration is a bit-identical copy.
pub struct ObjectLocation {
    client: Arc<dyn ObjectClient>,
    algorithm: HashAlgorithm,
    split: PathSplit,
    retry: RetryPolicy,
}

impl ObjectLocation {
    pub fn new(client: Arc<dyn ObjectClient>, algorithm: HashAlgorithm) -> Self {
        Self {
            client,
            algorithm,
            split: PathSplit::default(),
            retry: RetryPolicy::default(),
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

    fn object_name(&self, key: &Key) -> LocationResult<String> {
        Ok(self.split.segments(key)?.join("/"))
    }
}

impl Location for ObjectLocation {
    fn algorithm(&self) -> Option<HashAlgorithm> {
        Some(self.algorithm)
    }

    fn read(&self, key: &Key) -> LocationResult<Option<BoxReader>> {
        let name = self.object_name(key)?;
        self.retry.run(|| {
            self.client
                .get(&name)
                .map_err(|e| e.into_location())
                .map(|body| body.map(|b| b as BoxReader))
        })
    }

    fn write(&self, key: &Key, payload: &Payload) -> LocationResult<WriteOutcome> {
        let name = self.object_name(key)?;
        self.retry.run(|| {
            // idempotent: the object is its content
            if self.client.head(&name).map_err(|e| e.into_location())?.is_some() {
                return Ok(WriteOutcome::Accepted);
            }
            let size = payload.size()?;
            let mut body = payload.open()?;
            match self.client.put(&name, &mut body, size) {
                Ok(()) => Ok(WriteOutcome::Accepted),
                Err(crate::error::RemoteError::OutOfSpace) => Ok(WriteOutcome::RejectedFull),
                Err(err) => Err(err.into_location()),
            }
        })
    }

    fn contains(&self, key: &Key) -> LocationResult<Presence> {
        let name = self.object_name(key)?;
        match self.retry.run(|| {
            self.client.head(&name).map_err(|e| e.into_location())
        }) {
            Ok(Some(_)) => Ok(Presence::Found),
            Ok(None) => Ok(Presence::Missing),
            Err(err) if err.is_transient() => Ok(Presence::Unknown),
            Err(err) => Err(err),
        }
    }

    fn delete(&self, key: &Key) -> LocationResult<DeleteOutcome> {
        let name = self.object_name(key)?;
        self.retry.run(|| {
            let existed = self
                .client
                .head(&name)
                .map_err(|e| e.into_location())?
                .is_some();
            if !existed {
                return Ok(DeleteOutcome::Absent);
            }
            self.client.delete(&name).map_err(|e| e.into_location())?;
            Ok(DeleteOutcome::Removed)
        })
    }
}
