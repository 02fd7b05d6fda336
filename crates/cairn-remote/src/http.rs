use std::io::Read;
use std::sync::{Arc, Mutex};

use tracing::debug;

use cairn_location::{
    BoxReader, DeleteOutcome, DiskConfig, Location, LocationResult, Presence, RetryPolicy,
    WriteOutcome, CONFIG_NAME,
};
use cairn_types::{HashAlgorithm, Key, PathSplit, Payload};

use crate::error::RemoteResult;

/// Minimal contract an HTTP client must satisfy to read a storage root
/// exposed by a plain autoindex (nginx in front of a disk location).
pub trait HttpClient: Send + Sync {
    /// GET the path, `None` on 404.
    fn get(&self, path: &str) -> RemoteResult<Option<Box<dyn Read + Send>>>;

    /// HEAD the path. Servers that do not answer HEAD reliably return
    /// [`Presence::Unknown`] and callers fall back to a GET.
    fn head(&self, path: &str) -> RemoteResult<Presence>;
}

/// Read-only `Location` over an HTTP-exposed storage root.
///
/// The remote layout is the disk layout, so the adapter first fetches
/// the root's `config.json` to learn the algorithm and path split; until
/// that succeeds the location declares no algorithm and serves nothing.
/// Discovery is retried on the next operation after a failure and cached
/// after the first success.
pub struct HttpLocation {
    client: Arc<dyn HttpClient>,
    retry: RetryPolicy,
    discovered: Mutex<Option<(HashAlgorithm, PathSplit)>>,
}

impl HttpLocation {
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self {
            client,
            retry: RetryPolicy::default(),
            discovered: Mutex::new(None),
        }
    }

    /// Replace the retry policy applied to transient failures.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Fetch and cache the remote root's algorithm and path split.
    /// `Ok(None)` means the remote exposes no config (yet).
    fn discover(&self) -> LocationResult<Option<(HashAlgorithm, PathSplit)>> {
        if let Some(found) = self.discovered.lock().expect("lock poisoned").clone() {
            return Ok(Some(found));
        }
        let body = self.retry.run(|| {
            self.client
                .get(CONFIG_NAME)
                .map_err(|e| e.into_location())
        })?;
        let Some(mut reader) = body else {
            debug!("remote config not found; serving nothing");
            return Ok(None);
        };
        let mut raw = String::new();
        reader.read_to_string(&mut raw)?;
        let config: DiskConfig = serde_json::from_str(&raw).map_err(|e| {
            cairn_location::LocationError::Config(format!("malformed remote config: {e}"))
        })?;
        let algorithm = config.hash.resolve()?;
        let split = config.split();
        *self.discovered.lock().expect("lock poisoned") = Some((algorithm, split.clone()));
        Ok(Some((algorithm, split)))
    }
}

impl Location for HttpLocation {
    fn algorithm(&self) -> Option<HashAlgorithm> {
        // cached only: declaring an algorithm must not do network I/O
        self.discovered
            .lock()
            .expect("lock poisoned")
            .as_ref()
            .map(|(algorithm, _)| *algorithm)
    }

    fn writable(&self) -> bool {
        false
    }

    fn read(&self, key: &Key) -> LocationResult<Option<BoxReader>> {
        let Some((_, split)) = self.discover()? else {
            return Ok(None);
        };
        let path = split.segments(key)?.join("/");
        self.retry.run(|| {
            self.client
                .get(&path)
                .map_err(|e| e.into_location())
                .map(|body| body.map(|b| b as BoxReader))
        })
    }

    fn write(&self, _key: &Key, _payload: &Payload) -> LocationResult<WriteOutcome> {
        Ok(WriteOutcome::RejectedReadOnly)
    }

    fn contains(&self, key: &Key) -> LocationResult<Presence> {
        let Some((_, split)) = self.discover()? else {
            return Ok(Presence::Unknown);
        };
        let path = split.segments(key)?.join("/");
        match self.retry.run(|| {
            self.client.head(&path).map_err(|e| e.into_location())
        }) {
            Ok(presence) => Ok(presence),
            Err(err) if err.is_transient() => Ok(Presence::Unknown),
            Err(err) => Err(err),
        }
    }

    fn delete(&self, _key: &Key) -> LocationResult<DeleteOutcome> {
        Ok(DeleteOutcome::RejectedReadOnly)
    }
}
