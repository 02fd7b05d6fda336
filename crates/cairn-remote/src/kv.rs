use std::io::Cursor;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use cairn_location::{
    BoxReader, DeleteOutcome, Location, LocationResult, Presence, RetryPolicy, WriteOutcome,
};
use cairn_types::{HashAlgorithm, Key, Payload};

use crate::error::{RemoteError, RemoteResult};

/// Minimal contract a Redis-style key-value client must satisfy.
///
/// Values live under namespaced binary keys; the adapter never issues
/// anything fancier than get/set/exists/delete. A backend that runs out
/// of memory reports [`RemoteError::OutOfSpace`], which the adapter
/// turns into a full rejection so a fanout can spill elsewhere.
pub trait KvClient: Send + Sync {
    fn get(&self, key: &[u8]) -> RemoteResult<Option<Vec<u8>>>;
    fn set(&self, key: &[u8], value: &[u8]) -> RemoteResult<()>;
    fn exists(&self, key: &[u8]) -> RemoteResult<bool>;
    /// Returns whether the key existed.
    fn delete(&self, key: &[u8]) -> RemoteResult<bool>;
}

/// A `Location` over a [`KvClient`], intended for small payloads --
/// typically composed as `Small(KvLocation, threshold)`.
///
/// Layout: content under `<prefix>:<hex-digest>`, last-access timestamp
/// under `<prefix>:time:<hex-digest>` (same textual format as the disk
/// backend's `.time` files).
pub struct KvLocation {
    client: Arc<dyn KvClient>,
    prefix: Vec<u8>,
    algorithm: HashAlgorithm,
    retry: RetryPolicy,
}

impl KvLocation {
    pub fn new(
        client: Arc<dyn KvClient>,
        prefix: impl Into<Vec<u8>>,
        algorithm: HashAlgorithm,
    ) -> Self {
        Self {
            client,
            prefix: prefix.into(),
            algorithm,
            retry: RetryPolicy::default(),
        }
    }

    /// Replace the retry policy applied to transient failures.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn content_key(&self, key: &Key) -> Vec<u8> {
        let mut out = self.prefix.clone();
        out.push(b':');
        out.extend_from_slice(key.to_hex().as_bytes());
        out
    }

    fn time_key(&self, key: &Key) -> Vec<u8> {
        let mut out = self.prefix.clone();
        out.extend_from_slice(b":time:");
        out.extend_from_slice(key.to_hex().as_bytes());
        out
    }

    fn stamp_now(&self, key: &Key) -> RemoteResult<()> {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        let stamp = format!("{:.6}\n", since_epoch.as_secs_f64());
        self.client.set(&self.time_key(key), stamp.as_bytes())
    }
}

impl Location for KvLocation {
    fn algorithm(&self) -> Option<HashAlgorithm> {
        Some(self.algorithm)
    }

    fn read(&self, key: &Key) -> LocationResult<Option<BoxReader>> {
        let content_key = self.content_key(key);
        let value = self.retry.run(|| {
            self.client
                .get(&content_key)
                .map_err(|e| e.into_location())
        })?;
        match value {
            Some(data) => {
                if let Err(err) = self.stamp_now(key) {
                    tracing::debug!(key = %key.short_hex(), error = %err, "kv last-access update failed");
                }
                Ok(Some(Box::new(Cursor::new(data)) as BoxReader))
            }
            None => Ok(None),
        }
    }

    fn write(&self, key: &Key, payload: &Payload) -> LocationResult<WriteOutcome> {
        let content_key = self.content_key(key);
        self.retry.run(|| {
            if self
                .client
                .exists(&content_key)
                .map_err(|e| e.into_location())?
            {
                return Ok(WriteOutcome::Accepted);
            }
            let data = payload.to_vec()?;
            match self.client.set(&content_key, &data) {
                Ok(()) => {
                    if let Err(err) = self.stamp_now(key) {
                        tracing::debug!(key = %key.short_hex(), error = %err, "kv last-access update failed");
                    }
                    Ok(WriteOutcome::Accepted)
                }
                Err(RemoteError::OutOfSpace) => Ok(WriteOutcome::RejectedFull),
                Err(err) => Err(err.into_location()),
            }
        })
    }

    fn contains(&self, key: &Key) -> LocationResult<Presence> {
        let content_key = self.content_key(key);
        match self.retry.run(|| {
            self.client
                .exists(&content_key)
                .map_err(|e| e.into_location())
        }) {
            Ok(true) => Ok(Presence::Found),
            Ok(false) => Ok(Presence::Missing),
            Err(err) if err.is_transient() => Ok(Presence::Unknown),
            Err(err) => Err(err),
        }
    }

    fn delete(&self, key: &Key) -> LocationResult<DeleteOutcome> {
        let content_key = self.content_key(key);
        let time_key = self.time_key(key);
        self.retry.run(|| {
            let existed = self
                .client
                .delete(&content_key)
                .map_err(|e| e.into_location())?;
            let _ = self.client.delete(&time_key);
            Ok(if existed {
                DeleteOutcome::Removed
            } else {
                DeleteOutcome::Absent
            })
        })
    }

    fn touch(&self, key: &Key) -> LocationResult<bool> {
        let content_key = self.content_key(key);
        if !self
            .client
            .exists(&content_key)
            .map_err(|e| e.into_location())?
        {
            return Ok(false);
        }
        self.stamp_now(key).map_err(|e| e.into_location())?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_location::Small;
    use std::collections::HashMap;
    use std::io::Read as _;
    use std::sync::Mutex;

    /// In-memory stand-in for a KV store with an optional memory cap.
    #[derive(Default)]
    struct FakeKv {
        map: Mutex<HashMap<Vec<u8>, Vec<u8>>>,
        capacity: Option<usize>,
    }

    impl FakeKv {
        fn bounded(capacity: usize) -> Self {
            Self {
                map: Mutex::default(),
                capacity: Some(capacity),
            }
        }

        fn used(&self) -> usize {
            self.map
                .lock()
                .expect("lock poisoned")
                .values()
                .map(Vec::len)
                .sum()
        }
    }

    impl KvClient for FakeKv {
        fn get(&self, key: &[u8]) -> RemoteResult<Option<Vec<u8>>> {
            Ok(self.map.lock().expect("lock poisoned").get(key).cloned())
        }

        fn set(&self, key: &[u8], value: &[u8]) -> RemoteResult<()> {
            if let Some(capacity) = self.capacity {
                if self.used() + value.len() > capacity {
                    return Err(RemoteError::OutOfSpace);
                }
            }
            self.map
                .lock()
                .expect("lock poisoned")
                .insert(key.to_vec(), value.to_vec());
            Ok(())
        }

        fn exists(&self, key: &[u8]) -> RemoteResult<bool> {
            Ok(self.map.lock().expect("lock poisoned").contains_key(key))
        }

        fn delete(&self, key: &[u8]) -> RemoteResult<bool> {
            Ok(self
                .map
                .lock()
                .expect("lock poisoned")
                .remove(key)
                .is_some())
        }
    }

    fn keyed(data: &[u8]) -> (Key, Payload) {
        (
            HashAlgorithm::Sha256.digest(data),
            Payload::from_bytes(data.to_vec()),
        )
    }

    #[test]
    fn roundtrip_under_namespaced_key() {
        let kv = Arc::new(FakeKv::default());
        let location = KvLocation::new(kv.clone(), b"cache".to_vec(), HashAlgorithm::Sha256);
        let (key, payload) = keyed(b"small value");

        location.write(&key, &payload).unwrap();

        let expected_kv_key =
            [b"cache:".as_slice(), key.to_hex().as_bytes()].concat();
        assert!(kv.map.lock().unwrap().contains_key(&expected_kv_key));

        let mut buf = Vec::new();
        location
            .read(&key)
            .unwrap()
            .expect("stored")
            .read_to_end(&mut buf)
            .unwrap();
        assert_eq!(buf, b"small value");
    }

    #[test]
    fn oom_becomes_rejected_full() {
        let kv = Arc::new(FakeKv::bounded(16));
        let location = KvLocation::new(kv, b"c".to_vec(), HashAlgorithm::Sha256);
        let (key, payload) = keyed(&[1u8; 64]);
        assert_eq!(
            location.write(&key, &payload).unwrap(),
            WriteOutcome::RejectedFull
        );
    }

    #[test]
    fn small_gate_protects_the_kv_store() {
        // The canonical composition: Small(threshold) over a KV store.
        // Oversized payloads never reach the backend.
        let kv = Arc::new(FakeKv::default());
        let location = Arc::new(KvLocation::new(
            kv.clone(),
            b"c".to_vec(),
            HashAlgorithm::Sha256,
        ));
        let small = Small::new(location, 1024);

        let (big_key, big) = keyed(&[2u8; 2048]);
        assert_eq!(
            small.write(&big_key, &big).unwrap(),
            WriteOutcome::RejectedPolicy
        );
        assert!(kv.map.lock().unwrap().is_empty());

        let (small_key, little) = keyed(&[3u8; 512]);
        assert_eq!(
            small.write(&small_key, &little).unwrap(),
            WriteOutcome::Accepted
        );
        assert_eq!(small.contains(&small_key).unwrap(), Presence::Found);
    }

    #[test]
    fn delete_removes_content_and_timestamp() {
        let kv = Arc::new(FakeKv::default());
        let location = KvLocation::new(kv.clone(), b"c".to_vec(), HashAlgorithm::Sha256);
        let (key, payload) = keyed(b"doomed");
        location.write(&key, &payload).unwrap();
        assert_eq!(kv.map.lock().unwrap().len(), 2);

        assert_eq!(location.delete(&key).unwrap(), DeleteOutcome::Removed);
        assert!(kv.map.lock().unwrap().is_empty());
        assert_eq!(location.delete(&key).unwrap(), DeleteOutcome::Absent);
    }

    #[test]
    fn touch_requires_presence() {
        let kv = Arc::new(FakeKv::default());
        let location = KvLocation::new(kv, b"c".to_vec(), HashAlgorithm::Sha256);
        let (key, payload) = keyed(b"here");
        assert!(!location.touch(&key).unwrap());
        location.write(&key, &payload).unwrap();
        assert!(location.touch(&key).unwrap());
    }
}
