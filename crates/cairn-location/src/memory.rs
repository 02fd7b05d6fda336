use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use cairn_types::{HashAlgorithm, Key, Payload};

use crate::contract::{
    BoxReader, DeleteOutcome, EntryMeta, Location, Presence, WriteOutcome,
};
use crate::error::{LocationError, LocationResult};

struct MemEntry {
    data: Arc<[u8]>,
    last_used: SystemTime,
}

/// In-memory, `HashMap`-based location.
///
/// Backs combinator tests and doubles as a bounded in-process cache tier.
/// All entries are held behind an `RwLock`; payload bytes are shared via
/// `Arc`, so reads are cheap clones.
pub struct MemoryLocation {
    algorithm: HashAlgorithm,
    budget: Option<u64>,
    writable: bool,
    entries: RwLock<HashMap<Key, MemEntry>>,
}

impl MemoryLocation {
    /// An unbounded, writable in-memory location.
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self {
            algorithm,
            budget: None,
            writable: true,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Cap stored bytes; writes past the cap return `RejectedFull`.
    pub fn with_budget(mut self, budget: u64) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Make the location read-only.
    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    /// Number of entries currently stored.
    pub fn len(&self) -> usize {
        self.entries.read().expect("lock poisoned").len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total bytes across all stored entries.
    pub fn used_bytes(&self) -> u64 {
        self.entries
            .read()
            .expect("lock poisoned")
            .values()
            .map(|e| e.data.len() as u64)
            .sum()
    }
}

impl Location for MemoryLocation {
    fn algorithm(&self) -> Option<HashAlgorithm> {
        Some(self.algorithm)
    }

    fn writable(&self) -> bool {
        self.writable
    }

    fn read(&self, key: &Key) -> LocationResult<Option<BoxReader>> {
        let mut map = self.entries.write().expect("lock poisoned");
        match map.get_mut(key) {
            Some(entry) => {
                entry.last_used = SystemTime::now();
                Ok(Some(Box::new(Cursor::new(Arc::clone(&entry.data)))))
            }
            None => Ok(None),
        }
    }

    fn write(&self, key: &Key, payload: &Payload) -> LocationResult<WriteOutcome> {
        if !self.writable {
            return Ok(WriteOutcome::RejectedReadOnly);
        }

        // Idempotent: content addressing guarantees equal bytes.
        if self
            .entries
            .read()
            .expect("lock poisoned")
            .contains_key(key)
        {
            return Ok(WriteOutcome::Accepted);
        }

        let data = payload.to_vec()?;

        // Only keys of the declared algorithm's length are verifiable;
        // legacy keys of other lengths are stored as-is.
        if key.len() == self.algorithm.digest_len() {
            let computed = self.algorithm.digest(&data);
            if computed != *key {
                return Err(LocationError::DigestMismatch {
                    key: key.clone(),
                    computed,
                });
            }
        }

        let mut map = self.entries.write().expect("lock poisoned");
        if map.contains_key(key) {
            return Ok(WriteOutcome::Accepted);
        }
        if let Some(budget) = self.budget {
            let used: u64 = map.values().map(|e| e.data.len() as u64).sum();
            if used + data.len() as u64 > budget {
                return Ok(WriteOutcome::RejectedFull);
            }
        }
        map.insert(
            key.clone(),
            MemEntry {
                data: data.into(),
                last_used: SystemTime::now(),
            },
        );
        Ok(WriteOutcome::Accepted)
    }

    fn contains(&self, key: &Key) -> LocationResult<Presence> {
        let map = self.entries.read().expect("lock poisoned");
        Ok(if map.contains_key(key) {
            Presence::Found
        } else {
            Presence::Missing
        })
    }

    fn delete(&self, key: &Key) -> LocationResult<DeleteOutcome> {
        if !self.writable {
            return Ok(DeleteOutcome::RejectedReadOnly);
        }
        let mut map = self.entries.write().expect("lock poisoned");
        Ok(if map.remove(key).is_some() {
            DeleteOutcome::Removed
        } else {
            DeleteOutcome::Absent
        })
    }

    fn touch(&self, key: &Key) -> LocationResult<bool> {
        let mut map = self.entries.write().expect("lock poisoned");
        match map.get_mut(key) {
            Some(entry) => {
                entry.last_used = SystemTime::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn contents(&self) -> LocationResult<Vec<(Key, EntryMeta)>> {
        let map = self.entries.read().expect("lock poisoned");
        let mut listing: Vec<(Key, EntryMeta)> = map
            .iter()
            .map(|(key, entry)| {
                (
                    key.clone(),
                    EntryMeta {
                        size: entry.data.len() as u64,
                        last_used: Some(entry.last_used),
                    },
                )
            })
            .collect();
        listing.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(listing)
    }
}

impl std::fmt::Debug for MemoryLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryLocation")
            .field("algorithm", &self.algorithm)
            .field("entries", &self.len())
            .field("budget", &self.budget)
            .finish()
    }
}
