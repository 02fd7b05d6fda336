use std::sync::Arc;

use cairn_types::{HashAlgorithm, Key, Payload};

use crate::contract::{
    BoxReader, DeleteOutcome, EntryMeta, Location, Presence, WriteOutcome,
};
use crate::error::LocationResult;

/// Gates writes into a child location by payload size.
///
/// Writes larger than the threshold return `RejectedPolicy` without
/// touching the child. Reads, probes and deletes pass through unchanged:
/// entries written before a threshold change must stay readable.
pub struct Small {
    child: Arc<dyn Location>,
    threshold: u64,
}

impl Small {
    pub fn new(child: Arc<dyn Location>, threshold: u64) -> Self {
        Self { child, threshold }
    }

    /// The maximum accepted payload size in bytes.
    pub fn threshold(&self) -> u64 {
        self.threshold
    }
}

impl Location for Small {
    fn algorithm(&self) -> Option<HashAlgorithm> {
        self.child.algorithm()
    }

    fn writable(&self) -> bool {
        self.child.writable()
    }

    fn readable(&self) -> bool {
        self.child.readable()
    }

    fn read(&self, key: &Key) -> LocationResult<Option<BoxReader>> {
        self.child.read(key)
    }

    fn write(&self, key: &Key, payload: &Payload) -> LocationResult<WriteOutcome> {
        if payload.size()? > self.threshold {
            return Ok(WriteOutcome::RejectedPolicy);
        }
        self.child.write(key, payload)
    }

    fn contains(&self, key: &Key) -> LocationResult<Presence> {
        self.child.contains(key)
    }

    fn delete(&self, key: &Key) -> LocationResult<DeleteOutcome> {
        self.child.delete(key)
    }

    fn touch(&self, key: &Key) -> LocationResult<bool> {
        self.child.touch(key)
    }

    fn read_batch(&self, keys: &[Key]) -> Vec<(Key, LocationResult<Option<BoxReader>>)> {
        self.child.read_batch(keys)
    }

    fn contents(&self) -> LocationResult<Vec<(Key, EntryMeta)>> {
        self.child.contents()
    }
}
