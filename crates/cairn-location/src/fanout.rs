use std::sync::Arc;

use cairn_types::{HashAlgorithm, Key, Payload};

use crate::contract::{
    common_algorithm, BoxReader, DeleteOutcome, Location, Presence, WriteOutcome,
};
use crate::error::{LocationError, LocationResult};

/// Horizontal spill across an ordered list of peer locations.
///
/// Reads consult children in declared order and return the first hit.
/// Writes land in exactly one child: the first whose write is accepted;
/// every rejection code advances to the next child. This is what turns a
/// list of budget-capped stores into one store that fills left to right.
pub struct Fanout {
    children: Vec<Arc<dyn Location>>,
    algorithm: Option<HashAlgorithm>,
}

impl Fanout {
    /// Compose children, verifying they agree on a digest algorithm.
    pub fn new(children: Vec<Arc<dyn Location>>) -> LocationResult<Self> {
        let algorithm = common_algorithm(&children)?;
        Ok(Self {
            children,
            algorithm,
        })
    }

    pub fn children(&self) -> &[Arc<dyn Location>] {
        &self.children
    }
}

impl Location for Fanout {
    fn algorithm(&self) -> Option<HashAlgorithm> {
        self.algorithm
    }

    fn writable(&self) -> bool {
        self.children.iter().any(|c| c.writable())
    }

    fn readable(&self) -> bool {
        self.children.iter().any(|c| c.readable())
    }

    fn read(&self, key: &Key) -> LocationResult<Option<BoxReader>> {
        let mut transient = Vec::new();
        let mut saw_absent = false;
        for child in &self.children {
            if !child.readable() {
                continue;
            }
            match child.read(key) {
                Ok(Some(reader)) => return Ok(Some(reader)),
                Ok(None) => saw_absent = true,
                Err(err) if err.is_transient() => transient.push(err),
                Err(err) => return Err(err),
            }
        }
        if transient.is_empty() || saw_absent {
            Ok(None)
        } else {
            Err(LocationError::aggregate_transient(transient))
        }
    }

    fn write(&self, key: &Key, payload: &Payload) -> LocationResult<WriteOutcome> {
        let mut transient = Vec::new();
        let mut rejected = false;
        for child in &self.children {
            match child.write(key, payload) {
                Ok(WriteOutcome::Accepted) => return Ok(WriteOutcome::Accepted),
                Ok(_) => rejected = true,
                Err(err) if err.is_transient() => transient.push(err),
                Err(err) => return Err(err),
            }
        }
        if rejected || transient.is_empty() {
            Ok(WriteOutcome::RejectedFull)
        } else {
            Err(LocationError::aggregate_transient(transient))
        }
    }

    fn contains(&self, key: &Key) -> LocationResult<Presence> {
        let mut unknown = false;
        for child in &self.children {
            if !child.readable() {
                continue;
            }
            match child.contains(key) {
                Ok(Presence::Found) => return Ok(Presence::Found),
                Ok(Presence::Missing) => {}
                Ok(Presence::Unknown) => unknown = true,
                // an unreachable child can't rule the key out
                Err(err) if err.is_transient() => unknown = true,
                Err(err) => return Err(err),
            }
        }
        Ok(if unknown {
            Presence::Unknown
        } else {
            Presence::Missing
        })
    }

    fn delete(&self, key: &Key) -> LocationResult<DeleteOutcome> {
        let mut removed = false;
        let mut read_only = 0usize;
        let mut first_err = None;
        for child in &self.children {
            match child.delete(key) {
                Ok(DeleteOutcome::Removed) => removed = true,
                Ok(DeleteOutcome::Absent) => {}
                Ok(DeleteOutcome::RejectedReadOnly) => read_only += 1,
                Err(err) => {
                    if first_err.is_none() {
                        first_err = Some(err);
                    }
                }
            }
        }
        if removed {
            return Ok(DeleteOutcome::Removed);
        }
        if let Some(err) = first_err {
            return Err(err);
        }
        Ok(if read_only == self.children.len() && read_only > 0 {
            DeleteOutcome::RejectedReadOnly
        } else {
            DeleteOutcome::Absent
        })
    }

    fn touch(&self, key: &Key) -> LocationResult<bool> {
        let mut touched = false;
        for child in &self.children {
            touched |= child.touch(key)?;
        }
        Ok(touched)
    }

    fn contents(&self) -> LocationResult<Vec<(Key, crate::contract::EntryMeta)>> {
        let mut listing = Vec::new();
        for child in &self.children {
            listing.extend(child.contents()?);
        }
        Ok(listing)
    }

    fn read_batch(&self, keys: &[Key]) -> Vec<(Key, LocationResult<Option<BoxReader>>)> {
        // One pass per child over the still-missing keys, preserving the
        // single-read ordering semantics without re-probing hits.
        let mut results: Vec<(Key, LocationResult<Option<BoxReader>>)> = Vec::new();
        let mut remaining: Vec<Key> = keys.to_vec();
        for child in &self.children {
            if remaining.is_empty() {
                break;
            }
            if !child.readable() {
                continue;
            }
            let mut next_round = Vec::new();
            for (key, result) in child.read_batch(&remaining) {
                match result {
                    Ok(Some(reader)) => results.push((key, Ok(Some(reader)))),
                    _ => next_round.push(key),
                }
            }
            remaining = next_round;
        }
        for key in remaining {
            results.push((key, Ok(None)));
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryLocation;
    use std::io::Read as _;

    fn keyed(data: &[u8]) -> (Key, Payload) {
        (
            HashAlgorithm::Sha256.digest(data),
            Payload::from_bytes(data.to_vec()),
        )
    }

    #[test]
    fn write_lands_in_first_accepting_child() {
        let a = Arc::new(MemoryLocation::new(HashAlgorithm::Sha256).with_budget(100));
        let b = Arc::new(MemoryLocation::new(HashAlgorithm::Sha256).with_budget(1 << 20));
        let fanout =
            Fanout::new(vec![a.clone() as Arc<dyn Location>, b.clone() as _]).unwrap();

        // Five 30-byte payloads: the first three fit child 0's 100-byte
        // budget, the rest spill into child 1.
        let mut keys = Vec::new();
        for i in 0u8..5 {
            let (key, payload) = keyed(&[i; 30]);
            assert_eq!(
                fanout.write(&key, &payload).unwrap(),
                WriteOutcome::Accepted
            );
            keys.push(key);
        }
        assert_eq!(a.len(), 3);
        assert_eq!(b.len(), 2);

        // Everything stays readable through the fanout.
        for key in &keys {
            assert!(fanout.read(key).unwrap().is_some());
        }
    }

    #[test]
    fn read_returns_first_hit() {
        let a = Arc::new(MemoryLocation::new(HashAlgorithm::Sha256));
        let b = Arc::new(MemoryLocation::new(HashAlgorithm::Sha256));
        let (key, payload) = keyed(b"in b only");
        b.write(&key, &payload).unwrap();

        let fanout = Fanout::new(vec![a as Arc<dyn Location>, b as _]).unwrap();
        let mut buf = Vec::new();
        fanout
            .read(&key)
            .unwrap()
            .expect("hit in second child")
            .read_to_end(&mut buf)
            .unwrap();
        assert_eq!(buf, b"in b only");
    }

    #[test]
    fn all_rejections_yield_full() {
        let a = Arc::new(MemoryLocation::new(HashAlgorithm::Sha256).with_budget(1));
        let b = Arc::new(MemoryLocation::new(HashAlgorithm::Sha256).read_only());
        let fanout = Fanout::new(vec![a as Arc<dyn Location>, b as _]).unwrap();

        let (key, payload) = keyed(&[9u8; 64]);
        assert_eq!(
            fanout.write(&key, &payload).unwrap(),
            WriteOutcome::RejectedFull
        );
    }

    #[test]
    fn contains_short_circuits() {
        let a = Arc::new(MemoryLocation::new(HashAlgorithm::Sha256));
        let b = Arc::new(MemoryLocation::new(HashAlgorithm::Sha256));
        let (key, payload) = keyed(b"present");
        a.write(&key, &payload).unwrap();

        let fanout = Fanout::new(vec![a as Arc<dyn Location>, b as _]).unwrap();
        assert_eq!(fanout.contains(&key).unwrap(), Presence::Found);
        let missing = HashAlgorithm::Sha256.digest(b"missing");
        assert_eq!(fanout.contains(&missing).unwrap(), Presence::Missing);
    }

    #[test]
    fn delete_broadcasts() {
        let a = Arc::new(MemoryLocation::new(HashAlgorithm::Sha256));
        let b = Arc::new(MemoryLocation::new(HashAlgorithm::Sha256));
        let (key, payload) = keyed(b"everywhere");
        a.write(&key, &payload).unwrap();
        b.write(&key, &payload).unwrap();

        let fanout =
            Fanout::new(vec![a.clone() as Arc<dyn Location>, b.clone() as _]).unwrap();
        assert_eq!(fanout.delete(&key).unwrap(), DeleteOutcome::Removed);
        assert!(a.is_empty());
        assert!(b.is_empty());
        assert_eq!(fanout.delete(&key).unwrap(), DeleteOutcome::Absent);
    }

    #[test]
    fn mixed_algorithms_fail_construction() {
        let a = Arc::new(MemoryLocation::new(HashAlgorithm::Sha256));
        let b = Arc::new(MemoryLocation::new(HashAlgorithm::Blake3));
        assert!(Fanout::new(vec![a as Arc<dyn Location>, b as _]).is_err());
    }

    #[test]
    fn read_batch_consults_each_child_once() {
        let a = Arc::new(MemoryLocation::new(HashAlgorithm::Sha256));
        let b = Arc::new(MemoryLocation::new(HashAlgorithm::Sha256));
        let (k1, p1) = keyed(b"first");
        let (k2, p2) = keyed(b"second");
        a.write(&k1, &p1).unwrap();
        b.write(&k2, &p2).unwrap();

        let fanout = Fanout::new(vec![a as Arc<dyn Location>, b as _]).unwrap();
        let missing = HashAlgorithm::Sha256.digest(b"nowhere");
        let results = fanout.read_batch(&[k1.clone(), k2.clone(), missing.clone()]);
        assert_eq!(results.len(), 3);

        let hit = |key: &Key| {
            results
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, r)| r.as_ref().unwrap().is_some())
                .unwrap()
        };
        assert!(hit(&k1));
        assert!(hit(&k2));
        assert!(!hit(&missing));
    }
}
