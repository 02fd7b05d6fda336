use std::io::{self, Read};
use std::sync::Arc;

use tracing::{debug, warn};

use cairn_types::{HashAlgorithm, Key, Payload};

use crate::contract::{
    common_algorithm, BoxReader, DeleteOutcome, EntryMeta, Location, Presence, WriteOutcome,
};
use crate::error::{LocationError, LocationResult};
use crate::retry::RetryPolicy;

/// One tier of a [`Levels`] hierarchy: a location plus read/write gates.
#[derive(Clone)]
pub struct Level {
    location: Arc<dyn Location>,
    write: bool,
    read: bool,
}

impl Level {
    /// A tier with both gates open.
    pub fn new(location: Arc<dyn Location>) -> Self {
        Self {
            location,
            write: true,
            read: true,
        }
    }

    /// Close or open the write gate.
    pub fn write(mut self, write: bool) -> Self {
        self.write = write;
        self
    }

    /// Close or open the read gate.
    pub fn read(mut self, read: bool) -> Self {
        self.read = read;
        self
    }

    pub fn location(&self) -> &Arc<dyn Location> {
        &self.location
    }

    fn is_writable(&self) -> bool {
        self.write && self.location.writable()
    }

    fn is_readable(&self) -> bool {
        self.read && self.location.readable()
    }
}

impl From<Arc<dyn Location>> for Level {
    fn from(location: Arc<dyn Location>) -> Self {
        Self::new(location)
    }
}

/// Vertical cache hierarchy: tier 0 is the top (fastest, smallest), the
/// last tier the bottom (slowest, source of truth).
///
/// Writes go to *every* writable tier, top first, so the hierarchy is
/// strictly inclusive for writes. Reads walk top to bottom; a hit at a
/// lower tier schedules copy-on-read promotion into every writable tier
/// above it. Promotion runs synchronously after the returned reader is
/// closed (dropped), by re-reading the hit tier -- content-addressed
/// entries are immutable, so the re-read observes the same bytes. The
/// reader therefore sees its first byte exactly as fast as a direct read
/// from the hit tier; promotion failures are logged and never surfaced.
pub struct Levels {
    tiers: Vec<Level>,
    algorithm: Option<HashAlgorithm>,
    retry: RetryPolicy,
}

impl Levels {
    /// Compose tiers, verifying algorithm agreement across them.
    pub fn new(tiers: Vec<Level>) -> LocationResult<Self> {
        let locations: Vec<Arc<dyn Location>> =
            tiers.iter().map(|t| t.location.clone()).collect();
        let algorithm = common_algorithm(&locations)?;
        Ok(Self {
            tiers,
            algorithm,
            retry: RetryPolicy::default(),
        })
    }

    /// Compose plain locations, all gates open.
    pub fn of(locations: Vec<Arc<dyn Location>>) -> LocationResult<Self> {
        Self::new(locations.into_iter().map(Level::new).collect())
    }

    /// Replace the retry policy applied to transient write failures.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn tiers(&self) -> &[Level] {
        &self.tiers
    }

    /// Writable tiers above `hit_index` that should receive a promoted
    /// copy.
    fn promotion_targets(&self, hit_index: usize) -> Vec<Arc<dyn Location>> {
        self.tiers[..hit_index]
            .iter()
            .filter(|t| t.is_writable())
            .map(|t| t.location.clone())
            .collect()
    }

    fn wrap_hit(&self, key: &Key, hit_index: usize, reader: BoxReader) -> BoxReader {
        let targets = self.promotion_targets(hit_index);
        if targets.is_empty() {
            return reader;
        }
        Box::new(PromoteOnClose {
            inner: reader,
            source: self.tiers[hit_index].location.clone(),
            key: key.clone(),
            targets,
        })
    }
}

impl Location for Levels {
    fn algorithm(&self) -> Option<HashAlgorithm> {
        self.algorithm
    }

    fn writable(&self) -> bool {
        self.tiers.iter().any(Level::is_writable)
    }

    fn readable(&self) -> bool {
        self.tiers.iter().any(Level::is_readable)
    }

    fn read(&self, key: &Key) -> LocationResult<Option<BoxReader>> {
        let mut transient = Vec::new();
        let mut saw_absent = false;
        for (i, tier) in self.tiers.iter().enumerate() {
            if !tier.is_readable() {
                continue;
            }
            match tier.location.read(key) {
                Ok(Some(reader)) => return Ok(Some(self.wrap_hit(key, i, reader))),
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
        let mut accepted = false;
        let mut rejected = false;
        for tier in self.tiers.iter().filter(|t| t.is_writable()) {
            match self.retry.run(|| tier.location.write(key, payload)) {
                Ok(WriteOutcome::Accepted) => accepted = true,
                Ok(_) => rejected = true,
                Err(err) => return Err(err),
            }
        }
        Ok(if accepted {
            WriteOutcome::Accepted
        } else if rejected {
            WriteOutcome::RejectedFull
        } else {
            WriteOutcome::RejectedReadOnly
        })
    }

    fn contains(&self, key: &Key) -> LocationResult<Presence> {
        let mut unknown = false;
        for tier in &self.tiers {
            if !tier.is_readable() {
                continue;
            }
            match tier.location.contains(key) {
                Ok(Presence::Found) => return Ok(Presence::Found),
                Ok(Presence::Missing) => {}
                Ok(Presence::Unknown) => unknown = true,
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
        let mut first_err = None;
        for tier in &self.tiers {
            match tier.location.delete(key) {
                Ok(DeleteOutcome::Removed) => removed = true,
                Ok(_) => {}
                Err(err) => {
                    if first_err.is_none() {
                        first_err = Some(err);
                    }
                }
            }
        }
        if removed {
            Ok(DeleteOutcome::Removed)
        } else if let Some(err) = first_err {
            Err(err)
        } else {
            Ok(DeleteOutcome::Absent)
        }
    }

    fn touch(&self, key: &Key) -> LocationResult<bool> {
        let mut touched = false;
        for tier in &self.tiers {
            touched |= tier.location.touch(key)?;
        }
        Ok(touched)
    }

    fn read_batch(&self, keys: &[Key]) -> Vec<(Key, LocationResult<Option<BoxReader>>)> {
        let mut results: Vec<(Key, LocationResult<Option<BoxReader>>)> = Vec::new();
        let mut remaining: Vec<Key> = keys.to_vec();
        for (i, tier) in self.tiers.iter().enumerate() {
            if remaining.is_empty() {
                break;
            }
            if !tier.is_readable() {
                continue;
            }
            let mut next_round = Vec::new();
            for (key, result) in tier.location.read_batch(&remaining) {
                match result {
                    Ok(Some(reader)) => {
                        let wrapped = self.wrap_hit(&key, i, reader);
                        results.push((key, Ok(Some(wrapped))));
                    }
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

    fn contents(&self) -> LocationResult<Vec<(Key, EntryMeta)>> {
        let mut listing = Vec::new();
        for tier in &self.tiers {
            listing.extend(tier.location.contents()?);
        }
        Ok(listing)
    }
}

/// Reader returned for a hit below the top tier; performs copy-on-read
/// promotion when dropped.
struct PromoteOnClose {
    inner: BoxReader,
    source: Arc<dyn Location>,
    key: Key,
    targets: Vec<Arc<dyn Location>>,
}

impl Read for PromoteOnClose {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Drop for PromoteOnClose {
    fn drop(&mut self) {
        if let Err(err) = promote(&self.source, &self.key, &self.targets) {
            warn!(key = %self.key.short_hex(), error = %err, "copy-on-read promotion failed");
        }
    }
}

/// Copy `key` from `source` into each target that does not already hold
/// it. Spools through a temp file so every target can open its own
/// reader.
fn promote(
    source: &Arc<dyn Location>,
    key: &Key,
    targets: &[Arc<dyn Location>],
) -> LocationResult<()> {
    let Some(mut reader) = source.read(key)? else {
        // deleted between the hit and the promotion; nothing to copy
        return Ok(());
    };
    let mut spool = tempfile::NamedTempFile::new()?;
    io::copy(&mut reader, spool.as_file_mut())?;
    let payload = Payload::from_file(spool.path());

    for target in targets {
        if matches!(target.contains(key), Ok(Presence::Found)) {
            continue;
        }
        match target.write(key, &payload) {
            Ok(WriteOutcome::Accepted) => {
                debug!(key = %key.short_hex(), "promoted entry to higher tier");
            }
            Ok(outcome) => {
                debug!(key = %key.short_hex(), ?outcome, "promotion rejected");
            }
            Err(err) => {
                warn!(key = %key.short_hex(), error = %err, "promotion write failed");
            }
        }
    }
    Ok(())
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

    fn two_tier() -> (Levels, Arc<MemoryLocation>, Arc<MemoryLocation>) {
        let top = Arc::new(MemoryLocation::new(HashAlgorithm::Sha256));
        let bottom = Arc::new(MemoryLocation::new(HashAlgorithm::Sha256));
        let levels =
            Levels::of(vec![top.clone() as Arc<dyn Location>, bottom.clone() as _]).unwrap();
        (levels, top, bottom)
    }

    #[test]
    fn write_reaches_every_writable_tier() {
        let (levels, top, bottom) = two_tier();
        let (key, payload) = keyed(b"x");
        assert_eq!(
            levels.write(&key, &payload).unwrap(),
            WriteOutcome::Accepted
        );
        assert_eq!(top.len(), 1);
        assert_eq!(bottom.len(), 1);
    }

    #[test]
    fn read_promotes_into_higher_tiers_on_close() {
        let (levels, top, bottom) = two_tier();
        let (key, payload) = keyed(b"x");
        levels.write(&key, &payload).unwrap();

        // Drop the entry from the top tier, then read through the levels.
        top.delete(&key).unwrap();
        assert_eq!(top.contains(&key).unwrap(), Presence::Missing);

        let mut buf = Vec::new();
        let mut reader = levels.read(&key).unwrap().expect("hit in bottom tier");
        reader.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"x");
        drop(reader);

        // The close repopulated the top tier from the bottom one.
        assert_eq!(top.contains(&key).unwrap(), Presence::Found);
        assert_eq!(bottom.contains(&key).unwrap(), Presence::Found);
    }

    #[test]
    fn promotion_skips_write_gated_tiers() {
        let top = Arc::new(MemoryLocation::new(HashAlgorithm::Sha256));
        let bottom = Arc::new(MemoryLocation::new(HashAlgorithm::Sha256));
        let levels = Levels::new(vec![
            Level::new(top.clone()).write(false),
            Level::new(bottom.clone()),
        ])
        .unwrap();

        let (key, payload) = keyed(b"cold");
        bottom.write(&key, &payload).unwrap();

        drop(levels.read(&key).unwrap().expect("hit"));
        assert!(top.is_empty());
    }

    #[test]
    fn read_gated_tier_is_skipped() {
        let top = Arc::new(MemoryLocation::new(HashAlgorithm::Sha256));
        let bottom = Arc::new(MemoryLocation::new(HashAlgorithm::Sha256));
        let levels = Levels::new(vec![
            Level::new(top.clone()).read(false),
            Level::new(bottom.clone()),
        ])
        .unwrap();

        let (key, payload) = keyed(b"hidden");
        top.write(&key, &payload).unwrap();

        // The only copy sits in a tier whose read gate is closed.
        assert!(levels.read(&key).unwrap().is_none());
        assert_eq!(levels.contains(&key).unwrap(), Presence::Missing);
    }

    #[test]
    fn all_tiers_full_rejects_full() {
        let top = Arc::new(MemoryLocation::new(HashAlgorithm::Sha256).with_budget(1));
        let bottom = Arc::new(MemoryLocation::new(HashAlgorithm::Sha256).with_budget(1));
        let levels = Levels::of(vec![top as Arc<dyn Location>, bottom as _]).unwrap();

        let (key, payload) = keyed(&[1u8; 64]);
        assert_eq!(
            levels.write(&key, &payload).unwrap(),
            WriteOutcome::RejectedFull
        );
    }

    #[test]
    fn partial_full_still_accepts() {
        let top = Arc::new(MemoryLocation::new(HashAlgorithm::Sha256).with_budget(1));
        let bottom = Arc::new(MemoryLocation::new(HashAlgorithm::Sha256));
        let levels =
            Levels::of(vec![top as Arc<dyn Location>, bottom.clone() as _]).unwrap();

        let (key, payload) = keyed(&[2u8; 64]);
        assert_eq!(
            levels.write(&key, &payload).unwrap(),
            WriteOutcome::Accepted
        );
        assert_eq!(bottom.len(), 1);
    }

    #[test]
    fn no_writable_tier_rejects_read_only() {
        let a = Arc::new(MemoryLocation::new(HashAlgorithm::Sha256).read_only());
        let levels = Levels::of(vec![a as Arc<dyn Location>]).unwrap();
        let (key, payload) = keyed(b"ro");
        assert_eq!(
            levels.write(&key, &payload).unwrap(),
            WriteOutcome::RejectedReadOnly
        );
    }

    #[test]
    fn delete_broadcasts_to_all_tiers() {
        let (levels, top, bottom) = two_tier();
        let (key, payload) = keyed(b"gone");
        levels.write(&key, &payload).unwrap();

        assert_eq!(levels.delete(&key).unwrap(), DeleteOutcome::Removed);
        assert!(top.is_empty());
        assert!(bottom.is_empty());
    }

    #[test]
    fn read_batch_promotes_hits() {
        let (levels, top, _bottom) = two_tier();
        let (k1, p1) = keyed(b"one");
        let (k2, p2) = keyed(b"two");
        levels.write(&k1, &p1).unwrap();
        levels.write(&k2, &p2).unwrap();
        top.delete(&k1).unwrap();
        top.delete(&k2).unwrap();

        for (_key, result) in levels.read_batch(&[k1.clone(), k2.clone()]) {
            let mut reader = result.unwrap().expect("hit");
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf).unwrap();
        }
        assert_eq!(top.contains(&k1).unwrap(), Presence::Found);
        assert_eq!(top.contains(&k2).unwrap(), Presence::Found);
    }
}
