use std::io::Read;
use std::sync::Arc;
use std::time::SystemTime;

use cairn_types::{HashAlgorithm, Key, Payload};

use crate::error::{LocationError, LocationResult};

/// A boxed byte stream returned by reads.
pub type BoxReader = Box<dyn Read + Send>;

/// Result of offering a payload to a location.
///
/// Rejections are data, not errors: combinators advance on them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The payload is durably stored (or already was -- writes are
    /// idempotent under content addressing).
    Accepted,
    /// The backing store is out of budget.
    RejectedFull,
    /// The location is not writable.
    RejectedReadOnly,
    /// A configured predicate (e.g. a size filter) refused the payload.
    RejectedPolicy,
}

impl WriteOutcome {
    /// Whether the payload landed.
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Result of an existence probe.
///
/// `Unknown` is legal for backends where a probe is expensive; callers
/// must then attempt a read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Presence {
    Found,
    Missing,
    Unknown,
}

/// Result of a delete.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    Removed,
    Absent,
    RejectedReadOnly,
}

/// Per-entry metadata surfaced by [`Location::contents`].
#[derive(Clone, Debug)]
pub struct EntryMeta {
    /// Payload size in bytes.
    pub size: u64,
    /// Last successful access, where the backend tracks one.
    pub last_used: Option<SystemTime>,
}

/// A polymorphic storage backend participating in the location algebra.
///
/// All implementations must satisfy these invariants:
/// - Entries are immutable once written; content addressing guarantees
///   that a key always maps to the same bytes.
/// - A reader never observes a partially written payload: it sees a
///   complete entry or absence.
/// - Absence is `Ok(None)` / `Missing` / `Absent`, never an error.
/// - Operations are re-entrant per key and safe to call from multiple
///   threads.
pub trait Location: Send + Sync {
    /// The digest algorithm this location expects, if it declares one.
    ///
    /// Combinators require all children that declare an algorithm to
    /// agree; mixing algorithms is a construction-time error.
    fn algorithm(&self) -> Option<HashAlgorithm>;

    /// May new keys be written?
    fn writable(&self) -> bool {
        true
    }

    /// May keys be read?
    fn readable(&self) -> bool {
        true
    }

    /// Open a byte stream for `key`, or `None` if the key is not held.
    fn read(&self, key: &Key) -> LocationResult<Option<BoxReader>>;

    /// Offer a payload for `key`. The payload is re-openable; the
    /// location opens its own reader and never consumes the caller's.
    fn write(&self, key: &Key, payload: &Payload) -> LocationResult<WriteOutcome>;

    /// Cheap existence probe.
    fn contains(&self, key: &Key) -> LocationResult<Presence>;

    /// Remove `key` if held.
    fn delete(&self, key: &Key) -> LocationResult<DeleteOutcome>;

    /// Update last-access metadata where supported. Returns whether the
    /// key was present. The default is a no-op.
    fn touch(&self, _key: &Key) -> LocationResult<bool> {
        Ok(false)
    }

    /// Read several keys. The default loops [`read`]; combinators
    /// override to consult each child once for the whole key set.
    ///
    /// [`read`]: Self::read
    fn read_batch(&self, keys: &[Key]) -> Vec<(Key, LocationResult<Option<BoxReader>>)> {
        keys.iter()
            .map(|key| (key.clone(), self.read(key)))
            .collect()
    }

    /// Enumerate held keys with metadata. Backends where enumeration is
    /// impractical return an empty list.
    fn contents(&self) -> LocationResult<Vec<(Key, EntryMeta)>> {
        Ok(Vec::new())
    }
}

/// The algorithm shared by a set of children, if consistent.
///
/// Children that declare no algorithm are ignored; two children declaring
/// different algorithms make the composition unconstructible.
pub fn common_algorithm(
    children: &[Arc<dyn Location>],
) -> LocationResult<Option<HashAlgorithm>> {
    let mut found: Option<HashAlgorithm> = None;
    for child in children {
        if let Some(algorithm) = child.algorithm() {
            match found {
                None => found = Some(algorithm),
                Some(existing) if existing == algorithm => {}
                Some(existing) => {
                    return Err(LocationError::Config(format!(
                        "mixed digest algorithms in composition: {existing} vs {algorithm}"
                    )));
                }
            }
        }
    }
    Ok(found)
}
