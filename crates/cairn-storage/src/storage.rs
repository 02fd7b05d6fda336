use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use cairn_location::{
    common_algorithm, BoxReader, DeleteOutcome, DiskConfig, DiskLocation, Fanout, Level,
    Levels, Location, Presence, WriteOutcome,
};
use cairn_types::{Digester, HashAlgorithm, Key};

use crate::error::{StorageError, StorageResult};
use crate::source::WriteSource;

/// Something that can be turned into a location at build time: an
/// existing location, a filesystem path (coerced to a disk location), or
/// a group of specs (coerced to a fanout).
pub enum LocationSpec {
    Location(Arc<dyn Location>),
    Path(PathBuf),
    Group(Vec<LocationSpec>),
}

impl From<Arc<dyn Location>> for LocationSpec {
    fn from(location: Arc<dyn Location>) -> Self {
        Self::Location(location)
    }
}

impl From<PathBuf> for LocationSpec {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&std::path::Path> for LocationSpec {
    fn from(path: &std::path::Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl From<Vec<LocationSpec>> for LocationSpec {
    fn from(specs: Vec<LocationSpec>) -> Self {
        Self::Group(specs)
    }
}

impl LocationSpec {
    /// Algorithms declared by already-constructed locations in the spec
    /// tree (paths declare nothing until they are opened).
    fn collect_algorithms(&self, found: &mut Vec<HashAlgorithm>) {
        match self {
            Self::Location(location) => {
                if let Some(algorithm) = location.algorithm() {
                    found.push(algorithm);
                }
            }
            Self::Path(_) => {}
            Self::Group(specs) => {
                for spec in specs {
                    spec.collect_algorithms(found);
                }
            }
        }
    }

    fn resolve(self, algorithm: HashAlgorithm) -> StorageResult<Arc<dyn Location>> {
        match self {
            Self::Location(location) => Ok(location),
            Self::Path(path) => {
                let disk =
                    DiskLocation::open_or_init(path, DiskConfig::new(algorithm))?;
                Ok(Arc::new(disk))
            }
            Self::Group(specs) => {
                let children = specs
                    .into_iter()
                    .map(|spec| spec.resolve(algorithm))
                    .collect::<StorageResult<Vec<_>>>()?;
                Ok(Arc::new(Fanout::new(children)?))
            }
        }
    }
}

/// Builder for [`HashKeyStorage`].
pub struct HashKeyStorageBuilder {
    local: Vec<LocationSpec>,
    remote: Vec<LocationSpec>,
    algorithm: Option<HashAlgorithm>,
    legacy: Vec<HashAlgorithm>,
}

impl HashKeyStorageBuilder {
    /// Add a local tier (writable, consulted first).
    pub fn local(mut self, spec: impl Into<LocationSpec>) -> Self {
        self.local.push(spec.into());
        self
    }

    /// Add a remote tier (consulted after every local tier; reads
    /// passing through it repopulate the local tiers).
    pub fn remote(mut self, spec: impl Into<LocationSpec>) -> Self {
        self.remote.push(spec.into());
        self
    }

    /// Force the primary algorithm instead of inferring it.
    pub fn algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.algorithm = Some(algorithm);
        self
    }

    /// Accept reads of keys produced by an older algorithm. Writes
    /// always use the primary.
    pub fn accept_legacy(mut self, algorithm: HashAlgorithm) -> Self {
        self.legacy.push(algorithm);
        self
    }

    /// Resolve specs, validate algorithm agreement and compose the root.
    pub fn build(self) -> StorageResult<HashKeyStorage> {
        if self.local.is_empty() {
            return Err(cairn_location::LocationError::Config(
                "at least one local location is required".into(),
            )
            .into());
        }

        // Infer the algorithm from constructed locations before opening
        // paths, which need one to initialize fresh roots.
        let mut declared = Vec::new();
        for spec in self.local.iter().chain(&self.remote) {
            spec.collect_algorithms(&mut declared);
        }
        let inferred = declared.first().copied();
        let primary = self
            .algorithm
            .or(inferred)
            .unwrap_or(HashAlgorithm::Sha256);

        let local = resolve_group(self.local, primary)?;
        let root: Arc<dyn Location> = if self.remote.is_empty() {
            local
        } else {
            let remote = resolve_group(self.remote, primary)?;
            Arc::new(Levels::new(vec![Level::new(local), Level::new(remote)])?)
        };

        // Final agreement check across the whole composition.
        if let Some(declared) = common_algorithm(&[root.clone()])? {
            if declared != primary {
                return Err(cairn_location::LocationError::Config(format!(
                    "locations declare {declared}, but the primary algorithm is {primary}"
                ))
                .into());
            }
        }

        let mut accepted = vec![primary];
        for algorithm in self.legacy {
            if !accepted.contains(&algorithm) {
                accepted.push(algorithm);
            }
        }

        Ok(HashKeyStorage {
            root,
            primary,
            accepted,
        })
    }
}

fn resolve_group(
    specs: Vec<LocationSpec>,
    algorithm: HashAlgorithm,
) -> StorageResult<Arc<dyn Location>> {
    let mut resolved = specs
        .into_iter()
        .map(|spec| spec.resolve(algorithm))
        .collect::<StorageResult<Vec<_>>>()?;
    Ok(if resolved.len() == 1 {
        resolved.remove(0)
    } else {
        Arc::new(Fanout::new(resolved)?)
    })
}

/// The hash-key storage façade.
///
/// Owns a single root [`Location`] (usually a composition) and keeps the
/// content-addressing contract honest at the boundary: writes digest the
/// source first and hand `(key, payload)` down; reads hand back a
/// [`ReadGuard`] that verifies the bytes against the key as they are
/// consumed.
pub struct HashKeyStorage {
    root: Arc<dyn Location>,
    primary: HashAlgorithm,
    accepted: Vec<HashAlgorithm>,
}

impl HashKeyStorage {
    pub fn builder() -> HashKeyStorageBuilder {
        HashKeyStorageBuilder {
            local: Vec::new(),
            remote: Vec::new(),
            algorithm: None,
            legacy: Vec::new(),
        }
    }

    /// Storage over a single prepared root location.
    pub fn over(root: Arc<dyn Location>) -> StorageResult<Self> {
        Self::builder().local(root).build()
    }

    /// The algorithm used for writes.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.primary
    }

    /// The root location (for diagnostics and maintenance wiring).
    pub fn root(&self) -> &Arc<dyn Location> {
        &self.root
    }

    /// Digest the source and store it. Returns the content key.
    ///
    /// Hash-first, write-second: the key is known before any location
    /// sees a byte, so locations can verify what they receive.
    pub fn write(&self, source: impl Into<WriteSource>) -> StorageResult<Key> {
        let digested = source.into().digest(self.primary)?;
        let key = digested.key().clone();
        match self.root.write(&key, digested.payload())? {
            WriteOutcome::Accepted => {
                debug!(key = %key.short_hex(), "stored payload");
                Ok(key)
            }
            WriteOutcome::RejectedFull
            | WriteOutcome::RejectedReadOnly
            | WriteOutcome::RejectedPolicy => Err(StorageError::StorageFull(key)),
        }
    }

    /// Open a verified read of `key`.
    ///
    /// Verification is lazy: the guard digests bytes as the caller
    /// consumes them, and [`ReadGuard::close`] reports
    /// [`StorageError::Corruption`] if the content does not match the
    /// key. Use [`read_bytes`](Self::read_bytes) for the eager variant.
    pub fn read(&self, key: &Key) -> StorageResult<ReadGuard> {
        let algorithm = self.verifier_for(key)?;
        match self.root.read(key)? {
            Some(reader) => Ok(ReadGuard::new(reader, key.clone(), algorithm)),
            None => Err(StorageError::NotFound(key.clone())),
        }
    }

    /// Read and verify the whole payload into memory.
    pub fn read_bytes(&self, key: &Key) -> StorageResult<Vec<u8>> {
        let mut guard = self.read(key)?;
        let mut buf = Vec::new();
        guard.read_to_end(&mut buf)?;
        guard.close()?;
        Ok(buf)
    }

    /// Whether any location holds the key. An `Unknown` probe falls back
    /// to attempting a read, as the contract requires.
    pub fn contains(&self, key: &Key) -> StorageResult<bool> {
        match self.root.contains(key)? {
            Presence::Found => Ok(true),
            Presence::Missing => Ok(false),
            Presence::Unknown => Ok(self.root.read(key)?.is_some()),
        }
    }

    /// Delete the key everywhere. Returns whether anything was removed.
    pub fn delete(&self, key: &Key) -> StorageResult<bool> {
        match self.root.delete(key)? {
            DeleteOutcome::Removed => Ok(true),
            DeleteOutcome::Absent => Ok(false),
            DeleteOutcome::RejectedReadOnly => Err(cairn_location::LocationError::Permission(
                "every location holding the key is read-only".into(),
            )
            .into()),
        }
    }

    /// Probe a batch of keys, reporting which are available. Reads that
    /// pass through lower tiers repopulate the higher ones as a side
    /// effect, so this doubles as a prefetch.
    pub fn fetch(&self, keys: &[Key]) -> Vec<(Key, bool)> {
        self.root
            .read_batch(keys)
            .into_iter()
            .map(|(key, result)| {
                let available = matches!(result, Ok(Some(_)));
                (key, available)
            })
            .collect()
    }

    /// The algorithm that verifies `key`, selected by digest length
    /// among the accepted set (primary first).
    fn verifier_for(&self, key: &Key) -> StorageResult<HashAlgorithm> {
        self.accepted
            .iter()
            .copied()
            .find(|algorithm| algorithm.digest_len() == key.len())
            .ok_or_else(|| StorageError::UnknownDigest {
                key: key.clone(),
                actual: key.len(),
            })
    }
}

impl std::fmt::Debug for HashKeyStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashKeyStorage")
            .field("primary", &self.primary)
            .field("accepted", &self.accepted)
            .finish()
    }
}

/// Scoped verified read: a byte stream that digests what the caller
/// consumes and checks it against the key on [`close`](Self::close).
///
/// Dropping the guard without closing skips verification (the bytes were
/// possibly never fully consumed); promotion and other location-side
/// effects still run.
pub struct ReadGuard {
    inner: BoxReader,
    key: Key,
    digester: Option<Digester>,
}

impl ReadGuard {
    fn new(inner: BoxReader, key: Key, algorithm: HashAlgorithm) -> Self {
        Self {
            inner,
            key,
            digester: Some(algorithm.digester()),
        }
    }

    /// The key this guard verifies against.
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Drain any unconsumed bytes, finish the digest and verify it.
    pub fn close(mut self) -> StorageResult<()> {
        io::copy(&mut self, &mut io::sink())?;
        let Some(digester) = self.digester.take() else {
            return Ok(());
        };
        let computed = digester.finalize();
        if computed != self.key {
            return Err(StorageError::Corruption {
                key: self.key.clone(),
                computed,
            });
        }
        Ok(())
    }
}

impl Read for ReadGuard {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            if let Some(digester) = self.digester.as_mut() {
                digester.update(&buf[..n]);
            }
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_location::{LocationError, LocationResult, MemoryLocation};
    use cairn_types::Payload;

    fn memory_storage() -> (HashKeyStorage, Arc<MemoryLocation>) {
        let root = Arc::new(MemoryLocation::new(HashAlgorithm::Sha256));
        let storage = HashKeyStorage::over(root.clone()).unwrap();
        (storage, root)
    }

    #[test]
    fn hello_has_the_canonical_sha256_key() {
        let (storage, _) = memory_storage();
        let key = storage.write(b"hello").unwrap();
        assert_eq!(
            key.to_hex(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(storage.read_bytes(&key).unwrap(), b"hello");
    }

    #[test]
    fn unwritten_key_is_not_found() {
        let (storage, _) = memory_storage();
        let key = HashAlgorithm::Sha256.digest(b"never written");
        assert!(matches!(
            storage.read(&key),
            Err(StorageError::NotFound(_))
        ));
        assert!(!storage.contains(&key).unwrap());
    }

    #[test]
    fn identical_writes_share_one_payload() {
        let (storage, root) = memory_storage();
        let k1 = storage.write(b"same bytes").unwrap();
        let k2 = storage.write(b"same bytes").unwrap();
        assert_eq!(k1, k2);
        assert_eq!(root.len(), 1);
    }

    #[test]
    fn full_root_reports_storage_full() {
        let root = Arc::new(MemoryLocation::new(HashAlgorithm::Sha256).with_budget(4));
        let storage = HashKeyStorage::over(root).unwrap();
        assert!(matches!(
            storage.write(&[0u8; 100]),
            Err(StorageError::StorageFull(_))
        ));
    }

    #[test]
    fn corrupted_disk_entry_is_reported_on_close() {
        let dir = tempfile::tempdir().unwrap();
        let storage = HashKeyStorage::builder()
            .local(dir.path())
            .algorithm(HashAlgorithm::Sha256)
            .build()
            .unwrap();

        let key = storage.write(b"precious bytes").unwrap();

        // Flip one byte of the payload on disk, bypassing the contract.
        let path = dir
            .path()
            .join(key.to_hex()[..2].to_string())
            .join(&key.to_hex()[2..]);
        let mut data = std::fs::read(&path).unwrap();
        data[0] ^= 0xFF;
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        #[allow(clippy::permissions_set_readonly_false)]
        perms.set_readonly(false);
        std::fs::set_permissions(&path, perms).unwrap();
        std::fs::write(&path, &data).unwrap();

        let err = storage.read_bytes(&key).unwrap_err();
        assert!(matches!(err, StorageError::Corruption { .. }));
    }

    #[test]
    fn legacy_digests_stay_readable() {
        // A key written under the older sha512 scheme: its 64-byte
        // length selects the legacy verifier.
        let root = Arc::new(MemoryLocation::new(HashAlgorithm::Sha256));
        let data = b"written long ago".to_vec();
        let old_key = HashAlgorithm::Sha512.digest(&data);
        root.write(&old_key, &Payload::from_bytes(data.clone()))
            .unwrap();

        let storage = HashKeyStorage::builder()
            .local(root as Arc<dyn Location>)
            .accept_legacy(HashAlgorithm::Sha512)
            .build()
            .unwrap();

        assert_eq!(storage.read_bytes(&old_key).unwrap(), data);

        // new writes still use the primary algorithm
        let new_key = storage.write(b"fresh").unwrap();
        assert_eq!(new_key.len(), 32);
    }

    #[test]
    fn unknown_digest_length_is_rejected() {
        let (storage, _) = memory_storage();
        let odd_key = Key::new(vec![0u8; 17]);
        assert!(matches!(
            storage.read(&odd_key),
            Err(StorageError::UnknownDigest { actual: 17, .. })
        ));
    }

    #[test]
    fn write_from_stream_spools() {
        let (storage, _) = memory_storage();
        let reader: Box<dyn Read + Send> =
            Box::new(std::io::Cursor::new(vec![7u8; 200_000]));
        let key = storage.write(reader).unwrap();
        assert_eq!(storage.read_bytes(&key).unwrap().len(), 200_000);
    }

    #[test]
    fn write_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input");
        std::fs::write(&input, b"from a file").unwrap();

        let (storage, _) = memory_storage();
        let key = storage.write(input.as_path()).unwrap();
        assert_eq!(storage.read_bytes(&key).unwrap(), b"from a file");
    }

    #[test]
    fn delete_reports_removal() {
        let (storage, _) = memory_storage();
        let key = storage.write(b"short lived").unwrap();
        assert!(storage.delete(&key).unwrap());
        assert!(!storage.delete(&key).unwrap());
    }

    #[test]
    fn remote_tier_backfills_local_on_read() {
        // Levels(local, remote): a key only present remotely is served
        // and repopulated into the local tier.
        let local = Arc::new(MemoryLocation::new(HashAlgorithm::Sha256));
        let remote = Arc::new(MemoryLocation::new(HashAlgorithm::Sha256));
        let data = b"remote only".to_vec();
        let key = HashAlgorithm::Sha256.digest(&data);
        remote
            .write(&key, &Payload::from_bytes(data.clone()))
            .unwrap();

        let storage = HashKeyStorage::builder()
            .local(local.clone() as Arc<dyn Location>)
            .remote(remote as Arc<dyn Location>)
            .build()
            .unwrap();

        assert_eq!(storage.read_bytes(&key).unwrap(), data);
        assert_eq!(local.len(), 1, "read should repopulate the local tier");
    }

    #[test]
    fn fetch_reports_availability() {
        let (storage, _) = memory_storage();
        let key = storage.write(b"here").unwrap();
        let missing = HashAlgorithm::Sha256.digest(b"not here");

        let report = storage.fetch(&[key.clone(), missing.clone()]);
        let get = |k: &Key| report.iter().find(|(rk, _)| rk == k).unwrap().1;
        assert!(get(&key));
        assert!(!get(&missing));
    }

    #[test]
    fn contains_falls_back_to_read_on_unknown() {
        /// A location whose probe always answers `Unknown`.
        struct CoyLocation(MemoryLocation);

        impl Location for CoyLocation {
            fn algorithm(&self) -> Option<HashAlgorithm> {
                self.0.algorithm()
            }
            fn read(&self, key: &Key) -> LocationResult<Option<BoxReader>> {
                self.0.read(key)
            }
            fn write(
                &self,
                key: &Key,
                payload: &Payload,
            ) -> LocationResult<WriteOutcome> {
                self.0.write(key, payload)
            }
            fn contains(&self, _key: &Key) -> LocationResult<Presence> {
                Ok(Presence::Unknown)
            }
            fn delete(&self, key: &Key) -> LocationResult<DeleteOutcome> {
                self.0.delete(key)
            }
        }

        let root = Arc::new(CoyLocation(MemoryLocation::new(HashAlgorithm::Sha256)));
        let storage = HashKeyStorage::over(root).unwrap();
        let key = storage.write(b"hidden behind unknown").unwrap();
        assert!(storage.contains(&key).unwrap());
        let missing = HashAlgorithm::Sha256.digest(b"absent");
        assert!(!storage.contains(&missing).unwrap());
    }

    #[test]
    fn builder_requires_a_local_location() {
        let err = HashKeyStorage::builder().build().unwrap_err();
        assert!(matches!(
            err,
            StorageError::Location(LocationError::Config(_))
        ));
    }

    #[test]
    fn builder_rejects_algorithm_disagreement() {
        let root = Arc::new(MemoryLocation::new(HashAlgorithm::Blake3));
        let err = HashKeyStorage::builder()
            .local(root as Arc<dyn Location>)
            .algorithm(HashAlgorithm::Sha256)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::Location(LocationError::Config(_))
        ));
    }
}
