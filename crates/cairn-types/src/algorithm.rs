use std::io::{self, Read};

use sha2::Digest as _;

use crate::error::TypeError;
use crate::key::Key;

/// Read buffer size for streaming digests.
const BLOCK_SIZE: usize = 64 * 1024;

/// The closed registry of digest algorithms a location may declare.
///
/// SHA-256 is the default. The registry is closed on purpose: a key's
/// algorithm is recovered from its digest length, so every supported
/// algorithm must have a distinct, known length.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Sha256,
    Sha512,
    Blake3,
}

impl HashAlgorithm {
    /// All supported algorithms.
    pub const ALL: [Self; 3] = [Self::Sha256, Self::Sha512, Self::Blake3];

    /// Canonical lowercase name, as persisted in location configs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
            Self::Blake3 => "blake3",
        }
    }

    /// Digest length in bytes.
    pub fn digest_len(&self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Sha512 => 64,
            Self::Blake3 => 32,
        }
    }

    /// Look up an algorithm by its canonical name.
    pub fn from_name(name: &str) -> Result<Self, TypeError> {
        match name {
            "sha256" => Ok(Self::Sha256),
            "sha512" => Ok(Self::Sha512),
            "blake3" => Ok(Self::Blake3),
            other => Err(TypeError::UnknownAlgorithm(other.to_string())),
        }
    }

    /// Start a streaming digest computation.
    pub fn digester(&self) -> Digester {
        Digester(match self {
            Self::Sha256 => Inner::Sha256(sha2::Sha256::new()),
            Self::Sha512 => Inner::Sha512(sha2::Sha512::new()),
            Self::Blake3 => Inner::Blake3(Box::new(blake3::Hasher::new())),
        })
    }

    /// Digest a byte slice in one call.
    pub fn digest(&self, data: &[u8]) -> Key {
        let mut digester = self.digester();
        digester.update(data);
        digester.finalize()
    }

    /// Digest an entire reader, streaming in fixed-size blocks.
    pub fn digest_reader(&self, reader: &mut dyn Read) -> io::Result<Key> {
        let mut digester = self.digester();
        let mut buf = vec![0u8; BLOCK_SIZE];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            digester.update(&buf[..n]);
        }
        Ok(digester.finalize())
    }

    /// Verify that `data` digests to `expected`.
    pub fn verify(&self, data: &[u8], expected: &Key) -> bool {
        self.digest(data) == *expected
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Incremental digest state for one [`HashAlgorithm`].
pub struct Digester(Inner);

enum Inner {
    Sha256(sha2::Sha256),
    Sha512(sha2::Sha512),
    // boxed: the blake3 hasher is ~2 KiB of SIMD state
    Blake3(Box<blake3::Hasher>),
}

impl Digester {
    /// Feed more bytes into the digest.
    pub fn update(&mut self, data: &[u8]) {
        match &mut self.0 {
            Inner::Sha256(h) => h.update(data),
            Inner::Sha512(h) => h.update(data),
            Inner::Blake3(h) => {
                h.update(data);
            }
        }
    }

    /// Finish the computation and produce the key.
    pub fn finalize(self) -> Key {
        match self.0 {
            Inner::Sha256(h) => Key::new(h.finalize().to_vec()),
            Inner::Sha512(h) => Key::new(h.finalize().to_vec()),
            Inner::Blake3(h) => Key::new(h.finalize().as_bytes().to_vec()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        // sha256("hello")
        let key = HashAlgorithm::Sha256.digest(b"hello");
        assert_eq!(
            key.to_hex(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn digest_lengths() {
        assert_eq!(HashAlgorithm::Sha256.digest(b"x").len(), 32);
        assert_eq!(HashAlgorithm::Sha512.digest(b"x").len(), 64);
        assert_eq!(HashAlgorithm::Blake3.digest(b"x").len(), 32);
    }

    #[test]
    fn streaming_matches_oneshot() {
        let data = vec![7u8; 3 * BLOCK_SIZE + 17];
        for algorithm in HashAlgorithm::ALL {
            let oneshot = algorithm.digest(&data);
            let streamed = algorithm.digest_reader(&mut &data[..]).unwrap();
            assert_eq!(oneshot, streamed, "{algorithm}");
        }
    }

    #[test]
    fn name_roundtrip() {
        for algorithm in HashAlgorithm::ALL {
            assert_eq!(HashAlgorithm::from_name(algorithm.name()).unwrap(), algorithm);
        }
    }

    #[test]
    fn unknown_name_is_rejected() {
        let err = HashAlgorithm::from_name("md5").unwrap_err();
        assert!(matches!(err, TypeError::UnknownAlgorithm(_)));
    }

    #[test]
    fn verify_detects_tampering() {
        let key = HashAlgorithm::Sha256.digest(b"original");
        assert!(HashAlgorithm::Sha256.verify(b"original", &key));
        assert!(!HashAlgorithm::Sha256.verify(b"tampered", &key));
    }
}
