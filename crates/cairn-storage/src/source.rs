use std::io::{Read, Write as _};
use std::path::PathBuf;

use cairn_types::{HashAlgorithm, Key, Payload};

use crate::error::StorageResult;

/// A caller-provided source of bytes to store: a file on disk, an
/// in-memory buffer, or a one-shot stream of unknown size.
pub enum WriteSource {
    Bytes(Vec<u8>),
    File(PathBuf),
    Stream(Box<dyn Read + Send>),
}

/// A digested source, ready to offer to a location. Keeps the spool
/// file (for stream sources) alive until the write completes.
pub(crate) struct DigestedSource {
    key: Key,
    payload: Payload,
    _spool: Option<tempfile::NamedTempFile>,
}

impl DigestedSource {
    pub(crate) fn key(&self) -> &Key {
        &self.key
    }

    pub(crate) fn payload(&self) -> &Payload {
        &self.payload
    }
}

impl WriteSource {
    /// Hash-first ingestion: stream the source through the digester,
    /// producing the key and a re-openable payload. One-shot streams are
    /// spooled through a temp file while hashing, so locations can open
    /// the payload as many times as the composition requires.
    pub(crate) fn digest(self, algorithm: HashAlgorithm) -> StorageResult<DigestedSource> {
        match self {
            Self::Bytes(data) => {
                let key = algorithm.digest(&data);
                Ok(DigestedSource {
                    key,
                    payload: Payload::from_bytes(data),
                    _spool: None,
                })
            }
            Self::File(path) => {
                let mut file = std::fs::File::open(&path)?;
                let key = algorithm.digest_reader(&mut file)?;
                Ok(DigestedSource {
                    key,
                    payload: Payload::from_file(path),
                    _spool: None,
                })
            }
            Self::Stream(mut reader) => {
                let mut spool = tempfile::NamedTempFile::new()?;
                let mut digester = algorithm.digester();
                let mut buf = vec![0u8; 64 * 1024];
                loop {
                    let n = reader.read(&mut buf)?;
                    if n == 0 {
                        break;
                    }
                    spool.write_all(&buf[..n])?;
                    digester.update(&buf[..n]);
                }
                spool.flush()?;
                let key = digester.finalize();
                let payload = Payload::from_file(spool.path());
                Ok(DigestedSource {
                    key,
                    payload,
                    _spool: Some(spool),
                })
            }
        }
    }
}

impl From<Vec<u8>> for WriteSource {
    fn from(data: Vec<u8>) -> Self {
        Self::Bytes(data)
    }
}

impl From<&[u8]> for WriteSource {
    fn from(data: &[u8]) -> Self {
        Self::Bytes(data.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for WriteSource {
    fn from(data: &[u8; N]) -> Self {
        Self::Bytes(data.to_vec())
    }
}

impl From<PathBuf> for WriteSource {
    fn from(path: PathBuf) -> Self {
        Self::File(path)
    }
}

impl From<&std::path::Path> for WriteSource {
    fn from(path: &std::path::Path) -> Self {
        Self::File(path.to_path_buf())
    }
}

impl From<Box<dyn Read + Send>> for WriteSource {
    fn from(reader: Box<dyn Read + Send>) -> Self {
        Self::Stream(reader)
    }
}
