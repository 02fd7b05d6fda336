use std::fs::File;
use std::io::{self, BufReader, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A re-openable byte source offered to locations on write.
///
/// Combinators may hand the same payload to several children (a `Levels`
/// write goes to every writable tier), so a one-shot stream is not enough:
/// each child opens its own reader. Callers with a true one-shot stream
/// spool it to a temp file first and pass the path; the storage façade
/// does this transparently.
#[derive(Clone, Debug)]
pub enum Payload {
    /// Bytes on a local filesystem. Opened lazily, per reader.
    File(PathBuf),
    /// Bytes held in memory, shared without copying.
    Bytes(Arc<[u8]>),
}

impl Payload {
    /// A payload backed by a file path.
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    /// A payload backed by an in-memory buffer.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Bytes(bytes.into().into())
    }

    /// Payload size in bytes. Stats the file for path-backed payloads.
    pub fn size(&self) -> io::Result<u64> {
        match self {
            Self::File(path) => Ok(std::fs::metadata(path)?.len()),
            Self::Bytes(bytes) => Ok(bytes.len() as u64),
        }
    }

    /// Open a fresh reader over the whole payload.
    pub fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        match self {
            Self::File(path) => Ok(Box::new(BufReader::new(File::open(path)?))),
            Self::Bytes(bytes) => Ok(Box::new(Cursor::new(Arc::clone(bytes)))),
        }
    }

    /// Read the whole payload into memory.
    pub fn to_vec(&self) -> io::Result<Vec<u8>> {
        match self {
            Self::File(path) => std::fs::read(path),
            Self::Bytes(bytes) => Ok(bytes.to_vec()),
        }
    }

    /// The backing path, for payloads that have one.
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Self::File(path) => Some(path),
            Self::Bytes(_) => None,
        }
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_bytes(bytes)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Self::from_bytes(bytes.to_vec())
    }
}

impl From<PathBuf> for Payload {
    fn from(path: PathBuf) -> Self {
        Self::File(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn bytes_payload_reports_size_and_reopens() {
        let payload = Payload::from_bytes(b"hello".to_vec());
        assert_eq!(payload.size().unwrap(), 5);

        for _ in 0..2 {
            let mut buf = Vec::new();
            payload.open().unwrap().read_to_end(&mut buf).unwrap();
            assert_eq!(buf, b"hello");
        }
    }

    #[test]
    fn file_payload_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"on disk")
            .unwrap();

        let payload = Payload::from_file(&path);
        assert_eq!(payload.size().unwrap(), 7);
        assert_eq!(payload.to_vec().unwrap(), b"on disk");
        assert_eq!(payload.as_path(), Some(path.as_path()));
    }

    #[test]
    fn missing_file_surfaces_io_error() {
        let payload = Payload::from_file("/nonexistent/cairn-test");
        assert!(payload.size().is_err());
        assert!(payload.open().is_err());
    }
}
