use std::io;

use cairn_location::LocationError;
use cairn_types::Key;

/// Errors surfaced to callers of the storage façade.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No location held the key.
    #[error("key not found: {0}")]
    NotFound(Key),

    /// Every writable location rejected the payload (full, read-only or
    /// policy).
    #[error("no writable location accepted the payload for {0}")]
    StorageFull(Key),

    /// Stored bytes did not digest to their key (lazy verification,
    /// reported on close).
    #[error("corrupt content for {key}: digests to {computed}")]
    Corruption { key: Key, computed: Key },

    /// The key's length matches none of the accepted algorithms.
    #[error("no accepted algorithm produces {actual}-byte digests (key {key})")]
    UnknownDigest { key: Key, actual: usize },

    /// A failure from the location layer (digest mismatch on write,
    /// permission, transient, corruption, config, I/O).
    #[error(transparent)]
    Location(#[from] LocationError),

    /// An I/O failure while reading a caller-provided source.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result alias for façade operations.
pub type StorageResult<T> = Result<T, StorageError>;
