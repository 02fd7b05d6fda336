//! Hash-key storage: the content-addressed façade of the cairn
//! framework.
//!
//! [`HashKeyStorage`] owns a root [`Location`] -- usually a composition
//! built from the combinators in `cairn-location` -- and enforces the
//! content-addressing contract at the boundary:
//!
//! - **write-by-hash**: sources are digested first (spooling one-shot
//!   streams through a temp file), so every location receives a key it
//!   can verify
//! - **verified reads**: [`ReadGuard`] digests the bytes the caller
//!   consumes and reports corruption on close
//! - **multi-digest tolerance**: legacy keys under older algorithms stay
//!   readable; writes always use the primary algorithm
//!
//! ```no_run
//! use cairn_storage::HashKeyStorage;
//! use std::path::Path;
//!
//! # fn example() -> Result<(), cairn_storage::StorageError> {
//! let storage = HashKeyStorage::builder()
//!     .local(Path::new("/var/cache/cairn"))
//!     .build()?;
//!
//! let key = storage.write(b"hello")?;
//! let bytes = storage.read_bytes(&key)?;
//! assert_eq!(bytes, b"hello");
//! # Ok(())
//! # }
//! ```
//!
//! [`Location`]: cairn_location::Location

pub mod error;
pub mod source;
pub mod storage;

pub use error::{StorageError, StorageResult};
pub use source::WriteSource;
pub use storage::{HashKeyStorage, HashKeyStorageBuilder, LocationSpec, ReadGuard};
