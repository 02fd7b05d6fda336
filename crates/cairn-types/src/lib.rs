//! Core types for the cairn content-addressed storage framework.
//!
//! Everything in cairn is keyed by a cryptographic digest: a value's
//! identifier *is* its hash. This crate holds the vocabulary shared by the
//! location layer and the storage façade:
//!
//! - [`Key`] -- a digest, the flat byte-wise key space
//! - [`HashAlgorithm`] -- the closed algorithm registry with streaming
//!   [`Digester`]s
//! - [`PathSplit`] -- the mapping from a hex digest to path segments
//!   (`<d0d1>/<d2…dN>` by default), shared by every backend so that local
//!   and remote layouts stay bit-identical
//! - [`Payload`] -- a re-openable byte source handed to locations on write
//!
//! No I/O happens here beyond `std::io` traits; backends live in
//! `cairn-location` and `cairn-remote`.

pub mod algorithm;
pub mod error;
pub mod key;
pub mod payload;
pub mod split;

pub use algorithm::{Digester, HashAlgorithm};
pub use error::TypeError;
pub use key::Key;
pub use payload::Payload;
pub use split::PathSplit;
