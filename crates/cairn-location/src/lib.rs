//! The location algebra of the cairn storage framework.
//!
//! A [`Location`] is any backend that can hold content-addressed entries:
//! a directory on disk, an object store, a remote host, an in-memory map.
//! The value of this crate is the small set of combinators that compose
//! locations into bigger ones behind the same contract:
//!
//! - [`Fanout`] -- horizontal spill: an ordered list of peers; each new
//!   key lands in the first peer with room
//! - [`Levels`] -- vertical cache hierarchy with copy-on-read promotion
//!   into the faster tiers
//! - [`Small`] -- a size gate in front of stores meant for small values
//!
//! The local backend is [`DiskLocation`]: a sharded, content-addressed
//! directory with lock-free reads, advisory-locked writers, a crash
//! recovery sweep and least-recently-used eviction. [`MemoryLocation`]
//! backs tests and small in-process cache tiers.
//!
//! ```no_run
//! use std::sync::Arc;
//! use cairn_location::{DiskLocation, DiskConfig, Levels, Location};
//! use cairn_types::HashAlgorithm;
//!
//! # fn example() -> Result<(), cairn_location::LocationError> {
//! let fast = Arc::new(DiskLocation::open("/ssd/cache")?);
//! let slow = Arc::new(DiskLocation::open("/mnt/archive")?);
//! let hierarchy = Levels::of(vec![fast as Arc<dyn Location>, slow as _])?;
//! # Ok(())
//! # }
//! ```

pub mod contract;
pub mod disk;
pub mod error;
pub mod fanout;
pub mod levels;
pub mod maintenance;
pub mod memory;
pub mod retry;
pub mod small;

pub use contract::{
    common_algorithm, BoxReader, DeleteOutcome, EntryMeta, Location, Presence, WriteOutcome,
};
pub use disk::{
    ByteSize, DiskConfig, DiskLocation, EvictionStats, HashDescriptor, ShardLock, SweepStats,
    CONFIG_NAME,
};
pub use error::{LocationError, LocationResult};
pub use fanout::Fanout;
pub use levels::{Level, Levels};
pub use maintenance::{Maintenance, MaintenanceConfig};
pub use memory::MemoryLocation;
pub use retry::RetryPolicy;
pub use small::Small;
