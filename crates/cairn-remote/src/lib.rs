//! Remote backend adapters for the cairn storage framework.
//!
//! Each adapter translates the `Location` contract onto a backend shape
//! -- S3-style object stores, Redis-style KV stores, SFTP/SCP remotes,
//! HTTP autoindexes -- while the concrete network client stays an
//! external collaborator behind a small trait ([`ObjectClient`],
//! [`KvClient`], [`SshClient`], [`HttpClient`]). Wire protocols,
//! credentials and deadlines belong to the client; the adapter owns path
//! layout, idempotence, retry and error classification.
//!
//! All remote layouts mirror the local disk scheme
//! (`<d0d1>/<d2…dN>` under the bucket or remote root), so moving entries
//! between local and remote storage is a bit-identical copy.

pub mod error;
pub mod http;
pub mod kv;
pub mod object;
pub mod ssh;

pub use error::{RemoteError, RemoteResult};
pub use http::{HttpClient, HttpLocation};
pub use kv::{KvClient, KvLocation};
pub use object::{ObjectClient, ObjectLocation};
pub use ssh::{SshClient, SshLocation};
