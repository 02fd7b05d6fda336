use std::io;

use cairn_types::{Key, TypeError};

/// The shared error taxonomy for location operations.
///
/// Absence and policy rejections are *not* errors -- they are encoded in
/// the operation outcomes (`Ok(None)`, [`WriteOutcome`]) so combinators
/// can drive traversal on them. Errors split into *transient* (worth a
/// retry: network, timeout, contended lock) and everything else, which is
/// fatal for the operation.
///
/// [`WriteOutcome`]: crate::contract::WriteOutcome
#[derive(Debug, thiserror::Error)]
pub enum LocationError {
    /// Content did not verify against its key.
    #[error("digest mismatch for {key}: computed {computed}")]
    DigestMismatch { key: Key, computed: Key },

    /// The backend denied access.
    #[error("permission denied: {0}")]
    Permission(String),

    /// A failure expected to succeed on retry (network, timeout,
    /// contended advisory lock).
    #[error("transient failure: {0}")]
    Transient(String),

    /// On-disk or backend state is inconsistent beyond what the startup
    /// sweep repairs.
    #[error("storage corruption: {0}")]
    Corruption(String),

    /// Construction-time misconfiguration: algorithm mismatch across
    /// children, missing root, malformed config.
    #[error("configuration error: {0}")]
    Config(String),

    /// An I/O failure from the underlying filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl LocationError {
    /// Whether a retry may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Collapse a set of transient child failures into one.
    pub fn aggregate_transient(errors: Vec<LocationError>) -> Self {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        Self::Transient(format!(
            "all {} children failed transiently: {}",
            messages.len(),
            messages.join("; ")
        ))
    }
}

impl From<TypeError> for LocationError {
    fn from(err: TypeError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result alias for location operations.
pub type LocationResult<T> = Result<T, LocationError>;
