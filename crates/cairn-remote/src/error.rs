use std::time::Duration;

use cairn_location::LocationError;

/// Failures reported by remote backend clients.
///
/// Clients translate their SDK's failures into these variants; the
/// adapters then classify them per the shared policy: network trouble,
/// timeouts and 5xx are transient, authentication failures and 403 are
/// permission errors, any other unambiguous 4xx is fatal for the
/// operation. "Not found" is not an error at all -- clients express
/// absence through their return types.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// The per-operation deadline expired.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The backend could not be reached.
    #[error("connection failure: {0}")]
    Connection(String),

    /// The backend rejected the caller's credentials.
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// An HTTP-style status from the backend.
    #[error("backend returned status {status}: {message}")]
    Status { status: u16, message: String },

    /// The backend is out of memory or space (e.g. a KV store OOM).
    /// Adapters turn this into a full rejection on write.
    #[error("backend out of space")]
    OutOfSpace,

    /// Anything else the client could not classify. Fatal.
    #[error("{0}")]
    Other(String),
}

impl RemoteError {
    /// Whether a retry may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Connection(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Classify into the shared location taxonomy.
    pub fn into_location(self) -> LocationError {
        if self.is_transient() {
            return LocationError::Transient(self.to_string());
        }
        match self {
            Self::Auth(message) => LocationError::Permission(message),
            Self::Status { status: 403, message } => LocationError::Permission(message),
            other => LocationError::Io(std::io::Error::other(other.to_string())),
        }
    }
}

/// Result alias for client operations.
pub type RemoteResult<T> = Result<T, RemoteError>;
