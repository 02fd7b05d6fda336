/// Errors from key parsing and the algorithm registry.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TypeError {
    /// A hex string could not be decoded.
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    /// A key's length does not fit the expected digest or split.
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// The named algorithm is not in the registry.
    #[error("unknown hash algorithm: {0}")]
    UnknownAlgorithm(String),

    /// A path split's encoded levels are malformed.
    #[error("invalid path split: {0}")]
    InvalidSplit(String),
}
