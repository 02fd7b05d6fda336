use std::fmt;

use crate::error::TypeError;

/// Content-addressed identifier for a stored value.
///
/// A `Key` is the digest of the value's bytes. Identical content always
/// produces the same `Key`, making values deduplicatable and verifiable.
/// The key space is flat; equality and ordering are byte-wise.
///
/// Unlike a fixed 32-byte hash newtype, a `Key` owns a variable-length
/// byte string: the façade can be configured to accept several digest
/// algorithms at once, and their lengths differ.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(Box<[u8]>);

impl Key {
    /// Wrap raw digest bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into().into_boxed_slice())
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Digest length in bytes (32 for SHA-256).
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` for a zero-length key. Such keys are never produced
    /// by a digester; the check exists for input validation.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Short hex representation (first 8 characters) for logging.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..self.0.len().min(4)])
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if bytes.is_empty() {
            return Err(TypeError::InvalidHex("empty key".into()));
        }
        Ok(Self(bytes.into_boxed_slice()))
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self.short_hex())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<Vec<u8>> for Key {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl From<[u8; 32]> for Key {
    fn from(bytes: [u8; 32]) -> Self {
        Self::new(bytes.to_vec())
    }
}

impl AsRef<[u8]> for Key {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip() {
        let key = Key::new(vec![0xde, 0xad, 0xbe, 0xef]);
        let parsed = Key::from_hex(&key.to_hex()).unwrap();
        assert_eq!(key, parsed);
    }

    #[test]
    fn from_hex_rejects_garbage() {
        assert!(Key::from_hex("not hex").is_err());
        assert!(Key::from_hex("").is_err());
    }

    #[test]
    fn display_is_full_hex() {
        let key = Key::new(vec![0xab; 32]);
        let display = format!("{key}");
        assert_eq!(display.len(), 64);
        assert_eq!(display, key.to_hex());
    }

    #[test]
    fn short_hex_is_8_chars() {
        let key = Key::new(vec![0x01; 32]);
        assert_eq!(key.short_hex().len(), 8);
    }

    #[test]
    fn short_hex_handles_tiny_keys() {
        let key = Key::new(vec![0x01, 0x02]);
        assert_eq!(key.short_hex(), "0102");
    }

    #[test]
    fn ordering_is_bytewise() {
        let a = Key::new(vec![0u8; 32]);
        let b = Key::new(vec![1u8; 32]);
        assert!(a < b);
    }
}
