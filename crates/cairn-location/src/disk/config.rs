use std::io::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};

use cairn_types::{HashAlgorithm, PathSplit};

use crate::error::{LocationError, LocationResult};

/// File name of the persisted root config.
pub const CONFIG_NAME: &str = "config.json";

/// Persisted algorithm descriptor: `{name, length}`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HashDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,
}

impl From<HashAlgorithm> for HashDescriptor {
    fn from(algorithm: HashAlgorithm) -> Self {
        Self {
            name: algorithm.name().to_string(),
            length: Some(algorithm.digest_len()),
        }
    }
}

impl HashDescriptor {
    /// Resolve against the registry, verifying a declared length.
    pub fn resolve(&self) -> LocationResult<HashAlgorithm> {
        let algorithm = HashAlgorithm::from_name(&self.name)?;
        if let Some(length) = self.length {
            if length != algorithm.digest_len() {
                return Err(LocationError::Config(format!(
                    "declared digest length {length} does not match {} ({} bytes)",
                    algorithm.name(),
                    algorithm.digest_len()
                )));
            }
        }
        Ok(algorithm)
    }
}

/// A byte count that deserializes from either an integer or a string
/// with a binary suffix (`"512"`, `"100K"`, `"1G"`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ByteSize(pub u64);

impl<'de> Deserialize<'de> for ByteSize {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Int(u64),
            Str(String),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Int(n) => Ok(Self(n)),
            Repr::Str(s) => parse_size(&s).map(Self).map_err(serde::de::Error::custom),
        }
    }
}

/// Parse `"100"`, `"100K"`, `"1M"`, … (binary multiples, optional `B`).
fn parse_size(input: &str) -> Result<u64, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("empty size".to_string());
    }
    let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
    let suffix = s[digits.len()..].trim().to_ascii_uppercase();
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("bad size number in {input:?}"))?;
    let multiplier: u64 = match suffix.as_str() {
        "" | "B" => 1,
        "K" | "KB" | "KIB" => 1 << 10,
        "M" | "MB" | "MIB" => 1 << 20,
        "G" | "GB" | "GIB" => 1 << 30,
        "T" | "TB" | "TIB" => 1 << 40,
        other => return Err(format!("unknown size suffix {other:?} in {input:?}")),
    };
    value
        .checked_mul(multiplier)
        .ok_or_else(|| format!("size overflows u64: {input:?}"))
}

/// Persisted root configuration of a disk location.
///
/// The recognized options mirror the on-disk compatibility surface:
/// `hash` (required), `levels` (path split, default `[1, -1]`),
/// `max_size` (byte budget), `free_disk_size` (filesystem reserve) and
/// `grace_window` (eviction grace, seconds).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DiskConfig {
    pub hash: HashDescriptor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub levels: Option<PathSplit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<ByteSize>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub free_disk_size: ByteSize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grace_window: Option<u64>,
}

fn is_zero(size: &ByteSize) -> bool {
    size.0 == 0
}

impl DiskConfig {
    /// A minimal config for the given algorithm.
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self {
            hash: algorithm.into(),
            levels: None,
            max_size: None,
            free_disk_size: ByteSize(0),
            grace_window: None,
        }
    }

    /// Set the byte budget.
    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = Some(ByteSize(max_size));
        self
    }

    /// Set the free-disk reserve.
    pub fn with_free_disk_size(mut self, reserve: u64) -> Self {
        self.free_disk_size = ByteSize(reserve);
        self
    }

    /// Set the eviction grace window, in seconds.
    pub fn with_grace_window(mut self, seconds: u64) -> Self {
        self.grace_window = Some(seconds);
        self
    }

    /// The path split, defaulting to `[1, -1]`.
    pub fn split(&self) -> PathSplit {
        self.levels.clone().unwrap_or_default()
    }
}

/// Load the config from an existing storage root.
pub fn load(root: &Path) -> LocationResult<DiskConfig> {
    let path = root.join(CONFIG_NAME);
    let raw = std::fs::read_to_string(&path).map_err(|e| {
        LocationError::Config(format!("cannot read {}: {e}", path.display()))
    })?;
    serde_json::from_str(&raw)
        .map_err(|e| LocationError::Config(format!("malformed {}: {e}", path.display())))
}

/// Persist the config into a storage root, atomically.
pub fn store(root: &Path, config: &DiskConfig) -> LocationResult<()> {
    let raw = serde_json::to_vec_pretty(config)
        .map_err(|e| LocationError::Config(format!("cannot encode config: {e}")))?;
    let mut tmp = tempfile::NamedTempFile::new_in(root)?;
    tmp.write_all(&raw)?;
    tmp.persist(root.join(CONFIG_NAME))
        .map_err(|e| LocationError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let config = DiskConfig::new(HashAlgorithm::Sha256)
            .with_max_size(1 << 20)
            .with_grace_window(3600);
        store(dir.path(), &config).unwrap();
        let loaded = load(dir.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn missing_config_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load(dir.path()),
            Err(LocationError::Config(_))
        ));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let raw = r#"{"hash": {"name": "sha256"}, "surprise": 1}"#;
        assert!(serde_json::from_str::<DiskConfig>(raw).is_err());
    }

    #[test]
    fn size_accepts_int_and_suffixed_string() {
        let config: DiskConfig =
            serde_json::from_str(r#"{"hash": {"name": "sha256"}, "max_size": "100M", "free_disk_size": 512}"#)
                .unwrap();
        assert_eq!(config.max_size, Some(ByteSize(100 << 20)));
        assert_eq!(config.free_disk_size, ByteSize(512));
    }

    #[test]
    fn size_parser_suffixes() {
        assert_eq!(parse_size("512").unwrap(), 512);
        assert_eq!(parse_size("1K").unwrap(), 1024);
        assert_eq!(parse_size("2 MiB").unwrap(), 2 << 20);
        assert_eq!(parse_size("3gb").unwrap(), 3 << 30);
        assert!(parse_size("").is_err());
        assert!(parse_size("12X").is_err());
    }

    #[test]
    fn descriptor_length_mismatch_is_rejected() {
        let descriptor = HashDescriptor {
            name: "sha256".into(),
            length: Some(64),
        };
        assert!(matches!(
            descriptor.resolve(),
            Err(LocationError::Config(_))
        ));
    }

    #[test]
    fn descriptor_without_length_resolves() {
        let descriptor = HashDescriptor {
            name: "blake3".into(),
            length: None,
        };
        assert_eq!(descriptor.resolve().unwrap(), HashAlgorithm::Blake3);
    }
}
