use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::key::Key;

/// Partitions a hex digest into path segments.
///
/// Encoded as a list of byte counts; a trailing `-1` means "the rest of
/// the digest". The default `[1, -1]` maps a 32-byte key to
/// `<d0d1>/<d2…d63>`: the first byte (2 hex chars) becomes the shard
/// directory, the remainder the file name. Every backend -- local disk,
/// object stores, SSH remotes, HTTP autoindexes -- shares this mapping so
/// that migrating entries between them is a bit-identical copy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<i64>", into = "Vec<i64>")]
pub struct PathSplit {
    levels: Vec<i64>,
}

impl PathSplit {
    /// Validate and build a split from its encoded form.
    ///
    /// Rules: at least one level; every level positive, except that the
    /// last may be `-1` ("rest").
    pub fn new(levels: Vec<i64>) -> Result<Self, TypeError> {
        if levels.is_empty() {
            return Err(TypeError::InvalidSplit("no levels".into()));
        }
        for (i, &level) in levels.iter().enumerate() {
            let is_last = i == levels.len() - 1;
            if level == -1 && is_last {
                continue;
            }
            if level <= 0 {
                return Err(TypeError::InvalidSplit(format!(
                    "level {level} at position {i} (only the last level may be -1)"
                )));
            }
        }
        Ok(Self { levels })
    }

    /// The encoded form, as persisted in location configs.
    pub fn levels(&self) -> &[i64] {
        &self.levels
    }

    /// Total key length in bytes this split expects, or `None` if the
    /// split ends in a "rest" segment and accepts any sufficient length.
    pub fn fixed_len(&self) -> Option<usize> {
        if self.levels.last() == Some(&-1) {
            None
        } else {
            Some(self.levels.iter().map(|&l| l as usize).sum())
        }
    }

    /// Split a key's hex form into path segments.
    pub fn segments(&self, key: &Key) -> Result<Vec<String>, TypeError> {
        let head: usize = self
            .levels
            .iter()
            .filter(|&&l| l != -1)
            .map(|&l| l as usize)
            .sum();
        match self.fixed_len() {
            Some(expected) if key.len() != expected => {
                return Err(TypeError::InvalidLength {
                    expected,
                    actual: key.len(),
                });
            }
            // a "rest" segment must still be non-empty
            None if key.len() <= head => {
                return Err(TypeError::InvalidLength {
                    expected: head + 1,
                    actual: key.len(),
                });
            }
            _ => {}
        }

        let hex = key.to_hex();
        let mut segments = Vec::with_capacity(self.levels.len());
        let mut start = 0;
        for &level in &self.levels {
            let stop = if level == -1 {
                hex.len()
            } else {
                start + level as usize * 2
            };
            segments.push(hex[start..stop].to_string());
            start = stop;
        }
        Ok(segments)
    }

    /// The key's relative path under a storage root.
    pub fn relative(&self, key: &Key) -> Result<PathBuf, TypeError> {
        Ok(self.segments(key)?.into_iter().collect())
    }

    /// Reassemble a key from its path segments. Inverse of [`segments`].
    ///
    /// [`segments`]: Self::segments
    pub fn key_from_segments<S: AsRef<str>>(&self, segments: &[S]) -> Result<Key, TypeError> {
        let hex: String = segments.iter().map(|s| s.as_ref()).collect();
        Key::from_hex(&hex)
    }
}

impl Default for PathSplit {
    fn default() -> Self {
        Self { levels: vec![1, -1] }
    }
}

impl TryFrom<Vec<i64>> for PathSplit {
    type Error = TypeError;

    fn try_from(levels: Vec<i64>) -> Result<Self, Self::Error> {
        Self::new(levels)
    }
}

impl From<PathSplit> for Vec<i64> {
    fn from(split: PathSplit) -> Self {
        split.levels
    }
}
