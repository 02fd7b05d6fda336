use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Last-access metadata: a `<payload>.time` sibling file holding the
/// POSIX timestamp as a textual float (seconds since epoch, one line).
///
/// Textual over binary so that `cat` answers "when was this last used";
/// every backend that stores a timestamp uses this same encoding.
///
/// A payload without its `.time` file is well-formed -- the metadata is
/// re-initialized on the next access. A `.time` file without a payload
/// is garbage; the sweep removes it.

/// The metadata sibling of a payload path.
pub(crate) fn time_path(payload: &Path) -> PathBuf {
    let mut name = payload
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".time");
    payload.with_file_name(name)
}

/// Record "now" as the payload's last access.
pub(crate) fn update(payload: &Path) -> io::Result<()> {
    let stamp = encode(SystemTime::now());
    std::fs::write(time_path(payload), stamp)
}

/// The payload's recorded last access, falling back to the payload
/// file's mtime when the metadata is missing or unreadable.
pub(crate) fn last_used(payload: &Path) -> Option<SystemTime> {
    if let Ok(raw) = std::fs::read_to_string(time_path(payload)) {
        if let Some(stamp) = decode(raw.trim()) {
            return Some(stamp);
        }
    }
    std::fs::metadata(payload).and_then(|m| m.modified()).ok()
}

/// Remove the metadata sibling, ignoring absence.
pub(crate) fn remove(payload: &Path) {
    let _ = std::fs::remove_file(time_path(payload));
}

fn encode(stamp: SystemTime) -> String {
    let since_epoch = stamp
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);
    format!("{:.6}\n", since_epoch.as_secs_f64())
}

fn decode(raw: &str) -> Option<SystemTime> {
    let seconds: f64 = raw.parse().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Some(UNIX_EPOCH + Duration::from_secs_f64(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_path_appends_suffix() {
        let payload = Path::new("/root/2c/f24dba");
        assert_eq!(time_path(payload), PathBuf::from("/root/2c/f24dba.time"));
    }

    #[test]
    fn update_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let payload = dir.path().join("entry");
        std::fs::write(&payload, b"data").unwrap();

        let before = SystemTime::now();
        update(&payload).unwrap();
        let stamp = last_used(&payload).expect("metadata present");

        let drift = stamp
            .duration_since(before)
            .unwrap_or_else(|e| e.duration());
        assert!(drift < Duration::from_secs(2));
    }

    #[test]
    fn missing_metadata_falls_back_to_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let payload = dir.path().join("entry");
        std::fs::write(&payload, b"data").unwrap();
        assert!(last_used(&payload).is_some());
    }

    #[test]
    fn garbage_metadata_falls_back_to_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let payload = dir.path().join("entry");
        std::fs::write(&payload, b"data").unwrap();
        std::fs::write(time_path(&payload), "not a number\n").unwrap();
        assert!(last_used(&payload).is_some());
    }

    #[test]
    fn missing_everything_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(last_used(&dir.path().join("ghost")).is_none());
    }

    #[test]
    fn encode_decode_roundtrip() {
        let stamp = UNIX_EPOCH + Duration::from_secs_f64(1_700_000_000.25);
        let decoded = decode(encode(stamp).trim()).unwrap();
        let drift = decoded
            .duration_since(stamp)
            .unwrap_or_else(|e| e.duration());
        assert!(drift < Duration::from_millis(1));
    }
}
