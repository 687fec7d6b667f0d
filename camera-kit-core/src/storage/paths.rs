use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::models::error::CaptureError;

/// `dir/video<index>.mp4`.
pub fn recording_path(dir: &Path, index: u32) -> PathBuf {
    dir.join(format!("video{}.mp4", index))
}

/// Scratch path `dir/<name>.<ext>`; any file already there is removed.
pub fn temp_file_path(dir: &Path, name: &str, ext: &str) -> Result<PathBuf, CaptureError> {
    let path = dir.join(format!("{}.{}", name, ext));
    remove_stale(&path)?;
    Ok(path)
}

/// Remove a leftover file. Returns whether something was removed.
pub fn remove_stale(path: &Path) -> Result<bool, CaptureError> {
    match fs::remove_file(path) {
        Ok(()) => {
            log::debug!("Removed stale file {}", path.display());
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(CaptureError::StorageError(format!(
            "failed to remove {}: {}",
            path.display(),
            e
        ))),
    }
}

/// Delete every file and subdirectory inside `dir`, keeping `dir` itself.
pub fn clear_directory(dir: &Path) -> Result<(), CaptureError> {
    let entries = fs::read_dir(dir)
        .map_err(|e| CaptureError::StorageError(format!("failed to list {}: {}", dir.display(), e)))?;

    for entry in entries {
        let entry = entry.map_err(|e| CaptureError::StorageError(e.to_string()))?;
        let path = entry.path();
        let removed = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        removed.map_err(|e| {
            CaptureError::StorageError(format!("failed to remove {}: {}", path.display(), e))
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_path_uses_file_index() {
        let path = recording_path(Path::new("/data/out"), 3);
        assert_eq!(path, PathBuf::from("/data/out/video3.mp4"));
    }

    #[test]
    fn temp_file_path_removes_stale_file() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join("capture.mov");
        fs::write(&stale, b"old").unwrap();

        let path = temp_file_path(dir.path(), "capture", "mov").unwrap();
        assert_eq!(path, stale);
        assert!(!path.exists());
    }

    #[test]
    fn remove_stale_reports_whether_anything_was_there() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("video0.mp4");
        assert!(!remove_stale(&path).unwrap());

        fs::write(&path, b"x").unwrap();
        assert!(remove_stale(&path).unwrap());
    }

    #[test]
    fn clear_directory_keeps_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.mp4"), b"a").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested/b.jpg"), b"b").unwrap();

        clear_directory(dir.path()).unwrap();
        assert!(dir.path().exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn clear_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = clear_directory(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, CaptureError::StorageError(_)));
    }

    #[test]
    fn cleared_directory_has_no_stale_recordings() {
        let dir = tempfile::tempdir().unwrap();
        let recordings = dir.path().join("recordings");
        fs::create_dir_all(&recordings).unwrap();
        fs::write(recording_path(&recordings, 0), b"old").unwrap();
        fs::write(recordings.join("still.jpg"), b"old").unwrap();

        clear_directory(&recordings).unwrap();
        assert!(!remove_stale(&recording_path(&recordings, 0)).unwrap());

        let still = temp_file_path(&recordings, "still", "jpg").unwrap();
        assert_eq!(still, recordings.join("still.jpg"));
        assert!(!still.exists());
    }
}
