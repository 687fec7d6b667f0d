use std::fs;
use std::path::{Path, PathBuf};

use crate::models::error::CaptureError;
use crate::models::recording_result::RecordingMetadata;

/// Sidecar location for a recording: `video0.mp4` → `video0.metadata.json`.
pub fn metadata_path(recording_path: &Path) -> PathBuf {
    recording_path.with_extension("metadata.json")
}

/// Write recording metadata as a JSON sidecar file next to the recording.
pub fn write_metadata(metadata: &RecordingMetadata, recording_path: &Path) -> Result<(), CaptureError> {
    let json = serde_json::to_string_pretty(metadata)
        .map_err(|e| CaptureError::StorageError(format!("failed to serialize metadata: {}", e)))?;
    fs::write(metadata_path(recording_path), json)
        .map_err(|e| CaptureError::StorageError(format!("failed to write metadata: {}", e)))?;
    Ok(())
}

/// Read recording metadata from a JSON sidecar file.
pub fn read_metadata(recording_path: &Path) -> Result<RecordingMetadata, CaptureError> {
    let json = fs::read_to_string(metadata_path(recording_path))
        .map_err(|e| CaptureError::StorageError(format!("failed to read metadata: {}", e)))?;
    serde_json::from_str(&json)
        .map_err(|e| CaptureError::StorageError(format!("failed to parse metadata: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::frame::AudioFormat;
    use crate::models::recording_result::StopReason;

    #[test]
    fn sidecar_sits_next_to_recording() {
        let dir = tempfile::tempdir().unwrap();
        let recording = dir.path().join("video2.mp4");

        let mut metadata = RecordingMetadata::new(
            2,
            &recording.to_string_lossy(),
            4.5,
            StopReason::MaxDuration,
            (720, 1280),
            Some(AudioFormat {
                channels: 2,
                sample_rate: 48_000.0,
            }),
        );
        metadata.checksum = Some("abc123".into());
        write_metadata(&metadata, &recording).unwrap();

        assert!(dir.path().join("video2.metadata.json").exists());
        let loaded = read_metadata(&recording).unwrap();
        assert_eq!(loaded, metadata);
        assert_eq!(loaded.audio_channels, Some(2));
    }

    #[test]
    fn stop_reason_is_snake_case_in_json() {
        let dir = tempfile::tempdir().unwrap();
        let recording = dir.path().join("video0.mp4");
        let metadata = RecordingMetadata::new(0, "video0.mp4", 1.0, StopReason::MaxDuration, (1, 1), None);
        write_metadata(&metadata, &recording).unwrap();

        let json = fs::read_to_string(metadata_path(&recording)).unwrap();
        assert!(json.contains("\"max_duration\""));
    }

    #[test]
    fn missing_sidecar_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_metadata(&dir.path().join("nothing.mp4")).unwrap_err();
        assert!(matches!(err, CaptureError::StorageError(_)));
    }
}
