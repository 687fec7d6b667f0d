use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::error::CaptureError;
use super::frame::AudioFormat;

/// Why a recording ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// `stop_recording` was called.
    Manual,
    /// The deadline timer reached the configured maximum duration.
    MaxDuration,
}

/// Result delivered when a recording has been finalized and persisted.
///
/// Persistence failures do not abort finalization; they are carried in
/// `error` and reported on the error channel.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingResult {
    pub file_path: PathBuf,
    pub duration_secs: f64,
    pub stop_reason: StopReason,
    pub local_identifier: Option<String>,
    pub checksum: Option<String>,
    pub error: Option<CaptureError>,
    pub metadata: RecordingMetadata,
}

impl RecordingResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Metadata stored alongside a recording as a JSON sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub id: String,
    pub file_index: u32,
    pub file_path: String,
    pub duration_secs: f64,
    pub stop_reason: StopReason,
    pub width: u32,
    pub height: u32,
    pub audio_channels: Option<u16>,
    pub audio_sample_rate: Option<f64>,
    pub checksum: Option<String>,
    pub local_identifier: Option<String>,
    pub created_at: String,
}

impl RecordingMetadata {
    pub fn new(
        file_index: u32,
        file_path: &str,
        duration_secs: f64,
        stop_reason: StopReason,
        dimensions: (u32, u32),
        audio: Option<AudioFormat>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            file_index,
            file_path: file_path.to_string(),
            duration_secs,
            stop_reason,
            width: dimensions.0,
            height: dimensions.1,
            audio_channels: audio.map(|a| a.channels),
            audio_sample_rate: audio.map(|a| a.sample_rate),
            checksum: None,
            local_identifier: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Result of a still picture capture.
#[derive(Debug, Clone, PartialEq)]
pub struct StillImageResult {
    pub image: Vec<u8>,
    pub local_identifier: Option<String>,
    pub error: Option<CaptureError>,
}
