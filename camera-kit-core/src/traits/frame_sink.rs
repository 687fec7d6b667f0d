use std::path::{Path, PathBuf};

use crate::models::error::CaptureError;
use crate::models::frame::{AudioFormat, Frame};

/// Parameters for creating a frame sink.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkSpec {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    /// `Some` when the container carries an audio track.
    pub audio: Option<AudioFormat>,
}

/// Writer status as exposed by a frame sink.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkStatus {
    /// Created, no frame accepted yet.
    Idle,
    Writing,
    Failed(CaptureError),
}

/// What a sink reports once its container is finalized.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkOutput {
    pub file_path: PathBuf,
    pub checksum: String,
    pub video_frames: u64,
    pub audio_frames: u64,
}

/// Callback invoked exactly once when finalization completes.
pub type FinishCallback = Box<dyn FnOnce(Result<SinkOutput, CaptureError>) + Send + 'static>;

/// Encoder that accepts timestamped frames and finalizes them into a container file.
///
/// The first accepted frame starts the writing session at its presentation
/// timestamp.
pub trait FrameSink: Send {
    /// Append a frame to its track. Frames for a missing track are rejected.
    fn write(&mut self, frame: &Frame) -> Result<(), CaptureError>;

    fn status(&self) -> SinkStatus;

    fn path(&self) -> &Path;

    /// Finalize asynchronously; `on_complete` may run on another thread.
    fn finish(self: Box<Self>, on_complete: FinishCallback);
}

/// Creates frame sinks for a recording session.
pub trait FrameSinkFactory: Send + Sync {
    fn create(&self, spec: &SinkSpec) -> Result<Box<dyn FrameSink>, CaptureError>;
}
