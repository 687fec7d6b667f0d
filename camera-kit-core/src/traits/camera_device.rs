use crate::models::config::{FlashMode, OutputQuality};
use crate::models::error::CaptureError;

/// Camera authorization as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    Authorized,
    NotDetermined,
    Denied,
}

/// Interface for the platform camera the session records from.
///
/// Frame delivery is not part of this trait: capture outputs push frames
/// into `RecordingSession::on_frame` from their own queue.
pub trait CameraDevice: Send + Sync {
    /// Whether any (front or rear) camera exists.
    fn has_camera(&self) -> bool;

    fn authorization(&self) -> Authorization;

    /// Whether the session preset for `quality` can be applied.
    fn supports_quality(&self, quality: OutputQuality) -> bool;

    /// Switch the torch; called with the flash mode when recording starts
    /// and with `Off` once it is finalized.
    fn set_torch(&self, mode: FlashMode) -> Result<(), CaptureError>;

    /// Capture one still picture, returned as encoded image bytes.
    fn capture_still(&self) -> Result<Vec<u8>, CaptureError>;
}
