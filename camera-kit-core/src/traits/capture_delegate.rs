use crate::models::error::CaptureError;
use crate::models::recording_result::RecordingResult;
use crate::models::state::RecordingPhase;

/// Event delegate for recording session notifications.
///
/// This is the single-slot listener of the session: errors, progress and
/// completion all arrive here. Methods are called from the caller's thread
/// or the session's finalizer thread, never while the session lock is held.
/// Implementations should marshal to the UI thread if needed.
pub trait CaptureDelegate: Send + Sync {
    /// Called when the session moves between recording phases.
    fn on_state_changed(&self, state: &RecordingPhase);

    /// Called on every deadline timer tick with the elapsed time as `MM:SS.f`.
    fn on_time_updated(&self, elapsed: &str);

    /// Called for capability, I/O and persistence failures.
    fn on_error(&self, error: &CaptureError);

    /// Called after every finalized recording, whatever stopped it.
    fn on_capture_finished(&self, result: &RecordingResult);

    /// Called when a recording was cut off by the maximum duration.
    fn on_max_duration_reached(&self, result: &RecordingResult);
}
